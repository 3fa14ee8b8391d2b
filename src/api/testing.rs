//! Minimal in-process HTTP responder for client tests.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

#[derive(Debug, Clone)]
pub struct TestResponse {
    pub status: u16,
    pub body: String,
}

impl TestResponse {
    pub fn json(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }
}

pub struct TestServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl TestServer {
    /// Serve `responses` in order, one per connection, then stop accepting.
    pub fn spawn(responses: Vec<TestResponse>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let queue = Arc::new(Mutex::new(VecDeque::from(responses)));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let requests_for_thread = Arc::clone(&requests);

        thread::spawn(move || {
            while let Ok((mut stream, _)) = listener.accept() {
                let Ok(request) = read_request(&mut stream) else {
                    break;
                };
                requests_for_thread.lock().unwrap().push(request);

                let Some(response) = queue.lock().unwrap().pop_front() else {
                    break;
                };
                let _ = write_response(&mut stream, &response);
                let _ = stream.shutdown(Shutdown::Both);
                if queue.lock().unwrap().is_empty() {
                    break;
                }
            }
        });

        Self {
            base_url: format!("http://{addr}/api"),
            requests,
        }
    }

    /// Raw requests received so far (request line, headers, body).
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

fn read_request(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut buf = [0_u8; 1024];
    let mut request = Vec::new();
    let header_end = loop {
        let read = stream.read(&mut buf)?;
        if read == 0 {
            return Ok(String::from_utf8_lossy(&request).into_owned());
        }
        request.extend_from_slice(&buf[..read]);
        if let Some(pos) = request.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&request[..header_end]).to_lowercase();
    let content_length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while request.len() < header_end + content_length {
        let read = stream.read(&mut buf)?;
        if read == 0 {
            break;
        }
        request.extend_from_slice(&buf[..read]);
    }
    Ok(String::from_utf8_lossy(&request).into_owned())
}

fn write_response(stream: &mut TcpStream, response: &TestResponse) -> std::io::Result<()> {
    write!(
        stream,
        "HTTP/1.1 {} TEST\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        response.status,
        response.body.len()
    )?;
    stream.write_all(response.body.as_bytes())?;
    stream.flush()
}
