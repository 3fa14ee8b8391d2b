//! Backend access: the HTTP client and the query cache in front of it.

pub mod cache;
pub mod client;
#[cfg(test)]
pub(crate) mod testing;

pub use cache::{QueryCache, QueryKey, QueryState};
pub use client::{LeadQuery, TcisClient};
