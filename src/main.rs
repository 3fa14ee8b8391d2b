use std::process::ExitCode;

use clap::Parser;

use tcis_lib::cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match tcis_lib::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let report = tcis_lib::error::ErrorReport::from(&e);
            eprintln!("Error: {}", report.message);
            eprintln!("{}", report.recovery_suggestion);
            log::debug!("{:?}", e);
            ExitCode::FAILURE
        }
    }
}
