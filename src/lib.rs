pub mod api;
pub mod cli;
mod commands;
pub mod error;
pub mod export;
pub mod filters;
pub mod notification;
pub mod poller;
pub mod projection;
pub mod render;
pub mod services;
pub mod state;
pub mod types;
pub mod url_sync;
pub mod util;
pub mod validation;

use cli::Cli;
use error::ApiError;
use state::AppState;

/// Entry point for the `tcis` binary: load state from `~/.tcis` and run the
/// parsed command.
pub async fn run(cli: Cli) -> Result<(), ApiError> {
    let state = AppState::load()?;
    log::debug!("Backend: {}", state.dashboard.client().base_url());
    commands::execute(&state, cli).await
}
