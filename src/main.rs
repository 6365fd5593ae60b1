mod auth;
mod compose;
mod config;
mod encoder;
mod error;
mod gmail;
mod labels;
mod models;
mod responder;
mod server;
mod transport;

use crate::config::Config;
use crate::gmail::GmailConnector;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level()?)
        .with_target(false)
        .init();

    // Read the client secret up front so a missing file fails at startup
    // rather than on the first login.
    let secret = auth::Authenticator::load_secret(&config.credentials_path).await?;

    server::serve(&config, Box::new(GmailConnector::new(secret))).await
}
