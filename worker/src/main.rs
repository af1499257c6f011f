//! Worker-proxy sidecar entry point.
//!
//! Wires the generic engine to the built-in JSON-echo adapter. Real
//! deployments swap in their own `EndpointAdapter` (see `demos/` for two
//! richer, hello-world-grounded ones) but the wiring below -- settings,
//! logging, public key fetch, server bootstrap -- stays the same.
#[macro_use]
extern crate slog_scope;

use std::error::Error;

use worker::default_adapter::{log_rules, EchoAdapter};
use worker::logging;
use worker_auth::{pubkey, Authenticator};
use worker_settings::Settings;

#[actix_web::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let settings = Settings::from_env()?;
    logging::init_logging(settings.human_logs).expect("Logging failed to initialize");
    debug!("Starting up...");

    let client = reqwest::Client::new();
    let public_key = pubkey::fetch_public_key(&client, pubkey::PUBLIC_KEY_URL).await;
    if public_key.is_none() {
        error!("no public key available after retries; running fail-closed");
    }
    let authenticator = Authenticator::new(public_key);

    let banner = settings.banner();
    let server =
        worker::Server::with_settings(settings, EchoAdapter, authenticator, true, log_rules()).await?;
    info!("Server running on {}", banner);
    server.await?;
    info!("Server closing");
    logging::reset_logging();

    Ok(())
}
