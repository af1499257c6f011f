//! Runs the worker-proxy engine against the buffered `hello_world` adapter.
//! Grounded in `original_source/workers/hello_world/server.py`'s `backend`
//! wiring: same log-action rules, same benchmark handler.
#[macro_use]
extern crate slog_scope;

use std::error::Error;

use worker::logging;
use worker_auth::{pubkey, Authenticator};
use worker_demos::echo::{log_rules, GenerateAdapter};
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
    // The reference worker allows parallel requests to the model server.
    let server = worker::Server::with_settings(
        settings,
        GenerateAdapter,
        authenticator,
        true,
        log_rules(),
    )
    .await?;
    info!("Server running on {}", banner);
    server.await?;
    info!("Server closing");
    logging::reset_logging();

    Ok(())
}
