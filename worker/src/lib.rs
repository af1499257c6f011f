#![warn(rust_2018_idioms)]
#[macro_use]
extern crate slog_scope;

pub mod adapter;
pub mod benchmark;
pub mod default_adapter;
pub mod engine;
pub mod error;
pub mod gate;
pub mod logging;
pub mod metrics;
pub mod reporter;
pub mod tailer;

use std::error::Error;
use std::sync::Arc;

use actix_web::{dev, web, App, HttpResponse, HttpServer};

use adapter::EndpointAdapter;
use engine::Engine;
use gate::AdmissionGate;
use metrics::Metrics;
use tailer::LogRule;
use worker_auth::Authenticator;
use worker_settings::Settings;

pub struct Server;

async fn ping() -> HttpResponse {
    HttpResponse::Ok().body("pong")
}

impl Server {
    /// Builds and runs the worker-proxy HTTP server, plus its two background
    /// tasks (§4.9), for a single Endpoint Adapter mounted at its own path.
    ///
    /// Callers needing more than one adapter (as the `demos` crate's stub
    /// model server does) repeat this wiring per adapter against the same
    /// `Metrics`/`Authenticator`/`AdmissionGate`, mirroring how
    /// `syncserver::server::Server` composes multiple `.configure(...)` calls
    /// over one `HttpServer::new` closure.
    pub async fn with_settings<A>(
        settings: Settings,
        adapter: A,
        authenticator: Authenticator,
        allow_parallel_requests: bool,
        log_rules: Vec<LogRule>,
    ) -> Result<dev::Server, Box<dyn Error>>
    where
        A: EndpointAdapter + Clone + 'static,
    {
        let advertised_url = settings.advertised_url();
        let metrics = Arc::new(Metrics::new(settings.container_id, settings.report_addr.clone()));
        let gate = Arc::new(AdmissionGate::new(allow_parallel_requests));
        let authenticator = Arc::new(authenticator);
        let client = reqwest::Client::new();

        let benchmarker = benchmark::Benchmarker::new(
            adapter.clone(),
            client.clone(),
            settings.model_server_url(),
            std::path::PathBuf::from(&settings.benchmark_indicator_path),
            3,
        );
        tokio::spawn(tailer::run(
            settings.model_log.clone(),
            log_rules,
            Arc::clone(&metrics),
            benchmarker,
        ));

        tokio::spawn(reporter::run(
            Arc::clone(&metrics),
            reqwest::Client::new(),
            advertised_url,
        ));

        let engine = Arc::new(Engine {
            adapter,
            authenticator,
            metrics,
            gate,
            client,
            model_server_url: settings.model_server_url(),
        });
        let endpoint = engine.adapter.endpoint().to_owned();

        let server = HttpServer::new(move || {
            let engine = Arc::clone(&engine);
            App::new()
                .app_data(web::Data::new(Arc::clone(&engine)))
                .route("/ping", web::get().to(ping))
                .route(
                    &endpoint,
                    web::post().to(move |data: web::Data<Arc<Engine<A>>>, body: web::Bytes| {
                        let data = Arc::clone(&data);
                        async move { data.handle(body).await }
                    }),
                )
        });

        // TLS termination is out of core scope (§1): certificate/key loading
        // and the `bind_rustls` wiring belong to the binary, not the engine.
        if settings.use_ssl {
            debug!("use_ssl set; certificate loading is the binary's responsibility");
        }
        let server = server.bind(("0.0.0.0", settings.port))?.run();
        Ok(server)
    }
}
