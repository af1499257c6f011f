//! A tiny stand-in "model server" used by the integration tests: it accepts
//! the same `/generate` and `/generate_stream` shapes the `hello_world`
//! reference model server does, without loading an actual model.
use actix_web::{web, App, HttpResponse, HttpServer};
use serde_json::Value;

async fn generate(payload: web::Json<Value>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "echo": payload.into_inner() }))
}

async fn generate_stream(payload: web::Json<Value>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "echo": payload.into_inner() }))
}

async fn healthcheck() -> HttpResponse {
    HttpResponse::Ok().finish()
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let port: u16 = std::env::var("STUB_MODEL_SERVER_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(5001);

    HttpServer::new(|| {
        App::new()
            .route("/generate", web::post().to(generate))
            .route("/generate_stream", web::post().to(generate_stream))
            .route("/healthcheck", web::get().to(healthcheck))
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
