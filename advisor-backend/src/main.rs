use actix_cors::Cors;
use actix_files::{Files, NamedFile};
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::sync::Arc;

mod agents;
mod ai;
mod config;
mod context;
mod controllers;
mod db;
mod execution;
mod http;
mod telemetry;
mod tools;
mod turn;
mod uploads;

use config::Config;
use context::AppContext;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env().map_err(|e| {
        log::error!("Invalid configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e)
    })?;
    let port = config.port;
    let frontend_dir = config.frontend_dir.clone();

    let ctx = AppContext::init(config).map_err(|e| {
        log::error!("Startup failed: {}", e);
        std::io::Error::other(e)
    })?;

    let maintenance = ctx.spawn_maintenance();

    log::info!("Starting financial advisor server on port {}", port);

    let server_ctx = Arc::clone(&ctx);
    let result = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        let mut app = App::new()
            .app_data(web::Data::new(Arc::clone(&server_ctx)))
            .wrap(Logger::default())
            .wrap(cors)
            .configure(controllers::health::config)
            .configure(controllers::chat::config)
            .configure(controllers::artifacts::config)
            .configure(controllers::telemetry::config);

        // Serve the frontend, with SPA fallback to index.html for client-side routing
        if let Some(dir) = frontend_dir.clone() {
            let index = dir.join("index.html");
            app = app.service(
                Files::new("/", dir)
                    .index_file("index.html")
                    .default_handler(move |req: actix_web::dev::ServiceRequest| {
                        let (http_req, _payload) = req.into_parts();
                        let index = index.clone();
                        async move {
                            let response = NamedFile::open(index)?.into_response(&http_req);
                            Ok(actix_web::dev::ServiceResponse::new(http_req, response))
                        }
                    }),
            );
        }
        app
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await;

    maintenance.abort();
    ctx.shutdown();
    result
}
