mod api;
mod config;
mod database;
mod middleware;
mod models;
mod services;
mod state;
mod utils;

#[cfg(test)]
mod test_support;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::database::{MemoryStore, MongoDB, Store};
use crate::services::email_service::{LogMailer, Mailer, PostmarkMailer};
use crate::state::AppState;
use crate::utils::UuidTokenGenerator;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = AppConfig::from_env();

    log::info!("🚀 Starting Course Notifier...");

    let store: Arc<dyn Store> = if config.uses_memory_store() {
        log::warn!("⚠️  Using in-memory store, data is lost on restart");
        Arc::new(MemoryStore::new())
    } else {
        let db = MongoDB::new(&config.database_url)
            .await
            .expect("Failed to connect to MongoDB");
        log::info!("✅ MongoDB connected successfully");
        Arc::new(db)
    };

    let mailer: Arc<dyn Mailer> = match &config.postmark_api_key {
        Some(key) => {
            log::info!("📧 Sending email through Postmark as {}", config.email_sender);
            let mailer = PostmarkMailer::new(key.clone(), config.email_sender.clone())
                .expect("Failed to build the Postmark client");
            Arc::new(mailer)
        }
        None => {
            log::warn!("⚠️  POSTMARK_API_KEY not set, emails will only be logged");
            Arc::new(LogMailer)
        }
    };

    if config.bot_api_key.is_none() {
        log::warn!("⚠️  BOT_API_KEY not set, bot endpoints are open");
    }

    let host = config.host.clone();
    let port = config.port;
    let state = web::Data::new(AppState {
        store,
        mailer,
        tokens: Arc::new(UuidTokenGenerator),
        config: Arc::new(config),
    });

    log::info!("🌐 Server starting on {}:{}", host, port);
    log::info!("📚 Swagger UI available at: http://{}:{}/swagger-ui/", host, port);
    log::info!("📄 OpenAPI spec at: http://{}:{}/api-docs/openapi.json", host, port);

    HttpServer::new(move || {
        let config = &state.config;

        let cors = if config.cors_origins.is_empty() {
            Cors::default().allow_any_origin()
        } else {
            config
                .cors_origins
                .iter()
                .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
        }
        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allowed_headers(vec![
            actix_web::http::header::AUTHORIZATION,
            actix_web::http::header::CONTENT_TYPE,
            actix_web::http::header::ACCEPT,
        ])
        .max_age(3600);

        // Generate OpenAPI specification
        let openapi = api::swagger::ApiDoc::openapi();
        let bot_api_key = config.bot_api_key.clone();

        App::new()
            .app_data(state.clone())
            .wrap(cors)
            .wrap(Logger::default())
            .service(SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", openapi))
            .configure(move |cfg| api::configure(cfg, bot_api_key))
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}
