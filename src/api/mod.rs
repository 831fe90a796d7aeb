pub mod auth;
pub mod classes;
pub mod health;
pub mod swagger;

use actix_web::web;

use crate::middleware::BotAuth;
use crate::utils::AppError;

/// Registers every route. `bot_api_key` guards the bot endpoints when set.
pub fn configure(cfg: &mut web::ServiceConfig, bot_api_key: Option<String>) {
    // Malformed bodies get the same JSON error shape as everything else
    let json_config = web::JsonConfig::default().error_handler(|err, _req| {
        AppError::Validation(format!("Invalid request body: {}", err)).into()
    });

    cfg.app_data(json_config)
        // Health
        .route("/health", web::get().to(health::health_check))
        .route("/get_example", web::get().to(health::get_example))
        // Accounts
        .route("/create_account", web::post().to(auth::create_account))
        .route("/verify_account/{token}", web::get().to(auth::verify_account))
        .route("/request_reset", web::post().to(auth::request_reset))
        .route("/reset_password/{token}", web::post().to(auth::reset_password))
        .route("/sign_in", web::post().to(auth::sign_in))
        .route("/session", web::get().to(auth::get_session))
        // Classes
        .route("/update_classes", web::post().to(classes::update_classes))
        .route("/user_classes/{email}", web::get().to(classes::list_user_classes))
        // Bot
        .service(
            web::resource("/get_user_classes")
                .wrap(BotAuth::new(bot_api_key.clone()))
                .route(web::get().to(classes::get_user_classes)),
        )
        .service(
            web::resource("/update_class_statuses")
                .wrap(BotAuth::new(bot_api_key))
                .route(web::post().to(classes::update_class_statuses)),
        );
}
