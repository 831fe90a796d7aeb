use utoipa::OpenApi;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Course Notifier API",
        version = "1.0.0",
        description = "Backend for course registration notifications.\n\n**Accounts:** email verification, password reset and sign in.\n\n**Classes:** each user keeps a list of CRNs to watch; the list is replaced as a whole.\n\n**Bot:** a polling agent reads the watch list and reports class statuses back. When `BOT_API_KEY` is set these endpoints expect it as a Bearer token."
    ),
    paths(
        // Auth
        crate::api::auth::create_account,
        crate::api::auth::verify_account,
        crate::api::auth::request_reset,
        crate::api::auth::reset_password,
        crate::api::auth::sign_in,
        crate::api::auth::get_session,

        // Classes
        crate::api::classes::update_classes,
        crate::api::classes::list_user_classes,

        // Bot
        crate::api::classes::get_user_classes,
        crate::api::classes::update_class_statuses,

        // Health
        crate::api::health::health_check,
        crate::api::health::get_example,
    ),
    components(
        schemas(
            crate::services::auth_service::CreateAccountRequest,
            crate::services::auth_service::RequestResetRequest,
            crate::services::auth_service::ResetPasswordRequest,
            crate::services::auth_service::SignInRequest,
            crate::services::auth_service::MessageResponse,
            crate::services::auth_service::SignInResponse,
            crate::services::auth_service::SessionResponse,

            crate::models::ClassRow,
            crate::models::Subscription,
            crate::services::subscription_service::UpdateClassesRequest,
            crate::services::subscription_service::UpdateClassesResponse,
            crate::services::subscription_service::UserClassesResponse,
            crate::services::subscription_service::WatchedCourse,
            crate::services::subscription_service::WatchedUser,
            crate::services::subscription_service::StatusUpdateResponse,

            crate::api::health::HealthResponse,
            crate::api::health::ExampleResponse,
        )
    ),
    tags(
        (name = "Auth", description = "Account creation, email verification, password reset and sign in."),
        (name = "Classes", description = "Per-user course lists."),
        (name = "Bot", description = "Endpoints polled by the registration bot."),
        (name = "Health", description = "Liveness and database connectivity."),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("Session token returned by /sign_in"))
                        .build(),
                ),
            );
            components.add_security_scheme(
                "bot_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    "Authorization",
                    "Bearer <BOT_API_KEY>",
                ))),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&str> = doc.paths.paths.keys().map(String::as_str).collect();

        for path in [
            "/create_account",
            "/verify_account/{token}",
            "/request_reset",
            "/reset_password/{token}",
            "/sign_in",
            "/session",
            "/update_classes",
            "/user_classes/{email}",
            "/get_user_classes",
            "/update_class_statuses",
            "/get_example",
            "/health",
        ] {
            assert!(paths.contains(&path), "missing {}", path);
        }
    }
}
