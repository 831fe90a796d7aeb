use actix_web::{http::header, web, HttpRequest, HttpResponse, ResponseError};

use crate::services::auth_service::{
    self, CreateAccountOutcome, CreateAccountRequest, MessageResponse, RequestResetRequest,
    ResetPasswordRequest, SessionResponse, SignInRequest, SignInResponse,
};
use crate::state::AppState;
use crate::utils::AppError;

const RESET_REQUESTED: &str = "If the email is registered, a reset link has been sent.";

pub(crate) fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[utoipa::path(
    post,
    path = "/create_account",
    tag = "Auth",
    request_body = CreateAccountRequest,
    responses(
        (status = 201, description = "Account created, verification email sent", body = MessageResponse),
        (status = 200, description = "Unverified account refreshed, verification email resent", body = MessageResponse),
        (status = 400, description = "Invalid input or email already exists", body = MessageResponse)
    )
)]
pub async fn create_account(
    state: web::Data<AppState>,
    request: web::Json<CreateAccountRequest>,
) -> HttpResponse {
    log::info!("📝 POST /create_account - email: {}", request.email);

    match auth_service::create_account(&state, &request).await {
        Ok(CreateAccountOutcome::Created) => HttpResponse::Created().json(MessageResponse::ok(
            "Account created. Check your email to verify it.",
        )),
        Ok(CreateAccountOutcome::Resent) => HttpResponse::Ok().json(MessageResponse::ok(
            "Account not verified yet. A new verification email has been sent.",
        )),
        Err(e) => {
            log::warn!("❌ Account creation failed: {} - {}", request.email, e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/verify_account/{token}",
    tag = "Auth",
    params(("token" = String, Path, description = "Verification token from the email")),
    responses(
        (status = 200, description = "Account verified", body = MessageResponse),
        (status = 400, description = "Invalid or expired token", body = MessageResponse)
    )
)]
pub async fn verify_account(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    log::info!("✓ GET /verify_account");

    match auth_service::verify_account(&state, &path).await {
        Ok(()) => HttpResponse::Ok().json(MessageResponse::ok("Account verified. You can now sign in.")),
        Err(e) => {
            log::warn!("❌ Verification failed: {}", e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/request_reset",
    tag = "Auth",
    request_body = RequestResetRequest,
    responses(
        (status = 200, description = "Reset requested; the answer does not reveal whether the email exists", body = MessageResponse)
    )
)]
pub async fn request_reset(
    state: web::Data<AppState>,
    request: web::Json<RequestResetRequest>,
) -> HttpResponse {
    log::info!("🔑 POST /request_reset");

    if let Err(e) = auth_service::request_reset(&state, &request).await {
        log::error!("❌ Reset request failed: {}", e);
    }

    HttpResponse::Ok().json(MessageResponse::ok(RESET_REQUESTED))
}

#[utoipa::path(
    post,
    path = "/reset_password/{token}",
    tag = "Auth",
    request_body = ResetPasswordRequest,
    params(("token" = String, Path, description = "Reset token from the email")),
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Invalid or expired token", body = MessageResponse)
    )
)]
pub async fn reset_password(
    state: web::Data<AppState>,
    path: web::Path<String>,
    request: web::Json<ResetPasswordRequest>,
) -> HttpResponse {
    log::info!("🔑 POST /reset_password");

    match auth_service::reset_password(&state, &path, &request).await {
        Ok(()) => HttpResponse::Ok().json(MessageResponse::ok("Password updated.")),
        Err(e) => {
            log::warn!("❌ Password reset failed: {}", e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/sign_in",
    tag = "Auth",
    request_body = SignInRequest,
    responses(
        (status = 200, description = "Signed in", body = SignInResponse),
        (status = 401, description = "Login failed", body = MessageResponse),
        (status = 403, description = "Account not verified", body = MessageResponse)
    )
)]
pub async fn sign_in(state: web::Data<AppState>, request: web::Json<SignInRequest>) -> HttpResponse {
    log::info!("🔐 POST /sign_in - email: {}", request.email);

    match auth_service::sign_in(&state, &request).await {
        Ok(response) => {
            log::info!("✅ Sign in successful: {}", request.email);
            HttpResponse::Ok().json(response)
        }
        Err(e) => {
            log::warn!("❌ Sign in failed: {} - {}", request.email, e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/session",
    tag = "Auth",
    responses(
        (status = 200, description = "Session token is valid", body = SessionResponse),
        (status = 401, description = "Missing, invalid or expired token", body = MessageResponse)
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_session(state: web::Data<AppState>, req: HttpRequest) -> HttpResponse {
    log::info!("✓ GET /session");

    let Some(token) = bearer_token(&req) else {
        return AppError::Unauthorized("Missing bearer token.".to_string()).error_response();
    };

    match auth_service::verify_session_token(&state.config, token) {
        Ok(claims) => HttpResponse::Ok().json(SessionResponse {
            valid: true,
            email: claims.sub,
            exp: claims.exp,
        }),
        Err(e) => {
            log::warn!("❌ Invalid session token: {}", e);
            e.error_response()
        }
    }
}
