use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use std::collections::BTreeMap;

use super::auth::bearer_token;
use crate::services::auth_service;
use crate::services::subscription_service::{
    self, StatusUpdateResponse, UpdateClassesRequest, UpdateClassesResponse, UserClassesResponse,
    WatchedUser,
};
use crate::state::AppState;
use crate::utils::AppError;

/// A session token, when one is sent, must belong to `email`. Requests
/// without a token are served as before.
fn check_session(state: &AppState, req: &HttpRequest, email: &str) -> Result<(), AppError> {
    let Some(token) = bearer_token(req) else {
        return Ok(());
    };

    let claims = auth_service::verify_session_token(&state.config, token)?;
    if claims.sub != email.trim() {
        return Err(AppError::Forbidden(
            "Session does not belong to this account.".to_string(),
        ));
    }
    Ok(())
}

#[utoipa::path(
    post,
    path = "/update_classes",
    tag = "Classes",
    request_body = UpdateClassesRequest,
    responses(
        (status = 200, description = "Course list replaced", body = UpdateClassesResponse),
        (status = 400, description = "Invalid CRN or missing accountName"),
        (status = 401, description = "Session token sent but invalid"),
        (status = 403, description = "Session token belongs to another account"),
        (status = 404, description = "Unknown user")
    ),
    security(
        (),
        ("bearer_auth" = [])
    )
)]
pub async fn update_classes(
    state: web::Data<AppState>,
    req: HttpRequest,
    request: web::Json<UpdateClassesRequest>,
) -> HttpResponse {
    log::info!(
        "📚 POST /update_classes - account: {}, rows: {}",
        request.account_name,
        request.rows.len()
    );

    if let Err(e) = check_session(&state, &req, &request.account_name) {
        log::warn!("❌ Update classes refused: {} - {}", request.account_name, e);
        return e.error_response();
    }

    match subscription_service::update_classes(&state, &request).await {
        Ok(count) => HttpResponse::Ok().json(UpdateClassesResponse {
            success: true,
            message: "Classes updated.".to_string(),
            count,
        }),
        Err(e) => {
            log::warn!("❌ Update classes failed: {} - {}", request.account_name, e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/user_classes/{email}",
    tag = "Classes",
    params(("email" = String, Path, description = "Account email")),
    responses(
        (status = 200, description = "Current subscriptions with class status", body = UserClassesResponse),
        (status = 401, description = "Session token sent but invalid"),
        (status = 403, description = "Session token belongs to another account"),
        (status = 404, description = "Unknown user")
    ),
    security(
        (),
        ("bearer_auth" = [])
    )
)]
pub async fn list_user_classes(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> HttpResponse {
    let email = path.into_inner();
    log::info!("📚 GET /user_classes/{}", email);

    if let Err(e) = check_session(&state, &req, &email) {
        log::warn!("❌ List classes refused: {} - {}", email, e);
        return e.error_response();
    }

    match subscription_service::list_user_classes(&state, &email).await {
        Ok(classes) => HttpResponse::Ok().json(UserClassesResponse {
            success: true,
            email,
            classes,
        }),
        Err(e) => {
            log::warn!("❌ List classes failed: {} - {}", email, e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/get_user_classes",
    tag = "Bot",
    responses(
        (status = 200, description = "Watch list keyed by email", body = BTreeMap<String, WatchedUser>),
        (status = 401, description = "Bot API key missing or wrong")
    ),
    security(
        ("bot_key" = [])
    )
)]
pub async fn get_user_classes(state: web::Data<AppState>) -> HttpResponse {
    log::info!("🤖 GET /get_user_classes");

    match subscription_service::get_user_classes(&state).await {
        Ok(watched) => HttpResponse::Ok().json(watched),
        Err(e) => {
            log::error!("❌ Failed to build watch list: {}", e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/update_class_statuses",
    tag = "Bot",
    request_body(content = BTreeMap<String, i32>, description = "CRN to status"),
    responses(
        (status = 200, description = "All statuses written", body = StatusUpdateResponse),
        (status = 404, description = "At least one CRN is unknown; nothing was written"),
        (status = 401, description = "Bot API key missing or wrong")
    ),
    security(
        ("bot_key" = [])
    )
)]
pub async fn update_class_statuses(
    state: web::Data<AppState>,
    statuses: web::Json<BTreeMap<i32, i32>>,
) -> HttpResponse {
    log::info!("🤖 POST /update_class_statuses - {} classes", statuses.len());

    match subscription_service::update_class_statuses(&state, &statuses).await {
        Ok(updated) => HttpResponse::Ok().json(StatusUpdateResponse {
            success: true,
            updated,
        }),
        Err(e) => {
            log::warn!("❌ Status update rejected: {}", e);
            e.error_response()
        }
    }
}
