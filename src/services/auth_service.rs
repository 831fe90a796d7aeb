use bcrypt::{hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    models::User,
    services::email_service::{self, LinkKind},
    state::AppState,
    utils::AppError,
};

const INVALID_TOKEN: &str = "Invalid or expired token.";

// JWT Claims
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // email
    pub iat: usize,
    pub exp: usize,
    pub jti: String,
    pub iss: String,
}

// Request/Response structures
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateAccountRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RequestResetRequest {
    pub email: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ResetPasswordRequest {
    pub password: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: &str) -> Self {
        Self {
            success: true,
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SignInResponse {
    pub success: bool,
    pub message: String,
    pub token: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SessionResponse {
    pub valid: bool,
    pub email: String,
    pub exp: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateAccountOutcome {
    Created,
    Resent,
}

// ==================== SESSION TOKENS ====================

pub fn issue_session_token(config: &AppConfig, email: &str) -> Result<String, AppError> {
    let now = Utc::now();
    let claims = Claims {
        sub: email.to_string(),
        iat: now.timestamp() as usize,
        exp: (now + Duration::hours(config.session_ttl_hours)).timestamp() as usize,
        jti: Uuid::new_v4().to_string(),
        iss: config.jwt_issuer.clone(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_ref()),
    )
    .map_err(|e| AppError::Internal(format!("Failed to generate token: {}", e)))
}

pub fn verify_session_token(config: &AppConfig, token: &str) -> Result<Claims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[config.jwt_issuer.as_str()]);

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_ref()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))
}

// ==================== PASSWORDS ====================

async fn hash_password(password: &str, cost: u32) -> Result<String, AppError> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || hash(password, cost))
        .await
        .map_err(|e| AppError::Internal(format!("Password hashing task failed: {}", e)))?
        .map_err(AppError::from)
}

async fn password_matches(password: &str, password_hash: &str) -> bool {
    let password = password.to_string();
    let password_hash = password_hash.to_string();

    match tokio::task::spawn_blocking(move || verify(password, &password_hash)).await {
        Ok(Ok(valid)) => valid,
        Ok(Err(e)) => {
            log::warn!("⚠️  Stored password hash is unreadable: {}", e);
            false
        }
        Err(e) => {
            log::error!("❌ Password verification task failed: {}", e);
            false
        }
    }
}

fn normalize_email(raw: &str) -> Result<String, AppError> {
    let email = raw.trim();
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    };

    if !valid {
        return Err(AppError::Validation("A valid email is required.".to_string()));
    }
    Ok(email.to_string())
}

fn require_password(password: &str) -> Result<(), AppError> {
    if password.is_empty() {
        return Err(AppError::Validation("Password is required.".to_string()));
    }
    Ok(())
}

// ==================== ACCOUNT FLOWS ====================

/// Registers a new account, or refreshes an account that was never verified.
pub async fn create_account(
    state: &AppState,
    request: &CreateAccountRequest,
) -> Result<CreateAccountOutcome, AppError> {
    let email = normalize_email(&request.email)?;
    require_password(&request.password)?;

    let existing = state.store.find_user_by_email(&email).await?;
    if existing.as_ref().is_some_and(|u| u.verified) {
        return Err(AppError::Conflict("Email already exists.".to_string()));
    }

    let password_hash = hash_password(&request.password, state.config.bcrypt_cost).await?;
    let token = state.tokens.generate();

    let outcome = match existing {
        // Fails with Conflict if the account got verified while hashing
        Some(_) => {
            state
                .store
                .refresh_unverified(&email, &password_hash, &token)
                .await?;
            log::info!("🔁 Unverified account {} re-registered", email);
            CreateAccountOutcome::Resent
        }
        None => {
            let user = User::new_unverified(&email, password_hash, token.clone(), Utc::now());
            state.store.insert_user(&user).await?;
            log::info!("✅ Account created: {}", email);
            CreateAccountOutcome::Created
        }
    };

    email_service::dispatch(
        state.mailer.as_ref(),
        &email,
        &state.config.api_base_url,
        LinkKind::VerifyAccount,
        &token,
    )
    .await;

    Ok(outcome)
}

/// Marks the account owning `token` as verified. The token is single use.
pub async fn verify_account(state: &AppState, token: &str) -> Result<(), AppError> {
    if token.is_empty() {
        return Err(AppError::Validation(INVALID_TOKEN.to_string()));
    }

    let email = state
        .store
        .verify_by_token(token)
        .await?
        .ok_or_else(|| AppError::Validation(INVALID_TOKEN.to_string()))?;

    log::info!("✅ Account verified: {}", email);
    Ok(())
}

/// Issues a reset token when the email is registered. Callers answer the
/// same way whether or not it is.
pub async fn request_reset(state: &AppState, request: &RequestResetRequest) -> Result<(), AppError> {
    let email = request.email.trim();

    let Some(user) = state.store.find_user_by_email(email).await? else {
        log::info!("🔑 Reset requested for unknown email");
        return Ok(());
    };

    let token = state.tokens.generate();
    let expires = Utc::now() + Duration::minutes(state.config.reset_token_ttl_minutes);
    state.store.set_reset_token(&user.email, &token, expires).await?;

    email_service::dispatch(
        state.mailer.as_ref(),
        &user.email,
        &state.config.webpage_base_url,
        LinkKind::ResetPassword,
        &token,
    )
    .await;

    Ok(())
}

pub async fn reset_password(
    state: &AppState,
    token: &str,
    request: &ResetPasswordRequest,
) -> Result<(), AppError> {
    require_password(&request.password)?;

    let invalid = || AppError::Validation(INVALID_TOKEN.to_string());

    // Checked up front so unknown tokens skip the hash
    let known = state
        .store
        .find_user_by_reset_token(token)
        .await?
        .is_some_and(|u| u.reset_token_valid(token, Utc::now()));
    if !known {
        return Err(invalid());
    }

    let password_hash = hash_password(&request.password, state.config.bcrypt_cost).await?;
    let email = state
        .store
        .consume_reset_token(token, &password_hash, Utc::now())
        .await?
        .ok_or_else(invalid)?;

    log::info!("✅ Password reset for {}", email);
    Ok(())
}

pub async fn sign_in(state: &AppState, request: &SignInRequest) -> Result<SignInResponse, AppError> {
    let login_failed = || AppError::Unauthorized("Login failed.".to_string());

    let user = state
        .store
        .find_user_by_email(request.email.trim())
        .await?
        .ok_or_else(login_failed)?;

    if !password_matches(&request.password, &user.password_hash).await {
        return Err(login_failed());
    }

    if !user.verified {
        return Err(AppError::Forbidden("Account not verified.".to_string()));
    }

    let token = issue_session_token(&state.config, &user.email)?;

    Ok(SignInResponse {
        success: true,
        message: "Successfully logged in.".to_string(),
        token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context, TestContext};

    fn create(email: &str, password: &str) -> CreateAccountRequest {
        CreateAccountRequest {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    fn sign_in_request(email: &str, password: &str) -> SignInRequest {
        SignInRequest {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    async fn register_and_verify(ctx: &TestContext, email: &str, password: &str) {
        create_account(&ctx.state, &create(email, password)).await.unwrap();
        let token = ctx.user(email).await.verification_token.unwrap();
        verify_account(&ctx.state, &token).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_account_sends_verification_link() {
        let ctx = context();

        let outcome = create_account(&ctx.state, &create("a@gatech.edu", "pw1")).await.unwrap();
        assert_eq!(outcome, CreateAccountOutcome::Created);

        let user = ctx.user("a@gatech.edu").await;
        assert!(!user.verified);
        assert_eq!(user.verification_token.as_deref(), Some("token-1"));
        assert_ne!(user.password_hash, "pw1");

        let sent = ctx.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "a@gatech.edu");
        assert_eq!(sent[0].link, "http://api.test/verify_account/token-1");
    }

    #[tokio::test]
    async fn test_unverified_reregistration_resends() {
        let ctx = context();
        create_account(&ctx.state, &create("a@gatech.edu", "old")).await.unwrap();

        let outcome = create_account(&ctx.state, &create("a@gatech.edu", "new")).await.unwrap();
        assert_eq!(outcome, CreateAccountOutcome::Resent);

        let user = ctx.user("a@gatech.edu").await;
        assert_eq!(user.verification_token.as_deref(), Some("token-2"));
        assert_eq!(ctx.mailer.sent().len(), 2);

        // The old link no longer works, the new password does
        assert!(verify_account(&ctx.state, "token-1").await.is_err());
        verify_account(&ctx.state, "token-2").await.unwrap();
        assert!(sign_in(&ctx.state, &sign_in_request("a@gatech.edu", "old")).await.is_err());
        assert!(sign_in(&ctx.state, &sign_in_request("a@gatech.edu", "new")).await.is_ok());
    }

    #[tokio::test]
    async fn test_verified_email_cannot_register_again() {
        let ctx = context();
        register_and_verify(&ctx, "a@gatech.edu", "pw").await;
        let before = ctx.user("a@gatech.edu").await;

        let err = create_account(&ctx.state, &create("a@gatech.edu", "other")).await.unwrap_err();
        assert_eq!(err, AppError::Conflict("Email already exists.".to_string()));
        assert_eq!(ctx.user("a@gatech.edu").await, before);
        assert_eq!(ctx.mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_create_account_validation() {
        let ctx = context();

        for (email, password) in [("", "pw"), ("no-at-sign", "pw"), ("@gatech.edu", "pw"), ("a@", "pw"), ("a@gatech.edu", "")] {
            let err = create_account(&ctx.state, &create(email, password)).await.unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{:?} / {:?}", email, password);
        }
        assert!(ctx.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_verification_token_changes_nothing() {
        let ctx = context();
        create_account(&ctx.state, &create("a@gatech.edu", "pw")).await.unwrap();
        let before = ctx.user("a@gatech.edu").await;

        let err = verify_account(&ctx.state, "token-999").await.unwrap_err();
        assert_eq!(err, AppError::Validation(INVALID_TOKEN.to_string()));
        assert!(verify_account(&ctx.state, "").await.is_err());

        assert_eq!(ctx.user("a@gatech.edu").await, before);
    }

    #[tokio::test]
    async fn test_verification_token_is_single_use() {
        let ctx = context();
        create_account(&ctx.state, &create("a@gatech.edu", "pw")).await.unwrap();

        verify_account(&ctx.state, "token-1").await.unwrap();
        let user = ctx.user("a@gatech.edu").await;
        assert!(user.verified);
        assert!(user.verification_token.is_none());

        assert!(verify_account(&ctx.state, "token-1").await.is_err());
    }

    #[tokio::test]
    async fn test_verification_during_reregistration_is_kept() {
        let ctx = context();
        ctx.insert_user("a@gatech.edu", "original", false).await;

        // The re-registration is still hashing when the verification lands
        let request = create("a@gatech.edu", "intruder");
        let (created, verified) = tokio::join!(
            create_account(&ctx.state, &request),
            verify_account(&ctx.state, "verify-a@gatech.edu"),
        );

        verified.unwrap();
        assert_eq!(created.unwrap_err(), AppError::Conflict("Email already exists.".to_string()));

        let user = ctx.user("a@gatech.edu").await;
        assert!(user.verified);
        assert!(user.verification_token.is_none());
        assert!(sign_in(&ctx.state, &sign_in_request("a@gatech.edu", "original")).await.is_ok());
        assert!(sign_in(&ctx.state, &sign_in_request("a@gatech.edu", "intruder")).await.is_err());
        assert!(ctx.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_account_writes_keep_notification_stamp() {
        let ctx = context();
        ctx.insert_user("a@gatech.edu", "pw", true).await;
        let stamp = Utc::now() - Duration::minutes(1);
        ctx.state.store.mark_notified(&["a@gatech.edu".to_string()], stamp).await.unwrap();

        request_reset(&ctx.state, &RequestResetRequest { email: "a@gatech.edu".to_string() })
            .await
            .unwrap();
        let request = ResetPasswordRequest {
            password: "new".to_string(),
        };
        reset_password(&ctx.state, "token-1", &request).await.unwrap();

        assert_eq!(ctx.user("a@gatech.edu").await.last_notified_at, Some(stamp));
    }

    #[tokio::test]
    async fn test_request_reset_for_unknown_email_is_silent() {
        let ctx = context();
        let request = RequestResetRequest {
            email: "nobody@gatech.edu".to_string(),
        };

        request_reset(&ctx.state, &request).await.unwrap();
        assert!(ctx.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_request_reset_issues_expiring_token() {
        let ctx = context();
        ctx.insert_user("a@gatech.edu", "pw", true).await;

        let before = Utc::now();
        request_reset(&ctx.state, &RequestResetRequest { email: "a@gatech.edu".to_string() })
            .await
            .unwrap();

        let user = ctx.user("a@gatech.edu").await;
        assert_eq!(user.reset_token.as_deref(), Some("token-1"));
        let expires = user.reset_token_expires.unwrap();
        assert!(expires >= before + Duration::minutes(60));
        assert!(expires <= Utc::now() + Duration::minutes(60));

        let sent = ctx.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].link, "http://web.test/reset_password/token-1");
    }

    #[tokio::test]
    async fn test_reset_password_happy_path() {
        let ctx = context();
        ctx.insert_user("a@gatech.edu", "old", true).await;
        request_reset(&ctx.state, &RequestResetRequest { email: "a@gatech.edu".to_string() })
            .await
            .unwrap();

        let request = ResetPasswordRequest {
            password: "new".to_string(),
        };
        reset_password(&ctx.state, "token-1", &request).await.unwrap();

        let user = ctx.user("a@gatech.edu").await;
        assert!(user.reset_token.is_none());
        assert!(user.reset_token_expires.is_none());
        assert!(sign_in(&ctx.state, &sign_in_request("a@gatech.edu", "new")).await.is_ok());

        // Single use
        let err = reset_password(&ctx.state, "token-1", &request).await.unwrap_err();
        assert_eq!(err, AppError::Validation(INVALID_TOKEN.to_string()));
    }

    #[tokio::test]
    async fn test_reset_password_rejects_expired_token() {
        let ctx = context();
        let user = ctx.insert_user("a@gatech.edu", "old", true).await;
        ctx.state
            .store
            .set_reset_token("a@gatech.edu", "stale", Utc::now() - Duration::seconds(1))
            .await
            .unwrap();

        let request = ResetPasswordRequest {
            password: "new".to_string(),
        };
        let err = reset_password(&ctx.state, "stale", &request).await.unwrap_err();
        assert_eq!(err, AppError::Validation(INVALID_TOKEN.to_string()));

        assert_eq!(ctx.user("a@gatech.edu").await.password_hash, user.password_hash);
    }

    #[tokio::test]
    async fn test_sign_in_outcomes() {
        let ctx = context();
        ctx.insert_user("verified@gatech.edu", "pw", true).await;
        ctx.insert_user("pending@gatech.edu", "pw", false).await;

        let ok = sign_in(&ctx.state, &sign_in_request("verified@gatech.edu", "pw")).await.unwrap();
        let claims = verify_session_token(&ctx.state.config, &ok.token).unwrap();
        assert_eq!(claims.sub, "verified@gatech.edu");

        let err = sign_in(&ctx.state, &sign_in_request("pending@gatech.edu", "pw")).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = sign_in(&ctx.state, &sign_in_request("pending@gatech.edu", "wrong")).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        let err = sign_in(&ctx.state, &sign_in_request("verified@gatech.edu", "wrong")).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        let err = sign_in(&ctx.state, &sign_in_request("ghost@gatech.edu", "pw")).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn test_session_token_rejects_other_secret() {
        let config = crate::test_support::test_config();
        let token = issue_session_token(&config, "a@gatech.edu").unwrap();

        let other = AppConfig {
            jwt_secret: "another-secret".to_string(),
            ..config.clone()
        };
        assert!(matches!(verify_session_token(&other, &token), Err(AppError::Unauthorized(_))));
        assert!(verify_session_token(&config, "not-a-jwt").is_err());
    }
}
