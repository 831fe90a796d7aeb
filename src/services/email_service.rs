// ==================== TRANSACTIONAL EMAIL ====================
// Verification and password-reset links, delivered through Postmark.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::utils::AppError;

const POSTMARK_API_URL: &str = "https://api.postmarkapp.com/email";
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Which page the emailed link opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    VerifyAccount,
    ResetPassword,
}

impl LinkKind {
    /// Path segment placed between the base URL and the token.
    pub fn endpoint(&self) -> &'static str {
        match self {
            LinkKind::VerifyAccount => "verify_account",
            LinkKind::ResetPassword => "reset_password",
        }
    }

    fn subject(&self) -> &'static str {
        match self {
            LinkKind::VerifyAccount => "[GT Registration] Verify your account",
            LinkKind::ResetPassword => "[GT Registration] Reset your password",
        }
    }

    fn action(&self) -> &'static str {
        match self {
            LinkKind::VerifyAccount => "verify your account",
            LinkKind::ResetPassword => "reset your password",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
    pub link: String,
}

/// `base_url/link_kind/token`, with the token URL-encoded.
pub fn compose_link(base_url: &str, kind: LinkKind, token: &str) -> String {
    format!(
        "{}/{}/{}",
        base_url.trim_end_matches('/'),
        kind.endpoint(),
        urlencoding::encode(token)
    )
}

pub fn build_email(to: &str, base_url: &str, kind: LinkKind, token: &str) -> OutboundEmail {
    let link = compose_link(base_url, kind, token);

    OutboundEmail {
        to: to.to_string(),
        subject: kind.subject().to_string(),
        text_body: format!("Please click on the link to {}: {}", kind.action(), link),
        html_body: format!(
            "<html><body><strong>Please click on the link to {}:</strong> <a href=\"{}\">{}</a></body></html>",
            kind.action(),
            link,
            link
        ),
        link,
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> Result<(), AppError>;
}

// ==================== POSTMARK ====================

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PostmarkPayload<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text_body: &'a str,
    html_body: &'a str,
    message_stream: &'a str,
}

pub struct PostmarkMailer {
    client: reqwest::Client,
    api_key: String,
    sender: String,
}

impl PostmarkMailer {
    pub fn new(api_key: String, sender: String) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build Postmark client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            sender,
        })
    }
}

#[async_trait]
impl Mailer for PostmarkMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<(), AppError> {
        let payload = PostmarkPayload {
            from: &self.sender,
            to: &email.to,
            subject: &email.subject,
            text_body: &email.text_body,
            html_body: &email.html_body,
            message_stream: "outbound",
        };

        let response = self
            .client
            .post(POSTMARK_API_URL)
            .header("Accept", "application/json")
            .header("X-Postmark-Server-Token", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::EmailError(format!("Failed to reach Postmark: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(AppError::EmailError(format!(
            "Postmark send failed (status={}): {}",
            status, body
        )))
    }
}

/// Used when no Postmark key is configured: the link goes to the log instead.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<(), AppError> {
        log::info!("📧 [no email provider] {} -> {}", email.subject, email.link);
        Ok(())
    }
}

/// Builds and sends a link email. Delivery failures are logged and swallowed.
pub async fn dispatch(mailer: &dyn Mailer, to: &str, base_url: &str, kind: LinkKind, token: &str) {
    let email = build_email(to, base_url, kind, token);

    match mailer.send(&email).await {
        Ok(()) => log::info!("📧 {} email sent to {}", kind.endpoint(), to),
        Err(e) => log::warn!("⚠️  Failed to send {} email to {}: {}", kind.endpoint(), to, e),
    }
}
