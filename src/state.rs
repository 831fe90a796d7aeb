use std::sync::Arc;

use crate::{
    config::AppConfig,
    database::Store,
    services::email_service::Mailer,
    utils::TokenGenerator,
};

/// Everything a request handler needs, shared through `web::Data`.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub mailer: Arc<dyn Mailer>,
    pub tokens: Arc<dyn TokenGenerator>,
    pub config: Arc<AppConfig>,
}
