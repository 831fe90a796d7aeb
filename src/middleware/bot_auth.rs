use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use futures::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::rc::Rc;

use crate::utils::AppError;

/// Guards the bot endpoints with a shared API key sent as
/// `Authorization: Bearer <key>`. Without a configured key requests pass through.
pub struct BotAuth {
    api_key: Option<Rc<str>>,
}

impl BotAuth {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key: api_key.map(Rc::from),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for BotAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = BotAuthMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(BotAuthMiddleware {
            service,
            api_key: self.api_key.clone(),
        }))
    }
}

pub struct BotAuthMiddleware<S> {
    service: S,
    api_key: Option<Rc<str>>,
}

impl<S, B> Service<ServiceRequest> for BotAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let Some(expected) = self.api_key.as_deref() else {
            return Box::pin(self.service.call(req));
        };

        let presented = req
            .headers()
            .get("Authorization")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "));

        let rejection = match presented {
            Some(key) if key == expected => None,
            Some(_) => Some("Invalid bot API key."),
            None => Some("Missing bot API key."),
        };
        let Some(reason) = rejection else {
            return Box::pin(self.service.call(req));
        };

        log::warn!("❌ Rejected bot request to {}: {}", req.path(), reason);
        let error: Error = AppError::Unauthorized(reason.to_string()).into();
        Box::pin(async move { Err(error) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, web, App, HttpResponse};

    async fn ok() -> HttpResponse {
        HttpResponse::Ok().finish()
    }

    /// Middleware errors surface as `Err`; the server renders them as responses.
    fn status_of(result: Result<ServiceResponse, Error>) -> u16 {
        match result {
            Ok(resp) => resp.status().as_u16(),
            Err(e) => e.as_response_error().status_code().as_u16(),
        }
    }

    #[actix_rt::test]
    async fn test_open_without_configured_key() {
        let app = test::init_service(
            App::new().service(web::resource("/bot").wrap(BotAuth::new(None)).route(web::get().to(ok))),
        )
        .await;

        let resp = test::try_call_service(&app, test::TestRequest::get().uri("/bot").to_request()).await;
        assert_eq!(status_of(resp), 200);
    }

    #[actix_rt::test]
    async fn test_requires_matching_key() {
        let app = test::init_service(
            App::new().service(
                web::resource("/bot")
                    .wrap(BotAuth::new(Some("s3cret".to_string())))
                    .route(web::get().to(ok)),
            ),
        )
        .await;

        let missing = test::TestRequest::get().uri("/bot").to_request();
        assert_eq!(status_of(test::try_call_service(&app, missing).await), 401);

        let wrong = test::TestRequest::get()
            .uri("/bot")
            .insert_header(("Authorization", "Bearer nope"))
            .to_request();
        assert_eq!(status_of(test::try_call_service(&app, wrong).await), 401);

        let right = test::TestRequest::get()
            .uri("/bot")
            .insert_header(("Authorization", "Bearer s3cret"))
            .to_request();
        assert_eq!(status_of(test::try_call_service(&app, right).await), 200);
    }
}
