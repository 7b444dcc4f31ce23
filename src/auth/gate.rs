use crate::auth::token::{TokenClass, TokenSigner};
use crate::db::models::PublicUser;
use crate::error::AppError;
use crate::AppState;
use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use futures::future::LocalBoxFuture;
use tracing::warn;

/// Request guard for protected operations.
///
/// Extracts a bearer token (the `accessToken` cookie wins over the
/// `Authorization` header), verifies it as an access-class token and
/// resolves the subject to a user. Every failure mode is the same
/// external 401, so callers cannot probe which check failed.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub PublicUser);

fn bearer_token(req: &HttpRequest) -> Option<String> {
    if let Some(cookie) = req.cookie("accessToken") {
        return Some(cookie.value().to_string());
    }
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_string)
}

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, AppError>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move {
            let state = req
                .app_data::<web::Data<AppState>>()
                .ok_or_else(|| AppError::Internal("application state missing".to_string()))?;

            let token = bearer_token(&req)
                .ok_or_else(|| AppError::Unauthorized("unauthorized access".to_string()))?;

            let claims = state.signer.verify(&token, TokenClass::Access)?;
            let subject = TokenSigner::subject(&claims)?;

            let user = state
                .store
                .find_by_id(subject)
                .await?
                .ok_or_else(|| {
                    warn!("access token presented for unknown subject {}", subject);
                    AppError::Unauthorized("invalid access token".to_string())
                })?;

            Ok(AuthenticatedUser(user.sanitized()))
        })
    }
}
