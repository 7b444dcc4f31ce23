use crate::auth::gate::AuthenticatedUser;
use crate::auth::session::NewAccount;
use crate::error::AppError;
use crate::AppState;
use actix_web::cookie::{Cookie, SameSite};
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

/// Incoming multipart/form data is modeled as named optional fields; the
/// image values are references produced by the (out-of-scope) upload step.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub avatar_url: Option<String>,
    pub cover_image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

fn token_cookie<'a>(name: &'a str, value: &'a str, secure: bool) -> Cookie<'a> {
    Cookie::build(name, value)
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .finish()
}

fn removal_cookie(name: &'static str) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, "");
    cookie.set_path("/");
    cookie.make_removal();
    cookie
}

pub async fn register(
    req: web::Json<RegisterRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let req = req.into_inner();
    info!("received registration request for username: {}", req.username);

    let user = state
        .sessions
        .register(NewAccount {
            username: req.username,
            email: req.email,
            password: req.password,
            full_name: req.full_name,
            avatar_url: req.avatar_url,
            cover_image_url: req.cover_image_url,
        })
        .await?;

    Ok(HttpResponse::Created().json(json!({
        "status": 201,
        "data": user,
        "message": "user registered successfully"
    })))
}

pub async fn login(
    req: web::Json<LoginRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let req = req.into_inner();
    let identifier = req
        .username
        .or(req.email)
        .unwrap_or_default();
    info!("received login request for: {}", identifier);

    match state.sessions.login(&identifier, &req.password).await {
        Ok(outcome) => {
            let secure = state.config.cookie.secure;
            Ok(HttpResponse::Ok()
                .cookie(token_cookie(ACCESS_COOKIE, &outcome.tokens.access_token, secure))
                .cookie(token_cookie(REFRESH_COOKIE, &outcome.tokens.refresh_token, secure))
                .json(json!({
                    "status": 200,
                    "data": outcome,
                    "message": "user logged in successfully"
                })))
        }
        Err(e) => {
            error!("login failed for {}: {}", identifier, e);
            Err(e)
        }
    }
}

pub async fn logout(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    state.sessions.logout(user.0.id).await?;

    Ok(HttpResponse::Ok()
        .cookie(removal_cookie(ACCESS_COOKIE))
        .cookie(removal_cookie(REFRESH_COOKIE))
        .json(json!({
            "status": 200,
            "data": {},
            "message": "user logged out successfully"
        })))
}

/// The refresh token arrives in the `refreshToken` cookie, or in the body
/// as a fallback for non-browser clients.
pub async fn refresh_token(
    http_req: HttpRequest,
    body: Option<web::Json<RefreshRequest>>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let presented = http_req
        .cookie(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .or_else(|| body.and_then(|b| b.into_inner().refresh_token))
        .ok_or_else(|| AppError::Unauthorized("no refresh token provided".to_string()))?;

    let tokens = state.sessions.refresh(&presented).await?;
    let secure = state.config.cookie.secure;

    Ok(HttpResponse::Ok()
        .cookie(token_cookie(ACCESS_COOKIE, &tokens.access_token, secure))
        .cookie(token_cookie(REFRESH_COOKIE, &tokens.refresh_token, secure))
        .json(json!({
            "status": 200,
            "data": tokens,
            "message": "access token refreshed"
        })))
}

pub async fn change_password(
    user: AuthenticatedUser,
    req: web::Json<ChangePasswordRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    state
        .sessions
        .change_password(user.0.id, &req.old_password, &req.new_password)
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "status": 200,
        "data": {},
        "message": "password changed successfully"
    })))
}
