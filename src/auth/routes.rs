//! Anonymous `/users` endpoints: signup, login, token reissue, logout and
//! password recovery. None of them take the [`AuthUser`](crate::auth::AuthUser)
//! guard; login and signup establish identity and the token routes consume a
//! refresh token from the body.

use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket::{State, post};
use rocket_okapi::openapi;

use crate::auth::responses::{
    FindPasswordRequest, LoginRequest, MessageResponse, RefreshTokenRequest, SignupRequest,
    TokenResponse, require_fields,
};
use crate::auth::service::{IssuedTokens, SignUpInput};
use crate::auth::AuthState;
use crate::error::ApiError;

type RouteResult<T> = Result<Json<T>, ApiError>;

fn token_response(message: &str, tokens: IssuedTokens) -> TokenResponse {
    TokenResponse {
        message: message.to_string(),
        access_token: tokens.access_token.token,
        refresh_token: tokens.refresh_token.token,
        access_token_expires_at: tokens.access_token.expires_at,
        refresh_token_expires_at: tokens.refresh_token.expires_at,
    }
}

/// Register a new account.
#[openapi(tag = "Users")]
#[post("/users/signup", data = "<payload>")]
pub async fn signup(
    state: &State<AuthState>,
    payload: Json<SignupRequest>,
) -> Result<status::Custom<Json<MessageResponse>>, ApiError> {
    require_fields(&[
        ("name", &payload.name),
        ("nickname", &payload.nickname),
        ("email", &payload.email),
        ("password", &payload.password),
        ("confirmPassword", &payload.confirm_password),
    ])?;

    state
        .auth
        .sign_up(SignUpInput {
            name: &payload.name,
            nickname: &payload.nickname,
            email: &payload.email,
            password: &payload.password,
            confirm_password: &payload.confirm_password,
        })
        .await?;

    Ok(status::Custom(
        Status::Created,
        Json(MessageResponse::new("Signup completed")),
    ))
}

/// Log in and open the account's single session.
#[openapi(tag = "Users")]
#[post("/users/login", data = "<payload>")]
pub async fn login(
    state: &State<AuthState>,
    payload: Json<LoginRequest>,
) -> RouteResult<TokenResponse> {
    require_fields(&[("email", &payload.email), ("password", &payload.password)])?;

    let tokens = state.auth.login(&payload.email, &payload.password).await?;
    Ok(Json(token_response("Login succeeded", tokens)))
}

/// Exchange a refresh token for a new access token. The refresh token is
/// rotated; the one presented stops working.
#[openapi(tag = "Users")]
#[post("/users/reissue-token", data = "<payload>")]
pub async fn reissue_token(
    state: &State<AuthState>,
    payload: Json<RefreshTokenRequest>,
) -> RouteResult<TokenResponse> {
    require_fields(&[("refreshToken", &payload.refresh_token)])?;

    let tokens = state
        .auth
        .refresh_access_token(&payload.refresh_token)
        .await?;
    Ok(Json(token_response("Token reissued", tokens)))
}

#[openapi(tag = "Users")]
#[post("/users/logout", data = "<payload>")]
pub async fn logout(
    state: &State<AuthState>,
    payload: Json<RefreshTokenRequest>,
) -> RouteResult<MessageResponse> {
    require_fields(&[("refreshToken", &payload.refresh_token)])?;

    state.auth.logout(&payload.refresh_token).await?;
    Ok(Json(MessageResponse::new("Logged out")))
}

/// Mail a temporary password to the account matching name and email.
#[openapi(tag = "Users")]
#[post("/users/find-password", data = "<payload>")]
pub async fn find_password(
    state: &State<AuthState>,
    payload: Json<FindPasswordRequest>,
) -> RouteResult<MessageResponse> {
    require_fields(&[("name", &payload.name), ("email", &payload.email)])?;

    state
        .auth
        .find_password(&payload.name, &payload.email)
        .await?;
    Ok(Json(MessageResponse::new(
        "A temporary password has been sent to your email",
    )))
}
