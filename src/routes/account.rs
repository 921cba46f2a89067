//! Protected account endpoints. Every handler takes [`AuthUser`], so a
//! request without a valid access token is answered by the 401 catcher.

use rocket::serde::json::Json;
use rocket::{State, get, post, put};
use rocket_okapi::openapi;

use crate::auth::account::ProfileUpdate;
use crate::auth::responses::{
    MessageResponse, ProfileResponse, UpdateProfileRequest, WithdrawRequest, require_fields,
};
use crate::auth::{AuthState, AuthUser};
use crate::error::ApiError;

/// Name, nickname and email of the caller.
#[openapi(tag = "Account")]
#[get("/users/me")]
pub async fn get_profile(
    state: &State<AuthState>,
    user: AuthUser,
) -> Result<Json<ProfileResponse>, ApiError> {
    let profile = state.accounts.get_profile(&user.id).await?;
    Ok(Json(profile.into()))
}

/// Change nickname and optionally password. The current password is always
/// required.
#[openapi(tag = "Account")]
#[put("/users/me", data = "<payload>")]
pub async fn update_profile(
    state: &State<AuthState>,
    user: AuthUser,
    payload: Json<UpdateProfileRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    require_fields(&[
        ("nickname", &payload.nickname),
        ("currentPassword", &payload.current_password),
    ])?;

    // An empty newPassword means "keep the current one".
    let new_password = payload
        .new_password
        .as_deref()
        .filter(|value| !value.is_empty());

    state
        .accounts
        .update_profile(
            &user.id,
            ProfileUpdate {
                nickname: &payload.nickname,
                current_password: &payload.current_password,
                new_password,
                confirm_new_password: payload.confirm_new_password.as_deref(),
            },
        )
        .await?;

    Ok(Json(MessageResponse::new("Profile updated")))
}

#[openapi(tag = "Account")]
#[post("/users/withdraw", data = "<payload>")]
pub async fn withdraw(
    state: &State<AuthState>,
    user: AuthUser,
    payload: Json<WithdrawRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    require_fields(&[("password", &payload.password)])?;

    state.accounts.withdraw(&user.id, &payload.password).await?;
    Ok(Json(MessageResponse::new("Account withdrawn")))
}
