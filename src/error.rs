use rocket::http::Status;
use rocket::response::{self, Responder};
use rocket::{Request, Response};
use rocket_okapi::OpenApiError;
use rocket_okapi::okapi::Map;
use rocket_okapi::okapi::openapi3::{RefOr, Response as OpenApiResponse, Responses};
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::response::OpenApiResponderInner;
use serde::{Deserialize, Serialize};
use std::io::Cursor;

use crate::auth::AuthError;

const GENERIC_INTERNAL_MESSAGE: &str = "Internal server error";

#[derive(Debug)]
pub enum ApiError {
    DatabaseError(sqlx::Error),
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    InternalError(String),
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let (status, error_type, message) = match self {
            ApiError::DatabaseError(e) => {
                log::error!("database error: {}", e);
                (
                    Status::InternalServerError,
                    "InternalError",
                    GENERIC_INTERNAL_MESSAGE.to_string(),
                )
            }
            ApiError::BadRequest(msg) => {
                log::debug!("bad request: {}", msg);
                (Status::BadRequest, "InvalidInput", msg)
            }
            ApiError::Unauthorized(msg) => {
                log::debug!("unauthorized: {}", msg);
                (Status::Unauthorized, "Unauthorized", msg)
            }
            ApiError::Forbidden(msg) => {
                log::debug!("forbidden: {}", msg);
                (Status::Forbidden, "Forbidden", msg)
            }
            ApiError::NotFound(msg) => {
                log::debug!("not found: {}", msg);
                (Status::NotFound, "NotFound", msg)
            }
            ApiError::Conflict(msg) => {
                log::debug!("conflict: {}", msg);
                (Status::Conflict, "Conflict", msg)
            }
            ApiError::InternalError(msg) => {
                log::error!("internal error: {}", msg);
                (
                    Status::InternalServerError,
                    "InternalError",
                    GENERIC_INTERNAL_MESSAGE.to_string(),
                )
            }
        };

        let error_response = ErrorResponse {
            error: error_type.to_string(),
            message,
        };

        let json = serde_json::to_string(&error_response)
            .unwrap_or_else(|_| r#"{"error":"SerializationError","message":"Failed to serialize error"}"#.to_string());

        Response::build()
            .status(status)
            .header(rocket::http::ContentType::JSON)
            .sized_body(json.len(), Cursor::new(json))
            .ok()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::DatabaseError(err)
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidInput(msg) => ApiError::BadRequest(msg),
            AuthError::Unauthorized(msg) => ApiError::Unauthorized(msg),
            AuthError::TokenInvalid => {
                ApiError::Unauthorized("Invalid or expired token".to_string())
            }
            AuthError::Forbidden => ApiError::Forbidden("Forbidden".to_string()),
            AuthError::NotFound(msg) => ApiError::NotFound(msg),
            AuthError::Conflict(msg) => ApiError::Conflict(msg),
            AuthError::Sqlx(e) => ApiError::DatabaseError(e),
            other => ApiError::InternalError(other.to_string()),
        }
    }
}

impl OpenApiResponderInner for ApiError {
    fn responses(_generator: &mut OpenApiGenerator) -> Result<Responses, OpenApiError> {
        let mut responses = Map::new();
        for (code, description) in [
            ("400", "Malformed or missing input"),
            ("401", "Bad credentials or missing, invalid or expired token"),
            ("404", "No matching record"),
            ("409", "Uniqueness or session-state conflict"),
            ("500", "Unexpected server failure"),
        ] {
            responses.insert(
                code.to_string(),
                RefOr::Object(OpenApiResponse {
                    description: description.to_string(),
                    ..Default::default()
                }),
            );
        }
        Ok(Responses {
            responses,
            ..Default::default()
        })
    }
}

/// JSON catchers so framework and guard failures share the `{error, message}` body.
pub mod catchers {
    use rocket::{Catcher, Request, catch, catchers};

    use super::ApiError;

    #[catch(400)]
    fn bad_request(_req: &Request<'_>) -> ApiError {
        ApiError::BadRequest("Malformed request".to_string())
    }

    #[catch(401)]
    fn unauthorized(_req: &Request<'_>) -> ApiError {
        ApiError::Unauthorized("Missing or invalid access token".to_string())
    }

    #[catch(404)]
    fn not_found(_req: &Request<'_>) -> ApiError {
        ApiError::NotFound("Resource not found".to_string())
    }

    // Rocket reports JSON bodies that fail to deserialize as 422.
    #[catch(422)]
    fn unprocessable(_req: &Request<'_>) -> ApiError {
        ApiError::BadRequest("Request body is missing or malformed".to_string())
    }

    #[catch(500)]
    fn internal(_req: &Request<'_>) -> ApiError {
        ApiError::InternalError("unhandled server error".to_string())
    }

    pub fn all() -> Vec<Catcher> {
        catchers![bad_request, unauthorized, not_found, unprocessable, internal]
    }
}
