//! HTTP route handlers outside the anonymous auth flow.
//!
//! Handlers are annotated with `#[openapi]` so `rocket_okapi` can derive
//! the OpenAPI document automatically.

pub mod account;
pub mod health;
