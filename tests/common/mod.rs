#![allow(dead_code)]

use std::sync::Arc;

use oasis_api::auth::routes::{find_password, login, logout, reissue_token, signup};
use oasis_api::routes::account::{get_profile, update_profile, withdraw};
use oasis_api::test_support::{CapturingNotifier, TestRocketBuilder, memory_auth_state};
use rocket::http::{ContentType, Header, Status};
use rocket::local::asynchronous::Client;
use rocket::routes;
use rocket::serde::json::{Value, json};

pub struct TestApp {
    pub client: Client,
    pub notifier: Arc<CapturingNotifier>,
}

pub async fn spawn_app() -> TestApp {
    let notifier = Arc::new(CapturingNotifier::default());
    let client = TestRocketBuilder::new()
        .mount_api_routes(routes![
            signup,
            login,
            reissue_token,
            logout,
            find_password,
            get_profile,
            update_profile,
            withdraw,
        ])
        .manage_auth_state(memory_auth_state(notifier.clone()))
        .async_client()
        .await;
    TestApp { client, notifier }
}

impl TestApp {
    pub async fn post(&self, path: &str, body: Value) -> (Status, Value) {
        let response = self
            .client
            .post(format!("/api/v1{path}"))
            .header(ContentType::JSON)
            .body(body.to_string())
            .dispatch()
            .await;
        let status = response.status();
        let body = response.into_json::<Value>().await.unwrap_or(Value::Null);
        (status, body)
    }

    pub async fn authed(
        &self,
        method: rocket::http::Method,
        path: &str,
        token: &str,
        body: Option<Value>,
    ) -> (Status, Value) {
        let mut request = self
            .client
            .req(method, format!("/api/v1{path}"))
            .header(Header::new("Authorization", format!("Bearer {token}")));
        if let Some(body) = body {
            request = request.header(ContentType::JSON).body(body.to_string());
        }
        let response = request.dispatch().await;
        let status = response.status();
        let body = response.into_json::<Value>().await.unwrap_or(Value::Null);
        (status, body)
    }

    pub async fn signup_kim(&self) {
        let (status, body) = self
            .post(
                "/users/signup",
                json!({
                    "name": "Kim",
                    "nickname": "kim01",
                    "email": "a@b.com",
                    "password": "abc12345",
                    "confirmPassword": "abc12345",
                }),
            )
            .await;
        assert_eq!(status, Status::Created, "signup failed: {body}");
    }

    /// Returns `(accessToken, refreshToken)`.
    pub async fn login(&self, email: &str, password: &str) -> (String, String) {
        let (status, body) = self
            .post("/users/login", json!({ "email": email, "password": password }))
            .await;
        assert_eq!(status, Status::Ok, "login failed: {body}");
        (
            body["accessToken"].as_str().expect("accessToken").to_string(),
            body["refreshToken"].as_str().expect("refreshToken").to_string(),
        )
    }
}
