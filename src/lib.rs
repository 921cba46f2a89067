#[macro_use]
extern crate rocket;

pub mod auth;
pub mod db;
pub mod error;
pub mod models;
pub mod request_logger;
pub mod routes;

use crate::auth::notifier::{DisabledNotificationSender, NotifierConfig, SmtpNotificationSender};
use crate::auth::{AuthConfig, AuthState, NotificationSender, PgCredentialStore, PgSessionRegistry};
use crate::db::OasisDb;
use crate::request_logger::RequestLogger;
use env_logger::Env;
use rocket::fairing::AdHoc;
use rocket::http::Method;
use rocket::{Build, Rocket};
use rocket_cors::{AllowedOrigins, CorsOptions};
use rocket_db_pools::Database;
use rocket_okapi::{
    openapi_get_routes,
    rapidoc::{GeneralConfig, HideShowConfig, RapiDocConfig, make_rapidoc},
    settings::UrlObject,
    swagger_ui::{SwaggerUIConfig, make_swagger_ui},
};
use std::sync::{Arc, Once};

static LOGGER: Once = Once::new();

fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(
            Env::default().default_filter_or("info,rocket::server=warn,rocket::request=warn"),
        )
        .init();
    });
}

fn build_notifier() -> Arc<dyn NotificationSender> {
    match NotifierConfig::from_env() {
        Some(config) => {
            log::info!(
                "temporary passwords will be mailed via {}:{}",
                config.smtp_host,
                config.smtp_port
            );
            Arc::new(SmtpNotificationSender::new(config))
        }
        None => {
            log::warn!("SMTP_HOST not set; password recovery is disabled");
            Arc::new(DisabledNotificationSender)
        }
    }
}

pub fn rocket() -> Rocket<Build> {
    init_logger();

    let cors = CorsOptions::default()
        .allowed_origins(AllowedOrigins::all())
        .allowed_methods(
            vec![Method::Get, Method::Post, Method::Put, Method::Delete]
                .into_iter()
                .map(From::from)
                .collect(),
        )
        .allow_credentials(true)
        .to_cors()
        .expect("Error creating CORS");

    rocket::build()
        .attach(RequestLogger)
        .attach(OasisDb::init())
        .attach(cors)
        .attach(AdHoc::try_on_ignite(
            "Run Migrations",
            |rocket| async move {
                let pool = match OasisDb::fetch(&rocket) {
                    Some(db) => (**db).clone(),
                    None => {
                        log::error!("database pool not available for migrations");
                        return Err(rocket);
                    }
                };
                match db::run_migrations(&pool).await {
                    Ok(()) => {
                        log::info!("database migrations successful");
                        Ok(rocket)
                    }
                    Err(e) => {
                        log::error!("database migrations failed: {}", e);
                        Err(rocket)
                    }
                }
            },
        ))
        .attach(AdHoc::try_on_ignite("Auth State", |rocket| async move {
            let pool = match OasisDb::fetch(&rocket) {
                Some(db) => (**db).clone(),
                None => {
                    log::error!("database pool not available for auth state");
                    return Err(rocket);
                }
            };

            let config = match AuthConfig::from_env() {
                Ok(config) => config,
                Err(err) => {
                    log::error!("invalid auth configuration: {}", err);
                    return Err(rocket);
                }
            };

            let state = AuthState::new(
                config,
                Arc::new(PgCredentialStore::new(pool.clone())),
                Arc::new(PgSessionRegistry::new(pool)),
                build_notifier(),
            );
            match state {
                Ok(state) => Ok(rocket.manage(state)),
                Err(err) => {
                    log::error!("failed to initialise auth services: {}", err);
                    Err(rocket)
                }
            }
        }))
        .mount(
            "/api/v1",
            openapi_get_routes![
                // Health
                routes::health::health_check,
                // Anonymous auth flow
                auth::routes::signup,
                auth::routes::login,
                auth::routes::reissue_token,
                auth::routes::logout,
                auth::routes::find_password,
                // Authenticated account management
                routes::account::get_profile,
                routes::account::update_profile,
                routes::account::withdraw,
            ],
        )
        .mount(
            "/api/docs/swagger/",
            make_swagger_ui(&SwaggerUIConfig {
                url: "../../v1/openapi.json".to_owned(),
                ..Default::default()
            }),
        )
        .mount(
            "/api/docs/rapidoc/",
            make_rapidoc(&RapiDocConfig {
                general: GeneralConfig {
                    spec_urls: vec![UrlObject::new("City Oasis API", "../../v1/openapi.json")],
                    ..Default::default()
                },
                hide_show: HideShowConfig {
                    allow_spec_url_load: false,
                    allow_spec_file_load: false,
                    ..Default::default()
                },
                ..Default::default()
            }),
        )
        .register("/", error::catchers::all())
}

#[cfg_attr(not(test), allow(dead_code))]
pub mod test_support {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use parking_lot::Mutex;
    use rocket::config::LogLevel;
    use rocket::figment::Figment;
    use rocket::local::asynchronous::Client as AsyncClient;
    use rocket::local::blocking::Client;
    use rocket::{Build, Rocket, Route};

    use crate::auth::memory::MemoryCredentialStore;
    use crate::auth::{AuthConfig, AuthError, AuthResult, AuthState, NotificationSender};

    pub use database::{TestDatabase, TestDatabaseError};

    /// Auth settings with short, fixed secrets for tests.
    pub fn test_auth_config() -> AuthConfig {
        AuthConfig {
            issuer: "oasis-test".into(),
            access_token_secret: "test-access-secret".into(),
            access_token_ttl_secs: 900,
            refresh_token_secret: "test-refresh-secret".into(),
            refresh_token_ttl_secs: 7 * 24 * 60 * 60,
            leeway_secs: 0,
            temp_password_len: 10,
        }
    }

    /// Auth state over in-memory stores and the given notifier.
    pub fn memory_auth_state(notifier: Arc<CapturingNotifier>) -> AuthState {
        let credentials = MemoryCredentialStore::new();
        let sessions = credentials.session_registry();
        AuthState::new(
            test_auth_config(),
            Arc::new(credentials),
            Arc::new(sessions),
            notifier,
        )
        .expect("valid test auth state")
    }

    #[derive(Debug, Clone)]
    pub struct SentPassword {
        pub name: String,
        pub email: String,
        pub temporary_password: String,
    }

    /// Records temporary-password mails instead of sending them.
    #[derive(Default)]
    pub struct CapturingNotifier {
        sent: Mutex<Vec<SentPassword>>,
        fail_next: AtomicBool,
    }

    impl CapturingNotifier {
        /// The next dispatch fails as an SMTP outage would.
        pub fn fail_next(&self) {
            self.fail_next.store(true, Ordering::SeqCst);
        }

        pub fn sent(&self) -> Vec<SentPassword> {
            self.sent.lock().clone()
        }

        pub fn last_password_for(&self, email: &str) -> Option<String> {
            self.sent
                .lock()
                .iter()
                .rev()
                .find(|message| message.email == email)
                .map(|message| message.temporary_password.clone())
        }
    }

    #[rocket::async_trait]
    impl NotificationSender for CapturingNotifier {
        async fn send_temporary_password(
            &self,
            name: &str,
            email: &str,
            temporary_password: &str,
        ) -> AuthResult<()> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(AuthError::Notification("simulated delivery failure".into()));
            }
            self.sent.lock().push(SentPassword {
                name: name.to_string(),
                email: email.to_string(),
                temporary_password: temporary_password.to_string(),
            });
            Ok(())
        }
    }

    pub mod database {
        use log::LevelFilter;
        use rocket_db_pools::sqlx::postgres::{PgConnectOptions, PgPoolOptions};
        use rocket_db_pools::sqlx::{self, ConnectOptions, PgPool};
        use testcontainers::{ContainerAsync, core::error::TestcontainersError, runners::AsyncRunner};
        use testcontainers_modules::postgres::Postgres;
        use thiserror::Error;

        #[derive(Debug, Error)]
        pub enum TestDatabaseError {
            #[error("database error: {0}")]
            Sqlx(#[from] sqlx::Error),
            #[error("migration error: {0}")]
            Migration(#[from] sqlx::migrate::MigrateError),
            #[error("container error: {0}")]
            Container(#[from] TestcontainersError),
        }

        /// Disposable migrated Postgres for integration tests.
        pub struct TestDatabase {
            pool: PgPool,
            _container: ContainerAsync<Postgres>,
        }

        impl TestDatabase {
            /// Starts a Postgres container and applies `./migrations`.
            pub async fn new() -> Result<Self, TestDatabaseError> {
                let container = Postgres::default().start().await?;

                let host = container.get_host().await?.to_string();
                let port = container.get_host_port_ipv4(5432).await?;
                let url = format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

                let options: PgConnectOptions = url.parse()?;
                let pool = PgPoolOptions::new()
                    .max_connections(5)
                    .connect_with(options.log_statements(LevelFilter::Off))
                    .await?;

                crate::db::run_migrations(&pool).await?;

                Ok(Self {
                    pool,
                    _container: container,
                })
            }

            pub fn pool(&self) -> &PgPool {
                &self.pool
            }

            pub fn pool_clone(&self) -> PgPool {
                self.pool.clone()
            }

            /// Close pool connections; the container stops on drop.
            pub async fn close(self) {
                self.pool.close().await;
            }
        }
    }

    /// Builder for constructing Rocket instances tailored for integration tests.
    #[derive(Default)]
    pub struct TestRocketBuilder {
        figment: Figment,
        mounts: Vec<(String, Vec<Route>)>,
        auth_state: Option<AuthState>,
    }

    impl TestRocketBuilder {
        /// Start a builder with sensible defaults: random port, logging disabled.
        pub fn new() -> Self {
            let figment = rocket::Config::figment()
                .merge(("port", 0))
                .merge(("log_level", LogLevel::Off))
                .merge(("cli_colors", false));

            Self {
                figment,
                mounts: Vec::new(),
                auth_state: None,
            }
        }

        /// Mount routes under `/api/v1`.
        pub fn mount_api_routes(mut self, routes: Vec<Route>) -> Self {
            self.mounts.push(("/api/v1".to_string(), routes));
            self
        }

        pub fn manage_auth_state(mut self, state: AuthState) -> Self {
            self.auth_state = Some(state);
            self
        }

        /// Finish building the Rocket instance. JSON catchers are always registered.
        pub fn build(self) -> Rocket<Build> {
            let mut rocket = rocket::custom(self.figment);

            for (base, routes) in self.mounts {
                rocket = rocket.mount(base, routes);
            }

            if let Some(state) = self.auth_state {
                rocket = rocket.manage(state);
            }

            rocket.register("/", crate::error::catchers::all())
        }

        /// Convenience helper to produce a blocking local client.
        pub fn blocking_client(self) -> Client {
            Client::tracked(self.build()).expect("valid Rocket instance")
        }

        /// Convenience helper to produce an asynchronous local client.
        pub async fn async_client(self) -> AsyncClient {
            AsyncClient::tracked(self.build())
                .await
                .expect("valid Rocket instance")
        }
    }
}
