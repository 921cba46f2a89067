use std::io::{self, Write};

use clap::Parser;
use sqlx::postgres::PgPoolOptions;

use oasis_api::auth::passwords::PasswordService;
use oasis_api::auth::validation::{validate_email, validate_name, validate_nickname, validate_password};
use oasis_api::auth::{CredentialStore, PgCredentialStore};

#[derive(Parser, Debug)]
#[command(name = "create_user", about = "Create a City Oasis user account")]
struct Args {
    /// Real name (2-20 Hangul or Latin letters).
    #[arg(long)]
    name: String,

    /// Public nickname, unique among active accounts.
    #[arg(long)]
    nickname: String,

    /// Login email, unique among active accounts.
    #[arg(long)]
    email: String,

    /// Plaintext password to hash and store for this user.
    #[arg(long)]
    password: String,

    /// Apply pending migrations before inserting.
    #[arg(long)]
    migrate: bool,
}

fn fail(message: impl std::fmt::Display) -> ! {
    let _ = writeln!(io::stderr(), "error: {message}");
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args = Args::parse();

    let checks = [
        validate_name(&args.name),
        validate_nickname(&args.nickname),
        validate_email(&args.email),
        validate_password(&args.password),
    ];
    if let Some(Err(err)) = checks.into_iter().find(Result::is_err) {
        fail(err);
    }

    let database_url = std::env::var("DATABASE_URL")?;
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await?;

    if args.migrate {
        oasis_api::db::run_migrations(&pool).await?;
    }

    let store = PgCredentialStore::new(pool);
    if store.find_by_nickname(&args.nickname).await?.is_some() {
        fail(format!("nickname '{}' is already taken", args.nickname));
    }
    if store.find_by_email(&args.email).await?.is_some() {
        fail(format!("a user with email '{}' already exists", args.email));
    }

    let password_service = PasswordService::new()?;
    let password_hash = password_service.hash(&args.password).await?;

    let user = store
        .create(&args.name, &args.nickname, &args.email, &password_hash)
        .await?;

    println!("Created user '{}' with id {}", user.email, user.id);
    Ok(())
}
