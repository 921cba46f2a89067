use rocket_db_pools::{Database, sqlx};

/// Primary Postgres pool, configured under `databases.oasis_db`.
#[derive(Database)]
#[database("oasis_db")]
pub struct OasisDb(sqlx::PgPool);

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Applies pending migrations from `./migrations`.
pub async fn run_migrations(pool: &sqlx::PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    MIGRATOR.run(pool).await
}
