pub mod models;
mod sqlite;

pub use sqlite::SqliteStore;

use sqlx::{
  migrate::MigrateDatabase,
  sqlite::{SqlitePool, SqlitePoolOptions},
  Sqlite,
};

pub type DbPool = SqlitePool;

pub async fn create_pool(database_url: &str) -> Result<DbPool, crate::Error> {
  if !Sqlite::database_exists(database_url).await.unwrap_or(false) {
    tracing::info!("Creating database: {}", database_url);
    Sqlite::create_database(database_url).await?;
  }

  let mut options = SqlitePoolOptions::new();
  // Every connection to an in-memory database opens a fresh, empty one.
  if database_url.contains(":memory:") {
    options = options
      .max_connections(1)
      .idle_timeout(None)
      .max_lifetime(None);
  }
  let pool = options.connect(database_url).await?;

  tracing::info!("Running migrations...");
  sqlx::migrate!("./migrations")
    .run(&pool)
    .await?;

  tracing::info!("Database ready");
  Ok(pool)
}
