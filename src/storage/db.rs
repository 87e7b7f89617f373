use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;
use std::time::Duration;

use crate::storage::migration::Migrator;

pub async fn init_db(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    tracing::info!("Connecting to database: {}", database_url);

    let mut options = ConnectOptions::new(database_url.to_string());
    options
        .connect_timeout(Duration::from_secs(10))
        .sqlx_logging(false);

    // Handle special SQLite URL formats
    if database_url == "sqlite::memory:" {
        // Every pooled connection would otherwise see its own empty database.
        options.max_connections(1).min_connections(1);
    } else if let Some(path_str) = database_url.strip_prefix("sqlite://") {
        let path_str = path_str.split('?').next().unwrap_or(path_str);
        let path = std::path::Path::new(path_str);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| DbErr::Custom(format!("Failed to create DB directory: {}", e)))?;
                tracing::info!("Created database directory: {}", parent.display());
            }
        }

        if !path.exists() {
            std::fs::File::create(path)
                .map_err(|e| DbErr::Custom(format!("Failed to create DB file: {}", e)))?;
            tracing::info!("Created database file: {}", path.display());
        }
    } else {
        return Err(DbErr::Custom("Invalid SQLite URL format".to_string()));
    }

    let db = Database::connect(options)
        .await
        .map_err(|e| DbErr::Custom(format!("Connection failed: {}", e)))?;

    tracing::info!("Applying migrations...");
    Migrator::up(&db, None).await?;

    Ok(db)
}
