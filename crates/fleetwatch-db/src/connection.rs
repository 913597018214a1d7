//! SurrealDB connection management.

use std::time::Duration;

use surrealdb::Surreal;
use surrealdb::engine::remote::ws::{Client, Ws};
use surrealdb::opt::auth::Root;
use tracing::{info, warn};

use crate::error::DbError;
use crate::schema::run_migrations;

/// Configuration for connecting to SurrealDB.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// WebSocket address (e.g., `127.0.0.1:8000`).
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: String,
    pub password: String,
    /// Connection attempts before giving up at startup.
    pub connect_attempts: u32,
    /// Delay between connection attempts.
    pub retry_delay: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: "127.0.0.1:8000".into(),
            namespace: "fleetwatch".into(),
            database: "main".into(),
            username: "root".into(),
            password: "root".into(),
            connect_attempts: 5,
            retry_delay: Duration::from_secs(2),
        }
    }
}

/// The process-wide store handle.
///
/// Constructed once at startup and cloned into every repository; there
/// is no ambient global connection.
#[derive(Clone)]
pub struct DbManager {
    db: Surreal<Client>,
}

impl DbManager {
    /// Connect, authenticate as root and select namespace/database.
    pub async fn connect(config: &DbConfig) -> Result<Self, DbError> {
        info!(
            url = %config.url,
            namespace = %config.namespace,
            database = %config.database,
            "Connecting to SurrealDB"
        );

        let db = Surreal::new::<Ws>(config.url.as_str()).await?;
        db.signin(Root {
            username: config.username.clone(),
            password: config.password.clone(),
        })
        .await?;
        db.use_ns(config.namespace.as_str())
            .use_db(config.database.as_str())
            .await?;

        info!("Connected to SurrealDB");
        Ok(Self { db })
    }

    /// Connect with retries, then apply pending migrations.
    pub async fn connect_and_migrate(config: &DbConfig) -> Result<Self, DbError> {
        let attempts = config.connect_attempts.max(1);
        let mut attempt = 1;
        let manager = loop {
            match Self::connect(config).await {
                Ok(manager) => break manager,
                Err(e) if attempt < attempts => {
                    warn!(attempt, error = %e, "SurrealDB connection failed, retrying");
                    tokio::time::sleep(config.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };
        run_migrations(&manager.db).await?;
        Ok(manager)
    }

    /// Returns a clone of the underlying SurrealDB client.
    pub fn client(&self) -> Surreal<Client> {
        self.db.clone()
    }
}
