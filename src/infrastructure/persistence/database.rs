use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tokio::fs;
use tracing::info;

/// Pool wrapper for the rule store (spec §6, "Persistence (Rule Store
/// tables)"): `monitor_rules` + `monitor_logs`, JSON columns stored as TEXT.
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn connect(db_url: &str) -> Result<Self> {
        if let Some(path_part) = db_url.strip_prefix("sqlite://") {
            let path = Path::new(path_part);
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                fs::create_dir_all(parent)
                    .await
                    .context("failed to create database directory")?;
            }
        }

        let options = SqliteConnectOptions::from_str(db_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("failed to connect to sqlite database")?;

        info!(%db_url, "connected to rule store database");

        let db = Self { pool };
        db.init().await?;
        Ok(db)
    }

    async fn init(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS monitor_rules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                enabled BOOLEAN NOT NULL DEFAULT 1,
                trigger_type TEXT NOT NULL,
                trigger_config TEXT NOT NULL,
                action_type TEXT NOT NULL,
                action_config TEXT NOT NULL,
                instrument_token INTEGER,
                symbol TEXT,
                linked_trade_id INTEGER,
                linked_order_id TEXT,
                fire_count INTEGER NOT NULL DEFAULT 0,
                max_fires INTEGER,
                expires_at TEXT,
                fired_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create monitor_rules table")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_monitor_rules_user_enabled ON monitor_rules (user_id, enabled);")
            .execute(&mut *conn)
            .await
            .context("failed to create user/enabled index")?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_monitor_rules_instrument ON monitor_rules (instrument_token);")
            .execute(&mut *conn)
            .await
            .context("failed to create instrument index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS monitor_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                rule_id INTEGER NOT NULL,
                trigger_snapshot TEXT NOT NULL,
                action_taken TEXT NOT NULL,
                action_result TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create monitor_logs table")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_monitor_logs_rule_time ON monitor_logs (rule_id, created_at);")
            .execute(&mut *conn)
            .await
            .context("failed to create logs index")?;

        info!("rule store schema initialized");
        Ok(())
    }
}
