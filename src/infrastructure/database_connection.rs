// Database connection and pool management
// This module handles SQLite database connections using sqlx

use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use anyhow::Result;
use std::path::Path;

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self> {
        // Create database file directory if it doesn't exist
        let db_path = if database_url.starts_with("sqlite://") {
            database_url.trim_start_matches("sqlite://")
        } else if database_url.starts_with("sqlite:") {
            database_url.trim_start_matches("sqlite:")
        } else {
            database_url
        };

        if let Some(parent) = Path::new(db_path).parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        if !Path::new(db_path).exists() {
            std::fs::File::create(db_path)?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        let create_raw_records_sql = r#"
            CREATE TABLE IF NOT EXISTS raw_records (
                id TEXT PRIMARY KEY,
                supplier_id TEXT NOT NULL,
                supplier_account_id TEXT,
                supplier_product_id TEXT NOT NULL,
                raw_payload TEXT NOT NULL,
                collection_method TEXT NOT NULL,
                collection_source TEXT NOT NULL,
                data_hash TEXT NOT NULL,
                is_processed BOOLEAN NOT NULL DEFAULT 0,
                processed_at DATETIME,
                metadata TEXT NOT NULL DEFAULT '{}',
                collected_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL,
                UNIQUE (supplier_id, supplier_product_id)
            )
        "#;

        let create_normalized_products_sql = r#"
            CREATE TABLE IF NOT EXISTS normalized_products (
                id TEXT PRIMARY KEY,
                raw_record_id TEXT NOT NULL UNIQUE,
                supplier_id TEXT NOT NULL,
                supplier_product_id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                price REAL NOT NULL,
                cost_price REAL,
                currency TEXT NOT NULL,
                category TEXT,
                brand TEXT,
                stock_quantity INTEGER NOT NULL,
                status TEXT NOT NULL,
                images TEXT NOT NULL DEFAULT '[]',
                attributes TEXT NOT NULL DEFAULT '{}',
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL,
                FOREIGN KEY (raw_record_id) REFERENCES raw_records (id) ON DELETE CASCADE
            )
        "#;

        let create_collection_runs_sql = r#"
            CREATE TABLE IF NOT EXISTS collection_runs (
                id TEXT PRIMARY KEY,
                supplier_id TEXT NOT NULL,
                account_id TEXT,
                status TEXT NOT NULL DEFAULT 'running',
                collected INTEGER NOT NULL DEFAULT 0,
                new_count INTEGER NOT NULL DEFAULT 0,
                updated_count INTEGER NOT NULL DEFAULT 0,
                failed_count INTEGER NOT NULL DEFAULT 0,
                started_at DATETIME NOT NULL,
                completed_at DATETIME,
                error_summary TEXT
            )
        "#;

        let create_indexes_sql = r#"
            CREATE INDEX IF NOT EXISTS idx_raw_records_supplier ON raw_records (supplier_id);
            CREATE INDEX IF NOT EXISTS idx_raw_records_unprocessed ON raw_records (is_processed, supplier_id);
            CREATE INDEX IF NOT EXISTS idx_normalized_supplier ON normalized_products (supplier_id);
            CREATE INDEX IF NOT EXISTS idx_runs_supplier ON collection_runs (supplier_id);
            CREATE INDEX IF NOT EXISTS idx_runs_status ON collection_runs (status);
        "#;

        sqlx::query(create_raw_records_sql).execute(&self.pool).await?;
        sqlx::query(create_normalized_products_sql).execute(&self.pool).await?;
        sqlx::query(create_collection_runs_sql).execute(&self.pool).await?;
        sqlx::query(create_indexes_sql).execute(&self.pool).await?;

        Ok(())
    }
}
