//! Database connection management
//!
//! `Database` owns one SQLite connection and the schema registry used to
//! hydrate records read through it.

#![allow(clippy::result_large_err)]

use std::path::Path;
use std::sync::Arc;

use draftline_core::errors::ExError;
use draftline_core::{SchemaRegistry, VersioningConfig};
use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::errors::{from_rusqlite, Result};
use crate::migrations::apply_migrations;

pub struct Database {
    conn: Connection,
    registry: Arc<SchemaRegistry>,
}

impl Database {
    /// Open (or create) a database file and bring its schema up to date
    pub fn open<P: AsRef<Path>>(path: P, registry: Arc<SchemaRegistry>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(from_rusqlite)?;
        tracing::debug!(path = %path.as_ref().display(), "database opened");
        Self::prepare(conn, registry)
    }

    /// Open a private in-memory database (tests, scratch use)
    pub fn open_in_memory(registry: Arc<SchemaRegistry>) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(from_rusqlite)?;
        Self::prepare(conn, registry)
    }

    /// Open the database named by `config`, in memory when it names none
    pub fn from_config(config: &VersioningConfig, registry: Arc<SchemaRegistry>) -> Result<Self> {
        match &config.database_path {
            Some(path) => Self::open(path, registry),
            None => Self::open_in_memory(registry),
        }
    }

    fn prepare(mut conn: Connection, registry: Arc<SchemaRegistry>) -> Result<Self> {
        configure(&conn)?;
        apply_migrations(&mut conn)?;
        Ok(Self { conn, registry })
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Connection for reads outside a transaction
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` inside one transaction
    ///
    /// Commits when `f` returns `Ok`; any `Err` (from `f` or from the
    /// commit itself) rolls every write back.
    pub fn transaction<T, E, F>(&mut self, behavior: TransactionBehavior, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Transaction<'_>, &Arc<SchemaRegistry>) -> std::result::Result<T, E>,
        E: From<ExError>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(behavior)
            .map_err(from_rusqlite)?;
        let value = f(&tx, &self.registry)?;
        tx.commit().map_err(from_rusqlite)?;
        Ok(value)
    }
}

/// Connection settings applied on open
fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(from_rusqlite)?;
    // WAL is unavailable for in-memory databases; SQLite reports "memory" there
    let _mode: String = conn
        .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
        .map_err(from_rusqlite)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .map_err(from_rusqlite)?;
    Ok(())
}
