use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager, Pool, PooledConnection};
use thiserror::Error;

use crate::gateway::PlatformRegistry;
use crate::password::PasswordHasher;

macro_rules! time {
  ($s:expr, $e:expr) => {{
    let start = std::time::Instant::now();
    let result = $e;
    metrics::timing!($s, start.elapsed());
    result
  }}
}

pub mod action_log;
pub mod platform;
pub mod sync;
pub mod track;
pub mod user;
pub mod user_track;

embed_migrations!();


#[derive(Clone)]
pub struct Database {
  connection_pool: Pool<ConnectionManager<SqliteConnection>>,
  inner: Arc<Inner>,
}

struct Inner {
  registry: PlatformRegistry,
  password_hasher: PasswordHasher,
}


// Creation

#[derive(Debug, Error)]
pub enum DatabaseCreateError {
  #[error("Failed to create database connection pool")]
  ConnectionPoolCreateFail(#[from] r2d2::PoolError),
  #[error("Failed to run database migrations")]
  MigrationsRunFail(#[from] diesel_migrations::RunMigrationsError),
}

/// Enables foreign keys (SQLite defaults them to off) and sets a busy timeout on every pooled
/// connection, so concurrent synchronizations for distinct users back off instead of failing.
#[derive(Debug)]
struct ConnectionCustomizer;

impl r2d2::CustomizeConnection<SqliteConnection, r2d2::Error> for ConnectionCustomizer {
  fn on_acquire(&self, connection: &mut SqliteConnection) -> Result<(), r2d2::Error> {
    connection.batch_execute("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
      .map_err(r2d2::Error::QueryError)
  }
}

impl Database {
  pub fn new<D: AsRef<str>>(
    database_url: D,
    registry: PlatformRegistry,
    password_hasher: PasswordHasher,
  ) -> Result<Database, DatabaseCreateError> {
    let connection_pool = Pool::builder()
      .max_size(16)
      .connection_customizer(Box::new(ConnectionCustomizer))
      .build(ConnectionManager::<SqliteConnection>::new(database_url.as_ref()))?;
    embedded_migrations::run(&*connection_pool.get()?)?;
    let inner = Arc::new(Inner { registry, password_hasher });
    Ok(Database { connection_pool, inner })
  }
}


// Connecting to the database

pub struct DatabaseConnection {
  connection: PooledConnection<ConnectionManager<SqliteConnection>>,
  inner: Arc<Inner>,
}

#[derive(Debug, Error)]
pub enum DatabaseConnectError {
  #[error("Failed to get database connection from database connection pool")]
  ConnectionGetFail(#[from] r2d2::PoolError),
}

impl Database {
  pub fn connect(&self) -> Result<DatabaseConnection, DatabaseConnectError> {
    let connection = self.connection_pool.get()?;
    let inner = self.inner.clone();
    Ok(DatabaseConnection { connection, inner })
  }
}

impl DatabaseConnection {
  pub fn registry(&self) -> &PlatformRegistry {
    &self.inner.registry
  }
}


// Generic database query error.

#[derive(Debug, Error)]
pub enum DatabaseQueryError {
  #[error("Failed to execute a database query")]
  DatabaseQueryFail(#[from] diesel::result::Error),
}


// Debug implementations

impl Debug for Database {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    Ok(write!(f, "Backend")?)
  }
}

impl Debug for DatabaseConnection {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    Ok(write!(f, "BackendConnected")?)
  }
}
