//! Database layer
//!
//! Supports SQLite (default, single-file deployment) and MySQL/MariaDB. The
//! driver is selected by configuration and hidden behind [`DatabasePool`];
//! repositories dispatch on [`DatabasePool::driver`] to per-dialect queries.

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};
