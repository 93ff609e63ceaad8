//! SQLite backend for the checkout engine.
//!
//! [`SqliteDatabase`] implements every storage trait in [`crate::traits`]. The SQL itself lives in [`db`] as free
//! functions over a connection.
mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;
