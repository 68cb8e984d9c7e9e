//! Local session cache.
//!
//! The hosted auth service owns the real session; this SQLite database only
//! keeps the latest tokens between CLI invocations, the way a browser client
//! keeps them in local storage.
//!
//! External modules should import from `agrirent::db`; the repository API is
//! re-exported here.

pub mod repo;

pub use repo::*;
