pub mod app;
pub mod backend;
pub mod booking;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod filter;
pub mod model;
pub mod notify;
pub mod pricing;
pub mod router;
pub mod session;
