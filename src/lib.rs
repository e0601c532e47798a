//! lewalink - account and session service
//!
//! Registration with emailed activation codes, password and Google signin,
//! rotating refresh tokens with reuse detection, and role-quota'd admin
//! account management over SQLite.

pub mod account;
pub mod admin;
pub mod api;
pub mod auth;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod mailer;
pub mod oauth;
pub mod server;

pub use config::ServerConfig;
pub use context::AppContext;
pub use error::{AppError, AppResult};
