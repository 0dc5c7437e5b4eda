// src/lib.rs
// finchat - chat gateway for the financial assistant

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod api;
pub mod auth;
pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod llm;
pub mod models;
pub mod state;

pub use error::{AppError, Result};
pub use state::AppState;
