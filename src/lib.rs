//! Library exports for moviedb, shared between the binary and tests.

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod mailer;
pub mod models;
pub mod routes;
pub mod startup;
pub mod state;
pub mod store;
pub mod utils;
pub mod validator;
