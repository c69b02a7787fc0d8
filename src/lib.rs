#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod cli;
pub mod clock;
pub mod comments;
pub mod config;
pub mod data;
pub mod debounce;
pub mod endpoints;
pub mod error;
pub mod format;
pub mod modal;
pub mod query;
pub mod reddit;
pub mod render;
pub mod search;
pub mod state;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
