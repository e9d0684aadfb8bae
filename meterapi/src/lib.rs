mod admin;
mod auth;
mod backend;
mod client;
mod error;
mod power;
mod response;
mod telemetry;

pub use auth::SessionResult;
pub use backend::MeterBackend;
pub use client::{Client, ClientOptions, DEFAULT_TIMEOUT};
pub use error::{Error, Result};
