mod auth;
mod error;
pub mod models;
mod server;
pub mod services;
pub mod state;
mod validation;

pub use auth::TOKEN_HEADER;
pub use error::ApiError;
pub use server::{router, run};
