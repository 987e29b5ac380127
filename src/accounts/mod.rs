mod dto;
pub mod error;
pub mod handlers;
#[cfg(test)]
pub(crate) mod memory;
pub mod otp_store;
pub mod repo;
pub mod repo_types;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub use error::AccountError;
pub use services::AccountService;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::public_routes())
        .merge(handlers::me_routes())
}
