//! HTTP surface of the volume lifecycle manager.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod reconcile;
pub mod routes;
pub mod service;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use reconcile::Reconciler;
pub use routes::create_router;
pub use state::AppState;
