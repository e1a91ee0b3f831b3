//! Client error types.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level failure talking to a collaborator.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// A collaborator answered with a non-success status.
    #[error("{service} returned {status}: {message}")]
    Service {
        service: &'static str,
        status: u16,
        message: String,
    },

    /// The billing service has no tariff with this id.
    #[error("tariff {0} not found")]
    TariffNotFound(Uuid),
}

pub type ClientResult<T> = Result<T, ClientError>;
