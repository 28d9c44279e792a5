use thiserror::Error;

use crate::blockchain::ParametersError;
use crate::connector::{ConnectorError, Request, RequestKind};
use crate::document::DocumentError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum SyncError {
    /// A request to the node failed; `request` says which one.
    #[error("{request} request failed: {source}")]
    Connector {
        request: RequestKind,
        source: ConnectorError,
    },

    #[error("unexpected {request} response: {reason}")]
    InvalidResponse { request: RequestKind, reason: String },

    #[error("malformed block document: {0}")]
    Document(#[from] DocumentError),

    #[error("invalid blockchain parameters: {0}")]
    Parameters(#[from] ParametersError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("currency {0} is not initialized")]
    NotInitialized(String),

    #[error("currency {0} is already initialized")]
    AlreadyInitialized(String),

    #[error("node did not return blocks {0:?}")]
    MissingBlocks(Vec<u64>),

    #[error("block range {from}..={to} is too large")]
    InvalidRange { from: u64, to: u64 },
}

impl SyncError {
    pub fn connector(request: Request, source: ConnectorError) -> Self {
        SyncError::Connector {
            request: request.kind(),
            source,
        }
    }

    pub fn invalid_response(request: Request, reason: impl ToString) -> Self {
        SyncError::InvalidResponse {
            request: request.kind(),
            reason: reason.to_string(),
        }
    }

    /// Transient failures: re-running the same operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Connector {
                source: ConnectorError::EndpointUnavailable { .. },
                ..
            }
        )
    }
}
