pub mod bma;

pub use bma::BmaConnector;

use async_trait::async_trait;
use futures::future::try_join_all;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Node error code: the chain has no block yet.
pub const NO_CURRENT_BLOCK: u32 = 2010;

/// Node error code: the requested block does not exist.
pub const BLOCK_NOT_FOUND: u32 = 2011;

/// A logical request against a currency's node API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Request {
    Current,
    Parameters,
    Ud,
    Tx,
    Joiners,
    Leavers,
    Actives,
    Excluded,
    Newcomers,
    Block { number: u64 },
    Blocks { count: u64, from: u64 },
}

/// Argument-free tag of a [`Request`], used to attribute results and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Current,
    Parameters,
    Ud,
    Tx,
    Joiners,
    Leavers,
    Actives,
    Excluded,
    Newcomers,
    Block,
    Blocks,
}

impl Request {
    pub fn kind(&self) -> RequestKind {
        match self {
            Request::Current => RequestKind::Current,
            Request::Parameters => RequestKind::Parameters,
            Request::Ud => RequestKind::Ud,
            Request::Tx => RequestKind::Tx,
            Request::Joiners => RequestKind::Joiners,
            Request::Leavers => RequestKind::Leavers,
            Request::Actives => RequestKind::Actives,
            Request::Excluded => RequestKind::Excluded,
            Request::Newcomers => RequestKind::Newcomers,
            Request::Block { .. } => RequestKind::Block,
            Request::Blocks { .. } => RequestKind::Blocks,
        }
    }

    /// Path of the request below the node's base URL.
    pub fn path(&self) -> String {
        match self {
            Request::Current => "/blockchain/current".to_string(),
            Request::Parameters => "/blockchain/parameters".to_string(),
            Request::Ud => "/blockchain/with/ud".to_string(),
            Request::Tx => "/blockchain/with/tx".to_string(),
            Request::Joiners => "/blockchain/with/joiners".to_string(),
            Request::Leavers => "/blockchain/with/leavers".to_string(),
            Request::Actives => "/blockchain/with/actives".to_string(),
            Request::Excluded => "/blockchain/with/excluded".to_string(),
            Request::Newcomers => "/blockchain/with/newcomers".to_string(),
            Request::Block { number } => format!("/blockchain/block/{number}"),
            Request::Blocks { count, from } => format!("/blockchain/blocks/{count}/{from}"),
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestKind::Current => "current",
            RequestKind::Parameters => "parameters",
            RequestKind::Ud => "with/ud",
            RequestKind::Tx => "with/tx",
            RequestKind::Joiners => "with/joiners",
            RequestKind::Leavers => "with/leavers",
            RequestKind::Actives => "with/actives",
            RequestKind::Excluded => "with/excluded",
            RequestKind::Newcomers => "with/newcomers",
            RequestKind::Block => "block",
            RequestKind::Blocks => "blocks",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConnectorError {
    /// The node answered with a domain error.
    #[error("node error {code}: {message}")]
    Remote { code: u32, message: String },

    /// No configured endpoint answered.
    #[error("no endpoint available for currency {currency}")]
    EndpointUnavailable { currency: String },
}

impl ConnectorError {
    pub fn is_no_current_block(&self) -> bool {
        matches!(self, ConnectorError::Remote { code, .. } if *code == NO_CURRENT_BLOCK)
    }
}

/// Issues requests against the known endpoints of a currency.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn get(&self, currency: &str, request: Request) -> Result<Value, ConnectorError>;
}

/// Run `requests` concurrently and wait for all of them. The first failure
/// drops the requests still in flight and is returned with its request.
pub async fn fetch_all(
    connector: &dyn Connector,
    currency: &str,
    requests: &[Request],
) -> Result<Vec<(Request, Value)>, (Request, ConnectorError)> {
    try_join_all(requests.iter().map(|&request| async move {
        connector
            .get(currency, request)
            .await
            .map(|value| (request, value))
            .map_err(|e| (request, e))
    }))
    .await
}
