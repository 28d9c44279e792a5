pub mod block;
pub mod block_uid;

pub use block::{BlockDocument, RemoteBlock};
pub use block_uid::BlockUid;

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::blockchain::ParametersError;

/// A fetched block could not be turned into a well-formed signed document.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("signed document must end with a newline")]
    MissingTrailingNewline,

    #[error("signed document has no detached signature")]
    MissingSignature,

    #[error("malformed signature: {0}")]
    InvalidSignature(String),

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("invalid value for `{field}`: {value:?}")]
    InvalidField { field: &'static str, value: String },

    #[error("unexpected line in block document: {0:?}")]
    UnexpectedLine(String),

    #[error("inner hash mismatch (declared {declared}, computed {computed})")]
    InnerHashMismatch { declared: String, computed: String },

    #[error("block hash mismatch (declared {declared}, computed {computed})")]
    HashMismatch { declared: String, computed: String },

    #[error("block number mismatch (envelope {envelope}, document {document})")]
    NumberMismatch { envelope: u64, document: u64 },

    #[error("invalid parameters in block zero: {0}")]
    InvalidParameters(#[from] ParametersError),
}

/// Uppercase hex SHA-256, the hash encoding used by block documents.
pub fn sha256_upper_hex(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    hex::encode_upper(hasher.finalize())
}
