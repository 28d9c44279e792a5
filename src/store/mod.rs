pub mod blockchains;
pub mod connections;

pub use blockchains::BlockchainsRepo;
pub use connections::ConnectionsRepo;

use log::info;
use std::path::Path;
use thiserror::Error;

use crate::document::BlockUid;

const TREE_BLOCKCHAINS: &str = "blockchains";
const TREE_CONNECTIONS: &str = "connections";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record already exists: {0}")]
    AlreadyExists(String),

    #[error("no snapshot stored for currency {0}")]
    NotFound(String),

    #[error("cursor of {currency} would move backwards ({stored} -> {new})")]
    CursorRegression {
        currency: String,
        stored: BlockUid,
        new: BlockUid,
    },

    #[error("storage backend: {0}")]
    Backend(#[from] sled::Error),

    #[error("record encoding: {0}")]
    Codec(#[from] serde_json::Error),
}

/// On-disk database holding the wallet's local state.
#[derive(Clone)]
pub struct Database {
    db: sled::Db,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        info!("DB - opened {}", path.display());
        Ok(Self { db })
    }

    /// Throwaway database, removed when dropped.
    #[cfg(test)]
    pub fn temporary() -> Self {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .expect("temporary sled db");
        Self { db }
    }

    pub fn blockchains(&self) -> Result<BlockchainsRepo, StoreError> {
        Ok(BlockchainsRepo::new(self.db.open_tree(TREE_BLOCKCHAINS)?))
    }

    pub fn connections(&self) -> Result<ConnectionsRepo, StoreError> {
        Ok(ConnectionsRepo::new(self.db.open_tree(TREE_CONNECTIONS)?))
    }
}
