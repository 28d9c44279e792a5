use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::document::BlockUid;
use crate::processor::{BlockchainProcessor, SyncState};
use crate::store::ConnectionsRepo;

/// Shared application state: the sync engine and the wallet connections.
pub struct AppState {
    pub processor: Arc<BlockchainProcessor>,
    pub connections: ConnectionsRepo,
    /// Currencies with configured endpoints.
    pub currencies: Vec<String>,
}

/* ---------- Blockchain API Models ---------- */

#[derive(Serialize)]
pub struct CurrencyStatus {
    pub currency: String,
    pub state: SyncState,
    pub current_buid: Option<BlockUid>,
}

#[derive(Serialize)]
pub struct CurrenciesResponse {
    pub currencies: Vec<CurrencyStatus>,
}

#[derive(Serialize)]
pub struct NewBlocksResponse {
    pub cursor: BlockUid,
    pub identities: Vec<u64>,
    pub money: Vec<u64>,
}

/// Monetary view of a currency, as a wallet displays it.
#[derive(Serialize)]
pub struct MoneyResponse {
    pub median_time: u64,
    pub members_count: u64,
    pub monetary_mass: u64,
    pub last_ud: u64,
    pub last_ud_base: u32,
    pub last_ud_time: u64,
    pub previous_monetary_mass: u64,
    pub previous_members_count: u64,
    pub previous_ud: u64,
    pub previous_ud_base: u32,
    pub previous_ud_time: u64,
    pub ud_growth: f64,
}

/// `?numbers=12,15,13`
#[derive(Deserialize)]
pub struct BlocksQuery {
    pub numbers: String,
}

/* ---------- Connection API Models ---------- */

#[derive(Deserialize)]
pub struct ConnectionsQuery {
    pub currency: Option<String>,
}

#[derive(Deserialize)]
pub struct NewConnectionRequest {
    pub currency: String,
    pub pubkey: String,
    pub salt: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub blockstamp: BlockUid,
}

/// Identity fields of a stored connection.
#[derive(Deserialize)]
pub struct ConnectionKey {
    pub currency: String,
    pub pubkey: String,
    pub salt: String,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
