use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::BlockchainParameters;
use crate::document::{BlockDocument, BlockUid};

/// Local reconciled view of one currency's blockchain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blockchain {
    pub currency: String,
    pub parameters: BlockchainParameters,
    /// Reconciliation cursor. Never moves backwards.
    pub current_buid: BlockUid,
    pub nb_members: u64,
    /// Monetary mass in base units, as of the last dividend block.
    pub current_mass: u64,
    pub median_time: u64,
    /// Last dividend amount (multiply by `10^last_ud_base`).
    pub last_ud: u64,
    pub last_ud_base: u32,
    pub last_ud_time: u64,
    pub previous_mass: u64,
    pub previous_members_count: u64,
    pub previous_ud: u64,
    pub previous_ud_base: u32,
    pub previous_ud_time: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Blockchain {
    /// Zero-valued snapshot of a chain with no current block.
    pub fn new(currency: impl Into<String>) -> Self {
        Self {
            currency: currency.into(),
            parameters: BlockchainParameters::default(),
            current_buid: BlockUid::empty(),
            nb_members: 0,
            current_mass: 0,
            median_time: 0,
            last_ud: 0,
            last_ud_base: 0,
            last_ud_time: 0,
            previous_mass: 0,
            previous_members_count: 0,
            previous_ud: 0,
            previous_ud_base: 0,
            previous_ud_time: 0,
            updated_at: None,
        }
    }

    /// Move the cursor to `block` if it is ahead. Returns whether it moved.
    pub fn advance_to(&mut self, block: &BlockDocument) -> bool {
        if !self.is_ahead(block.number) {
            return false;
        }
        self.current_buid = block.block_uid();
        self.median_time = self.median_time.max(block.median_time);
        true
    }

    /// Take the dividend fields from the most recent dividend block.
    pub fn set_last_dividend(&mut self, block: &BlockDocument) {
        self.last_ud = block.dividend.unwrap_or(0);
        self.last_ud_base = block.unit_base;
        self.last_ud_time = block.median_time;
        self.current_mass = block.monetary_mass;
        self.nb_members = block.members_count;
    }

    /// Take the `previous_*` fields from the dividend block before the last one.
    pub fn set_previous_dividend(&mut self, block: &BlockDocument) {
        self.previous_mass = block.monetary_mass;
        self.previous_members_count = block.members_count;
        self.previous_ud = block.dividend.unwrap_or(0);
        self.previous_ud_base = block.unit_base;
        self.previous_ud_time = block.median_time;
    }

    /// Fold one block into the snapshot. Blocks at or behind the cursor are
    /// ignored; a dividend block shifts the `last_*` fields into `previous_*`.
    pub fn fold(&mut self, block: &BlockDocument) -> bool {
        if !self.is_ahead(block.number) {
            return false;
        }
        if block.number == 0 {
            if let Some(parameters) = &block.parameters {
                self.parameters = parameters.clone();
            }
        }
        if block.dividend.is_some() {
            self.previous_mass = self.current_mass;
            self.previous_members_count = self.nb_members;
            self.previous_ud = self.last_ud;
            self.previous_ud_base = self.last_ud_base;
            self.previous_ud_time = self.last_ud_time;
            self.set_last_dividend(block);
        } else {
            self.nb_members = block.members_count;
        }
        self.advance_to(block)
    }

    /// A block is ahead of an empty cursor even at height zero.
    fn is_ahead(&self, number: u64) -> bool {
        self.current_buid.is_empty() || number > self.current_buid.number
    }
}
