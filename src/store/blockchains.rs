use chrono::Utc;
use log::debug;

use super::StoreError;
use crate::blockchain::Blockchain;

/// One [`Blockchain`] snapshot per currency, keyed by currency name.
#[derive(Clone)]
pub struct BlockchainsRepo {
    tree: sled::Tree,
}

impl BlockchainsRepo {
    pub fn new(tree: sled::Tree) -> Self {
        Self { tree }
    }

    /// `Ok(None)` means the currency was never initialized.
    pub fn get_one(&self, currency: &str) -> Result<Option<Blockchain>, StoreError> {
        match self.tree.get(currency.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Create the snapshot of a currency. Never overwrites.
    pub fn insert(&self, blockchain: &Blockchain) -> Result<(), StoreError> {
        let bytes = encode(blockchain)?;
        let swapped = self.tree.compare_and_swap(
            blockchain.currency.as_bytes(),
            None as Option<&[u8]>,
            Some(bytes),
        )?;
        if swapped.is_err() {
            return Err(StoreError::AlreadyExists(blockchain.currency.clone()));
        }
        self.tree.flush()?;
        debug!(
            "DB - inserted snapshot {} at {}",
            blockchain.currency, blockchain.current_buid
        );
        Ok(())
    }

    /// Replace an existing snapshot. The cursor may only move forward.
    pub fn update(&self, blockchain: &Blockchain) -> Result<(), StoreError> {
        let key = blockchain.currency.as_bytes();
        let bytes = encode(blockchain)?;
        loop {
            let old = self
                .tree
                .get(key)?
                .ok_or_else(|| StoreError::NotFound(blockchain.currency.clone()))?;
            let stored: Blockchain = serde_json::from_slice(&old)?;
            if blockchain.current_buid.number < stored.current_buid.number {
                return Err(StoreError::CursorRegression {
                    currency: blockchain.currency.clone(),
                    stored: stored.current_buid,
                    new: blockchain.current_buid.clone(),
                });
            }
            if self
                .tree
                .compare_and_swap(key, Some(old), Some(bytes.clone()))?
                .is_ok()
            {
                break;
            }
        }
        self.tree.flush()?;
        debug!(
            "DB - updated snapshot {} to {}",
            blockchain.currency, blockchain.current_buid
        );
        Ok(())
    }

    pub fn remove(&self, currency: &str) -> Result<bool, StoreError> {
        let removed = self.tree.remove(currency.as_bytes())?.is_some();
        self.tree.flush()?;
        Ok(removed)
    }

    pub fn currencies(&self) -> Result<Vec<String>, StoreError> {
        self.tree
            .iter()
            .keys()
            .map(|key| -> Result<String, StoreError> {
                Ok(String::from_utf8_lossy(&key?).into_owned())
            })
            .collect()
    }
}

fn encode(blockchain: &Blockchain) -> Result<Vec<u8>, StoreError> {
    let mut record = blockchain.clone();
    record.updated_at = Some(Utc::now());
    Ok(serde_json::to_vec(&record)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::BlockUid;
    use crate::store::Database;

    fn repo() -> BlockchainsRepo {
        Database::temporary().blockchains().unwrap()
    }

    #[test]
    fn absent_currency_is_none() {
        assert!(repo().get_one("g1").unwrap().is_none());
    }

    #[test]
    fn insert_is_create_only() {
        let repo = repo();
        let mut bc = Blockchain::new("g1");
        repo.insert(&bc).unwrap();

        bc.nb_members = 99;
        assert!(matches!(repo.insert(&bc), Err(StoreError::AlreadyExists(c)) if c == "g1"));
        assert_eq!(repo.get_one("g1").unwrap().unwrap().nb_members, 0);
    }

    #[test]
    fn update_rejects_cursor_regression() {
        let repo = repo();
        let mut bc = Blockchain::new("g1");
        bc.current_buid = BlockUid::new(10, "A".repeat(64));
        repo.insert(&bc).unwrap();

        bc.current_buid = BlockUid::new(12, "B".repeat(64));
        repo.update(&bc).unwrap();

        bc.current_buid = BlockUid::new(11, "C".repeat(64));
        assert!(matches!(
            repo.update(&bc),
            Err(StoreError::CursorRegression { .. })
        ));
        assert_eq!(repo.get_one("g1").unwrap().unwrap().current_buid.number, 12);
    }

    #[test]
    fn update_requires_existing_snapshot() {
        assert!(matches!(
            repo().update(&Blockchain::new("g1")),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn persist_stamps_update_time_and_lists_currencies() {
        let repo = repo();
        repo.insert(&Blockchain::new("g1")).unwrap();
        repo.insert(&Blockchain::new("g1-test")).unwrap();
        assert!(repo.get_one("g1").unwrap().unwrap().updated_at.is_some());
        assert_eq!(repo.currencies().unwrap(), vec!["g1", "g1-test"]);
        assert!(repo.remove("g1").unwrap());
        assert_eq!(repo.currencies().unwrap(), vec!["g1-test"]);
    }

    #[test]
    fn snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let db = Database::open(dir.path()).unwrap();
            let mut bc = Blockchain::new("g1");
            bc.current_mass = 1234;
            db.blockchains().unwrap().insert(&bc).unwrap();
        }
        let db = Database::open(dir.path()).unwrap();
        let bc = db.blockchains().unwrap().get_one("g1").unwrap().unwrap();
        assert_eq!(bc.current_mass, 1234);
    }
}
