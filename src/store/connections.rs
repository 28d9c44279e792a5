use log::debug;

use super::StoreError;
use crate::wallet::Connection;

/// Wallet connections, keyed by their `(currency, pubkey, salt)` identity.
#[derive(Clone)]
pub struct ConnectionsRepo {
    tree: sled::Tree,
}

impl ConnectionsRepo {
    pub fn new(tree: sled::Tree) -> Self {
        Self { tree }
    }

    pub fn insert(&self, connection: &Connection) -> Result<(), StoreError> {
        let key = connection.key()?;
        let value = serde_json::to_vec(connection)?;
        let swapped = self
            .tree
            .compare_and_swap(key, None as Option<&[u8]>, Some(value))?;
        if swapped.is_err() {
            return Err(StoreError::AlreadyExists(format!(
                "{}:{}",
                connection.currency, connection.pubkey
            )));
        }
        self.tree.flush()?;
        debug!(
            "DB - stored connection {} on {}",
            connection.pubkey, connection.currency
        );
        Ok(())
    }

    pub fn get_all(&self) -> Result<Vec<Connection>, StoreError> {
        self.tree
            .iter()
            .values()
            .map(|value| -> Result<Connection, StoreError> {
                Ok(serde_json::from_slice(&value?)?)
            })
            .collect()
    }

    pub fn get_by_currency(&self, currency: &str) -> Result<Vec<Connection>, StoreError> {
        Ok(self
            .get_all()?
            .into_iter()
            .filter(|c| c.currency == currency)
            .collect())
    }

    /// Currencies with at least one connection, sorted and deduplicated.
    pub fn currencies(&self) -> Result<Vec<String>, StoreError> {
        let mut currencies: Vec<String> = self.get_all()?.into_iter().map(|c| c.currency).collect();
        currencies.sort();
        currencies.dedup();
        Ok(currencies)
    }

    pub fn remove(&self, connection: &Connection) -> Result<bool, StoreError> {
        let removed = self.tree.remove(connection.key()?)?.is_some();
        self.tree.flush()?;
        Ok(removed)
    }
}
