use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

use crate::document::BlockUid;

/// Binding of a wallet key to a currency's network.
///
/// Identity is `(currency, pubkey, salt)`: the pubkey and salt derive the
/// keypair, the remaining fields are mutable attributes.
#[derive(Debug, Clone, Serialize, Deserialize, Eq)]
pub struct Connection {
    pub currency: String,
    pub pubkey: String,
    pub salt: String,
    /// Claimed identity name, empty when the key has no identity.
    #[serde(default)]
    pub uid: String,
    /// Block at which the identity was published.
    #[serde(default)]
    pub blockstamp: BlockUid,
    /// Only held in memory for local unlocking.
    #[serde(skip)]
    pub password: String,
}

impl Connection {
    pub fn new(
        currency: impl Into<String>,
        pubkey: impl Into<String>,
        salt: impl Into<String>,
    ) -> Self {
        Self {
            currency: currency.into(),
            pubkey: pubkey.into(),
            salt: salt.into(),
            uid: String::new(),
            blockstamp: BlockUid::empty(),
            password: String::new(),
        }
    }

    pub fn has_identity(&self) -> bool {
        !self.uid.is_empty()
    }

    /// Storage key derived from the identity fields only.
    pub fn key(&self) -> serde_json::Result<Vec<u8>> {
        // JSON keeps the three parts unambiguous whatever characters they hold.
        serde_json::to_vec(&(&self.currency, &self.pubkey, &self.salt))
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.currency == other.currency && self.pubkey == other.pubkey && self.salt == other.salt
    }
}

impl Hash for Connection {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.currency.hash(state);
        self.pubkey.hash(state);
        self.salt.hash(state);
    }
}
