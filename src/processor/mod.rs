mod error;

pub use error::SyncError;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::blockchain::{Blockchain, BlockchainParameters, RemoteParameters};
use crate::connector::{BLOCK_NOT_FOUND, Connector, ConnectorError, Request, fetch_all};
use crate::document::{BlockDocument, BlockUid, RemoteBlock};
use crate::store::{BlockchainsRepo, StoreError};

const IDENTITY_REQUESTS: [Request; 5] = [
    Request::Joiners,
    Request::Leavers,
    Request::Actives,
    Request::Excluded,
    Request::Newcomers,
];

const MONEY_REQUESTS: [Request; 2] = [Request::Ud, Request::Tx];

/// Sink for coarse progress messages. Must return promptly.
pub type Progress<'a> = &'a (dyn Fn(&str) + Send + Sync);

/// Reconciliation state of one currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Uninitialized,
    Initializing,
    Synced,
    Syncing,
}

/// Outcome of one reconciliation unit.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub currency: String,
    pub previous_buid: BlockUid,
    pub current_buid: BlockUid,
    pub blocks_folded: usize,
}

/// `{"result": {"blocks": [..]}}` answer of the `with/*` lookups.
#[derive(Deserialize)]
struct WithBlocks {
    result: WithBlocksResult,
}

#[derive(Deserialize)]
struct WithBlocksResult {
    blocks: Vec<u64>,
}

/// Reconciles the local snapshot of each currency with its nodes.
pub struct BlockchainProcessor {
    repo: BlockchainsRepo,
    connector: Arc<dyn Connector>,
    /// Serializes operations on the same currency.
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    running: Mutex<HashMap<String, SyncState>>,
}

/// Marks a currency as busy until dropped, including on cancellation.
struct Running<'a> {
    processor: &'a BlockchainProcessor,
    currency: String,
}

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.processor
            .running
            .lock()
            .expect("mutex poisoned")
            .remove(&self.currency);
    }
}

impl BlockchainProcessor {
    pub fn new(repo: BlockchainsRepo, connector: Arc<dyn Connector>) -> Self {
        Self {
            repo,
            connector,
            locks: Mutex::new(HashMap::new()),
            running: Mutex::new(HashMap::new()),
        }
    }

    fn currency_lock(&self, currency: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().expect("mutex poisoned");
        locks
            .entry(currency.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    fn mark_running(&self, currency: &str, state: SyncState) -> Running<'_> {
        self.running
            .lock()
            .expect("mutex poisoned")
            .insert(currency.to_string(), state);
        Running {
            processor: self,
            currency: currency.to_string(),
        }
    }

    pub fn state(&self, currency: &str) -> Result<SyncState, SyncError> {
        if let Some(state) = self.running.lock().expect("mutex poisoned").get(currency) {
            return Ok(*state);
        }
        Ok(match self.repo.get_one(currency)? {
            Some(_) => SyncState::Synced,
            None => SyncState::Uninitialized,
        })
    }

    /* -------------------- Local accessors -------------------- */

    /// Currencies with a stored snapshot.
    pub fn currencies(&self) -> Result<Vec<String>, SyncError> {
        Ok(self.repo.currencies()?)
    }

    pub fn snapshot(&self, currency: &str) -> Result<Blockchain, SyncError> {
        self.repo
            .get_one(currency)?
            .ok_or_else(|| SyncError::NotInitialized(currency.to_string()))
    }

    pub fn current_buid(&self, currency: &str) -> Result<BlockUid, SyncError> {
        Ok(self.snapshot(currency)?.current_buid)
    }

    /// Median time of the local current block.
    pub fn time(&self, currency: &str) -> Result<u64, SyncError> {
        Ok(self.snapshot(currency)?.median_time)
    }

    pub fn parameters(&self, currency: &str) -> Result<BlockchainParameters, SyncError> {
        Ok(self.snapshot(currency)?.parameters)
    }

    pub fn monetary_mass(&self, currency: &str) -> Result<u64, SyncError> {
        Ok(self.snapshot(currency)?.current_mass)
    }

    pub fn members_count(&self, currency: &str) -> Result<u64, SyncError> {
        Ok(self.snapshot(currency)?.nb_members)
    }

    /// Last dividend amount and its unit base.
    pub fn last_ud(&self, currency: &str) -> Result<(u64, u32), SyncError> {
        let bc = self.snapshot(currency)?;
        Ok((bc.last_ud, bc.last_ud_base))
    }

    pub fn last_ud_time(&self, currency: &str) -> Result<u64, SyncError> {
        Ok(self.snapshot(currency)?.last_ud_time)
    }

    pub fn previous_monetary_mass(&self, currency: &str) -> Result<u64, SyncError> {
        Ok(self.snapshot(currency)?.previous_mass)
    }

    pub fn previous_members_count(&self, currency: &str) -> Result<u64, SyncError> {
        Ok(self.snapshot(currency)?.previous_members_count)
    }

    pub fn previous_ud(&self, currency: &str) -> Result<(u64, u32), SyncError> {
        let bc = self.snapshot(currency)?;
        Ok((bc.previous_ud, bc.previous_ud_base))
    }

    pub fn previous_ud_time(&self, currency: &str) -> Result<u64, SyncError> {
        Ok(self.snapshot(currency)?.previous_ud_time)
    }

    /* -------------------- Remote operations -------------------- */

    /// Bootstrap the snapshot of a currency that has none. The snapshot is
    /// written once, at the end; on error nothing is stored.
    pub async fn initialize(
        &self,
        currency: &str,
        progress: Progress<'_>,
    ) -> Result<Blockchain, SyncError> {
        let lock = self.currency_lock(currency);
        let _serial = lock.lock().await;
        self.initialize_locked(currency, progress).await
    }

    async fn initialize_locked(
        &self,
        currency: &str,
        progress: Progress<'_>,
    ) -> Result<Blockchain, SyncError> {
        if self.repo.get_one(currency)?.is_some() {
            return Err(SyncError::AlreadyInitialized(currency.to_string()));
        }
        let _running = self.mark_running(currency, SyncState::Initializing);
        let mut blockchain = Blockchain::new(currency);

        progress("Requesting current block");
        let (current, parameters) = futures::try_join!(
            self.fetch_unless_empty(currency, Request::Current),
            self.fetch_unless_empty(currency, Request::Parameters),
        )?;
        match current {
            Some(value) => {
                let block = parse_block(Request::Current, value)?;
                blockchain.advance_to(&block);
            }
            None => info!("SYNC - {currency} has no current block yet"),
        }
        if let Some(value) = parameters {
            let remote: RemoteParameters = serde_json::from_value(value)
                .map_err(|e| SyncError::invalid_response(Request::Parameters, e))?;
            blockchain.parameters = BlockchainParameters::try_from(remote)?;
        }

        progress("Requesting blocks with dividend");
        let with_ud = self.fetch(currency, Request::Ud).await?;
        let dividend_heights = merge_heights([block_numbers(Request::Ud, with_ud)?], None);

        if let Some(&last) = dividend_heights.last() {
            progress("Requesting last block with dividend");
            let block = self.fetch_block(currency, last).await?;
            blockchain.set_last_dividend(&block);

            if dividend_heights.len() > 1 {
                progress("Requesting previous block with dividend");
                let previous = dividend_heights[dividend_heights.len() - 2];
                let block = self.fetch_block(currency, previous).await?;
                blockchain.set_previous_dividend(&block);
            }
        }

        self.repo.insert(&blockchain).map_err(|e| match e {
            StoreError::AlreadyExists(_) => SyncError::AlreadyInitialized(currency.to_string()),
            other => other.into(),
        })?;
        info!(
            "SYNC - {currency} initialized at {} (members={}, mass={}, last_ud={}e{})",
            blockchain.current_buid,
            blockchain.nb_members,
            blockchain.current_mass,
            blockchain.last_ud,
            blockchain.last_ud_base
        );
        Ok(blockchain)
    }

    /// Heights of blocks past the local cursor carrying identity events.
    pub async fn new_blocks_with_identities(&self, currency: &str) -> Result<Vec<u64>, SyncError> {
        let lock = self.currency_lock(currency);
        let _serial = lock.lock().await;
        let cursor = self.current_buid(currency)?;
        self.new_blocks(currency, &IDENTITY_REQUESTS, &cursor).await
    }

    /// Heights of blocks past the local cursor carrying dividends or transactions.
    pub async fn new_blocks_with_money(&self, currency: &str) -> Result<Vec<u64>, SyncError> {
        let lock = self.currency_lock(currency);
        let _serial = lock.lock().await;
        let cursor = self.current_buid(currency)?;
        self.new_blocks(currency, &MONEY_REQUESTS, &cursor).await
    }

    /// Fetch and parse the blocks at `numbers` (order of the result follows
    /// block height, duplicates are collapsed).
    pub async fn blocks(
        &self,
        numbers: &[u64],
        currency: &str,
    ) -> Result<Vec<BlockDocument>, SyncError> {
        let lock = self.currency_lock(currency);
        let _serial = lock.lock().await;
        self.fetch_blocks(currency, numbers).await
    }

    /// Incremental reconciliation: fold every block with money or identity
    /// events since the cursor, then move the cursor to the node's current
    /// block. The snapshot is written once, at the end.
    pub async fn refresh(&self, currency: &str) -> Result<SyncReport, SyncError> {
        let lock = self.currency_lock(currency);
        let _serial = lock.lock().await;
        self.refresh_locked(currency).await
    }

    async fn refresh_locked(&self, currency: &str) -> Result<SyncReport, SyncError> {
        let mut blockchain = self.snapshot(currency)?;
        let _running = self.mark_running(currency, SyncState::Syncing);
        let run_id = Uuid::new_v4();
        let previous = blockchain.current_buid.clone();
        debug!("SYNC - {currency} refresh {run_id} from {previous}");

        let unchanged = |blocks_folded| SyncReport {
            run_id,
            currency: currency.to_string(),
            previous_buid: previous.clone(),
            current_buid: previous.clone(),
            blocks_folded,
        };

        let current = match self.fetch_unless_empty(currency, Request::Current).await? {
            Some(value) => parse_block(Request::Current, value)?,
            None => return Ok(unchanged(0)),
        };
        if !previous.is_empty() && current.number <= previous.number {
            debug!("SYNC - {currency} already at {previous}");
            return Ok(unchanged(0));
        }

        let (money, identities) = futures::try_join!(
            self.new_blocks(currency, &MONEY_REQUESTS, &previous),
            self.new_blocks(currency, &IDENTITY_REQUESTS, &previous),
        )?;
        let mut numbers: Vec<u64> = merge_heights([money, identities], None)
            .into_iter()
            .filter(|&n| n < current.number)
            .collect();
        // Block zero carries the currency parameters; a snapshot started on
        // an empty chain has not seen it yet.
        if previous.is_empty() && current.number > 0 && numbers.first() != Some(&0) {
            numbers.insert(0, 0);
        }

        let mut blocks = self.fetch_blocks(currency, &numbers).await?;
        blocks.push(current);
        blocks.sort_by_key(|b| b.number);

        let mut blocks_folded = 0;
        for block in &blocks {
            if blockchain.fold(block) {
                debug!(
                    "SYNC - {currency} folded #{} ({} tx, identity events: {})",
                    block.number,
                    block.transaction_count(),
                    block.has_identity_events()
                );
                blocks_folded += 1;
            }
        }
        self.repo.update(&blockchain)?;

        info!(
            "SYNC - {currency} {previous} -> {} ({blocks_folded} blocks, run {run_id})",
            blockchain.current_buid
        );
        Ok(SyncReport {
            run_id,
            currency: currency.to_string(),
            previous_buid: previous,
            current_buid: blockchain.current_buid,
            blocks_folded,
        })
    }

    /// Forget the snapshot of `currency`; the next `sync` initializes it again.
    pub async fn reset(&self, currency: &str) -> Result<bool, SyncError> {
        let lock = self.currency_lock(currency);
        let _serial = lock.lock().await;
        let removed = self.repo.remove(currency)?;
        if removed {
            info!("SYNC - {currency} snapshot dropped");
        }
        Ok(removed)
    }

    /// `initialize` an unknown currency, `refresh` a known one. The choice is
    /// made under the currency lock, so concurrent calls never race to
    /// initialize.
    pub async fn sync(&self, currency: &str, progress: Progress<'_>) -> Result<SyncReport, SyncError> {
        let lock = self.currency_lock(currency);
        let _serial = lock.lock().await;
        if self.repo.get_one(currency)?.is_some() {
            return self.refresh_locked(currency).await;
        }
        let blockchain = self.initialize_locked(currency, progress).await?;
        Ok(SyncReport {
            run_id: Uuid::new_v4(),
            currency: currency.to_string(),
            previous_buid: BlockUid::empty(),
            current_buid: blockchain.current_buid,
            blocks_folded: 0,
        })
    }

    /* -------------------- Helpers (caller holds the currency lock) -------------------- */

    async fn fetch(&self, currency: &str, request: Request) -> Result<Value, SyncError> {
        self.connector
            .get(currency, request)
            .await
            .map_err(|e| SyncError::connector(request, e))
    }

    /// `None` when the node reports that the chain has no block yet.
    async fn fetch_unless_empty(
        &self,
        currency: &str,
        request: Request,
    ) -> Result<Option<Value>, SyncError> {
        match self.connector.get(currency, request).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_no_current_block() => Ok(None),
            Err(e) => Err(SyncError::connector(request, e)),
        }
    }

    async fn fetch_block(&self, currency: &str, number: u64) -> Result<BlockDocument, SyncError> {
        let request = Request::Block { number };
        let value = match self.connector.get(currency, request).await {
            Ok(value) => value,
            Err(ConnectorError::Remote { code, .. }) if code == BLOCK_NOT_FOUND => {
                return Err(SyncError::MissingBlocks(vec![number]));
            }
            Err(e) => return Err(SyncError::connector(request, e)),
        };
        parse_block(request, value)
    }

    async fn new_blocks(
        &self,
        currency: &str,
        requests: &[Request],
        cursor: &BlockUid,
    ) -> Result<Vec<u64>, SyncError> {
        let results = fetch_all(self.connector.as_ref(), currency, requests)
            .await
            .map_err(|(request, e)| SyncError::connector(request, e))?;
        let lists = results
            .into_iter()
            .map(|(request, value)| block_numbers(request, value))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(merge_heights(lists, past(cursor)))
    }

    /// One ranged request covering `min..=max` of `numbers`, keeping only the
    /// requested heights.
    async fn fetch_blocks(
        &self,
        currency: &str,
        numbers: &[u64],
    ) -> Result<Vec<BlockDocument>, SyncError> {
        let wanted: BTreeSet<u64> = numbers.iter().copied().collect();
        let (Some(&from), Some(&to)) = (wanted.first(), wanted.last()) else {
            return Ok(Vec::new());
        };
        let count = (to - from)
            .checked_add(1)
            .ok_or(SyncError::InvalidRange { from, to })?;
        let request = Request::Blocks { count, from };
        debug!(
            "SYNC - {currency} fetching {} blocks in range {from}..={to}",
            wanted.len()
        );

        let value = self.fetch(currency, request).await?;
        let entries: Vec<Value> =
            serde_json::from_value(value).map_err(|e| SyncError::invalid_response(request, e))?;

        let mut found = BTreeSet::new();
        let mut documents = Vec::with_capacity(wanted.len());
        for entry in entries {
            let Some(number) = entry.get("number").and_then(Value::as_u64) else {
                return Err(SyncError::invalid_response(request, "block without number"));
            };
            if wanted.contains(&number) && found.insert(number) {
                documents.push(parse_block(request, entry)?);
            }
        }

        let missing: Vec<u64> = wanted.difference(&found).copied().collect();
        if !missing.is_empty() {
            return Err(SyncError::MissingBlocks(missing));
        }
        documents.sort_by_key(|b| b.number);
        Ok(documents)
    }
}

/// Height filter for "strictly after the cursor". An empty cursor has seen
/// nothing, not even block zero.
fn past(cursor: &BlockUid) -> Option<u64> {
    (!cursor.is_empty()).then_some(cursor.number)
}

fn parse_block(request: Request, value: Value) -> Result<BlockDocument, SyncError> {
    let remote: RemoteBlock =
        serde_json::from_value(value).map_err(|e| SyncError::invalid_response(request, e))?;
    Ok(remote.into_document()?)
}

fn block_numbers(request: Request, value: Value) -> Result<Vec<u64>, SyncError> {
    let with: WithBlocks =
        serde_json::from_value(value).map_err(|e| SyncError::invalid_response(request, e))?;
    Ok(with.result.blocks)
}

/// Union of height lists, sorted ascending without duplicates, keeping only
/// heights strictly above `after` when given.
fn merge_heights(lists: impl IntoIterator<Item = Vec<u64>>, after: Option<u64>) -> Vec<u64> {
    lists
        .into_iter()
        .flatten()
        .filter(|&n| after.is_none_or(|a| n > a))
        .collect::<BTreeSet<u64>>()
        .into_iter()
        .collect()
}
