//! Test doubles shared by the unit tests: signed block fixtures and a
//! scripted connector standing in for the node API.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::{Notify, watch};

use crate::connector::{Connector, ConnectorError, NO_CURRENT_BLOCK, Request};
use crate::document::{BlockDocument, RemoteBlock, sha256_upper_hex};

pub const TEST_CURRENCY: &str = "g1-test";

const G1_PARAMETERS: &str = "0.0488:86400:1000:432000:100:5259600:63115200:5:5259600:5259600:0.8:31557600:5:24:300:12:0.67:1488970800:1490094000:15778800";

/// Builder for a well-formed signed block.
#[derive(Debug, Clone)]
pub struct BlockFixture {
    number: u64,
    median_time: u64,
    dividend: Option<(u64, u32)>,
    members: u64,
    mass: u64,
    parameters: bool,
    joiners: Vec<String>,
    transactions: Vec<String>,
}

impl BlockFixture {
    pub fn new(number: u64) -> Self {
        Self {
            number,
            median_time: 1_000 + number * 300,
            dividend: None,
            members: 0,
            mass: 0,
            parameters: false,
            joiners: Vec::new(),
            transactions: Vec::new(),
        }
    }

    pub fn dividend(mut self, amount: u64, base: u32) -> Self {
        self.dividend = Some((amount, base));
        self
    }

    pub fn members(mut self, count: u64) -> Self {
        self.members = count;
        self
    }

    pub fn mass(mut self, mass: u64) -> Self {
        self.mass = mass;
        self
    }

    pub fn median_time(mut self, time: u64) -> Self {
        self.median_time = time;
        self
    }

    pub fn with_parameters(mut self) -> Self {
        self.parameters = true;
        self
    }

    pub fn joiner(mut self, line: &str) -> Self {
        self.joiners.push(line.to_string());
        self
    }

    pub fn transaction(mut self, line: &str) -> Self {
        self.transactions.push(line.to_string());
        self
    }

    fn nonce(&self) -> u64 {
        10_000 + self.number
    }

    pub fn signature(&self) -> String {
        base64::encode([(self.number % 251) as u8; 64])
    }

    fn body(&self) -> String {
        let mut body = String::new();
        body.push_str("Version: 10\nType: Block\n");
        body.push_str(&format!("Currency: {TEST_CURRENCY}\n"));
        body.push_str(&format!("Number: {}\n", self.number));
        body.push_str("PoWMin: 70\n");
        body.push_str(&format!("Time: {}\n", self.median_time + 60));
        body.push_str(&format!("MedianTime: {}\n", self.median_time));
        let unit_base = match self.dividend {
            Some((amount, base)) => {
                body.push_str(&format!("UniversalDividend: {amount}\n"));
                base
            }
            None => 0,
        };
        body.push_str(&format!("UnitBase: {unit_base}\n"));
        body.push_str("Issuer: 2ny7YAdmzReQxAayyJZsyVYwYhVyax2thKcGknmQy5nQ\n");
        body.push_str("IssuersFrame: 100\nIssuersFrameVar: 0\nDifferentIssuersCount: 3\n");
        if self.number > 0 {
            let previous = sha256_upper_hex(&format!("block-{}", self.number - 1));
            body.push_str(&format!("PreviousHash: {previous}\n"));
            body.push_str("PreviousIssuer: 2ny7YAdmzReQxAayyJZsyVYwYhVyax2thKcGknmQy5nQ\n");
        }
        if self.parameters {
            body.push_str(&format!("Parameters: {G1_PARAMETERS}\n"));
        }
        body.push_str(&format!("MembersCount: {}\n", self.members));
        body.push_str("Identities:\nJoiners:\n");
        for line in &self.joiners {
            body.push_str(line);
            body.push('\n');
        }
        body.push_str("Actives:\nLeavers:\nRevoked:\nExcluded:\nCertifications:\nTransactions:\n");
        for line in &self.transactions {
            body.push_str(line);
            body.push('\n');
        }
        body
    }

    fn inner_hash(&self) -> String {
        sha256_upper_hex(&self.body())
    }

    /// Raw document without its signature.
    pub fn raw(&self) -> String {
        format!(
            "{}InnerHash: {}\nNonce: {}\n",
            self.body(),
            self.inner_hash(),
            self.nonce()
        )
    }

    pub fn signed_raw(&self) -> String {
        format!("{}{}\n", self.raw(), self.signature())
    }

    pub fn hash(&self) -> String {
        BlockDocument::compute_hash(&self.inner_hash(), self.nonce(), &self.signature())
    }

    /// The block as the node's JSON API serves it.
    pub fn json(&self) -> Value {
        json!({
            "version": 10,
            "number": self.number,
            "hash": self.hash(),
            "medianTime": self.median_time,
            "membersCount": self.members,
            "monetaryMass": self.mass,
            "dividend": self.dividend.map(|(amount, _)| amount),
            "unitbase": self.dividend.map(|(_, base)| base).unwrap_or(0),
            "raw": self.raw(),
            "signature": self.signature(),
        })
    }

    pub fn remote(&self) -> RemoteBlock {
        serde_json::from_value(self.json()).expect("fixture json")
    }

    pub fn document(&self) -> BlockDocument {
        self.remote().into_document().expect("fixture document")
    }
}

pub fn no_current_block() -> ConnectorError {
    ConnectorError::Remote {
        code: NO_CURRENT_BLOCK,
        message: "No current block".into(),
    }
}

/// In-memory [`Connector`] answering from a script and recording calls.
///
/// A `Blocks` range that was not scripted is assembled from the scripted
/// single `Block` answers, the way a node would serve it.
#[derive(Default)]
pub struct ScriptedConnector {
    responses: Mutex<HashMap<Request, Result<Value, ConnectorError>>>,
    calls: Mutex<Vec<Request>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, request: Request, value: Value) -> Self {
        self.set(request, Ok(value));
        self
    }

    pub fn fail(self, request: Request, err: ConnectorError) -> Self {
        self.set(request, Err(err));
        self
    }

    pub fn heights(self, request: Request, heights: &[u64]) -> Self {
        self.set_heights(request, heights);
        self
    }

    pub fn current(self, block: &BlockFixture) -> Self {
        self.set(Request::Current, Ok(block.json()));
        self
    }

    pub fn block(self, block: &BlockFixture) -> Self {
        self.set_block(block);
        self
    }

    /// Chain with no block at all.
    pub fn empty_chain() -> Self {
        Self::new()
            .fail(Request::Current, no_current_block())
            .fail(Request::Parameters, no_current_block())
            .heights(Request::Ud, &[])
    }

    pub fn set(&self, request: Request, response: Result<Value, ConnectorError>) {
        self.responses
            .lock()
            .expect("mutex poisoned")
            .insert(request, response);
    }

    pub fn set_heights(&self, request: Request, heights: &[u64]) {
        self.set(request, Ok(json!({ "result": { "blocks": heights } })));
    }

    pub fn set_block(&self, block: &BlockFixture) {
        let number = block.json()["number"].as_u64().expect("fixture number");
        self.set(Request::Block { number }, Ok(block.json()));
    }

    pub fn calls(&self) -> Vec<Request> {
        self.calls.lock().expect("mutex poisoned").clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("mutex poisoned").len()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn get(&self, currency: &str, request: Request) -> Result<Value, ConnectorError> {
        self.calls.lock().expect("mutex poisoned").push(request);
        let responses = self.responses.lock().expect("mutex poisoned");
        if let Some(response) = responses.get(&request) {
            return response.clone();
        }
        if let Request::Blocks { count, from } = request {
            let blocks: Vec<Value> = (from..from + count)
                .filter_map(|number| match responses.get(&Request::Block { number }) {
                    Some(Ok(block)) => Some(block.clone()),
                    _ => None,
                })
                .collect();
            return Ok(Value::Array(blocks));
        }
        Err(ConnectorError::EndpointUnavailable {
            currency: currency.to_string(),
        })
    }
}

/// Connector that holds every `gated` request until [`GatedConnector::open`]
/// is called, then answers from the wrapped script.
pub struct GatedConnector {
    pub script: ScriptedConnector,
    gated: Request,
    reached: Notify,
    open: watch::Sender<bool>,
}

impl GatedConnector {
    pub fn new(script: ScriptedConnector, gated: Request) -> Self {
        Self {
            script,
            gated,
            reached: Notify::new(),
            open: watch::channel(false).0,
        }
    }

    /// Resolves once a gated request has arrived.
    pub async fn reached(&self) {
        self.reached.notified().await;
    }

    pub fn open(&self) {
        self.open.send_replace(true);
    }
}

#[async_trait]
impl Connector for GatedConnector {
    async fn get(&self, currency: &str, request: Request) -> Result<Value, ConnectorError> {
        if request == self.gated {
            self.reached.notify_one();
            let mut open = self.open.subscribe();
            let _ = open.wait_for(|open| *open).await;
        }
        self.script.get(currency, request).await
    }
}
