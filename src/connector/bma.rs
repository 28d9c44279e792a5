use async_trait::async_trait;
use log::{debug, warn};
use rand::seq::SliceRandom;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::{Connector, ConnectorError, Request};

/// Error body of a node that rejects a request.
#[derive(Debug, Deserialize)]
struct RemoteErrorBody {
    ucode: u32,
    message: String,
}

/// Outcome of one request against one endpoint.
#[derive(Debug, PartialEq)]
enum Attempt {
    Answered(Value),
    Rejected(ConnectorError),
    Failed(String),
}

/// HTTP connector over the BMA API of the configured nodes.
pub struct BmaConnector {
    client: Client,
    endpoints: HashMap<String, Vec<String>>,
}

impl BmaConnector {
    /// `endpoints` maps a currency to node base URLs. Each request attempt
    /// against a single endpoint is bounded by `timeout`.
    pub fn new(
        endpoints: HashMap<String, Vec<String>>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoints })
    }

    /// Endpoints of `currency`, in random order so load spreads across nodes.
    fn shuffled_endpoints(&self, currency: &str) -> Vec<&str> {
        let mut endpoints: Vec<&str> = self
            .endpoints
            .get(currency)
            .map(|urls| urls.iter().map(String::as_str).collect())
            .unwrap_or_default();
        endpoints.shuffle(&mut rand::thread_rng());
        endpoints
    }

    async fn try_endpoint(&self, base: &str, request: Request) -> Attempt {
        let url = format!("{}{}", base.trim_end_matches('/'), request.path());
        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => return Attempt::Failed(e.to_string()),
        };
        let status = response.status().as_u16();
        match response.text().await {
            Ok(body) => interpret_response(status, &body),
            Err(e) => Attempt::Failed(e.to_string()),
        }
    }
}

#[async_trait]
impl Connector for BmaConnector {
    async fn get(&self, currency: &str, request: Request) -> Result<Value, ConnectorError> {
        let endpoints = self.shuffled_endpoints(currency);
        if endpoints.is_empty() {
            warn!("BMA - no endpoint configured for currency {currency}");
        }

        for base in endpoints {
            let t0 = Instant::now();
            match self.try_endpoint(base, request).await {
                Attempt::Answered(value) => {
                    debug!(
                        "BMA - {currency} {} from {base} OK ({} ms)",
                        request.path(),
                        t0.elapsed().as_millis()
                    );
                    return Ok(value);
                }
                Attempt::Rejected(err) => {
                    debug!("BMA - {currency} {} rejected by {base}: {err}", request.path());
                    return Err(err);
                }
                Attempt::Failed(reason) => {
                    warn!(
                        "BMA - {currency} {} failed on {base}: {reason}",
                        request.path()
                    );
                }
            }
        }

        Err(ConnectorError::EndpointUnavailable {
            currency: currency.to_string(),
        })
    }
}

/// Map a node answer to an attempt outcome. Domain errors carry a `ucode`
/// body; anything else that is not a successful JSON answer lets the caller
/// move on to the next endpoint.
fn interpret_response(status: u16, body: &str) -> Attempt {
    if (200..300).contains(&status) {
        return match serde_json::from_str::<Value>(body) {
            Ok(value) => Attempt::Answered(value),
            Err(e) => Attempt::Failed(format!("invalid JSON body: {e}")),
        };
    }
    match serde_json::from_str::<RemoteErrorBody>(body) {
        Ok(err) => Attempt::Rejected(ConnectorError::Remote {
            code: err.ucode,
            message: err.message,
        }),
        Err(_) => Attempt::Failed(format!("HTTP {status}")),
    }
}
