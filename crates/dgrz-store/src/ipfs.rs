use std::thread;
use std::time::Duration;

use dgrz_types::{CancelToken, Cid, DgrzError, DgrzResult, ErrorKind};
use rand::Rng;
use reqwest::blocking::{multipart, Client};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::traits::ObjectStore;

/// Connection settings for an IPFS node's HTTP API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpfsConfig {
    /// Base URL of the API, e.g. `http://127.0.0.1:5001`.
    pub api: String,
    /// Connect and request timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Extra attempts after the first one fails with a transport error.
    pub max_retries: u32,
    /// Initial backoff in milliseconds; doubled on every retry.
    pub backoff_ms: u64,
}

impl Default for IpfsConfig {
    fn default() -> Self {
        Self {
            api: "http://127.0.0.1:5001".to_string(),
            connect_timeout_secs: 5,
            max_retries: 3,
            backoff_ms: 200,
        }
    }
}

impl IpfsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Delay before retry number `attempt` (0-based), with up to 50% jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self.backoff_ms.saturating_mul(1u64 << attempt.min(16));
        let jitter = if base > 1 {
            rand::thread_rng().gen_range(0..=base / 2)
        } else {
            0
        };
        Duration::from_millis(base + jitter)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/v0/{}", self.api.trim_end_matches('/'), path)
    }
}

/// Object store backed by the `dag/put` and `dag/get` endpoints of an IPFS
/// node. Values are stored and read back as dag-json and pinned on write.
pub struct IpfsHttpStore {
    config: IpfsConfig,
    client: Client,
}

impl IpfsHttpStore {
    pub fn new(config: IpfsConfig) -> DgrzResult<Self> {
        let client = Client::builder()
            .connect_timeout(config.timeout())
            .timeout(config.timeout())
            .build()
            .map_err(|e| DgrzError::external("failed to build HTTP client").with_source(e))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &IpfsConfig {
        &self.config
    }

    /// Run `attempt` until it succeeds, fails permanently, or retries run out.
    fn with_retries<T>(
        &self,
        op: &str,
        cancel: &CancelToken,
        mut attempt: impl FnMut() -> DgrzResult<T>,
    ) -> DgrzResult<T> {
        let mut tries = 0;
        loop {
            cancel.check()?;
            match attempt() {
                Ok(v) => return Ok(v),
                Err(e) if e.is(ErrorKind::TryAgain) && tries < self.config.max_retries => {
                    let delay = self.config.backoff(tries);
                    warn!(op, attempt = tries + 1, ?delay, error = %e, "IPFS request failed, retrying");
                    thread::sleep(delay);
                    tries += 1;
                }
                Err(e) if e.is(ErrorKind::TryAgain) => {
                    return Err(DgrzError::external(format!("IPFS {op} failed after retries"))
                        .with_context("api", &self.config.api)
                        .with_context("attempts", tries + 1)
                        .with_source(e));
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn dag_put_once(&self, data: &[u8]) -> DgrzResult<Cid> {
        let form = multipart::Form::new()
            .part("file", multipart::Part::bytes(data.to_vec()).file_name("object.json"));
        let url = self.config.endpoint("dag/put");
        let resp = self
            .client
            .post(&url)
            .query(&[
                ("store-codec", "dag-json"),
                ("input-codec", "dag-json"),
                ("pin", "true"),
            ])
            .multipart(form)
            .send()
            .map_err(classify_transport)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(DgrzError::external("IPFS dag/put rejected the object")
                .with_context("status", status)
                .with_context("body", body.trim()));
        }
        let body: Value = resp.json().map_err(classify_transport)?;
        parse_put_response(&body)
    }

    fn dag_get_once(&self, cid: &Cid) -> DgrzResult<Option<Value>> {
        let url = self.config.endpoint("dag/get");
        let resp = self
            .client
            .post(&url)
            .query(&[("arg", cid.as_str()), ("output-codec", "dag-json")])
            .send()
            .map_err(classify_transport)?;

        let status = resp.status();
        let body = resp.bytes().map_err(classify_transport)?;
        if status.is_success() {
            return Ok(Some(serde_json::from_slice(&body)?));
        }
        let text = String::from_utf8_lossy(&body);
        if text.contains("not found") {
            return Ok(None);
        }
        Err(DgrzError::external("IPFS dag/get failed")
            .with_context("status", status)
            .with_context("cid", cid))
    }
}

impl ObjectStore for IpfsHttpStore {
    fn put(&self, value: &Value, cancel: &CancelToken) -> DgrzResult<Cid> {
        let data = serde_json::to_vec(value)?;
        let cid = self.with_retries("dag/put", cancel, || self.dag_put_once(&data))?;
        debug!(cid = %cid, bytes = data.len(), "object stored in IPFS");
        Ok(cid)
    }

    fn get(&self, cid: &Cid, cancel: &CancelToken) -> DgrzResult<Option<Value>> {
        self.with_retries("dag/get", cancel, || self.dag_get_once(cid))
    }

    fn backend_name(&self) -> &'static str {
        "ipfs"
    }
}

impl std::fmt::Debug for IpfsHttpStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpfsHttpStore").field("api", &self.config.api).finish()
    }
}

/// Connection failures and timeouts are transient; anything else is not.
fn classify_transport(e: reqwest::Error) -> DgrzError {
    if e.is_connect() || e.is_timeout() {
        DgrzError::try_again("IPFS node unreachable").with_source(e)
    } else {
        DgrzError::external("IPFS request failed").with_source(e)
    }
}

/// Extract the CID from a `dag/put` reply of the form `{"Cid": {"/": "..."}}`.
fn parse_put_response(body: &Value) -> DgrzResult<Cid> {
    let cid = body
        .get("Cid")
        .and_then(|c| c.get("/"))
        .and_then(Value::as_str)
        .ok_or_else(|| {
            DgrzError::unexpected_value("IPFS dag/put reply has no CID").with_context("reply", body)
        })?;
    Cid::parse(cid)
}
