//! Test-only fixtures: a programmable in-memory transport and a set of
//! signing agents that render wire responses.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicUsize, Ordering},
};

use quorum_fetch_crypto::{secp256k1::SecretKey, ByteFmt as _, TextFmt};
use rand::Rng;
use zksync_concurrency::{ctx, time};

use crate::{client::Config, transport::Transport};

/// Scripted behavior of a [`TestTransport`] for one URL.
#[derive(Debug, Clone)]
pub enum Response {
    /// Respond immediately with the given body.
    Body(Vec<u8>),
    /// Respond with the given body after a delay.
    Delayed(time::Duration, Vec<u8>),
    /// Fail the attempt with the given message.
    Error(String),
    /// Never respond; the attempt terminates only through cancellation.
    Hang,
}

/// In-memory [`Transport`] with a scripted response per URL.
/// Counts started attempts, so tests can assert on concurrency behavior.
#[derive(Debug, Default)]
pub struct TestTransport {
    responses: HashMap<String, Response>,
    started: AtomicUsize,
}

impl TestTransport {
    /// Constructs a transport with no scripted responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the response for one URL.
    pub fn with(mut self, url: impl Into<String>, response: Response) -> Self {
        self.responses.insert(url.into(), response);
        self
    }

    /// Number of attempts started so far, including unfinished ones.
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Transport for TestTransport {
    async fn get(&self, ctx: &ctx::Ctx, url: &str) -> ctx::Result<Vec<u8>> {
        self.started.fetch_add(1, Ordering::SeqCst);
        match self.responses.get(url) {
            None => Err(anyhow::format_err!("no response scripted for {url}").into()),
            Some(Response::Body(body)) => Ok(body.clone()),
            Some(Response::Delayed(delay, body)) => {
                ctx.sleep(*delay).await?;
                Ok(body.clone())
            }
            Some(Response::Error(msg)) => Err(anyhow::format_err!("{msg}").into()),
            Some(Response::Hang) => {
                ctx.canceled().await;
                Err(ctx::Canceled.into())
            }
        }
    }
}

/// A set of test agents, one secret key and one URL each, all republishing
/// the same record.
#[derive(Debug)]
pub struct AgentSet {
    /// The agents' signing keys.
    pub keys: Vec<SecretKey>,
    /// The agents' endpoints.
    pub urls: Vec<String>,
}

impl AgentSet {
    /// Generates `n` agents with random keys.
    pub fn new(rng: &mut impl Rng, n: usize) -> Self {
        Self {
            keys: (0..n).map(|_| rng.gen()).collect(),
            urls: (0..n).map(|i| format!("http://host{i}.com")).collect(),
        }
    }

    /// The agents' signer addresses in text form, parallel to `urls`.
    pub fn signers(&self) -> Vec<String> {
        self.keys.iter().map(|k| TextFmt::encode(&k.address())).collect()
    }

    /// Client configuration covering all agents.
    pub fn config(&self) -> Config {
        Config::new(self.urls.clone(), self.signers())
    }

    /// Renders the wire response body: `payload` signed by every agent key.
    pub fn envelope_json(&self, payload: &str) -> Vec<u8> {
        let signatures: serde_json::Map<String, serde_json::Value> = self
            .keys
            .iter()
            .map(|key| {
                let sig = key.sign_payload(payload.as_bytes()).unwrap();
                (
                    TextFmt::encode(&key.address()),
                    hex::encode(sig.encode()).into(),
                )
            })
            .collect();
        serde_json::to_vec(&serde_json::json!({
            "payload": payload,
            "signatures": signatures,
        }))
        .unwrap()
    }

    /// Transport where every agent responds immediately with `payload`,
    /// fully signed.
    pub fn unanimous_transport(&self, payload: &str) -> TestTransport {
        let body = self.envelope_json(payload);
        self.urls.iter().fold(TestTransport::new(), |t, url| {
            t.with(url.clone(), Response::Body(body.clone()))
        })
    }
}
