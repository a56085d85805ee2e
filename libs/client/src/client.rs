//! Client orchestration: run the configured strategy over the configured
//! sources, hand the outcomes to quorum verification, decode the record.

use std::sync::Arc;

use quorum_fetch_crypto::{secp256k1::Address, Text};
use zksync_concurrency::ctx;

use crate::{
    quorum::{self, FailurePolicy, VerifiedRecord},
    strategy::FetchStrategy,
    transport::{HttpTransport, Transport},
};

/// Configuration of a [`Client`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Source URLs republishing the record. One fetch attempt per entry and
    /// cycle; duplicates are independent sources.
    pub urls: Vec<String>,
    /// Addresses of the required signers, `0x…` hex of any capitalization.
    /// Must have the same length as `urls`.
    pub signers: Vec<String>,
    /// Maximum number of concurrent fetch attempts; 0 means one per source.
    pub concurrency: usize,
    /// Stop issuing attempts once one source delivers a good response.
    pub stop_on_first_success: bool,
    /// What to do with failed sources at verification time.
    pub failure_policy: FailurePolicy,
}

impl Config {
    /// Configuration with the default scheduling: two concurrent attempts,
    /// run to completion.
    pub fn new(urls: Vec<String>, signers: Vec<String>) -> Self {
        Self {
            urls,
            signers,
            concurrency: 2,
            stop_on_first_success: false,
            failure_policy: FailurePolicy::default(),
        }
    }

    /// Preset that fetches from all sources at once and returns as soon as
    /// one of them delivers a good response.
    pub fn first_success(urls: Vec<String>, signers: Vec<String>) -> Self {
        Self {
            concurrency: 0,
            stop_on_first_success: true,
            ..Self::new(urls, signers)
        }
    }
}

/// Errors of a [`Client`] construction or fetch cycle.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed construction inputs. Surfaced before any network activity.
    #[error("configuration: {0:#}")]
    Config(#[source] anyhow::Error),
    /// The fetched outcome set was rejected by quorum verification.
    #[error(transparent)]
    Verify(#[from] quorum::Error),
    /// The fetch cycle as a whole was interrupted or failed internally.
    #[error(transparent)]
    Internal(#[from] ctx::Error),
}

/// Long-lived client for a fixed set of sources and required signers.
/// Reusable across fetch cycles; all per-cycle state is created fresh in
/// [`Client::fetch`] and discarded at its end.
#[derive(Debug)]
pub struct Client {
    urls: Vec<String>,
    signers: Vec<Address>,
    strategy: FetchStrategy,
    failure_policy: FailurePolicy,
    transport: Arc<dyn Transport>,
}

impl Client {
    /// Constructs a client with the default HTTP transport.
    pub fn new(config: Config) -> Result<Self, Error> {
        let transport = HttpTransport::new().map_err(Error::Config)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Constructs a client over the given transport. Validates and
    /// normalizes the configuration: the URL and signer counts must match,
    /// at least one source is required, and every signer must parse as an
    /// address (addresses are normalized here, making all later comparisons
    /// case-insensitive).
    pub fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Result<Self, Error> {
        if config.urls.len() != config.signers.len() {
            return Err(Error::Config(anyhow::format_err!(
                "got {} urls and {} signers, the counts must match",
                config.urls.len(),
                config.signers.len()
            )));
        }
        if config.urls.is_empty() {
            return Err(Error::Config(anyhow::format_err!(
                "at least one source url is required"
            )));
        }
        let signers = config
            .signers
            .iter()
            .map(|s| {
                Text::new(s)
                    .decode::<Address>()
                    .map_err(|err| Error::Config(err.context(format!("signer {s:?}"))))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            urls: config.urls,
            signers,
            strategy: FetchStrategy::Bounded {
                concurrency: config.concurrency,
                stop_on_first_success: config.stop_on_first_success,
            },
            failure_policy: config.failure_policy,
            transport,
        })
    }

    /// Runs one fetch cycle: fetch from every source per the configured
    /// strategy, verify the quorum, decode and return the agreed record.
    ///
    /// Per-source failures are not fatal by themselves; they surface, if at
    /// all, as an [`Error::Verify`]. There are no automatic retries: a
    /// caller that wants retries calls `fetch` again.
    pub async fn fetch(&self, ctx: &ctx::Ctx) -> Result<VerifiedRecord, Error> {
        let outcomes = self
            .strategy
            .fetch(ctx, &*self.transport, &self.urls)
            .await
            .map_err(ctx::Error::from)?;
        let record = quorum::verify(outcomes, &self.signers, self.failure_policy)?;
        tracing::debug!(
            sources = self.urls.len(),
            signers = self.signers.len(),
            "accepted quorum record"
        );
        Ok(record)
    }

    /// Blocking variant of [`Client::fetch`] for callers without an async
    /// runtime of their own: owns a private single-threaded runtime and a
    /// root context for the duration of the call.
    pub fn fetch_blocking(&self) -> Result<VerifiedRecord, Error> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| ctx::Error::Internal(err.into()))?;
        runtime.block_on(async {
            let ctx = ctx::root();
            self.fetch(&ctx).await
        })
    }
}
