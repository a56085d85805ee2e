//! Boundary to the HTTP stack. The fetch engine only requires "issue one
//! GET, get back the body bytes or an error"; connection pooling, TLS and
//! socket-level concerns live behind this trait.

use anyhow::Context as _;
use zksync_concurrency::ctx;

/// A transport capable of performing one fetch attempt against a URL.
#[async_trait::async_trait]
pub trait Transport: std::fmt::Debug + Send + Sync {
    /// Performs a single GET request and returns the raw response body.
    ///
    /// Exactly one attempt is made per call: retries, if any, are the
    /// caller's business. Cancellation of `ctx` aborts the attempt with
    /// [`ctx::Canceled`]; every other failure (connection error, non-2xx
    /// status, body read error) is reported as [`ctx::Error::Internal`].
    async fn get(&self, ctx: &ctx::Ctx, url: &str) -> ctx::Result<Vec<u8>>;
}

/// Default [`Transport`] backed by a shared `reqwest` client.
///
/// Imposes no timeouts of its own; deadlines, if needed, come from the
/// caller's context.
#[derive(Debug, Clone)]
pub struct HttpTransport(reqwest::Client);

impl HttpTransport {
    /// Constructs the transport with default `reqwest` settings.
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("building http client")?;
        Ok(Self(client))
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn get(&self, ctx: &ctx::Ctx, url: &str) -> ctx::Result<Vec<u8>> {
        let resp = ctx
            .wait(self.0.get(url).send())
            .await?
            .with_context(|| format!("GET {url}"))?;
        let resp = resp.error_for_status().context("bad response status")?;
        let body = ctx.wait(resp.bytes()).await?.context("reading body")?;
        Ok(body.to_vec())
    }
}
