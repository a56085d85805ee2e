//! Bounded-concurrency fetch engine. A fixed number of workers drain a
//! shared queue of sources, one attempt per source, and record a terminal
//! outcome for every source. No error escapes a worker: transport failures
//! and cancellations are captured as outcomes.

use std::{
    collections::{BTreeMap, VecDeque},
    sync::Mutex,
};

use anyhow::Context as _;
use zksync_concurrency::{ctx, scope};

use crate::transport::Transport;

/// Decoded body of a successful fetch: an opaque payload string (itself a
/// JSON-encoded record) and a map from signer address to the hex-encoded
/// recoverable signature over that payload.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct Envelope {
    /// The republished record, as the exact string the agents signed.
    pub payload: String,
    /// Signer address (`0x…` hex, any capitalization) to signature
    /// (hex, no `0x` prefix, 65 bytes `r||s||v`).
    pub signatures: BTreeMap<String, String>,
}

/// Why a single source's fetch attempt did not produce an envelope.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The attempt failed: connection error, non-2xx status or an
    /// undecodable body.
    #[error("transport: {0:#}")]
    Transport(#[source] anyhow::Error),
    /// The attempt was interrupted, or never started, because the fetch
    /// cycle stopped early.
    #[error("canceled before completion")]
    Canceled,
}

/// Terminal result of one source's fetch attempt. Produced exactly once per
/// source per fetch cycle.
pub type FetchOutcome = Result<Envelope, FetchError>;

/// The fetch engine configuration: a transport, a concurrency budget and a
/// stop condition.
#[derive(Debug)]
pub(crate) struct FetchPool<'a> {
    /// Transport performing the individual attempts.
    pub(crate) transport: &'a dyn Transport,
    /// Maximum number of attempts in flight; 0 means one worker per source.
    pub(crate) concurrency: usize,
    /// Stop issuing new attempts once one source has succeeded.
    pub(crate) stop_on_success: bool,
}

impl FetchPool<'_> {
    /// Fetches from every source, with at most the configured number of
    /// attempts in flight. Returns one outcome per source, indexed like
    /// `sources` (duplicate URLs are independent sources).
    ///
    /// Outcomes are recorded in completion order internally; once the stop
    /// condition fires, the remaining queue is drained as [`FetchError::Canceled`]
    /// and in-flight attempts are interrupted, their terminal outcome still
    /// recorded. Does not return until every spawned worker has terminated,
    /// so no fetch task outlives this call.
    pub(crate) async fn run(
        &self,
        ctx: &ctx::Ctx,
        sources: &[String],
    ) -> ctx::OrCanceled<Vec<FetchOutcome>> {
        let n = sources.len();
        let workers = match self.concurrency {
            0 => n,
            k => k.min(n),
        };
        let queue = Mutex::new((0..n).collect::<VecDeque<usize>>());
        let slots = Mutex::new((0..n).map(|_| None).collect::<Vec<Option<FetchOutcome>>>());
        let (done_send, mut done_recv) = ctx::channel::unbounded();

        scope::run!(ctx, |ctx, s| async {
            for _ in 0..workers {
                s.spawn(async {
                    self.worker(ctx, sources, &queue, &slots, &done_send).await;
                    Ok(())
                });
            }
            let mut received = 0;
            while received < n {
                let (_, ok) = done_recv.recv(ctx).await?;
                received += 1;
                if ok && self.stop_on_success {
                    // One good response is enough: stop handing out work and
                    // interrupt the attempts still in flight. Workers record
                    // the remaining sources as canceled before terminating.
                    s.cancel();
                    break;
                }
            }
            Ok(())
        })
        .await?;

        // Workers only terminate once the queue is empty, so by now every
        // slot holds an outcome.
        let slots = slots.into_inner().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(slots
            .into_iter()
            .map(|slot| slot.unwrap_or(Err(FetchError::Canceled)))
            .collect())
    }

    /// Pulls source indices off the queue until it is empty, recording one
    /// outcome per index. Never fails: cancellation is an outcome too.
    async fn worker(
        &self,
        ctx: &ctx::Ctx,
        sources: &[String],
        queue: &Mutex<VecDeque<usize>>,
        slots: &Mutex<Vec<Option<FetchOutcome>>>,
        done: &ctx::channel::UnboundedSender<(usize, bool)>,
    ) {
        loop {
            let next = queue
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .pop_front();
            let Some(i) = next else { return };
            let url = &sources[i];
            let outcome = if ctx.is_active() {
                match self.attempt(ctx, url).await {
                    Ok(envelope) => Ok(envelope),
                    Err(ctx::Error::Canceled(_)) => Err(FetchError::Canceled),
                    Err(ctx::Error::Internal(err)) => {
                        tracing::debug!("fetch attempt for {url} failed: {err:#}");
                        Err(FetchError::Transport(err))
                    }
                }
            } else {
                // Stop signal raised before this source was attempted.
                Err(FetchError::Canceled)
            };
            let ok = outcome.is_ok();
            slots
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)[i] = Some(outcome);
            // The outcome is already recorded; if the aggregator is gone the
            // notification is irrelevant.
            done.send((i, ok));
        }
    }

    /// One fetch attempt: GET the source and decode the envelope.
    async fn attempt(&self, ctx: &ctx::Ctx, url: &str) -> ctx::Result<Envelope> {
        let body = self.transport.get(ctx, url).await?;
        Ok(serde_json::from_slice(&body).context("malformed response body")?)
    }
}
