//! Scheduling policies for a fetch cycle. All of them are configurations of
//! the same engine ([`FetchPool`]): a concurrency budget plus a stop
//! condition, rather than separate implementations.

use zksync_concurrency::ctx;

use crate::{
    pool::{FetchOutcome, FetchPool},
    transport::Transport,
};

/// How a fetch cycle schedules its per-source attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStrategy {
    /// One attempt at a time, in source order, run to completion.
    Sequential,
    /// One concurrent attempt per source, run to completion.
    AllParallel,
    /// One concurrent attempt per source, stopping as soon as one source
    /// delivers a good response.
    FirstSuccess,
    /// At most `concurrency` attempts in flight (0 meaning one per source),
    /// optionally stopping once one source succeeds.
    Bounded {
        /// Maximum number of attempts in flight.
        concurrency: usize,
        /// Stop issuing attempts after the first success.
        stop_on_first_success: bool,
    },
}

/// Terminal outcome of one source in a fetch cycle.
#[derive(Debug)]
pub struct SourceOutcome {
    /// URL the source is reachable at. Also its identity within the cycle.
    pub url: String,
    /// What the attempt produced.
    pub outcome: FetchOutcome,
}

impl FetchStrategy {
    fn concurrency(&self) -> usize {
        match self {
            Self::Sequential => 1,
            Self::AllParallel | Self::FirstSuccess => 0,
            Self::Bounded { concurrency, .. } => *concurrency,
        }
    }

    fn stop_on_first_success(&self) -> bool {
        match self {
            Self::Sequential | Self::AllParallel => false,
            Self::FirstSuccess => true,
            Self::Bounded {
                stop_on_first_success,
                ..
            } => *stop_on_first_success,
        }
    }

    /// Runs one fetch cycle over `sources`.
    ///
    /// Every source gets exactly one outcome; sources never attempted or
    /// interrupted by an early stop appear as [`crate::FetchError::Canceled`],
    /// not omitted. If this strategy stops early and at least one success was
    /// recorded, only the successes are returned (the rest is discardable);
    /// with no success the full outcome set is returned so that the caller
    /// can diagnose the total failure.
    pub async fn fetch(
        &self,
        ctx: &ctx::Ctx,
        transport: &dyn Transport,
        sources: &[String],
    ) -> ctx::OrCanceled<Vec<SourceOutcome>> {
        let pool = FetchPool {
            transport,
            concurrency: self.concurrency(),
            stop_on_success: self.stop_on_first_success(),
        };
        let outcomes = pool.run(ctx, sources).await?;
        let mut set: Vec<SourceOutcome> = sources
            .iter()
            .zip(outcomes)
            .map(|(url, outcome)| SourceOutcome {
                url: url.clone(),
                outcome,
            })
            .collect();
        if self.stop_on_first_success() && set.iter().any(|s| s.outcome.is_ok()) {
            set.retain(|s| s.outcome.is_ok());
        }
        Ok(set)
    }
}
