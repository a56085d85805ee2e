//! Client fetching a single logical record that is independently republished
//! by several redundant agents, each reachable at its own URL. The record is
//! accepted only if every required signer produced a valid recoverable ECDSA
//! signature over a byte-identical payload.
//!
//! The fetch side is a bounded-concurrency worker pool with cooperative
//! cancellation (see [`FetchStrategy`] for the scheduling policies); the
//! acceptance side is a single atomic quorum decision over the per-source
//! outcomes (see [`quorum`]). Per-source failures never abort the fetch
//! cycle on their own: they are recorded as outcomes and surface, if at all,
//! as a verification error.

pub use client::{Client, Config, Error};
pub use pool::{Envelope, FetchError, FetchOutcome};
pub use quorum::{FailurePolicy, VerifiedRecord};
pub use strategy::{FetchStrategy, SourceOutcome};

mod client;
mod pool;
pub mod quorum;
mod strategy;
pub mod testonly;
pub mod transport;

#[cfg(test)]
mod tests;
