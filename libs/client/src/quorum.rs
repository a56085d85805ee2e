//! Quorum verification: a single atomic acceptance decision over the
//! per-source outcomes of a fetch cycle. Payload equality and signature
//! recovery are checked together; the decision depends only on the outcome
//! set, never on the order the outcomes arrived in.

use anyhow::Context as _;
use quorum_fetch_crypto::{
    secp256k1::{Address, Signature},
    ByteFmt as _, Text,
};

use crate::{
    pool::{Envelope, FetchError},
    strategy::SourceOutcome,
};

/// What to do with failed sources in the evaluated outcome set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Every source in the evaluated set must have succeeded; any failure
    /// rejects the whole set.
    #[default]
    RequireAll,
    /// Failed sources are dropped and quorum is checked among the
    /// survivors, provided at least one source succeeded.
    QuorumOfSurvivors,
}

/// Sources that agreed on one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadGroup {
    /// The exact payload string these sources returned.
    pub payload: String,
    /// The sources that returned it.
    pub sources: Vec<String>,
}

/// Why the outcome set was rejected.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// At least one source in the evaluated set failed or was canceled.
    #[error("{} source(s) failed to fetch: {failed:?}", failed.len())]
    PartialFetchFailure {
        /// The failed sources with their failure causes.
        failed: Vec<(String, FetchError)>,
    },
    /// The succeeded sources disagree on the payload content.
    #[error("sources disagree on the payload, {} distinct versions: {groups:?}", groups.len())]
    PayloadDivergence {
        /// Which sources produced which payload.
        groups: Vec<PayloadGroup>,
    },
    /// A required signer's signature is absent from an envelope.
    #[error("no signature from required signer {signer:?} in the response from {url}")]
    MissingSignature {
        /// The required signer without a signature.
        signer: Address,
        /// The source whose envelope lacks it.
        url: String,
    },
    /// A required signer's signature could not be decoded.
    #[error("undecodable signature from required signer {signer:?}: {cause:#}")]
    InvalidSignature {
        /// The claimed signer.
        signer: Address,
        /// Decoding or recovery failure.
        #[source]
        cause: anyhow::Error,
    },
    /// A required signer's signature recovers to a different address.
    #[error("signature claimed by {signer:?} recovers to {recovered:?}")]
    SignatureMismatch {
        /// The claimed signer.
        signer: Address,
        /// The address the signature actually recovers to.
        recovered: Address,
    },
    /// The agreed payload does not decode into a JSON record.
    #[error("malformed payload: {0}")]
    MalformedPayload(#[source] serde_json::Error),
}

/// The record a fetch cycle was accepted with. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedRecord {
    payload: String,
    record: serde_json::Map<String, serde_json::Value>,
}

impl VerifiedRecord {
    /// The exact payload string the signers attested to.
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// The decoded record.
    pub fn record(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.record
    }

    /// Consumes the verified record, returning the decoded mapping.
    pub fn into_record(self) -> serde_json::Map<String, serde_json::Value> {
        self.record
    }
}

/// Verifies that the outcome set carries an acceptable quorum: the evaluated
/// sources all succeeded (per `policy`), agreed on one exact payload string,
/// and every required signer's signature over that payload recovers to the
/// signer's address. On acceptance the payload is decoded into the record.
pub fn verify(
    outcomes: Vec<SourceOutcome>,
    signers: &[Address],
    policy: FailurePolicy,
) -> Result<VerifiedRecord, Error> {
    let mut good: Vec<(String, Envelope)> = Vec::new();
    let mut failed: Vec<(String, FetchError)> = Vec::new();
    for SourceOutcome { url, outcome } in outcomes {
        match outcome {
            Ok(envelope) => good.push((url, envelope)),
            Err(err) => failed.push((url, err)),
        }
    }
    let strict = policy == FailurePolicy::RequireAll;
    if good.is_empty() || (strict && !failed.is_empty()) {
        return Err(Error::PartialFetchFailure { failed });
    }

    // Payload equality comes before the signature checks: when sources
    // already disagree there is no point recovering signatures, and the
    // divergence is the more actionable error.
    let mut groups: Vec<PayloadGroup> = Vec::new();
    for (url, envelope) in &good {
        match groups.iter_mut().find(|g| g.payload == envelope.payload) {
            Some(group) => group.sources.push(url.clone()),
            None => groups.push(PayloadGroup {
                payload: envelope.payload.clone(),
                sources: vec![url.clone()],
            }),
        }
    }
    if groups.len() != 1 {
        return Err(Error::PayloadDivergence { groups });
    }
    // `good` is non-empty, so exactly one group remains.
    let payload = groups.swap_remove(0).payload;

    // Different sources could in principle carry different signature sets on
    // the identical payload, so the signer checks run per envelope.
    for (url, envelope) in &good {
        verify_envelope(url, envelope, &payload, signers)?;
    }

    let record = serde_json::from_str(&payload).map_err(Error::MalformedPayload)?;
    Ok(VerifiedRecord { payload, record })
}

fn verify_envelope(
    url: &str,
    envelope: &Envelope,
    payload: &str,
    signers: &[Address],
) -> Result<(), Error> {
    // Parse the envelope's signature keys up front. Parsing normalizes
    // capitalization, which makes the required-signer lookup
    // case-insensitive; entries whose key is not an address cannot match a
    // required signer and are ignored. Several spellings of one address may
    // coexist in the map, so matching is by parsed address, not by key, and
    // every matching entry is verified.
    let provided: Vec<(Address, &str)> = envelope
        .signatures
        .iter()
        .filter_map(|(addr, sig)| {
            let addr = Text::new(addr).decode::<Address>().ok()?;
            Some((addr, sig.as_str()))
        })
        .collect();
    for signer in signers {
        let mut found = false;
        for (_, sig_hex) in provided.iter().filter(|(addr, _)| addr == signer) {
            found = true;
            let signature = decode_signature(sig_hex).map_err(|cause| Error::InvalidSignature {
                signer: *signer,
                cause,
            })?;
            let recovered = signature
                .recover_payload_signer(payload.as_bytes())
                .map_err(|cause| Error::InvalidSignature {
                    signer: *signer,
                    cause,
                })?;
            if &recovered != signer {
                return Err(Error::SignatureMismatch {
                    signer: *signer,
                    recovered,
                });
            }
        }
        if !found {
            return Err(Error::MissingSignature {
                signer: *signer,
                url: url.to_owned(),
            });
        }
    }
    Ok(())
}

fn decode_signature(sig_hex: &str) -> anyhow::Result<Signature> {
    let bytes = hex::decode(sig_hex).context("signature hex")?;
    Signature::decode(&bytes)
}
