use std::sync::Arc;

use assert_matches::assert_matches;
use rand::{rngs::StdRng, seq::SliceRandom as _, Rng as _, SeedableRng as _};
use test_casing::test_casing;
use zksync_concurrency::{ctx, time};

use crate::{
    pool::FetchPool,
    quorum,
    testonly::{AgentSet, Response, TestTransport},
    Client, Config, Error, FailurePolicy, FetchError, FetchStrategy, SourceOutcome,
};

const SAMPLE_PAYLOAD: &str = "{\"some\": \"data\"}";

fn sample_record() -> serde_json::Map<String, serde_json::Value> {
    let serde_json::Value::Object(map) = serde_json::from_str(SAMPLE_PAYLOAD).unwrap() else {
        panic!("sample payload is an object");
    };
    map
}

#[tokio::test]
async fn accepts_unanimous_quorum() {
    zksync_concurrency::testonly::abort_on_panic();
    let ctx = &ctx::test_root(&ctx::RealClock);
    let rng = &mut ctx.rng();

    let agents = AgentSet::new(rng, 5);
    let transport = Arc::new(agents.unanimous_transport(SAMPLE_PAYLOAD));
    let client = Client::with_transport(agents.config(), transport).unwrap();

    let record = client.fetch(ctx).await.unwrap();
    assert_eq!(record.payload(), SAMPLE_PAYLOAD);
    assert_eq!(record.record(), &sample_record());

    // Same responses, same decoded output: fetch cycles are independent.
    let again = client.fetch(ctx).await.unwrap();
    assert_eq!(again, record);
}

#[tokio::test]
async fn rejects_missing_signature() {
    zksync_concurrency::testonly::abort_on_panic();
    let ctx = &ctx::test_root(&ctx::RealClock);
    let rng = &mut ctx.rng();

    let agents = AgentSet::new(rng, 1);
    let absent = rng.gen::<quorum_fetch_crypto::secp256k1::SecretKey>().address();
    let mut config = agents.config();
    // Require a signer that never signed the payload.
    config.signers = vec![quorum_fetch_crypto::TextFmt::encode(&absent)];
    let transport = Arc::new(agents.unanimous_transport(SAMPLE_PAYLOAD));
    let client = Client::with_transport(config, transport).unwrap();

    assert_matches!(
        client.fetch(ctx).await,
        Err(Error::Verify(quorum::Error::MissingSignature { signer, url })) => {
            assert_eq!(signer, absent);
            assert_eq!(url, agents.urls[0]);
        }
    );
}

#[tokio::test]
async fn rejects_signature_mismatch() {
    zksync_concurrency::testonly::abort_on_panic();
    let ctx = &ctx::test_root(&ctx::RealClock);
    let rng = &mut ctx.rng();

    let claimed = AgentSet::new(rng, 1);
    let actual = AgentSet::new(rng, 1);
    // The body claims `claimed`'s address, but carries `actual`'s signature.
    let mut body: serde_json::Value =
        serde_json::from_slice(&actual.envelope_json(SAMPLE_PAYLOAD)).unwrap();
    let signature = body["signatures"][&actual.signers()[0]].clone();
    body["signatures"] = serde_json::json!({ (claimed.signers()[0].clone()): signature });
    let transport = Arc::new(
        TestTransport::new().with(claimed.urls[0].clone(), Response::Body(serde_json::to_vec(&body).unwrap())),
    );
    let client = Client::with_transport(claimed.config(), transport).unwrap();

    assert_matches!(
        client.fetch(ctx).await,
        Err(Error::Verify(quorum::Error::SignatureMismatch { signer, recovered })) => {
            assert_eq!(signer, claimed.keys[0].address());
            assert_eq!(recovered, actual.keys[0].address());
        }
    );
}

#[tokio::test]
async fn verifies_every_spelling_of_a_required_signer() {
    zksync_concurrency::testonly::abort_on_panic();
    let ctx = &ctx::test_root(&ctx::RealClock);
    let rng = &mut ctx.rng();

    // The signatures map can carry several spellings of one address. A bad
    // signature under one spelling must not be shadowed by a valid one
    // under another.
    let agents = AgentSet::new(rng, 1);
    let intruder = AgentSet::new(rng, 1);
    let checksummed = agents.signers()[0].clone();
    let lowercase = checksummed.to_lowercase();
    assert_ne!(checksummed, lowercase);
    let mut body: serde_json::Value =
        serde_json::from_slice(&agents.envelope_json(SAMPLE_PAYLOAD)).unwrap();
    let valid = body["signatures"][&checksummed].clone();
    let forged = serde_json::from_slice::<serde_json::Value>(
        &intruder.envelope_json(SAMPLE_PAYLOAD),
    )
    .unwrap()["signatures"][&intruder.signers()[0]]
        .clone();
    body["signatures"] = serde_json::json!({
        (checksummed): forged,
        (lowercase): valid,
    });
    let transport = Arc::new(TestTransport::new().with(
        agents.urls[0].clone(),
        Response::Body(serde_json::to_vec(&body).unwrap()),
    ));
    let client = Client::with_transport(agents.config(), transport).unwrap();

    assert_matches!(
        client.fetch(ctx).await,
        Err(Error::Verify(quorum::Error::SignatureMismatch { signer, recovered })) => {
            assert_eq!(signer, agents.keys[0].address());
            assert_eq!(recovered, intruder.keys[0].address());
        }
    );
}

#[tokio::test]
async fn rejects_undecodable_signature() {
    zksync_concurrency::testonly::abort_on_panic();
    let ctx = &ctx::test_root(&ctx::RealClock);
    let rng = &mut ctx.rng();

    let agents = AgentSet::new(rng, 1);
    for bad_sig in ["not hex at all", "deadbeef"] {
        let body = serde_json::json!({
            "payload": SAMPLE_PAYLOAD,
            "signatures": { (agents.signers()[0].clone()): bad_sig },
        });
        let transport = Arc::new(TestTransport::new().with(
            agents.urls[0].clone(),
            Response::Body(serde_json::to_vec(&body).unwrap()),
        ));
        let client = Client::with_transport(agents.config(), transport).unwrap();

        assert_matches!(
            client.fetch(ctx).await,
            Err(Error::Verify(quorum::Error::InvalidSignature { signer, .. })) => {
                assert_eq!(signer, agents.keys[0].address());
            }
        );
    }
}

#[tokio::test]
async fn rejects_payload_divergence() {
    zksync_concurrency::testonly::abort_on_panic();
    let ctx = &ctx::test_root(&ctx::RealClock);
    let rng = &mut ctx.rng();

    let agents = AgentSet::new(rng, 2);
    let other_payload = "{\"some\": \"other data\"}";
    let transport = Arc::new(
        TestTransport::new()
            .with(
                agents.urls[0].clone(),
                Response::Body(agents.envelope_json(SAMPLE_PAYLOAD)),
            )
            .with(
                agents.urls[1].clone(),
                Response::Body(agents.envelope_json(other_payload)),
            ),
    );
    let client = Client::with_transport(agents.config(), transport).unwrap();

    assert_matches!(
        client.fetch(ctx).await,
        Err(Error::Verify(quorum::Error::PayloadDivergence { groups })) => {
            assert_eq!(groups.len(), 2);
            let sources: Vec<_> = groups.iter().flat_map(|g| g.sources.clone()).collect();
            assert!(sources.contains(&agents.urls[0]));
            assert!(sources.contains(&agents.urls[1]));
        }
    );
}

#[tokio::test]
async fn rejects_partial_fetch_failure() {
    zksync_concurrency::testonly::abort_on_panic();
    let ctx = &ctx::test_root(&ctx::RealClock);
    let rng = &mut ctx.rng();

    // 4 sources fetched 2 at a time; one fails with a transport error, the
    // other three succeed identically and fully signed. Verification still
    // sees all 4 outcomes and rejects the set, naming the failed source.
    let agents = AgentSet::new(rng, 4);
    let mut transport = agents.unanimous_transport(SAMPLE_PAYLOAD);
    transport = transport.with(agents.urls[2].clone(), Response::Error("boom".into()));
    let config = agents.config();
    assert_eq!(config.concurrency, 2);
    let client = Client::with_transport(config, Arc::new(transport)).unwrap();

    assert_matches!(
        client.fetch(ctx).await,
        Err(Error::Verify(quorum::Error::PartialFetchFailure { failed })) => {
            assert_eq!(failed.len(), 1);
            assert_eq!(failed[0].0, agents.urls[2]);
            assert_matches!(failed[0].1, FetchError::Transport(_));
        }
    );
}

#[tokio::test]
async fn survivor_quorum_tolerates_failed_minority() {
    zksync_concurrency::testonly::abort_on_panic();
    let ctx = &ctx::test_root(&ctx::RealClock);
    let rng = &mut ctx.rng();

    let agents = AgentSet::new(rng, 3);
    let transport = agents
        .unanimous_transport(SAMPLE_PAYLOAD)
        .with(agents.urls[0].clone(), Response::Error("boom".into()));
    let mut config = agents.config();
    config.failure_policy = FailurePolicy::QuorumOfSurvivors;
    let client = Client::with_transport(config, Arc::new(transport)).unwrap();

    let record = client.fetch(ctx).await.unwrap();
    assert_eq!(record.record(), &sample_record());
}

#[tokio::test]
async fn first_success_preset_returns_early() {
    zksync_concurrency::testonly::abort_on_panic();
    let ctx = &ctx::test_root(&ctx::RealClock);
    let rng = &mut ctx.rng();

    // Only one source ever responds; the other two would hang forever.
    let agents = AgentSet::new(rng, 3);
    let transport = TestTransport::new()
        .with(
            agents.urls[0].clone(),
            Response::Body(agents.envelope_json(SAMPLE_PAYLOAD)),
        )
        .with(agents.urls[1].clone(), Response::Hang)
        .with(agents.urls[2].clone(), Response::Hang);
    let config = Config::first_success(agents.urls.clone(), agents.signers());
    let client = Client::with_transport(config, Arc::new(transport)).unwrap();

    let record = client.fetch(ctx).await.unwrap();
    assert_eq!(record.record(), &sample_record());
}

#[tokio::test]
async fn early_stop_bounds_started_attempts() {
    zksync_concurrency::testonly::abort_on_panic();
    let ctx = &ctx::test_root(&ctx::RealClock);
    let rng = &mut ctx.rng();

    let agents = AgentSet::new(rng, 4);
    let transport = TestTransport::new()
        .with(agents.urls[0].clone(), Response::Hang)
        .with(
            agents.urls[1].clone(),
            Response::Body(agents.envelope_json(SAMPLE_PAYLOAD)),
        )
        .with(agents.urls[2].clone(), Response::Hang)
        .with(agents.urls[3].clone(), Response::Hang);
    let pool = FetchPool {
        transport: &transport,
        concurrency: 2,
        stop_on_success: true,
    };

    let outcomes = pool.run(ctx, &agents.urls).await.unwrap();
    assert_eq!(outcomes.len(), 4);
    assert!(outcomes[1].is_ok());
    for i in [0, 2, 3] {
        assert_matches!(outcomes[i], Err(FetchError::Canceled));
    }
    // 2 attempts were in flight when the success arrived; at most one more
    // could start before the stop signal landed. Nothing was ever started
    // beyond the concurrency budget after the success.
    assert!(transport.started() <= 3, "started {}", transport.started());
}

#[tokio::test]
async fn sequential_strategy_runs_to_completion() {
    zksync_concurrency::testonly::abort_on_panic();
    let ctx = &ctx::test_root(&ctx::RealClock);
    let rng = &mut ctx.rng();

    let agents = AgentSet::new(rng, 3);
    let transport = agents
        .unanimous_transport(SAMPLE_PAYLOAD)
        .with(agents.urls[1].clone(), Response::Error("boom".into()));

    let set = FetchStrategy::Sequential
        .fetch(ctx, &transport, &agents.urls)
        .await
        .unwrap();
    // No early stop: the full outcome set comes back, failures included.
    assert_eq!(set.len(), 3);
    assert!(set[0].outcome.is_ok());
    assert_matches!(set[1].outcome, Err(FetchError::Transport(_)));
    assert!(set[2].outcome.is_ok());
    assert_eq!(transport.started(), 3);
}

#[tokio::test]
async fn first_success_strategy_returns_only_successes() {
    zksync_concurrency::testonly::abort_on_panic();
    let ctx = &ctx::test_root(&ctx::RealClock);
    let rng = &mut ctx.rng();

    let agents = AgentSet::new(rng, 3);
    let transport = TestTransport::new()
        .with(
            agents.urls[0].clone(),
            Response::Body(agents.envelope_json(SAMPLE_PAYLOAD)),
        )
        .with(agents.urls[1].clone(), Response::Hang)
        .with(agents.urls[2].clone(), Response::Hang);

    let set = FetchStrategy::FirstSuccess
        .fetch(ctx, &transport, &agents.urls)
        .await
        .unwrap();
    assert!(!set.is_empty());
    assert!(set.iter().all(|s| s.outcome.is_ok()));
    assert!(set.iter().any(|s| s.url == agents.urls[0]));
}

#[tokio::test]
async fn duplicate_urls_are_independent_sources() {
    zksync_concurrency::testonly::abort_on_panic();
    let ctx = &ctx::test_root(&ctx::RealClock);
    let rng = &mut ctx.rng();

    let agents = AgentSet::new(rng, 1);
    let transport = agents.unanimous_transport(SAMPLE_PAYLOAD);
    let sources = vec![agents.urls[0].clone(), agents.urls[0].clone()];

    let set = FetchStrategy::AllParallel
        .fetch(ctx, &transport, &sources)
        .await
        .unwrap();
    assert_eq!(set.len(), 2);
    assert!(set.iter().all(|s| s.outcome.is_ok()));
    assert_eq!(transport.started(), 2);
}

#[tokio::test]
async fn oversized_concurrency_budget_is_clamped() {
    zksync_concurrency::testonly::abort_on_panic();
    let ctx = &ctx::test_root(&ctx::RealClock);
    let rng = &mut ctx.rng();

    let agents = AgentSet::new(rng, 2);
    let transport = agents.unanimous_transport(SAMPLE_PAYLOAD);
    let pool = FetchPool {
        transport: &transport,
        concurrency: 10,
        stop_on_success: false,
    };

    let outcomes = pool.run(ctx, &agents.urls).await.unwrap();
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(Result::is_ok));
    assert_eq!(transport.started(), 2);
}

#[test_casing(4, [7, 29, 517, 8011])]
#[tokio::test]
async fn completion_order_does_not_affect_the_record(seed: u64) {
    zksync_concurrency::testonly::abort_on_panic();
    let ctx = &ctx::test_root(&ctx::RealClock);
    let rng = &mut StdRng::seed_from_u64(seed);

    // Random per-source delays reshuffle the completion order; the accepted
    // record must not depend on it.
    let agents = AgentSet::new(rng, 5);
    let body = agents.envelope_json(SAMPLE_PAYLOAD);
    let transport = agents.urls.iter().fold(TestTransport::new(), |t, url| {
        let delay = time::Duration::milliseconds(rng.gen_range(0..40));
        t.with(url.clone(), Response::Delayed(delay, body.clone()))
    });
    let mut config = agents.config();
    config.concurrency = rng.gen_range(0..4);
    let client = Client::with_transport(config, Arc::new(transport)).unwrap();

    let record = client.fetch(ctx).await.unwrap();
    assert_eq!(record.payload(), SAMPLE_PAYLOAD);
    assert_eq!(record.record(), &sample_record());
}

#[test]
fn verification_is_order_independent() {
    let rng = &mut StdRng::seed_from_u64(398471);

    let agents = AgentSet::new(rng, 4);
    let envelope: crate::Envelope =
        serde_json::from_slice(&agents.envelope_json(SAMPLE_PAYLOAD)).unwrap();
    let signers: Vec<_> = agents.keys.iter().map(|k| k.address()).collect();

    for _ in 0..5 {
        let mut outcomes: Vec<_> = agents
            .urls
            .iter()
            .map(|url| SourceOutcome {
                url: url.clone(),
                outcome: Ok(envelope.clone()),
            })
            .collect();
        outcomes.shuffle(rng);
        let record = quorum::verify(outcomes, &signers, FailurePolicy::RequireAll).unwrap();
        assert_eq!(record.payload(), SAMPLE_PAYLOAD);
    }
}

#[test]
fn rejects_malformed_configuration() {
    let rng = &mut StdRng::seed_from_u64(1298);
    let agents = AgentSet::new(rng, 2);

    // URL/signer count mismatch.
    let mut config = agents.config();
    config.signers.pop();
    let transport = Arc::new(TestTransport::new());
    assert_matches!(
        Client::with_transport(config, transport.clone()),
        Err(Error::Config(_))
    );

    // No sources at all.
    assert_matches!(
        Client::with_transport(Config::new(vec![], vec![]), transport.clone()),
        Err(Error::Config(_))
    );

    // Unparseable signer address.
    let mut config = agents.config();
    config.signers[0] = "not an address".into();
    assert_matches!(
        Client::with_transport(config, transport.clone()),
        Err(Error::Config(_))
    );

    // Construction never touches the network.
    assert_eq!(transport.started(), 0);
}

#[test]
fn blocking_fetch_works_without_a_runtime() {
    let rng = &mut StdRng::seed_from_u64(55021);

    let agents = AgentSet::new(rng, 3);
    let transport = Arc::new(agents.unanimous_transport(SAMPLE_PAYLOAD));
    let client = Client::with_transport(agents.config(), transport).unwrap();

    let record = client.fetch_blocking().unwrap();
    assert_eq!(record.record(), &sample_record());
}
