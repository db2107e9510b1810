//! End-to-end coordinator tests
//!
//! Drives the public API only. Race tests start every contender behind a
//! barrier and repeat a number of rounds to shake out interleavings.

use std::sync::{Arc, Barrier};
use std::thread;

use bridge_core::chain_registry::VOLUME_WINDOW_SECONDS;
use bridge_core::settlement::SettlementAction;
use bridge_core::{
    Address, Amount, AttestationOutcome, AttestationPayload, BridgeCoordinator, BridgeError,
    BridgeEvent, BridgeSettings, ChainId, ChainUpdate, EventLog, InitiateRequest, ManualClock,
    RecordingSettlement, TransactionStatus, TxId,
};

const T0: u64 = 1_700_000_000;
const ETHER: Amount = 1_000_000_000_000_000_000;
const ROUNDS: usize = 25;

fn addr(s: &str) -> Address {
    Address::new(s).unwrap()
}

struct Fixture {
    bridge: BridgeCoordinator,
    clock: Arc<ManualClock>,
    settlement: Arc<RecordingSettlement>,
    events: Arc<EventLog>,
    admin: Address,
}

fn fixture(daily_limit: Amount, validators: &[(&str, u32)], threshold: u64) -> Fixture {
    let admin = addr("0x00000000000000000000000000000000000000ad");
    let clock = Arc::new(ManualClock::new(T0));
    let settlement = Arc::new(RecordingSettlement::new());
    let events = Arc::new(EventLog::default());

    let bridge = BridgeCoordinator::new(BridgeSettings::new(ChainId::from_u32(1), admin.clone()))
        .unwrap()
        .with_clock(clock.clone())
        .with_settlement(settlement.clone())
        .with_event_sink(events.clone());

    bridge
        .configure_chain(
            &admin,
            ChainId::from_u32(56),
            ChainUpdate {
                counterpart_address: addr("0x00000000000000000000000000000000000000b5"),
                active: true,
                required_confirmations: 15,
                daily_volume_limit: daily_limit,
            },
        )
        .unwrap();

    let set: Vec<(Address, u32)> = validators.iter().map(|(v, w)| (addr(v), *w)).collect();
    bridge.set_validators(&admin, &set, threshold).unwrap();

    Fixture {
        bridge,
        clock,
        settlement,
        events,
        admin,
    }
}

fn request(amount: Amount, nonce: u64) -> InitiateRequest {
    InitiateRequest {
        dest_chain: ChainId::from_u32(56),
        receiver: addr("bob"),
        token: addr("0x00000000000000000000000000000000000000cc"),
        amount,
        nonce,
    }
}

fn payload(validator: &str) -> AttestationPayload {
    AttestationPayload {
        validator: addr(validator),
        signature: format!("sig-{}", validator),
    }
}

// ============================================================================
// Race Tests
// ============================================================================

#[test]
fn test_concurrent_attestations_release_exactly_once() {
    let validators = [("a", 1), ("b", 1), ("c", 1), ("d", 1), ("e", 1)];

    for round in 0..ROUNDS {
        let f = fixture(0, &validators, 2);
        let id = f.bridge.initiate(&addr("alice"), request(10 * ETHER, round as u64)).unwrap();
        let barrier = Barrier::new(validators.len());

        let outcomes: Vec<AttestationOutcome> = thread::scope(|s| {
            let handles: Vec<_> = validators
                .iter()
                .map(|(v, _)| {
                    let bridge = &f.bridge;
                    let barrier = &barrier;
                    s.spawn(move || {
                        barrier.wait();
                        bridge.attest(&id, &payload(v)).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let released = outcomes
            .iter()
            .filter(|o| matches!(o, AttestationOutcome::Released { .. }))
            .count();
        assert_eq!(released, 1, "round {}: {:?}", round, outcomes);
        assert_eq!(f.settlement.releases(&id), 1);

        let completed_events = f
            .events
            .events_since(0, 1000)
            .into_iter()
            .filter(|r| matches!(r.event, BridgeEvent::TransactionCompleted { .. }))
            .count();
        assert_eq!(completed_events, 1);

        let tx = f.bridge.get_transaction(&id).unwrap();
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert!(tx.attestations.len() >= 2);
    }
}

#[test]
fn test_concurrent_duplicate_attestation_single_record() {
    for round in 0..ROUNDS {
        let f = fixture(0, &[("a", 1), ("b", 1)], 2);
        let id = f.bridge.initiate(&addr("alice"), request(10 * ETHER, round as u64)).unwrap();
        let barrier = Barrier::new(6);

        let outcomes: Vec<AttestationOutcome> = thread::scope(|s| {
            let handles: Vec<_> = (0..6)
                .map(|_| {
                    let bridge = &f.bridge;
                    let barrier = &barrier;
                    s.spawn(move || {
                        barrier.wait();
                        bridge.attest(&id, &payload("a")).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let recorded = outcomes
            .iter()
            .filter(|o| matches!(o, AttestationOutcome::Recorded { .. }))
            .count();
        assert_eq!(recorded, 1);
        assert_eq!(
            outcomes.len() - recorded,
            outcomes
                .iter()
                .filter(|o| **o == AttestationOutcome::Duplicate)
                .count()
        );
        assert_eq!(f.bridge.get_transaction(&id).unwrap().attestations.len(), 1);
    }
}

#[test]
fn test_concurrent_initiate_same_nonce_single_winner() {
    for _ in 0..ROUNDS {
        let f = fixture(0, &[("a", 1)], 1);
        let barrier = Barrier::new(8);

        let results: Vec<Result<TxId, BridgeError>> = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let bridge = &f.bridge;
                    let barrier = &barrier;
                    s.spawn(move || {
                        barrier.wait();
                        bridge.initiate(&addr("alice"), request(10 * ETHER, 42))
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, BridgeError::DuplicateTransaction { .. })));
        assert_eq!(f.bridge.get_bridge_stats().total_transactions, 1);

        // Losers must not have consumed volume
        let chain = f.bridge.registry().get(&ChainId::from_u32(56)).unwrap();
        assert_eq!(chain.volume_used_today, 10 * ETHER);
    }
}

#[test]
fn test_concurrent_volume_reservation_respects_limit() {
    for _ in 0..ROUNDS {
        let f = fixture(50 * ETHER, &[("a", 1)], 1);
        let barrier = Barrier::new(10);

        let results: Vec<Result<TxId, BridgeError>> = thread::scope(|s| {
            let handles: Vec<_> = (0..10u64)
                .map(|nonce| {
                    let bridge = &f.bridge;
                    let barrier = &barrier;
                    s.spawn(move || {
                        barrier.wait();
                        bridge.initiate(&addr("alice"), request(10 * ETHER, nonce))
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 5);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, BridgeError::VolumeExceeded { .. })));
        let chain = f.bridge.registry().get(&ChainId::from_u32(56)).unwrap();
        assert_eq!(chain.volume_used_today, 50 * ETHER);
    }
}

#[test]
fn test_concurrent_refund_claims_single_winner() {
    for round in 0..ROUNDS {
        let f = fixture(0, &[("a", 1), ("b", 1)], 2);
        let id = f.bridge.initiate(&addr("alice"), request(10 * ETHER, round as u64)).unwrap();
        f.clock.advance(3601);
        let barrier = Barrier::new(4);

        let results: Vec<_> = thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let bridge = &f.bridge;
                    let barrier = &barrier;
                    s.spawn(move || {
                        barrier.wait();
                        bridge.claim_refund(&id)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(f.settlement.refunds(&id), 1);
        assert_eq!(f.settlement.releases(&id), 0);
    }
}

#[test]
fn test_concurrent_retries_and_threshold_lowering_release_once() {
    for round in 0..ROUNDS {
        let f = fixture(0, &[("a", 1), ("b", 1), ("c", 1)], 3);
        let id = f.bridge.initiate(&addr("alice"), request(10 * ETHER, round as u64)).unwrap();
        f.bridge.attest(&id, &payload("a")).unwrap();
        f.bridge.attest(&id, &payload("b")).unwrap();

        let barrier = Barrier::new(3);
        thread::scope(|s| {
            for v in ["a", "b"] {
                let bridge = &f.bridge;
                let barrier = &barrier;
                s.spawn(move || {
                    barrier.wait();
                    bridge.attest(&id, &payload(v)).unwrap();
                });
            }
            let bridge = &f.bridge;
            let barrier = &barrier;
            let admin = &f.admin;
            s.spawn(move || {
                barrier.wait();
                bridge.set_threshold(admin, 2).unwrap();
            });
        });

        assert_eq!(f.settlement.releases(&id), 1, "round {}", round);
        assert_eq!(
            f.bridge.get_transaction(&id).unwrap().status,
            TransactionStatus::Completed
        );
    }
}

#[test]
fn test_lowered_threshold_releases_attesting_transaction() {
    let f = fixture(0, &[("a", 1), ("b", 1), ("c", 1)], 3);
    let id = f.bridge.initiate(&addr("alice"), request(10 * ETHER, 1)).unwrap();
    f.bridge.attest(&id, &payload("a")).unwrap();
    f.bridge.attest(&id, &payload("b")).unwrap();
    assert_eq!(
        f.bridge.get_transaction(&id).unwrap().status,
        TransactionStatus::Attesting
    );

    f.bridge.set_threshold(&f.admin, 2).unwrap();
    assert_eq!(f.settlement.releases(&id), 1);
    assert_eq!(
        f.bridge.get_transaction(&id).unwrap().status,
        TransactionStatus::Completed
    );

    // Retries after the release change nothing
    assert_eq!(
        f.bridge.attest(&id, &payload("a")).unwrap(),
        AttestationOutcome::Duplicate
    );
    assert_eq!(
        f.bridge.attest(&id, &payload("c")).unwrap(),
        AttestationOutcome::AlreadyCompleted
    );
    assert_eq!(f.settlement.releases(&id), 1);
}

#[test]
fn test_raised_threshold_requires_more_weight() {
    let f = fixture(0, &[("a", 1), ("b", 1), ("c", 1)], 2);
    let id = f.bridge.initiate(&addr("alice"), request(10 * ETHER, 1)).unwrap();
    f.bridge.attest(&id, &payload("a")).unwrap();

    f.bridge.set_threshold(&f.admin, 3).unwrap();
    assert_eq!(
        f.bridge.attest(&id, &payload("b")).unwrap(),
        AttestationOutcome::Recorded {
            attested_weight: 2,
            threshold: 3,
            status: TransactionStatus::Attesting,
        }
    );
    assert_eq!(
        f.bridge.attest(&id, &payload("b")).unwrap(),
        AttestationOutcome::Duplicate
    );
    assert_eq!(f.settlement.releases(&id), 0);

    assert_eq!(
        f.bridge.attest(&id, &payload("c")).unwrap(),
        AttestationOutcome::Released { tx_id: id }
    );
    assert_eq!(f.settlement.releases(&id), 1);
}

#[test]
fn test_validator_set_change_re_evaluates_open_transactions() {
    let f = fixture(0, &[("a", 1), ("b", 1), ("c", 1)], 3);
    let pending = f.bridge.initiate(&addr("alice"), request(10 * ETHER, 1)).unwrap();
    let untouched = f.bridge.initiate(&addr("alice"), request(10 * ETHER, 2)).unwrap();
    f.bridge.attest(&pending, &payload("a")).unwrap();

    // "a" now carries the threshold on its own
    let set = [(addr("a"), 3), (addr("b"), 1), (addr("c"), 1)];
    f.bridge.set_validators(&f.admin, &set, 3).unwrap();

    assert_eq!(f.settlement.releases(&pending), 1);
    assert_eq!(f.settlement.releases(&untouched), 0);
    assert_eq!(
        f.bridge.get_transaction(&untouched).unwrap().status,
        TransactionStatus::Initiated
    );
}

// ============================================================================
// Scenario Tests
// ============================================================================

#[test]
fn test_volume_limit_fails_on_crossing_transaction() {
    let f = fixture(25 * ETHER, &[("a", 1)], 1);

    f.bridge.initiate(&addr("alice"), request(10 * ETHER, 1)).unwrap();
    f.bridge.initiate(&addr("alice"), request(10 * ETHER, 2)).unwrap();
    assert!(matches!(
        f.bridge.initiate(&addr("alice"), request(10 * ETHER, 3)),
        Err(BridgeError::VolumeExceeded { .. })
    ));
    // A smaller transfer still fits under the limit
    f.bridge.initiate(&addr("alice"), request(5 * ETHER, 4)).unwrap();

    // Window rolls after 24 hours
    f.clock.advance(VOLUME_WINDOW_SECONDS);
    f.bridge.initiate(&addr("alice"), request(10 * ETHER, 3)).unwrap();
    let status = f.bridge.get_chain_status(&ChainId::from_u32(56)).unwrap();
    assert_eq!(status.remaining_daily_volume, Some(15 * ETHER));
}

#[test]
fn test_weighted_validators_full_lifecycle() {
    let f = fixture(0, &[("heavy", 3), ("light1", 1), ("light2", 1)], 3);

    let id = f.bridge.initiate(&addr("alice"), request(10 * ETHER, 1)).unwrap();
    assert!(matches!(
        f.bridge.attest(&id, &payload("light1")).unwrap(),
        AttestationOutcome::Recorded {
            attested_weight: 1,
            ..
        }
    ));
    assert!(matches!(
        f.bridge.attest(&id, &payload("light2")).unwrap(),
        AttestationOutcome::Recorded {
            attested_weight: 2,
            ..
        }
    ));
    assert_eq!(
        f.bridge.attest(&id, &payload("heavy")).unwrap(),
        AttestationOutcome::Released { tx_id: id }
    );

    assert_eq!(f.settlement.actions(), vec![SettlementAction::Release(id)]);
    let stats = f.bridge.get_bridge_stats();
    assert_eq!(stats.completed_transactions, 1);
    assert_eq!(stats.total_fees, 250_000_000_000_000_000);
}

#[test]
fn test_pause_rejects_user_flows() {
    let f = fixture(0, &[("a", 1)], 1);
    let id = f.bridge.initiate(&addr("alice"), request(10 * ETHER, 1)).unwrap();

    f.bridge.pause(&f.admin).unwrap();
    assert!(matches!(
        f.bridge.initiate(&addr("alice"), request(10 * ETHER, 2)),
        Err(BridgeError::Paused)
    ));
    assert!(matches!(f.bridge.attest(&id, &payload("a")), Err(BridgeError::Paused)));
    assert!(matches!(f.bridge.claim_refund(&id), Err(BridgeError::Paused)));

    // Configuration remains available
    f.bridge
        .add_validator(&f.admin, addr("b"), 1)
        .unwrap();

    f.bridge.unpause(&f.admin).unwrap();
    assert_eq!(
        f.bridge.attest(&id, &payload("a")).unwrap(),
        AttestationOutcome::Released { tx_id: id }
    );
}

#[test]
fn test_sweep_then_refund_emits_events() {
    let f = fixture(0, &[("a", 1), ("b", 1)], 2);
    let id = f.bridge.initiate(&addr("alice"), request(10 * ETHER, 1)).unwrap();
    f.bridge.attest(&id, &payload("a")).unwrap();

    f.clock.advance(3601);
    assert_eq!(f.bridge.sweep_expired(), vec![id]);
    assert!(matches!(
        f.bridge.attest(&id, &payload("b")),
        Err(BridgeError::TransactionExpired { .. })
    ));

    f.bridge.claim_refund(&id).unwrap();
    let names: Vec<&str> = f
        .events
        .events_since(0, 1000)
        .iter()
        .map(|r| r.event.name())
        .collect();
    assert!(names.ends_with(&["transaction_refundable", "transaction_refunded"]));
}
