//! Sync probe scheduling (spec §8 S6): the scheduler's `sync_request` job
//! firing against a real store, plus the probe/response round trip it
//! exists to drive. Unlike `pipeline::handlers::sync`'s own unit tests
//! (which drive `SyncRequestHandler`/`SyncResponseHandler::process`
//! directly against a hand-built cache), this exercises the wiring through
//! `Api`/`Scheduler`/`Pipeline` end to end.

use quiet_core::event::IdentityEvent;
use quiet_core::{CryptoMode, Envelope, EventBody, EventPlaintext};
use quietd::{Api, Pipeline, Scheduler, Store};
use serde_json::{json, Value};

fn new_api() -> Api {
    Api::new(Pipeline::new(Store::open_in_memory().unwrap(), CryptoMode::Dummy))
}

fn envelopes(data: &Value) -> Vec<Envelope> {
    serde_json::from_value(data.clone()).unwrap()
}

fn find<'a>(envs: &'a [Envelope], event_type: &str) -> &'a Envelope {
    envs.iter()
        .find(|e| e.event_type.as_deref() == Some(event_type))
        .unwrap_or_else(|| panic!("no {event_type} envelope in outcome"))
}

fn body_str<'a>(env: &'a Envelope, field: &str) -> &'a str {
    env.event_plaintext
        .as_ref()
        .and_then(|p| p.get(field))
        .and_then(|v| v.as_str())
        .unwrap_or_else(|| panic!("missing {field} on {:?}", env.event_type))
}

fn deliver(api: &Api, event_id: &str, ciphertext: &[u8], now_ms: i64) -> Vec<Envelope> {
    let mut env = Envelope::new();
    env.event_id = Some(event_id.to_string());
    env.event_ciphertext = Some(ciphertext.to_vec());
    env.received_at = Some(now_ms);
    api.pipeline.drive_and_queue(vec![env], now_ms).unwrap()
}

#[test]
fn scheduler_fires_sync_request_against_a_reachable_peer_and_records_the_run() {
    let alice = new_api();
    let bob = new_api();
    let network_id = "net1";
    let t = 1_000_i64;

    let alice_out =
        alice.execute_command("create_identity", json!({"network_id": network_id, "name": "alice"}), CryptoMode::Dummy, t).unwrap();
    let _alice_peer = alice_out.ids.get("identity").unwrap().clone();

    let bob_out =
        bob.execute_command("create_identity", json!({"network_id": network_id, "name": "bob"}), CryptoMode::Dummy, t).unwrap();
    let bob_peer = bob_out.ids.get("identity").unwrap().clone();
    let bob_identity_env = find(&envelopes(&bob_out.data), "identity").clone();

    deliver(&alice, bob_identity_env.event_id.as_deref().unwrap(), bob_identity_env.event_ciphertext.as_deref().unwrap(), t);
    assert!(alice.pipeline.store.read().get_peer(&bob_peer).unwrap().is_some());

    let addr_out = bob
        .execute_command(
            "register_address",
            json!({"peer_id": bob_peer, "user_id": bob_peer, "network_id": network_id, "address": "10.0.0.9", "port": 9001}),
            CryptoMode::Dummy,
            t,
        )
        .unwrap();
    let addr_env = find(&envelopes(&addr_out.data), "address").clone();
    deliver(&alice, addr_env.event_id.as_deref().unwrap(), addr_env.event_ciphertext.as_deref().unwrap(), t);
    assert!(!alice.pipeline.store.read().list_addresses_for_peer(&bob_peer).unwrap().is_empty());

    let transit_out =
        bob.execute_command("announce_transit_secret", json!({"peer_id": bob_peer, "network_id": network_id}), CryptoMode::Dummy, t).unwrap();
    let transit_env = find(&envelopes(&transit_out.data), "transit_secret").clone();
    deliver(&alice, transit_env.event_id.as_deref().unwrap(), transit_env.event_ciphertext.as_deref().unwrap(), t);
    assert!(alice.pipeline.store.read().get_peer_transit_key(&bob_peer, network_id).unwrap().is_some());

    // Bob is now a fully reachable peer in Alice's store: known identity,
    // address, transit key. First-ever tick always fires (job_runs starts
    // at last_run_ms == 0), which is how this stands in for the literal
    // "configure the job's interval to 1000ms" setup in the spec scenario
    // — the scheduler's own interval is fixed per job (spec §4.5), but the
    // always-fires-once semantics produce the same observable first probe.
    let scheduler = Scheduler::new();
    let produced = alice.tick(&scheduler, t).unwrap();
    assert!(produced >= 1, "expected the sync_request job to enqueue at least one envelope");

    let run = alice.pipeline.store.read().get_job_run("sync_request").unwrap();
    assert_eq!(run.success_count, 1);
    assert_eq!(run.last_run_ms, t);

    let sends = alice.pipeline.take_pending_sends();
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].dest_ip, "10.0.0.9");
    assert_eq!(sends[0].dest_port, 9001);
    assert!(!sends[0].raw_data.is_empty());

    // A second tick before the interval elapses is a no-op (same invariant
    // `scheduler.rs`'s own `second_tick_within_interval_does_not_rerun_a_job`
    // test checks for `purge_sweep`, exercised here for `sync_request`).
    let produced_again = alice.tick(&scheduler, t + 1).unwrap();
    assert_eq!(produced_again, 0);
    let run = alice.pipeline.store.read().get_job_run("sync_request").unwrap();
    assert_eq!(run.success_count, 1, "job ran again before its interval elapsed");
}

#[test]
fn sync_response_round_trip_discards_unknown_request_id_and_stores_the_known_one() {
    let alice = new_api();
    let network_id = "net1";
    let t = 1_000_i64;

    let out =
        alice.execute_command("create_identity", json!({"network_id": network_id, "name": "alice"}), CryptoMode::Dummy, t).unwrap();
    let alice_peer = out.ids.get("identity").unwrap().clone();

    let probe_out = alice
        .execute_command(
            "request_sync",
            json!({"peer_id": alice_peer, "network_id": network_id, "dest_ip": "10.0.0.50", "dest_port": 7000}),
            CryptoMode::Dummy,
            t,
        )
        .unwrap();
    let probe_env = find(&envelopes(&probe_out.data), "sync_request").clone();
    let request_id = body_str(&probe_env, "request_id").to_string();

    // Unknown request_id: no cache entry was ever made for it, so the
    // reflected event is discarded outright and nothing lands in the store.
    let bogus = identity_envelope("nobody", network_id, t);
    let out = deliver_response(&alice, "unknown-request-id", &bogus, t + 1);
    assert!(out.is_empty());
    assert!(!alice.pipeline.store.read().get_peer("nobody").unwrap().is_some());

    // Known request_id (the one Alice's own probe just cached): the
    // reflected identity event passes de-duplication (it's new) and is
    // validated, projected, and stored.
    let fresh = identity_envelope("carol", network_id, t);
    deliver_response(&alice, &request_id, &fresh, t + 2);

    assert!(alice.pipeline.store.read().get_peer("carol").unwrap().is_some());
    let event_id = quiet_core::crypto::event_id_for_ciphertext(&fresh);
    let row = alice.pipeline.store.read().get_event(&event_id).unwrap().unwrap();
    assert!(row.validated);
}

fn identity_envelope(peer_id: &str, network_id: &str, now_ms: i64) -> Vec<u8> {
    let plaintext = EventPlaintext::new(EventBody::Identity(IdentityEvent {
        peer_id: peer_id.to_string(),
        network_id: network_id.to_string(),
        name: None,
        created_at: now_ms,
        invite_code: None,
        public_key: "aa".repeat(16),
        seal_public_key: "bb".repeat(16),
    }));
    quiet_core::canonical::canonicalize_plaintext(&plaintext).unwrap().to_vec()
}

/// Deliver a reflected sync response: transit already stripped, `event_id`
/// derived from its own canonical bytes exactly as a real `decrypt_transit`
/// pass would, `in_response_to` carrying the correlation id a real
/// `SyncRequestHandler` reflection would stamp on it.
fn deliver_response(api: &Api, request_id: &str, canonical_bytes: &[u8], now_ms: i64) -> Vec<Envelope> {
    let mut env = Envelope::new();
    env.event_id = Some(quiet_core::crypto::event_id_for_ciphertext(canonical_bytes));
    env.event_ciphertext = Some(canonical_bytes.to_vec());
    env.in_response_to = Some(request_id.to_string());
    env.received_at = Some(now_ms);
    api.pipeline.drive_and_queue(vec![env], now_ms).unwrap()
}
