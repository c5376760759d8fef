//! §4.5 Scheduler: a table-driven job runner invoked once per `tick(now_ms)`
//! call (spec §6 process surface). Grounded on the teacher's own
//! `prober::scheduler::Scheduler` — interval tracking and a per-job success/
//! failure history (`ProbeHistory`) generalized from provider-probing to
//! named-job dispatch (Design Notes "decorator auto-registration → explicit
//! registries" applied the same way `HandlerRegistry`/`CommandRegistry` are).
//!
//! Two jobs are registered: `sync_request` (§4.3.11 probe, keeps the
//! gossip mesh converging without an operator manually invoking
//! `request_sync`) and `purge_sweep` (Design Notes "Purge TTL semantics":
//! "after TTL, a sweeper ... may reclaim them" — out of scope for the
//! protocol itself, needed for a real long-running daemon).

use std::time::Duration;

use serde_json::json;
use tracing::{debug, warn};

use crate::commands::CommandRegistry;
use crate::error::Result;
use crate::pipeline::Pipeline;
use crate::store::JobRun;

/// One entry in the job table: a name and how often it's allowed to fire.
struct JobEntry {
    name: &'static str,
    interval: Duration,
    run: fn(&Pipeline, &CommandRegistry, i64) -> Result<usize>,
}

pub struct Scheduler {
    jobs: Vec<JobEntry>,
    commands: CommandRegistry,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            jobs: vec![
                JobEntry { name: "sync_request", interval: Duration::from_secs(30), run: run_sync_request },
                JobEntry { name: "purge_sweep", interval: Duration::from_secs(3600), run: run_purge_sweep },
            ],
            commands: CommandRegistry::standard(),
        }
    }

    /// Run every job whose interval has elapsed since its last recorded
    /// run, persist the updated `job_states`/`job_runs` rows, and return
    /// the total envelope count the run produced (spec §6 `tick() ->
    /// envelopes_enqueued:int`).
    pub fn tick(&self, pipeline: &Pipeline, now_ms: i64) -> Result<usize> {
        let mut total = 0;
        for job in &self.jobs {
            let due = {
                let read = pipeline.store.read();
                match read.get_job_run(job.name)? {
                    run if run.last_run_ms == 0 => true,
                    run => now_ms.saturating_sub(run.last_run_ms) >= job.interval.as_millis() as i64,
                }
            };
            if !due {
                continue;
            }

            let outcome = (job.run)(pipeline, &self.commands, now_ms);
            let mut run = pipeline.store.read().get_job_run(job.name)?;
            run.job_name = job.name.to_string();
            run.last_run_ms = now_ms;
            match outcome {
                Ok(count) => {
                    run.last_success_ms = now_ms;
                    run.success_count += 1;
                    run.last_state = json!({"ok": true, "envelopes": count}).to_string();
                    total += count;
                }
                Err(e) => {
                    warn!(job = job.name, error = %e, "scheduler job failed");
                    run.last_failure_ms = now_ms;
                    run.failure_count += 1;
                    run.last_state = json!({"ok": false, "error": e.to_string()}).to_string();
                }
            }
            pipeline.store.write_txn(|write| write.put_job_run(&run))?;
        }
        Ok(total)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// One probe per local identity per tick (see DESIGN.md / SPEC_FULL.md
/// Open Question Decision #11 for why this isn't every known address).
fn run_sync_request(pipeline: &Pipeline, commands: &CommandRegistry, now_ms: i64) -> Result<usize> {
    let targets = {
        let read = pipeline.store.read();
        let mut targets = Vec::new();
        for identity in read.list_local_identities()? {
            let Some(peer) = read.get_peer(&identity.peer_id)? else { continue };
            let mut target = None;
            for other in read.list_identities_for_network(&peer.network_id)? {
                if other.peer_id == identity.peer_id {
                    continue;
                }
                if let Some(addr) = read.list_addresses_for_peer(&other.peer_id)?.into_iter().next() {
                    target = Some((identity.peer_id.clone(), peer.network_id.clone(), addr));
                    break;
                }
            }
            match target {
                Some(t) => targets.push(t),
                None => debug!(peer_id = %identity.peer_id, "sync_request: no reachable peer yet, skipping"),
            }
        }
        targets
    };

    let mut count = 0;
    for (peer_id, network_id, addr) in targets {
        let params = json!({
            "peer_id": peer_id,
            "network_id": network_id,
            "dest_ip": addr.address,
            "dest_port": addr.port,
        });
        let seed = {
            let read = pipeline.store.read();
            commands.dispatch("request_sync", params, &read, pipeline.crypto_mode(), now_ms)?
        };
        count += pipeline.drive_and_queue(seed, now_ms)?.len();
    }
    Ok(count)
}

fn run_purge_sweep(pipeline: &Pipeline, _commands: &CommandRegistry, now_ms: i64) -> Result<usize> {
    let reclaimed = pipeline.store.write_txn(|write| write.reclaim_expired_purges(now_ms))?;
    Ok(reclaimed)
}
