//! §6 process surface: `execute_command`, `execute_query`, `tick` — the
//! thin wrappers a future RPC/CLI layer calls. Out of scope per spec.md §1
//! is that outer layer itself, not this surface.

use std::collections::HashMap;

use quiet_core::CryptoMode;
use serde_json::Value;

use crate::commands::CommandRegistry;
use crate::error::Result;
use crate::pipeline::Pipeline;
use crate::queries::QueryRegistry;
use crate::scheduler::Scheduler;

/// §7: command/query dispatch returns this rather than a bare envelope
/// list — partial commits are impossible because the whole handler-runner
/// pass for a request runs inside one `write_txn` closure that only
/// commits on success.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CommandOutcome {
    /// Every terminal envelope's `event_id`, keyed by its `event_type` —
    /// a multi-envelope command (`create_network`, `accept_invite`) emits
    /// more than one entry.
    pub ids: HashMap<String, String>,
    /// The full terminal envelope set, for callers that need more than the
    /// id map (debugging, tests).
    pub data: Value,
}

pub struct Api {
    pub pipeline: Pipeline,
    commands: CommandRegistry,
    queries: QueryRegistry,
}

impl Api {
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline, commands: CommandRegistry::standard(), queries: QueryRegistry::standard() }
    }

    /// Build, sign, validate, project, and (if outgoing) enqueue a
    /// command's envelope(s) in one pipeline pass.
    pub fn execute_command(&self, name: &str, params: Value, mode: CryptoMode, now_ms: i64) -> Result<CommandOutcome> {
        let seed = {
            let read = self.pipeline.store.read();
            self.commands.dispatch(name, params, &read, mode, now_ms)?
        };
        let terminal = self.pipeline.drive_and_queue(seed, now_ms)?;

        let mut ids = HashMap::new();
        for env in &terminal {
            if let (Some(ty), Some(id)) = (&env.event_type, &env.event_id) {
                ids.insert(ty.clone(), id.clone());
            }
        }
        let data = serde_json::to_value(&terminal).map_err(quiet_core::Error::from)?;
        Ok(CommandOutcome { ids, data })
    }

    pub fn execute_query(&self, name: &str, params: Value) -> Result<Value> {
        let read = self.pipeline.store.read();
        self.queries.dispatch(name, params, &read)
    }

    /// Run every due scheduler job once; returns the number of envelopes
    /// the run produced (spec §6 `tick() -> envelopes_enqueued:int`).
    pub fn tick(&self, scheduler: &Scheduler, now_ms: i64) -> Result<usize> {
        scheduler.tick(&self.pipeline, now_ms)
    }
}
