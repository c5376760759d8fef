//! The runner: drains a FIFO queue of envelopes through the ordered
//! handler list (spec §4.3). Each pop finds the first handler whose filter
//! matches, calls it once, and requeues whatever it emits — including the
//! same envelope, mutated, to continue down the chain. An envelope for
//! which no handler fires is terminal.

use std::collections::VecDeque;

use quiet_core::Envelope;
use tracing::warn;

use crate::pipeline::ctx::PipelineCtx;
use crate::pipeline::registry::HandlerRegistry;

/// Bound on handler firings per original input envelope (spec §4.3, §8
/// invariant-adjacent termination rule: "the runner places a bound on
/// iterations per input (≥ 64)").
pub const MAX_ITERATIONS_PER_INPUT: u32 = 64;

pub struct Runner<'a> {
    registry: &'a HandlerRegistry,
}

impl<'a> Runner<'a> {
    pub fn new(registry: &'a HandlerRegistry) -> Self {
        Self { registry }
    }

    /// Drive `seed` to quiescence, returning every envelope that ended with
    /// no further handler firing (dropped, purged, or ran off the end of
    /// the pipeline as a terminal outgoing/reflect envelope).
    pub fn drive(&self, seed: Vec<Envelope>, ctx: &mut PipelineCtx) -> Vec<Envelope> {
        let mut queue: VecDeque<(Envelope, u32)> = seed.into_iter().map(|e| (e, 0)).collect();
        let mut terminal = Vec::new();

        while let Some((mut env, iterations)) = queue.pop_front() {
            if iterations >= MAX_ITERATIONS_PER_INPUT {
                warn!(iterations, "envelope exceeded max iterations, dropping");
                env.error = Some(format!("max iterations ({MAX_ITERATIONS_PER_INPUT}) exceeded"));
                terminal.push(env);
                continue;
            }

            let Some(handler) = self.registry.ordered().iter().find(|h| h.filter(&env)) else {
                terminal.push(env);
                continue;
            };

            match handler.process(env.clone(), ctx) {
                Ok(emitted) => {
                    for e in emitted {
                        queue.push_back((e, iterations + 1));
                    }
                }
                Err(err) => {
                    warn!(handler = handler.name(), error = %err, "handler returned error");
                    env.error = Some(err.to_string());
                    terminal.push(env);
                }
            }
        }

        terminal
    }
}
