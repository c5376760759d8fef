//! §4.3.9 Event-store. Grounded on
//! `original_source/protocols/quiet/handlers/event_store.py`: persist
//! `write_to_store` envelopes, rejecting resubmission of a tombstoned id.

use quiet_core::Envelope;

use crate::error::Result;
use crate::pipeline::ctx::PipelineCtx;
use crate::pipeline::registry::Handler;
use crate::store::EventRow;

pub struct EventStore;

impl Handler for EventStore {
    fn name(&self) -> &'static str {
        "event_store"
    }

    fn filter(&self, env: &Envelope) -> bool {
        env.flags.write_to_store && env.event_id.is_some() && !env.flags.stored
    }

    fn process(&self, mut env: Envelope, ctx: &mut PipelineCtx) -> Result<Vec<Envelope>> {
        let event_id = env.event_id.clone().unwrap_or_default();

        if let Some(existing) = ctx.store.get_event(&event_id)? {
            if existing.purged {
                env.error = Some(format!("event {event_id} is purged"));
                return Ok(vec![]);
            }
            ctx.store.mark_stored(&event_id)?;
            env.flags.stored = true;
            return Ok(vec![env]);
        }

        ctx.store.put_event(&EventRow {
            event_id: event_id.clone(),
            event_type: env.event_type.clone().unwrap_or_default(),
            event_ciphertext: env.event_ciphertext.clone().unwrap_or_default(),
            event_key_id: env.event_key_id.clone(),
            received_at: env.received_at.unwrap_or(ctx.now_ms),
            origin_ip: env.origin_ip.clone(),
            origin_port: env.origin_port,
            stored_at: ctx.now_ms,
            purged: false,
            purged_at: None,
            purged_reason: None,
            ttl_expire_at: None,
            validated: env.flags.validated,
        })?;
        env.flags.stored = true;
        Ok(vec![env])
    }
}
