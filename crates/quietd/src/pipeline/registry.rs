//! The handler registry: an ordered `Vec<Box<dyn Handler>>`, explicit
//! registration, no decorator/directory-scan magic (Design Notes "decorator
//! auto-registration → explicit registries"). Grounded on the original's
//! `core/handler.py` `Handler` ABC + `HandlerRegistry`, translated to Rust
//! trait objects.

use quiet_core::Envelope;

use crate::error::Result;
use crate::pipeline::ctx::PipelineCtx;

pub trait Handler: Send + Sync {
    fn name(&self) -> &'static str;
    fn filter(&self, env: &Envelope) -> bool;
    fn process(&self, env: Envelope, ctx: &mut PipelineCtx) -> Result<Vec<Envelope>>;
}

pub struct HandlerRegistry {
    handlers: Vec<Box<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    pub fn register(&mut self, handler: Box<dyn Handler>) -> &mut Self {
        self.handlers.push(handler);
        self
    }

    pub fn ordered(&self) -> &[Box<dyn Handler>] {
        &self.handlers
    }

    /// The canonical handler chain, in the order spec §4.3 enumerates it.
    pub fn standard() -> Self {
        use crate::pipeline::handlers::*;

        let mut r = Self::new();
        r.register(Box::new(receive_from_network::ReceiveFromNetwork))
            .register(Box::new(resolve_deps::ResolveDeps))
            .register(Box::new(decrypt_transit::DecryptTransit))
            .register(Box::new(remove::Remove))
            .register(Box::new(event_crypto::EventCrypto))
            .register(Box::new(signature::Signature))
            .register(Box::new(membership::MembershipCheck))
            .register(Box::new(validate::Validate))
            .register(Box::new(project::Project))
            .register(Box::new(event_store::EventStore))
            .register(Box::new(outgoing::CheckOutgoing))
            .register(Box::new(outgoing::TransitEncrypt))
            .register(Box::new(outgoing::SendToNetwork))
            .register(Box::new(sync::SyncRequestHandler))
            .register(Box::new(sync::SyncResponseHandler));
        r
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
