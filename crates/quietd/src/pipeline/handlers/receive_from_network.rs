//! §4.3.1 Receive-from-network. Grounded on
//! `original_source/protocols/quiet/handlers/receive_from_network.py`.

use quiet_core::Envelope;

use crate::error::Result;
use crate::pipeline::ctx::PipelineCtx;
use crate::pipeline::registry::Handler;

pub struct ReceiveFromNetwork;

impl Handler for ReceiveFromNetwork {
    fn name(&self) -> &'static str {
        "receive_from_network"
    }

    fn filter(&self, env: &Envelope) -> bool {
        env.raw_data.is_some() && env.transit_key_id.is_none()
    }

    fn process(&self, env: Envelope, _ctx: &mut PipelineCtx) -> Result<Vec<Envelope>> {
        let Some(raw_data) = &env.raw_data else { return Ok(vec![]) };
        // Short datagrams can't carry a 32-byte transit key id; drop
        // silently (spec §8 S5: "no envelope is emitted; no store mutation").
        if raw_data.len() < 33 {
            return Ok(vec![]);
        }

        let (key_bytes, transit_ciphertext) = raw_data.split_at(32);
        let transit_key_id = hex::encode(key_bytes);

        let mut next = Envelope::new();
        next.transit_key_id = Some(transit_key_id.clone());
        next.transit_ciphertext = Some(transit_ciphertext.to_vec());
        next.origin_ip = env.origin_ip.clone();
        next.origin_port = env.origin_port;
        next.received_at = env.received_at;
        next.deps = vec![format!("transit_key:{transit_key_id}")];

        Ok(vec![next])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_datagram_is_dropped() {
        let mut env = Envelope::new();
        env.raw_data = Some(b"short".to_vec());
        assert!(ReceiveFromNetwork.filter(&env));
        let mut cache = std::collections::HashMap::new();
        let store = crate::store::Store::open_in_memory().unwrap();
        let out = store
            .write_txn(|w| {
                let mut ctx = PipelineCtx {
                    store: w,
                    crypto_mode: quiet_core::CryptoMode::Dummy,
                    now_ms: 0,
                    outbox: vec![],
                    sync_cache: &mut cache,
                };
                ReceiveFromNetwork.process(env, &mut ctx)
            })
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn well_formed_datagram_splits_transit_key_and_ciphertext() {
        let mut env = Envelope::new();
        let mut raw = vec![0xAB; 32];
        raw.extend_from_slice(b"ciphertext-bytes");
        env.raw_data = Some(raw);
        let mut cache = std::collections::HashMap::new();
        let store = crate::store::Store::open_in_memory().unwrap();
        let out = store
            .write_txn(|w| {
                let mut ctx = PipelineCtx {
                    store: w,
                    crypto_mode: quiet_core::CryptoMode::Dummy,
                    now_ms: 0,
                    outbox: vec![],
                    sync_cache: &mut cache,
                };
                ReceiveFromNetwork.process(env, &mut ctx)
            })
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].transit_key_id.as_deref(), Some("ab".repeat(32).as_str()));
        assert_eq!(out[0].transit_ciphertext.as_deref(), Some(b"ciphertext-bytes".as_slice()));
        assert_eq!(out[0].deps, vec![format!("transit_key:{}", "ab".repeat(32))]);
    }
}
