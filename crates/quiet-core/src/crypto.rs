//! Cryptographic primitives for the envelope pipeline (spec §4.2).
//!
//! Two layers of AEAD wrap every event on the wire (transit, then event),
//! plus Ed25519 signing of plaintext, sealed-box key distribution, and
//! content-addressed hashing. [`CryptoMode`] selects between `Real`
//! (Ed25519 + XChaCha20-Poly1305 + X25519 ECDH) and `Dummy` (deterministic,
//! non-secret, used by tests that don't want real key material). Mode is
//! threaded explicitly through every call rather than held in a global, per
//! the "explicit context over hidden singleton" design choice.

use blake2::digest::{Update, VariableOutput};
use blake2::Blake2bVar;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};

use crate::error::{Error, Result};

/// How key material is produced and how AEAD/signatures behave. `Dummy` is
/// deterministic and recoverable (no real secrecy) so tests can assert on
/// fixed ciphertexts/signatures without generating and threading real keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CryptoMode {
    Real,
    Dummy,
}

impl Default for CryptoMode {
    fn default() -> Self {
        CryptoMode::Real
    }
}

impl std::str::FromStr for CryptoMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "real" => Ok(CryptoMode::Real),
            "dummy" => Ok(CryptoMode::Dummy),
            other => Err(Error::InputMalformed(format!("unknown CRYPTO_MODE: {other}"))),
        }
    }
}

/// An Ed25519 keypair, encoded as it travels through envelopes: hex strings.
#[derive(Clone, Debug)]
pub struct Keypair {
    pub public_key: String,
    pub private_key: String,
}

/// Generate a fresh signing keypair.
pub fn keypair(mode: CryptoMode) -> Keypair {
    match mode {
        CryptoMode::Real => {
            let signing_key = SigningKey::generate(&mut OsRng);
            Keypair {
                public_key: hex::encode(signing_key.verifying_key().to_bytes()),
                private_key: hex::encode(signing_key.to_bytes()),
            }
        }
        CryptoMode::Dummy => {
            // Still a real Ed25519 key (so sign/verify keep working), just
            // generated the same way — dummy mode changes AEAD/signature
            // *behavior* below, not key generation.
            let signing_key = SigningKey::generate(&mut OsRng);
            Keypair {
                public_key: hex::encode(signing_key.verifying_key().to_bytes()),
                private_key: hex::encode(signing_key.to_bytes()),
            }
        }
    }
}

/// An X25519 sealing keypair, hex-encoded like [`Keypair`]. Generated
/// alongside a fresh identity's signing keypair (DESIGN.md Open Question
/// Decision #4) so peers can seal group/channel keys to this identity.
#[derive(Clone, Debug)]
pub struct SealKeypair {
    pub public_key: String,
    pub private_key: String,
}

/// Generate a fresh X25519 sealing keypair.
pub fn seal_keypair(_mode: CryptoMode) -> SealKeypair {
    let secret = StaticSecret::random_from_rng(OsRng);
    let public = X25519Public::from(&secret);
    SealKeypair { public_key: hex::encode(public.as_bytes()), private_key: hex::encode(secret.to_bytes()) }
}

fn signing_key_from_hex(private_key_hex: &str) -> Result<SigningKey> {
    let bytes = hex::decode(private_key_hex).map_err(|e| Error::InvalidKeyMaterial(e.to_string()))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| Error::InvalidKeyMaterial("private key must be 32 bytes".into()))?;
    Ok(SigningKey::from_bytes(&bytes))
}

fn verifying_key_from_hex(public_key_hex: &str) -> Result<VerifyingKey> {
    let bytes = hex::decode(public_key_hex).map_err(|e| Error::InvalidKeyMaterial(e.to_string()))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| Error::InvalidKeyMaterial("public key must be 32 bytes".into()))?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| Error::InvalidKeyMaterial(e.to_string()))
}

/// Sign `msg` with a hex-encoded Ed25519 private key. Returns a hex signature.
pub fn sign(_mode: CryptoMode, msg: &[u8], private_key_hex: &str) -> Result<String> {
    let signing_key = signing_key_from_hex(private_key_hex)?;
    let sig: Signature = signing_key.sign(msg);
    Ok(hex::encode(sig.to_bytes()))
}

/// Verify `sig` (hex) over `msg` against a hex-encoded Ed25519 public key.
pub fn verify(_mode: CryptoMode, msg: &[u8], sig_hex: &str, public_key_hex: &str) -> Result<bool> {
    let verifying_key = verifying_key_from_hex(public_key_hex)?;
    let sig_bytes = hex::decode(sig_hex).map_err(|e| Error::InvalidKeyMaterial(e.to_string()))?;
    let sig_bytes: [u8; 64] = sig_bytes
        .try_into()
        .map_err(|_| Error::InvalidKeyMaterial("signature must be 64 bytes".into()))?;
    let sig = Signature::from_bytes(&sig_bytes);
    Ok(verifying_key.verify(msg, &sig).is_ok())
}

/// AEAD-encrypt `plaintext` under `key` (32 bytes), producing `nonce ‖
/// ciphertext` where `nonce` is the 24-byte XChaCha20-Poly1305 nonce (spec
/// §4.3.4 assumes exactly this layout for the transit layer; the event
/// layer reuses the same primitive). In `Dummy` mode the nonce is still
/// generated but the body is a reversible XOR keystream instead of a real
/// cipher, so tests don't need to carry real key material.
pub fn aead_encrypt(mode: CryptoMode, plaintext: &[u8], key: &[u8; 32]) -> Result<Vec<u8>> {
    let mut nonce_bytes = [0u8; 24];
    OsRng.fill_bytes(&mut nonce_bytes);
    let body = match mode {
        CryptoMode::Real => {
            let cipher = XChaCha20Poly1305::new(key.into());
            let nonce = XNonce::from_slice(&nonce_bytes);
            cipher
                .encrypt(nonce, Payload { msg: plaintext, aad: b"" })
                .map_err(|_| Error::DecryptFailed)?
        }
        CryptoMode::Dummy => dummy_xor(plaintext, key),
    };
    let mut out = Vec::with_capacity(24 + body.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Inverse of [`aead_encrypt`]: `data` is `nonce ‖ ciphertext`.
pub fn aead_decrypt(mode: CryptoMode, data: &[u8], key: &[u8; 32]) -> Result<Vec<u8>> {
    if data.len() < 24 {
        return Err(Error::InputMalformed("AEAD payload shorter than nonce".into()));
    }
    let (nonce_bytes, ciphertext) = data.split_at(24);
    match mode {
        CryptoMode::Real => {
            let cipher = XChaCha20Poly1305::new(key.into());
            let nonce = XNonce::from_slice(nonce_bytes);
            cipher
                .decrypt(nonce, Payload { msg: ciphertext, aad: b"" })
                .map_err(|_| Error::DecryptFailed)
        }
        CryptoMode::Dummy => Ok(dummy_xor(ciphertext, key)),
    }
}

fn dummy_xor(data: &[u8], key: &[u8; 32]) -> Vec<u8> {
    data.iter().enumerate().map(|(i, b)| b ^ key[i % key.len()]).collect()
}

/// Sealed-box encrypt: a one-shot ephemeral X25519 sender encrypts `data` to
/// `recipient_pub` (32-byte X25519 public key) with no return-trip needed by
/// the sender. Wire format: `ephemeral_pubkey(32) ‖ nonce(24) ‖ ciphertext`.
pub fn sealed_box_encrypt(mode: CryptoMode, data: &[u8], recipient_pub: &[u8; 32]) -> Result<Vec<u8>> {
    let ephemeral_secret = StaticSecret::random_from_rng(OsRng);
    let ephemeral_public = X25519Public::from(&ephemeral_secret);
    let recipient = X25519Public::from(*recipient_pub);
    let shared = ephemeral_secret.diffie_hellman(&recipient);

    let key = sealed_box_kdf(shared.as_bytes(), ephemeral_public.as_bytes(), recipient_pub);
    let aead_payload = aead_encrypt(mode, data, &key)?;

    let mut out = Vec::with_capacity(32 + aead_payload.len());
    out.extend_from_slice(ephemeral_public.as_bytes());
    out.extend_from_slice(&aead_payload);
    Ok(out)
}

/// Sealed-box open: `recipient_secret` is the 32-byte X25519 private key
/// matching the public key `data` was sealed to.
pub fn sealed_box_open(mode: CryptoMode, data: &[u8], recipient_secret: &[u8; 32]) -> Result<Vec<u8>> {
    if data.len() < 32 {
        return Err(Error::InputMalformed("sealed box shorter than ephemeral pubkey".into()));
    }
    let (ephemeral_pub_bytes, aead_payload) = data.split_at(32);
    let ephemeral_pub_arr: [u8; 32] = ephemeral_pub_bytes
        .try_into()
        .map_err(|_| Error::InputMalformed("malformed ephemeral pubkey".into()))?;
    let ephemeral_public = X25519Public::from(ephemeral_pub_arr);
    let secret = StaticSecret::from(*recipient_secret);
    let recipient_public = X25519Public::from(&secret);
    let shared = secret.diffie_hellman(&ephemeral_public);

    let key = sealed_box_kdf(shared.as_bytes(), &ephemeral_pub_arr, recipient_public.as_bytes());
    aead_decrypt(mode, aead_payload, &key)
}

fn sealed_box_kdf(shared_secret: &[u8], ephemeral_pub: &[u8; 32], recipient_pub: &[u8; 32]) -> [u8; 32] {
    let hkdf = Hkdf::<Sha256>::new(None, shared_secret);
    let mut info = Vec::with_capacity(64 + b"quiet-sealed-box".len());
    info.extend_from_slice(b"quiet-sealed-box");
    info.extend_from_slice(ephemeral_pub);
    info.extend_from_slice(recipient_pub);
    let mut key = [0u8; 32];
    hkdf.expand(&info, &mut key)
        .expect("HKDF-SHA256 expand to 32 bytes cannot fail");
    key
}

/// BLAKE2b over `data`, with the digest configured to `out_len` bytes (the
/// spec uses `out_len = 32` for content-addressed `event_id`s).
pub fn blake2b(data: &[u8], out_len: usize) -> Vec<u8> {
    let mut hasher = Blake2bVar::new(out_len).expect("valid BLAKE2b output length");
    hasher.update(data);
    let mut out = vec![0u8; out_len];
    hasher
        .finalize_variable(&mut out)
        .expect("output buffer matches requested length");
    out
}

/// BLAKE2b-256 of `ciphertext`, hex-encoded — the `event_id` derivation
/// (spec §4.1): content-addressed, stable across re-encryption that
/// reproduces the same ciphertext bytes.
pub fn event_id_for_ciphertext(ciphertext: &[u8]) -> String {
    hex::encode(blake2b(ciphertext, 32))
}

/// Argon2id-style key derivation from a password and salt, producing a
/// 32-byte key. Used for local secrets derived from user-supplied material
/// (e.g. at-rest store passphrases); never on the signing or AEAD hot path.
pub fn kdf(password: &[u8], salt: &[u8]) -> Result<[u8; 32]> {
    use argon2::{Algorithm, Argon2, Params, Version};
    let params = Params::new(19 * 1024, 2, 1, Some(32)).map_err(|e| Error::InvalidKeyMaterial(e.to_string()))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut out = [0u8; 32];
    argon2
        .hash_password_into(password, salt, &mut out)
        .map_err(|e| Error::InvalidKeyMaterial(e.to_string()))?;
    Ok(out)
}

/// Generate a random 32-byte symmetric secret (transit secrets, group keys).
pub fn random_secret() -> [u8; 32] {
    let mut out = [0u8; 32];
    OsRng.fill_bytes(&mut out);
    out
}

/// Generate a random X25519 keypair, hex-encoded, for sealed-box recipients.
pub fn x25519_keypair() -> Keypair {
    let secret = StaticSecret::random_from_rng(OsRng);
    let public = X25519Public::from(&secret);
    Keypair {
        public_key: hex::encode(public.to_bytes()),
        private_key: hex::encode(secret.to_bytes()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_round_trips() {
        let kp = keypair(CryptoMode::Real);
        let msg = b"hello quiet";
        let sig = sign(CryptoMode::Real, msg, &kp.private_key).unwrap();
        assert!(verify(CryptoMode::Real, msg, &sig, &kp.public_key).unwrap());
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let kp = keypair(CryptoMode::Real);
        let sig = sign(CryptoMode::Real, b"hello", &kp.private_key).unwrap();
        assert!(!verify(CryptoMode::Real, b"goodbye", &sig, &kp.public_key).unwrap());
    }

    #[test]
    fn aead_round_trips_real_mode() {
        let key = random_secret();
        let ciphertext = aead_encrypt(CryptoMode::Real, b"plaintext", &key).unwrap();
        let plaintext = aead_decrypt(CryptoMode::Real, &ciphertext, &key).unwrap();
        assert_eq!(plaintext, b"plaintext");
    }

    #[test]
    fn aead_round_trips_dummy_mode() {
        let key = [7u8; 32];
        let ciphertext = aead_encrypt(CryptoMode::Dummy, b"plaintext", &key).unwrap();
        let plaintext = aead_decrypt(CryptoMode::Dummy, &ciphertext, &key).unwrap();
        assert_eq!(plaintext, b"plaintext");
    }

    #[test]
    fn sealed_box_round_trips() {
        let recipient = x25519_keypair();
        let recipient_secret: [u8; 32] = hex::decode(&recipient.private_key).unwrap().try_into().unwrap();
        let recipient_pub: [u8; 32] = hex::decode(&recipient.public_key).unwrap().try_into().unwrap();

        let sealed = sealed_box_encrypt(CryptoMode::Real, b"group key material", &recipient_pub).unwrap();
        let opened = sealed_box_open(CryptoMode::Real, &sealed, &recipient_secret).unwrap();
        assert_eq!(opened, b"group key material");
    }

    #[test]
    fn event_id_is_deterministic_and_content_addressed() {
        let a = event_id_for_ciphertext(b"same bytes");
        let b = event_id_for_ciphertext(b"same bytes");
        let c = event_id_for_ciphertext(b"different bytes");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64); // 32 bytes hex-encoded
    }

    #[test]
    fn kdf_is_deterministic_for_same_salt() {
        let a = kdf(b"password", b"saltsaltsaltsalt").unwrap();
        let b = kdf(b"password", b"saltsaltsaltsalt").unwrap();
        let c = kdf(b"password", b"different-salt!!").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
