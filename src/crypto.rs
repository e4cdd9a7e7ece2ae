// Sweetgossip Core Library
// Written in 2020-2022 by
//     Dr. Maxim Orlovsky <orlovsky@pandoracore.com>
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.

//! Asymmetric signatures, ECIES-style asymmetric encryption and symmetric
//! hash-locked preimages used throughout the protocol.
//!
//! All objects that are signed or encrypted are first reduced to a
//! canonical byte string through [`strict_encoding`], so that the digest
//! and ciphertext are stable across implementations and process runs.

use bitcoin_hashes::{sha256, Hash, HashEngine};
use chacha20poly1305::aead::{Aead, NewAead};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hkdf::Hkdf;
use rand::RngCore;
use secp256k1::ecdh::SharedSecret;
use secp256k1::rand::rngs::OsRng;
use sha2::Sha256;
use strict_encoding::{StrictDecode, StrictEncode};

/// Public key used both for signature verification and for ECIES
/// asymmetric encryption.
pub type PublicKey = secp256k1::PublicKey;
/// Private key counterpart to [`PublicKey`].
pub type PrivateKey = secp256k1::SecretKey;
/// Detached ECDSA signature over an object digest.
pub type Signature = secp256k1::ecdsa::Signature;

/// Hash of a 32-byte preimage, used as the payment-channel hash lock.
///
/// Wraps a plain byte array rather than `bitcoin_hashes::sha256::Hash`
/// directly so it can be embedded in strict-encoded wire structs without
/// relying on a foreign crate's encoding impl.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, StrictEncode, StrictDecode)]
pub struct PaymentHash([u8; 32]);

impl std::fmt::Debug for PaymentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "PaymentHash(")?;
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, ")")
    }
}

impl From<sha256::Hash> for PaymentHash {
    fn from(hash: sha256::Hash) -> Self {
        Self(hash.into_inner())
    }
}

const NONCE_LEN: usize = 12;
const EPHEMERAL_PUBKEY_LEN: usize = 33;

#[derive(Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum Error {
    /// object could not be reduced to its canonical binary representation
    #[from]
    Encoding(strict_encoding::Error),

    /// signature does not match the object and the claimed signing key
    InvalidSignature,

    /// ciphertext is malformed or too short to contain an ephemeral key and nonce
    MalformedCiphertext,

    /// authenticated decryption failed: wrong key or tampered ciphertext
    DecryptionFailed,
}

/// Symmetric key shared between a replier and a single hop (or the
/// requester), doubling as a payment-channel preimage.
///
/// `Debug` is redacted so the key never leaks into logs.
#[derive(Clone, Copy, PartialEq, Eq, StrictEncode, StrictDecode)]
pub struct SymmetricKey([u8; 32]);

impl SymmetricKey {
    /// Generates a fresh, cryptographically random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() != 32 {
            return None;
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(slice);
        Some(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("SymmetricKey(..)")
    }
}

/// Computes the payment hash locking a preimage, i.e. `sha256(preimage)`.
pub fn compute_payment_hash(preimage: &SymmetricKey) -> PaymentHash {
    sha256::Hash::hash(preimage.as_bytes()).into()
}

fn digest_object<T: StrictEncode>(object: &T) -> Result<sha256::Hash, Error> {
    let bytes = object.strict_serialize()?;
    let mut engine = sha256::Hash::engine();
    engine.input(&bytes);
    Ok(sha256::Hash::from_engine(engine))
}

/// Signs the canonical encoding of `object` with `private_key`.
pub fn sign_object<T: StrictEncode>(
    object: &T,
    private_key: &PrivateKey,
) -> Result<Signature, Error> {
    let digest = digest_object(object)?;
    Ok(sign_digest(&digest, private_key))
}

/// Verifies that `signature` was produced by the owner of `public_key` over
/// the canonical encoding of `object`.
pub fn verify_object<T: StrictEncode>(
    object: &T,
    signature: &Signature,
    public_key: &PublicKey,
) -> Result<(), Error> {
    let digest = digest_object(object)?;
    if verify_digest(&digest, signature, public_key) {
        Ok(())
    } else {
        Err(Error::InvalidSignature)
    }
}

/// Signs a raw 32-byte digest.
pub fn sign_digest(digest: &sha256::Hash, private_key: &PrivateKey) -> Signature {
    let secp = secp256k1::SECP256K1;
    let message = secp256k1::Message::from_slice(digest.as_inner())
        .expect("sha256 digest is always a valid 32-byte message");
    secp.sign_ecdsa(&message, private_key)
}

/// Verifies a signature over a raw 32-byte digest.
pub fn verify_digest(digest: &sha256::Hash, signature: &Signature, public_key: &PublicKey) -> bool {
    let secp = secp256k1::SECP256K1;
    let message = secp256k1::Message::from_slice(digest.as_inner())
        .expect("sha256 digest is always a valid 32-byte message");
    secp.verify_ecdsa(&message, signature, public_key).is_ok()
}

/// Derives a ChaCha20-Poly1305 key from an ECDH shared secret via
/// HKDF-SHA256, with a fixed application-level info string.
fn derive_aead_key(shared_secret: &SharedSecret) -> Key {
    let hk = Hkdf::<Sha256>::new(None, shared_secret.as_ref());
    let mut okm = [0u8; 32];
    hk.expand(b"sweetgossip/onion-layer", &mut okm)
        .expect("32 bytes is a valid HKDF-SHA256 output length");
    *Key::from_slice(&okm)
}

/// Encrypts `plaintext` for the holder of `recipient` using an ephemeral
/// ECDH handshake (ECIES). Wire format is
/// `ephemeral_pubkey(33) || nonce(12) || ciphertext`.
pub fn encrypt_bytes(plaintext: &[u8], recipient: &PublicKey) -> Vec<u8> {
    let secp = secp256k1::SECP256K1;
    let (ephemeral_sk, ephemeral_pk) = secp.generate_keypair(&mut OsRng);
    let shared_secret = SharedSecret::new(recipient, &ephemeral_sk);
    let key = derive_aead_key(&shared_secret);

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let cipher = ChaCha20Poly1305::new(&key);
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .expect("chacha20poly1305 encryption over in-memory buffers cannot fail");

    let mut out = Vec::with_capacity(EPHEMERAL_PUBKEY_LEN + NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&ephemeral_pk.serialize());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    out
}

/// Decrypts a ciphertext produced by [`encrypt_bytes`] using `private_key`.
pub fn decrypt_bytes(ciphertext: &[u8], private_key: &PrivateKey) -> Result<Vec<u8>, Error> {
    if ciphertext.len() < EPHEMERAL_PUBKEY_LEN + NONCE_LEN {
        return Err(Error::MalformedCiphertext);
    }
    let (ephemeral_pk_bytes, rest) = ciphertext.split_at(EPHEMERAL_PUBKEY_LEN);
    let (nonce_bytes, body) = rest.split_at(NONCE_LEN);

    let ephemeral_pk = PublicKey::from_slice(ephemeral_pk_bytes)
        .map_err(|_| Error::MalformedCiphertext)?;
    let shared_secret = SharedSecret::new(&ephemeral_pk, private_key);
    let key = derive_aead_key(&shared_secret);
    let nonce = Nonce::from_slice(nonce_bytes);

    let cipher = ChaCha20Poly1305::new(&key);
    cipher
        .decrypt(nonce, body)
        .map_err(|_| Error::DecryptionFailed)
}

/// Encrypts the canonical encoding of `object` for `recipient`.
pub fn encrypt_object<T: StrictEncode>(object: &T, recipient: &PublicKey) -> Result<Vec<u8>, Error> {
    let bytes = object.strict_serialize()?;
    Ok(encrypt_bytes(&bytes, recipient))
}

/// Decrypts and decodes an object previously produced by [`encrypt_object`].
pub fn decrypt_object<T: StrictDecode>(ciphertext: &[u8], private_key: &PrivateKey) -> Result<T, Error> {
    let bytes = decrypt_bytes(ciphertext, private_key)?;
    T::strict_deserialize(&bytes).map_err(Error::from)
}

/// Symmetrically encrypts `plaintext` under `key` with a random nonce
/// prepended to the ciphertext.
pub fn symmetric_encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Vec<u8> {
    let aead_key = Key::from_slice(key.as_bytes());
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let cipher = ChaCha20Poly1305::new(aead_key);
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .expect("chacha20poly1305 encryption over in-memory buffers cannot fail");

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    out
}

/// Reverses [`symmetric_encrypt`]; fails if `key` is wrong or the
/// ciphertext was produced under a different key/order of layers.
pub fn symmetric_decrypt(key: &SymmetricKey, ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
    if ciphertext.len() < NONCE_LEN {
        return Err(Error::MalformedCiphertext);
    }
    let (nonce_bytes, body) = ciphertext.split_at(NONCE_LEN);
    let aead_key = Key::from_slice(key.as_bytes());
    let nonce = Nonce::from_slice(nonce_bytes);
    let cipher = ChaCha20Poly1305::new(aead_key);
    cipher.decrypt(nonce, body).map_err(|_| Error::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, PartialEq, Eq, Debug, StrictEncode, StrictDecode)]
    struct Greeting {
        text: String,
    }

    #[test]
    fn sign_and_verify_roundtrip() {
        let secp = secp256k1::SECP256K1;
        let (sk, pk) = secp.generate_keypair(&mut OsRng);
        let object = Greeting { text: "hello".to_owned() };
        let sig = sign_object(&object, &sk).unwrap();
        assert!(verify_object(&object, &sig, &pk).is_ok());
    }

    #[test]
    fn verify_rejects_tampered_object() {
        let secp = secp256k1::SECP256K1;
        let (sk, pk) = secp.generate_keypair(&mut OsRng);
        let object = Greeting { text: "hello".to_owned() };
        let sig = sign_object(&object, &sk).unwrap();
        let tampered = Greeting { text: "goodbye".to_owned() };
        assert!(verify_object(&tampered, &sig, &pk).is_err());
    }

    #[test]
    fn asymmetric_roundtrip() {
        let secp = secp256k1::SECP256K1;
        let (sk, pk) = secp.generate_keypair(&mut OsRng);
        let plaintext = b"the quick brown fox";
        let ciphertext = encrypt_bytes(plaintext, &pk);
        let decrypted = decrypt_bytes(&ciphertext, &sk).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn asymmetric_decrypt_fails_with_wrong_key() {
        let secp = secp256k1::SECP256K1;
        let (_sk, pk) = secp.generate_keypair(&mut OsRng);
        let (other_sk, _other_pk) = secp.generate_keypair(&mut OsRng);
        let ciphertext = encrypt_bytes(b"secret", &pk);
        assert!(decrypt_bytes(&ciphertext, &other_sk).is_err());
    }

    #[test]
    fn symmetric_roundtrip() {
        let key = SymmetricKey::generate();
        let ciphertext = symmetric_encrypt(&key, b"payload");
        let plaintext = symmetric_decrypt(&key, &ciphertext).unwrap();
        assert_eq!(plaintext, b"payload");
    }

    #[test]
    fn payment_hash_is_deterministic() {
        let key = SymmetricKey::generate();
        assert_eq!(compute_payment_hash(&key), compute_payment_hash(&key));
    }
}
