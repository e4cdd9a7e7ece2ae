// Sweetgossip Core Library
// Written in 2020-2022 by
//     Dr. Maxim Orlovsky <orlovsky@pandoracore.com>
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.

//! Reverse onion route construction and peeling.
//!
//! As a broadcast fans out through relays towards potential repliers, each
//! relay wraps the route it received in a fresh layer naming itself,
//! encrypted to the *next* relay's public key. A replier hands the fully
//! wrapped route back unchanged in its [`crate::frame::ResponseFrame`]; each
//! relay on the way back peels exactly one layer to learn who to forward to
//! next, until the route is empty and the requester is reached.

use crate::crypto::{self, PrivateKey, PublicKey};

/// One hop of an onion route: the name of the peer that grew this layer,
/// i.e. the peer the holder of the *next* layer should forward to.
#[derive(Clone, PartialEq, Eq, Debug, StrictEncode, StrictDecode)]
pub struct OnionLayer {
    pub peer_name: String,
}

#[derive(Clone, StrictEncode, StrictDecode)]
struct OnionEnvelope {
    layer: OnionLayer,
    rest: Vec<u8>,
}

/// An opaque, layered onion-encrypted route.
///
/// Grows outward-in as a broadcast propagates (each relay wraps what it
/// received) and peels inward-out as a reply travels back (each relay
/// removes the layer it wrapped).
#[derive(Clone, Default, StrictEncode, StrictDecode)]
pub struct OnionRoute {
    ciphertext: Vec<u8>,
}

impl std::fmt::Debug for OnionRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "OnionRoute({} bytes)", self.ciphertext.len())
    }
}

impl OnionRoute {
    /// An onion route with no layers, i.e. the requester's own position.
    pub fn empty() -> Self {
        Self::default()
    }

    /// True once every layer has been peeled off.
    pub fn is_empty(&self) -> bool {
        self.ciphertext.is_empty()
    }

    /// Wraps this route in a new outer layer naming `layer`, encrypted so
    /// that only the holder of `recipient`'s private key can peel it.
    pub fn grow(&self, layer: OnionLayer, recipient: &PublicKey) -> Result<OnionRoute, crypto::Error> {
        let envelope = OnionEnvelope { layer, rest: self.ciphertext.clone() };
        let ciphertext = crypto::encrypt_object(&envelope, recipient)?;
        Ok(OnionRoute { ciphertext })
    }

    /// Removes and returns the outermost layer, decrypting it with
    /// `private_key`. Mutates the route in place to the remaining,
    /// still-wrapped tail.
    pub fn peel(&mut self, private_key: &PrivateKey) -> Result<OnionLayer, crypto::Error> {
        let envelope: OnionEnvelope = crypto::decrypt_object(&self.ciphertext, private_key)?;
        self.ciphertext = envelope.rest;
        Ok(envelope.layer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secp256k1::rand::rngs::OsRng;

    fn keypair() -> (PrivateKey, PublicKey) {
        secp256k1::SECP256K1.generate_keypair(&mut OsRng)
    }

    #[test]
    fn grow_then_peel_in_lifo_order() {
        let (sk_a, pk_a) = keypair();
        let (sk_b, pk_b) = keypair();

        let route = OnionRoute::empty();
        let route = route.grow(OnionLayer { peer_name: "alice".into() }, &pk_a).unwrap();
        let mut route = route.grow(OnionLayer { peer_name: "bob".into() }, &pk_b).unwrap();

        assert!(!route.is_empty());
        let outer = route.peel(&sk_b).unwrap();
        assert_eq!(outer.peer_name, "bob");
        assert!(!route.is_empty());

        let inner = route.peel(&sk_a).unwrap();
        assert_eq!(inner.peer_name, "alice");
        assert!(route.is_empty());
    }

    #[test]
    fn peel_with_wrong_key_fails() {
        let (sk_a, pk_a) = keypair();
        let (sk_other, _pk_other) = keypair();
        let mut route = OnionRoute::empty()
            .grow(OnionLayer { peer_name: "alice".into() }, &pk_a)
            .unwrap();
        assert!(route.peel(&sk_other).is_err());
    }

    #[test]
    fn empty_route_has_no_layers() {
        assert!(OnionRoute::empty().is_empty());
    }
}
