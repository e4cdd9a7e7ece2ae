// Sweetgossip Core Library
// Written in 2020-2022 by
//     Dr. Maxim Orlovsky <orlovsky@pandoracore.com>
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.

//! Peer connectivity and message dispatch.
//!
//! The wire transport itself (framing, connection setup, retries) is out
//! of scope for this crate: [`PeerHandle`] is the seam a surrounding
//! service implements to actually move bytes. What lives here is the
//! closed set of messages a node can send and receive.

use crate::crypto::PublicKey;
use crate::frame::{AskForBroadcastFrame, PowBroadcastConditionsFrame, PowBroadcastFrame, ResponseFrame};

/// The four message kinds a node exchanges with its peers.
#[derive(Clone, Debug)]
pub enum Message {
    AskForBroadcast(AskForBroadcastFrame),
    PowBroadcastConditions(PowBroadcastConditionsFrame),
    PowBroadcast(PowBroadcastFrame),
    Response(ResponseFrame),
}

/// A handle a node uses to address one of its known peers.
///
/// Implementations own the actual connection; `deliver` is expected to be
/// non-blocking from the caller's perspective (queue-and-return), since
/// the protocol engine itself never suspends mid-operation.
pub trait PeerHandle {
    /// Stable name this peer is known by, used in onion layers and for
    /// routing replies back to the correct hop.
    fn name(&self) -> &str;

    /// Public key this peer signs and decrypts with.
    fn public_key(&self) -> PublicKey;

    /// Hands `message` to the peer, identifying `from` as the sending
    /// node so the peer's own dispatch can address a reply.
    fn deliver(&self, from: &str, message: Message);
}
