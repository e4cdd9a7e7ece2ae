// Sweetgossip Core Library
// Written in 2020-2022 by
//     Dr. Maxim Orlovsky <orlovsky@pandoracore.com>
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.

//! The node: a single-threaded, event-driven engine combining the
//! requester, relay and replier roles.
//!
//! A [`Node`] is deliberately synchronous end to end, including its calls
//! into [`crate::payments::PaymentChannel`] — there are no `.await` points
//! anywhere in the broadcast/reply/pay pipeline. Surrounding services are
//! expected to run a `Node` behind whatever async runtime or thread model
//! fits their transport; this crate does not prescribe one.

mod broadcast;
mod pay;
mod reply;

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::cert::Certificate;
use crate::crypto::{PrivateKey, PublicKey};
use crate::frame::{BroadcastPayload, PowBroadcastConditionsFrame, RequestPayload};
use crate::payments::PaymentChannel;
use crate::pow::PowScheme;
use crate::preimage::PreimageLedger;
use crate::transport::{Message, PeerHandle};
use crate::{AskId, RequestId};

pub use pay::PayError;

/// Policy hook: decides whether a node accepts a topic for relaying at
/// all, and whether/how it answers one directly.
///
/// The default, [`RejectAllPolicy`], forwards everything it is asked to
/// relay and never answers a topic itself — a pure relay node. Nodes that
/// actually serve replies supply their own implementation.
pub trait NodePolicy {
    /// Whether this node is willing to consider forwarding `topic` at
    /// all. A node that never forwards a given topic avoids broadcasting
    /// it further, effectively opting it out of the network.
    fn accept_topic(&self, topic: &[u8]) -> bool;

    /// Whether this node answers `request` directly, and for what fee.
    /// Returning `(Some(message), fee)` produces a reply; `(None, _)`
    /// continues forwarding the broadcast instead.
    fn accept_broadcast(&self, request: &RequestPayload) -> (Option<Vec<u8>>, u64);
}

/// Forwards every topic, answers none. Mirrors a relay-only node.
#[derive(Default)]
pub struct RejectAllPolicy;

impl NodePolicy for RejectAllPolicy {
    fn accept_topic(&self, _topic: &[u8]) -> bool {
        true
    }

    fn accept_broadcast(&self, _request: &RequestPayload) -> (Option<Vec<u8>>, u64) {
        (None, 0)
    }
}

/// Static configuration for a [`Node`]: its identity and the fees and
/// timeouts it imposes on the peers it deals with.
///
/// The embedding application is responsible for loading these fields from
/// whatever configuration format it uses (TOML, env, CLI flags); this
/// crate only defines the data shape.
#[derive(Clone)]
pub struct NodeConfig {
    pub name: String,
    pub certificate: Certificate,
    pub private_key: PrivateKey,
    /// Fee this node charges for relaying a broadcast one hop, or for
    /// forwarding a reply back one hop.
    pub price_amount_for_routing: u64,
    /// How long the proof-of-work conditions this node hands out remain
    /// valid for.
    pub broadcast_conditions_timeout: Duration,
    pub broadcast_conditions_pow_scheme: PowScheme,
    pub broadcast_conditions_pow_complexity: u8,
    /// How long an invoice minted while forwarding a reply stays payable.
    pub invoice_payment_timeout: Duration,
}

impl std::fmt::Debug for NodeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("NodeConfig")
            .field("name", &self.name)
            .field("certificate", &self.certificate)
            .field("private_key", &"..")
            .field("price_amount_for_routing", &self.price_amount_for_routing)
            .field("broadcast_conditions_timeout", &self.broadcast_conditions_timeout)
            .field("broadcast_conditions_pow_scheme", &self.broadcast_conditions_pow_scheme)
            .field("broadcast_conditions_pow_complexity", &self.broadcast_conditions_pow_complexity)
            .field("invoice_payment_timeout", &self.invoice_payment_timeout)
            .finish()
    }
}

/// A single peer node in the gossip network.
///
/// Plays all three roles at once, scoped per request: a node can be the
/// originator of one topic, a relay for another, and a replier for a
/// third, all concurrently.
pub struct Node {
    config: NodeConfig,
    policy: Box<dyn NodePolicy>,
    payment_channel: Box<dyn PaymentChannel>,
    known_peers: BTreeMap<String, Box<dyn PeerHandle>>,

    // Requester/relay-side bookkeeping: broadcasts this node issued,
    // keyed by the ask id they are waiting for conditions/acceptance on.
    pending_asks: BTreeMap<AskId, BroadcastPayload>,
    // Replier/relay-side bookkeeping: conditions this node itself handed
    // out, so it can validate the proof of work it gets back.
    issued_conditions: BTreeMap<AskId, PowBroadcastConditionsFrame>,
    // Loop suppression: number of times `broadcast()` has run for a
    // given request id, regardless of fan-out.
    broadcast_counters: BTreeMap<RequestId, u32>,
    preimage_ledger: PreimageLedger,
    // Requester-side: response frames collected per request, grouped by
    // the replier's serialized public key.
    response_frames: BTreeMap<RequestId, BTreeMap<[u8; 33], Vec<crate::frame::ResponseFrame>>>,
}

/// Gate used for loop suppression: a request may be (re-)broadcast at
/// most this many times by the same node.
const MAX_BROADCAST_COUNT: u32 = 2;

impl Node {
    pub fn new(
        config: NodeConfig,
        policy: Box<dyn NodePolicy>,
        payment_channel: Box<dyn PaymentChannel>,
    ) -> Self {
        Self {
            config,
            policy,
            payment_channel,
            known_peers: BTreeMap::new(),
            pending_asks: BTreeMap::new(),
            issued_conditions: BTreeMap::new(),
            broadcast_counters: BTreeMap::new(),
            preimage_ledger: PreimageLedger::new(),
            response_frames: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn public_key(&self) -> PublicKey {
        self.config.certificate.public_key()
    }

    /// Registers a peer this node can address by name. Connections are
    /// directional: the counterpart node must separately `connect` this
    /// node (or another handle to it) to exchange messages both ways.
    pub fn connect(&mut self, peer: Box<dyn PeerHandle>) {
        self.known_peers.insert(peer.name().to_owned(), peer);
    }

    /// Dispatches an inbound message, originating from peer `from`, to
    /// the matching handler.
    pub fn on_message(&mut self, from: &str, message: Message) {
        match message {
            Message::AskForBroadcast(frame) => self.on_ask_for_broadcast(from, frame),
            Message::PowBroadcastConditions(frame) => self.on_pow_broadcast_conditions(from, frame),
            Message::PowBroadcast(frame) => self.on_pow_broadcast(from, frame),
            Message::Response(frame) => self.on_response(from, frame),
        }
    }

    fn send_to(&self, peer_name: &str, message: Message) {
        match self.known_peers.get(peer_name) {
            Some(peer) => peer.deliver(&self.config.name, message),
            None => log::error!("{}: unknown peer {}", self.config.name, peer_name),
        }
    }

    fn increment_broadcast_counter(&mut self, request_id: RequestId) {
        *self.broadcast_counters.entry(request_id).or_insert(0) += 1;
    }

    fn can_broadcast(&self, request_id: RequestId) -> bool {
        self.broadcast_counters.get(&request_id).copied().unwrap_or(0) <= MAX_BROADCAST_COUNT
    }

    fn invoice_deadline(&self) -> DateTime<Utc> {
        Utc::now()
            + chrono::Duration::from_std(self.config.invoice_payment_timeout)
                .unwrap_or_else(|_| chrono::Duration::seconds(0))
    }
}
