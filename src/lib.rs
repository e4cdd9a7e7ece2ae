// Sweetgossip Core Library
// Gossip-based anonymous request/reply protocol engine with incentivised
// onion-routed relay payments.
//
// Written in 2020-2022 by
//     Dr. Maxim Orlovsky <orlovsky@pandoracore.com>
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.
//
// You should have received a copy of the MIT License
// along with this software.
// If not, see <https://opensource.org/licenses/MIT>.

//! Per-node protocol engine for a gossip-based anonymous request/reply
//! network with hash-locked, onion-routed relay payments.
//!
//! A [`node::Node`] plays three roles concurrently for different topics:
//! requester (originates a request, eventually pays), relay (forwards
//! broadcasts, accrues potential payment) and replier (accepts a topic,
//! produces a reply).

#![deny(
    non_upper_case_globals,
    non_camel_case_types,
    non_snake_case,
    unused_mut,
    dead_code
)]

#[macro_use]
extern crate amplify;
#[macro_use]
extern crate strict_encoding;

pub mod cert;
pub mod crypto;
pub mod frame;
pub mod node;
pub mod onion;
pub mod payments;
pub mod pow;
pub mod preimage;
pub mod transport;

pub use cert::{Certificate, CertificateAuthority, LocalAuthority};
pub use frame::{
    AskForBroadcastFrame, BroadcastPayload, Offer, PaymentCryptoInstruction,
    PowBroadcastConditionsFrame, PowBroadcastFrame, ReplyPayload,
    RequestPayload, ResponseFrame, RoutingPaymentInstruction,
};
pub use node::{Node, NodeConfig, NodePolicy};
pub use onion::{OnionLayer, OnionRoute};
pub use payments::{Invoice, InMemoryChannel, PaymentChannel, ProofOfPayment};
pub use pow::{pow_target_from_complexity, PowScheme, ProofOfWork, WorkRequest};
pub use preimage::PreimageLedger;
pub use transport::{Message, PeerHandle};

/// Unique identifier of a request (a.k.a. topic instance) and of an
/// outstanding broadcast ask, respectively.
pub type RequestId = uuid::Uuid;
/// Identifier of one outstanding [`AskForBroadcastFrame`].
pub type AskId = uuid::Uuid;
