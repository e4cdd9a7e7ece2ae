// Sweetgossip Core Library
// Written in 2020-2022 by
//     Dr. Maxim Orlovsky <orlovsky@pandoracore.com>
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.

//! Broadcast admission: the ask/conditions/proof-of-work handshake that
//! propagates a request through relays, and the decision of whether to
//! answer it or keep forwarding it once it clears that handshake.

use chrono::Utc;

use crate::frame::{
    AskForBroadcastFrame, BroadcastPayload, PowBroadcastConditionsFrame, PowBroadcastFrame,
    RequestPayload, RoutingPaymentInstruction,
};
use crate::onion::{OnionLayer, OnionRoute};
use crate::pow::pow_target_from_complexity;
use crate::transport::Message;

use super::Node;

impl Node {
    /// Signs and originates a fresh request for `topic`, broadcasting it
    /// to every currently known peer. Returns the signed payload so the
    /// caller can later poll [`Node::get_offers`] / [`Node::pay_and_read_response`]
    /// for it by id.
    pub fn request(&mut self, topic: Vec<u8>) -> Result<RequestPayload, crate::crypto::Error> {
        let mut payload = RequestPayload::new(
            crate::RequestId::new_v4(),
            topic,
            self.config.certificate.clone(),
        );
        payload.sign(&self.config.private_key)?;
        self.broadcast(&payload, None, OnionRoute::empty(), Vec::new());
        Ok(payload)
    }

    /// Forwards `request` to every known peer except `originator_peer_name`
    /// (the peer we heard it from, if any), growing the backward onion
    /// route by one layer naming this node and, if this is a relay hop,
    /// appending this node's own routing payment instruction.
    pub(crate) fn broadcast(
        &mut self,
        request: &RequestPayload,
        originator_peer_name: Option<&str>,
        backward_onion: OnionRoute,
        mut routing_payment_instruction_list: Vec<RoutingPaymentInstruction>,
    ) {
        if !self.policy.accept_topic(&request.topic) {
            log::trace!("{}: topic rejected, not broadcasting", self.config.name);
            return;
        }

        self.increment_broadcast_counter(request.id);
        if !self.can_broadcast(request.id) {
            log::trace!("{}: request {} already broadcast, suppressing", self.config.name, request.id);
            return;
        }

        if originator_peer_name.is_some() {
            routing_payment_instruction_list.push(RoutingPaymentInstruction {
                account: self.payment_channel.account().to_vec(),
                amount: self.config.price_amount_for_routing,
                public_key: self.public_key(),
            });
        }

        let peer_names: Vec<String> = self.known_peers.keys().cloned().collect();
        for peer_name in peer_names {
            if Some(peer_name.as_str()) == originator_peer_name {
                continue;
            }
            let peer_public_key = self.known_peers[&peer_name].public_key();
            let grown_onion = match backward_onion.grow(
                OnionLayer { peer_name: self.config.name.clone() },
                &peer_public_key,
            ) {
                Ok(onion) => onion,
                Err(err) => {
                    log::error!("{}: failed to grow onion for {}: {}", self.config.name, peer_name, err);
                    continue;
                }
            };

            let ask = AskForBroadcastFrame::new(request.clone());
            let payload = BroadcastPayload {
                signed_request_payload: request.clone(),
                backward_onion: grown_onion,
                routing_payment_instruction_list: routing_payment_instruction_list.clone(),
            };
            self.pending_asks.insert(ask.ask_id, payload);
            self.send_to(&peer_name, Message::AskForBroadcast(ask));
        }
    }

    pub(super) fn on_ask_for_broadcast(&mut self, from: &str, frame: AskForBroadcastFrame) {
        if !self.can_broadcast(frame.signed_request_payload.id) {
            log::trace!("{}: declining ask, request already broadcast twice", self.config.name);
            return;
        }

        let conditions = PowBroadcastConditionsFrame {
            ask_id: frame.ask_id,
            valid_till: Utc::now()
                + chrono::Duration::from_std(self.config.broadcast_conditions_timeout)
                    .unwrap_or_else(|_| chrono::Duration::seconds(0)),
            work_request: crate::pow::WorkRequest {
                pow_scheme: self.config.broadcast_conditions_pow_scheme,
                pow_target: pow_target_from_complexity(
                    self.config.broadcast_conditions_pow_scheme,
                    self.config.broadcast_conditions_pow_complexity,
                ),
            },
            routing_payment_instruction: RoutingPaymentInstruction {
                account: self.payment_channel.account().to_vec(),
                amount: self.config.price_amount_for_routing,
                public_key: self.public_key(),
            },
        };
        self.issued_conditions.insert(conditions.ask_id, conditions.clone());
        self.send_to(from, Message::PowBroadcastConditions(conditions));
    }

    pub(super) fn on_pow_broadcast_conditions(&mut self, from: &str, frame: PowBroadcastConditionsFrame) {
        if Utc::now() > frame.valid_till {
            log::trace!("{}: broadcast conditions from {} expired", self.config.name, from);
            return;
        }
        let payload = match self.pending_asks.get(&frame.ask_id) {
            Some(payload) => payload.clone(),
            None => {
                log::trace!("{}: conditions for unknown ask {}", self.config.name, frame.ask_id);
                return;
            }
        };
        let proof_of_work = frame.work_request.compute_proof(&payload);
        let pow_frame = PowBroadcastFrame {
            ask_id: frame.ask_id,
            broadcast_payload: payload,
            proof_of_work,
        };
        self.send_to(from, Message::PowBroadcast(pow_frame));
    }

    pub(super) fn on_pow_broadcast(&mut self, from: &str, frame: PowBroadcastFrame) {
        let conditions = match self.issued_conditions.get(&frame.ask_id) {
            Some(conditions) => conditions.clone(),
            None => {
                log::trace!("{}: proof of work for unknown ask {}", self.config.name, frame.ask_id);
                return;
            }
        };
        if frame.proof_of_work.pow_scheme != conditions.work_request.pow_scheme
            || frame.proof_of_work.pow_target != conditions.work_request.pow_target
        {
            log::error!("{}: proof of work does not match issued conditions", self.config.name);
            return;
        }
        if !frame.verify() {
            log::error!("{}: broadcast frame from {} failed verification", self.config.name, from);
            return;
        }

        let (reply, fee) = self
            .policy
            .accept_broadcast(&frame.broadcast_payload.signed_request_payload);
        match reply {
            Some(message) => self.produce_reply(&frame, &conditions, message, fee),
            None => {
                // `broadcast()` itself appends our own routing instruction
                // (matching `conditions.routing_payment_instruction`, both
                // built from the same account/fee/key) since we pass a
                // non-`None` originator here.
                self.broadcast(
                    &frame.broadcast_payload.signed_request_payload,
                    Some(from),
                    frame.broadcast_payload.backward_onion,
                    frame.broadcast_payload.routing_payment_instruction_list,
                );
            }
        }
    }
}
