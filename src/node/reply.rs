// Sweetgossip Core Library
// Written in 2020-2022 by
//     Dr. Maxim Orlovsky <orlovsky@pandoracore.com>
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.

//! Reply production and reverse-path relaying.
//!
//! Once a node decides to answer a broadcast it owes a preimage to every
//! hop the request travelled through plus itself, builds a
//! [`crate::frame::ResponseFrame`] committing to all of them at once, and
//! hands it to itself via [`Node::on_response`] exactly as if it had
//! arrived from the network — relaying and local collection share one
//! code path.

use crate::frame::{PowBroadcastConditionsFrame, PowBroadcastFrame, ResponseFrame, RoutingPaymentInstruction};
use crate::transport::Message;

use super::Node;

impl Node {
    pub(super) fn produce_reply(
        &mut self,
        frame: &PowBroadcastFrame,
        conditions: &PowBroadcastConditionsFrame,
        message: Vec<u8>,
        fee: u64,
    ) {
        let mut hops: Vec<RoutingPaymentInstruction> =
            frame.broadcast_payload.routing_payment_instruction_list.clone();
        hops.push(conditions.routing_payment_instruction.clone());

        let request_id = frame.broadcast_payload.signed_request_payload.id;
        let preimages = hops
            .iter()
            .map(|hop| self.preimage_ledger.preimage_for(request_id, hop))
            .collect::<Vec<_>>();

        let invoice = match self.payment_channel.create_invoice(fee, self.invoice_deadline()) {
            Ok(invoice) => invoice,
            Err(err) => {
                log::error!("{}: failed to create own reply invoice: {}", self.config.name, err);
                return;
            }
        };

        let mut response = ResponseFrame::new(
            self.config.certificate.clone(),
            &hops,
            &preimages,
            frame.broadcast_payload.backward_onion.clone(),
            frame.broadcast_payload.signed_request_payload.clone(),
            &message,
            invoice,
        );
        if let Err(err) = response.sign(&self.config.private_key) {
            log::error!("{}: failed to sign reply: {}", self.config.name, err);
            return;
        }

        log::info!("{}: replying to request {}", self.config.name, request_id);
        let own_name = self.config.name.clone();
        self.on_response(&own_name, response);
    }

    pub(super) fn on_response(&mut self, _from: &str, mut response: ResponseFrame) {
        if !response.verify() {
            log::trace!("{}: response frame failed verification", self.config.name);
            return;
        }

        if response.forward_onion.is_empty() {
            if response.invoices_are_coherent_with_signed_reply_payload() {
                let request_id = response.signed_reply_payload.signed_request_payload.id;
                let replier_key = response.replier_certificate.public_key().serialize();
                self.response_frames
                    .entry(request_id)
                    .or_default()
                    .entry(replier_key)
                    .or_default()
                    .push(response);
                log::info!("{}: collected a response for request {}", self.config.name, request_id);
            } else {
                log::trace!("{}: response invoices incoherent with reply payload, discarding", self.config.name);
            }
            return;
        }

        let layer_index = match response
            .find_route_payment_layer(self.payment_channel.account(), self.config.price_amount_for_routing)
        {
            Some(index) => index,
            None => {
                log::trace!("{}: no matching payment layer in response, discarding", self.config.name);
                return;
            }
        };

        let layer = match response.forward_onion.peel(&self.config.private_key) {
            Ok(layer) => layer,
            Err(err) => {
                log::error!("{}: failed to peel onion layer: {}", self.config.name, err);
                return;
            }
        };

        if !self.known_peers.contains_key(&layer.peer_name) {
            log::error!("{}: onion names unknown peer {}", self.config.name, layer.peer_name);
            return;
        }

        let valid_till = self.invoice_deadline();
        match response.make_invoice(layer_index, self.payment_channel.as_mut(), valid_till, &self.config.private_key) {
            Some(invoice) => {
                response.invoices.push(invoice);
                self.send_to(&layer.peer_name.clone(), Message::Response(response));
            }
            None => log::error!("{}: could not settle our own payment layer", self.config.name),
        }
    }
}
