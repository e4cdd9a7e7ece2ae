// Sweetgossip Core Library
// Written in 2020-2022 by
//     Dr. Maxim Orlovsky <orlovsky@pandoracore.com>
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.

//! Requester-side offer selection, payment and decryption.
//!
//! Once a node has collected one or more [`crate::frame::ResponseFrame`]s
//! for a request, it can list the offers they represent and pay the
//! cheapest it is willing to accept. Paying one route through to
//! completion unlocks every hop's preimage at once, which is also the
//! decryption key for that hop's onion layer of the reply; a route that
//! fails partway through is abandoned in favour of the next-cheapest one.

use std::collections::{HashMap, HashSet};

use crate::crypto::{self, PaymentHash};
use crate::frame::{Offer, ResponseFrame};
use crate::RequestId;

use super::Node;

#[derive(Debug, Display, Error)]
#[display(doc_comments)]
pub enum PayError {
    /// no response has been collected yet for request {0}
    NoResponses(RequestId),

    /// the given replier never responded to request {0}
    UnknownReplier(RequestId),

    /// every known payment route for request {0} has failed
    AllRoutesFailed(RequestId),
}

impl Node {
    /// Lists one offer per replier that has answered `request_id` so far.
    pub fn get_offers(&self, request_id: RequestId) -> Result<Vec<Offer>, PayError> {
        let by_replier = self
            .response_frames
            .get(&request_id)
            .ok_or(PayError::NoResponses(request_id))?;

        Ok(by_replier
            .values()
            .filter_map(|frames| frames.first())
            .map(|frame| Offer {
                replier_certificate: frame.replier_certificate.clone(),
                network_price: frame.invoices.iter().map(|invoice| invoice.amount).sum(),
                offer_price: frame.signed_reply_payload.invoice.amount,
            })
            .collect())
    }

    /// Pays the cheapest known route to `replier_public_key` for
    /// `request_id` and returns the decrypted reply, retrying against the
    /// next-cheapest uncollapsed route if a hop's invoice fails to settle
    /// or its preimage does not decrypt the onion layer it should.
    pub fn pay_and_read_response(
        &mut self,
        request_id: RequestId,
        replier_public_key: &crate::crypto::PublicKey,
    ) -> Result<Vec<u8>, PayError> {
        let replier_key = replier_public_key.serialize();
        let candidates: Vec<ResponseFrame> = self
            .response_frames
            .get(&request_id)
            .ok_or(PayError::NoResponses(request_id))?
            .get(&replier_key)
            .ok_or(PayError::UnknownReplier(request_id))?
            .clone();

        let mut keys_for_payment_hashes: HashMap<PaymentHash, crate::crypto::SymmetricKey> = HashMap::new();
        let mut failed_payment_hashes: HashSet<PaymentHash> = HashSet::new();

        loop {
            let mut remaining_fee_by_index: Vec<(usize, u64)> = candidates
                .iter()
                .enumerate()
                .filter(|(_, response)| {
                    response
                        .invoices
                        .iter()
                        .all(|invoice| !failed_payment_hashes.contains(&invoice.payment_hash))
                })
                .map(|(index, response)| {
                    let fee = response
                        .invoices
                        .iter()
                        .filter(|invoice| !keys_for_payment_hashes.contains_key(&invoice.payment_hash))
                        .map(|invoice| invoice.amount)
                        .sum();
                    (index, fee)
                })
                .collect();

            if remaining_fee_by_index.is_empty() {
                log::error!("{}: every payment route for {} failed", self.config.name, request_id);
                return Err(PayError::AllRoutesFailed(request_id));
            }

            // Stable sort: ties keep the order routes were collected in.
            remaining_fee_by_index.sort_by_key(|&(_, fee)| fee);
            let (index, _) = remaining_fee_by_index[0];
            let response = &candidates[index];

            if let Err(failed_hashes) = self.pay_route(response, &mut keys_for_payment_hashes) {
                failed_payment_hashes.extend(failed_hashes);
                continue;
            }

            match decrypt_reply(response, &keys_for_payment_hashes, &self.config.private_key) {
                Ok(plaintext) => return Ok(plaintext),
                Err(()) => {
                    for invoice in &response.invoices {
                        failed_payment_hashes.insert(invoice.payment_hash);
                    }
                    continue;
                }
            }
        }
    }

    fn pay_route(
        &mut self,
        response: &ResponseFrame,
        keys_for_payment_hashes: &mut HashMap<PaymentHash, crate::crypto::SymmetricKey>,
    ) -> Result<(), Vec<PaymentHash>> {
        for invoice in &response.invoices {
            if keys_for_payment_hashes.contains_key(&invoice.payment_hash) {
                continue;
            }
            match self.payment_channel.pay_invoice(invoice) {
                Ok(proof) => {
                    keys_for_payment_hashes.insert(invoice.payment_hash, proof.preimage);
                }
                Err(err) => {
                    log::error!(
                        "{}: failed to pay invoice for {:?}: {}",
                        self.config.name,
                        invoice.payment_hash,
                        err
                    );
                    return Err(vec![invoice.payment_hash]);
                }
            }
        }
        Ok(())
    }
}

/// Unwraps the reply's onion encryption layer by layer using the recovered
/// hop preimages, in the order the invoices were collected, then the
/// final asymmetric layer with the requester's own private key.
fn decrypt_reply(
    response: &ResponseFrame,
    keys_for_payment_hashes: &HashMap<PaymentHash, crate::crypto::SymmetricKey>,
    private_key: &crate::crypto::PrivateKey,
) -> Result<Vec<u8>, ()> {
    let mut message = response.signed_reply_payload.encrypted_reply_message.clone();
    for invoice in &response.invoices {
        let key = keys_for_payment_hashes.get(&invoice.payment_hash).ok_or(())?;
        message = crypto::symmetric_decrypt(key, &message).map_err(|_| ())?;
    }
    crypto::decrypt_bytes(&message, private_key).map_err(|_| ())
}
