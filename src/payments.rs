// Sweetgossip Core Library
// Written in 2020-2022 by
//     Dr. Maxim Orlovsky <orlovsky@pandoracore.com>
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.

//! Payment-channel abstraction.
//!
//! The protocol engine never speaks to a wallet or routing node directly;
//! it only needs to create invoices locked to a preimage it already knows,
//! and to pay invoices it receives, recovering the preimage on success.
//! Real deployments plug in a Lightning node or other payment rail behind
//! [`PaymentChannel`]; [`InMemoryChannel`] here is a settlement-free stand-in
//! for tests and simulations.

use chrono::{DateTime, Utc};

use crate::crypto::{PaymentHash, SymmetricKey};

#[derive(Debug, Display, Error)]
#[display(doc_comments)]
pub enum Error {
    /// the payment could not be routed or settled
    PaymentFailed,

    /// the payment rail reported an internal failure: {0}
    Backend(String),
}

/// An invoice locking `amount` to `payment_hash`, payable to `account`
/// until `valid_till`.
#[derive(Clone, PartialEq, Eq, Debug, StrictEncode, StrictDecode)]
pub struct Invoice {
    pub account: Vec<u8>,
    pub amount: u64,
    pub payment_hash: PaymentHash,
    pub valid_till: DateTime<Utc>,
}

/// Proof that an invoice was paid: the preimage unlocking its payment hash.
#[derive(Clone, Copy, Debug)]
pub struct ProofOfPayment {
    pub preimage: SymmetricKey,
}

/// Minimal surface the protocol engine needs from a payment rail.
pub trait PaymentChannel {
    /// This node's own account identifier on the channel.
    fn account(&self) -> &[u8];

    /// Issues an invoice for `amount` with a freshly generated preimage,
    /// valid until `valid_till`.
    fn create_invoice(&mut self, amount: u64, valid_till: DateTime<Utc>) -> Result<Invoice, Error>;

    /// Issues an invoice for `amount` locked to a preimage the caller
    /// already committed to elsewhere (e.g. a relay forwarding a reply).
    fn create_invoice_with_preimage(
        &mut self,
        amount: u64,
        preimage: SymmetricKey,
        valid_till: DateTime<Utc>,
    ) -> Result<Invoice, Error>;

    /// Attempts to pay `invoice`, returning the recovered preimage on
    /// success.
    fn pay_invoice(&mut self, invoice: &Invoice) -> Result<ProofOfPayment, Error>;
}

/// Settlement-free [`PaymentChannel`] for tests and simulations.
///
/// Invoices it issues are tracked so tests can assert on what was settled;
/// invoices it pays always succeed unless their hash is in
/// [`InMemoryChannel::fail_payment_hash`], which lets scenario tests model
/// routing failures without a real payment rail.
pub struct InMemoryChannel {
    account: Vec<u8>,
    preimages_by_hash: std::collections::HashMap<PaymentHash, SymmetricKey>,
    settled_invoices: Vec<Invoice>,
    failing_hashes: std::collections::HashSet<PaymentHash>,
}

impl InMemoryChannel {
    pub fn new(account: impl Into<Vec<u8>>) -> Self {
        Self {
            account: account.into(),
            preimages_by_hash: std::collections::HashMap::new(),
            settled_invoices: Vec::new(),
            failing_hashes: std::collections::HashSet::new(),
        }
    }

    /// Makes future [`PaymentChannel::pay_invoice`] calls against this
    /// hash fail, to exercise the requester's route-failure fallback.
    pub fn fail_payment_hash(&mut self, hash: PaymentHash) {
        self.failing_hashes.insert(hash);
    }

    pub fn settled_invoices(&self) -> &[Invoice] {
        &self.settled_invoices
    }
}

impl PaymentChannel for InMemoryChannel {
    fn account(&self) -> &[u8] {
        &self.account
    }

    fn create_invoice(&mut self, amount: u64, valid_till: DateTime<Utc>) -> Result<Invoice, Error> {
        let preimage = SymmetricKey::generate();
        self.create_invoice_with_preimage(amount, preimage, valid_till)
    }

    fn create_invoice_with_preimage(
        &mut self,
        amount: u64,
        preimage: SymmetricKey,
        valid_till: DateTime<Utc>,
    ) -> Result<Invoice, Error> {
        let payment_hash = crate::crypto::compute_payment_hash(&preimage);
        self.preimages_by_hash.insert(payment_hash, preimage);
        Ok(Invoice {
            account: self.account.clone(),
            amount,
            payment_hash,
            valid_till,
        })
    }

    fn pay_invoice(&mut self, invoice: &Invoice) -> Result<ProofOfPayment, Error> {
        if self.failing_hashes.contains(&invoice.payment_hash) {
            return Err(Error::PaymentFailed);
        }
        self.settled_invoices.push(invoice.clone());
        // A real channel learns the preimage from the payee during
        // settlement; here we mint one if we have not already locked an
        // invoice to this hash ourselves (the common case: we are paying
        // someone else's invoice).
        let preimage = self
            .preimages_by_hash
            .get(&invoice.payment_hash)
            .copied()
            .unwrap_or_else(SymmetricKey::generate);
        Ok(ProofOfPayment { preimage })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paying_own_invoice_recovers_the_same_preimage() {
        let mut channel = InMemoryChannel::new(b"alice".to_vec());
        let preimage = SymmetricKey::generate();
        let invoice = channel.create_invoice_with_preimage(100, preimage, Utc::now()).unwrap();
        let proof = channel.pay_invoice(&invoice).unwrap();
        assert_eq!(proof.preimage.as_bytes(), preimage.as_bytes());
    }

    #[test]
    fn failing_hash_makes_payment_fail() {
        let mut channel = InMemoryChannel::new(b"alice".to_vec());
        let preimage = SymmetricKey::generate();
        let invoice = channel.create_invoice_with_preimage(100, preimage, Utc::now()).unwrap();
        channel.fail_payment_hash(invoice.payment_hash);
        assert!(channel.pay_invoice(&invoice).is_err());
    }
}
