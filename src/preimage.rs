// Sweetgossip Core Library
// Written in 2020-2022 by
//     Dr. Maxim Orlovsky <orlovsky@pandoracore.com>
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.

//! Per-request preimage bookkeeping.
//!
//! A replying node must use the *same* preimage for a given hop every time
//! it is asked to produce payment instructions for a given request, so
//! that a relay seen on two different broadcast paths for the same topic
//! still resolves to one hash lock. The ledger here is the minimal state
//! needed for that: request id + routing instruction identity -> preimage.

use std::collections::BTreeMap;

use crate::crypto::SymmetricKey;
use crate::frame::{RoutingPaymentInstruction, RoutingTuple};
use crate::RequestId;

/// Tracks which preimage was minted for which hop of which request, so
/// repeated calls for the same (request, hop) pair are idempotent.
///
/// Keyed with a `BTreeMap` rather than a `HashMap`: public keys compare
/// and order, but do not implement `Hash`.
#[derive(Default)]
pub struct PreimageLedger {
    preimages: BTreeMap<(RequestId, RoutingTuple), SymmetricKey>,
}

impl PreimageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the preimage committed for `instruction` under `request_id`,
    /// minting a fresh one the first time this pair is seen.
    pub fn preimage_for(
        &mut self,
        request_id: RequestId,
        instruction: &RoutingPaymentInstruction,
    ) -> SymmetricKey {
        let key = (request_id, instruction.to_tuple());
        *self
            .preimages
            .entry(key)
            .or_insert_with(SymmetricKey::generate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secp256k1::rand::rngs::OsRng;

    fn instruction() -> RoutingPaymentInstruction {
        let (_sk, pk) = secp256k1::SECP256K1.generate_keypair(&mut OsRng);
        RoutingPaymentInstruction {
            account: b"relay".to_vec(),
            amount: 10,
            public_key: pk,
        }
    }

    #[test]
    fn same_request_and_hop_reuses_preimage() {
        let mut ledger = PreimageLedger::new();
        let request_id = uuid::Uuid::new_v4();
        let instruction = instruction();
        let first = ledger.preimage_for(request_id, &instruction);
        let second = ledger.preimage_for(request_id, &instruction);
        assert_eq!(first.as_bytes(), second.as_bytes());
    }

    #[test]
    fn different_requests_get_different_preimages() {
        let mut ledger = PreimageLedger::new();
        let instruction = instruction();
        let first = ledger.preimage_for(uuid::Uuid::new_v4(), &instruction);
        let second = ledger.preimage_for(uuid::Uuid::new_v4(), &instruction);
        assert_ne!(first.as_bytes(), second.as_bytes());
    }
}
