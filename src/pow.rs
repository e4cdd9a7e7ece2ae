// Sweetgossip Core Library
// Written in 2020-2022 by
//     Dr. Maxim Orlovsky <orlovsky@pandoracore.com>
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.

//! Proof-of-work admission control for broadcast requests.
//!
//! A relay that is asked to forward a topic sets a difficulty target; the
//! asking peer must find a nonce whose proof-of-work digest, taken over the
//! broadcast payload it intends to send, meets that target before the relay
//! will act on it. Only the SHA-256d scheme is implemented here; additional
//! schemes can be added as new [`PowScheme`] variants without touching the
//! broadcast engine.

use bitcoin_hashes::{sha256, sha256d, Hash};
use strict_encoding::StrictEncode;

/// Proof-of-work scheme identifier, carried on the wire so both ends agree
/// on how a nonce is validated.
#[derive(Copy, Clone, PartialEq, Eq, Debug, StrictEncode, StrictDecode)]
pub enum PowScheme {
    /// Double SHA-256 over the canonical encoding of the payload and nonce.
    Sha256d,
}

/// Work a relay demands before it will act on a broadcast: a scheme and a
/// target the resulting digest's leading zero bits must meet or exceed.
#[derive(Clone, Copy, PartialEq, Eq, Debug, StrictEncode, StrictDecode)]
pub struct WorkRequest {
    pub pow_scheme: PowScheme,
    pub pow_target: u8,
}

/// A found nonce together with the scheme and target it was computed for,
/// so the verifier does not need side-channel state to check it.
#[derive(Clone, Copy, PartialEq, Eq, Debug, StrictEncode, StrictDecode)]
pub struct ProofOfWork {
    pub pow_scheme: PowScheme,
    pub pow_target: u8,
    pub nonce: u64,
}

/// Converts an abstract difficulty level into a leading-zero-bit target.
///
/// The mapping is intentionally simple: complexity is the target itself,
/// clamped to the digest width of the chosen scheme.
pub fn pow_target_from_complexity(_scheme: PowScheme, complexity: u8) -> u8 {
    complexity.min(255)
}

fn digest_with_nonce<T: StrictEncode>(scheme: PowScheme, payload: &T, nonce: u64) -> Option<[u8; 32]> {
    let mut bytes = payload.strict_serialize().ok()?;
    bytes.extend_from_slice(&nonce.to_le_bytes());
    let digest = match scheme {
        PowScheme::Sha256d => sha256d::Hash::hash(&bytes).into_inner(),
    };
    Some(digest)
}

fn leading_zero_bits(digest: &[u8; 32]) -> u8 {
    let mut count = 0u16;
    for byte in digest {
        if *byte == 0 {
            count += 8;
            continue;
        }
        count += byte.leading_zeros() as u16;
        break;
    }
    count.min(255) as u8
}

impl WorkRequest {
    /// Searches for a nonce whose proof-of-work digest over `payload` meets
    /// [`Self::pow_target`]. Blocking; the caller is expected to run this on
    /// whatever thread it can afford to spend on admission work.
    pub fn compute_proof<T: StrictEncode>(&self, payload: &T) -> ProofOfWork {
        let mut nonce = 0u64;
        loop {
            if let Some(digest) = digest_with_nonce(self.pow_scheme, payload, nonce) {
                if leading_zero_bits(&digest) >= self.pow_target {
                    return ProofOfWork {
                        pow_scheme: self.pow_scheme,
                        pow_target: self.pow_target,
                        nonce,
                    };
                }
            }
            nonce = nonce.wrapping_add(1);
        }
    }
}

impl ProofOfWork {
    /// Recomputes the digest over `payload` using the carried nonce and
    /// checks that it meets the carried target.
    pub fn validate<T: StrictEncode>(&self, payload: &T) -> bool {
        match digest_with_nonce(self.pow_scheme, payload, self.nonce) {
            Some(digest) => leading_zero_bits(&digest) >= self.pow_target,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, StrictEncode)]
    struct Payload {
        data: Vec<u8>,
    }

    #[test]
    fn proof_of_work_validates() {
        let payload = Payload { data: b"topic".to_vec() };
        let request = WorkRequest { pow_scheme: PowScheme::Sha256d, pow_target: 8 };
        let proof = request.compute_proof(&payload);
        assert!(proof.validate(&payload));
    }

    #[test]
    fn proof_of_work_rejects_wrong_payload() {
        let payload = Payload { data: b"topic".to_vec() };
        let other = Payload { data: b"different".to_vec() };
        let request = WorkRequest { pow_scheme: PowScheme::Sha256d, pow_target: 8 };
        let proof = request.compute_proof(&payload);
        assert!(!proof.validate(&other));
    }

    #[test]
    fn zero_target_is_always_satisfied() {
        let payload = Payload { data: vec![] };
        let proof = ProofOfWork { pow_scheme: PowScheme::Sha256d, pow_target: 0, nonce: 0 };
        assert!(proof.validate(&payload));
    }
}
