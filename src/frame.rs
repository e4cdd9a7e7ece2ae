// Sweetgossip Core Library
// Written in 2020-2022 by
//     Dr. Maxim Orlovsky <orlovsky@pandoracore.com>
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.

//! Wire payloads and frames exchanged between nodes.
//!
//! Frames are grouped by the four-message handshake a single topic walks
//! through: [`AskForBroadcastFrame`] (can I forward this?), the
//! [`PowBroadcastConditionsFrame`] reply (yes, under these conditions),
//! [`PowBroadcastFrame`] (here is the proof and the payload to forward),
//! and finally [`ResponseFrame`] (the reply, travelling back along the
//! onion route it was asked to build).

use chrono::{DateTime, Utc};

use crate::cert::Certificate;
use crate::crypto::{self, PaymentHash, PrivateKey, PublicKey, Signature, SymmetricKey};
use crate::onion::OnionRoute;
use crate::payments::Invoice;
use crate::pow::{ProofOfWork, WorkRequest};
use crate::{AskId, RequestId};

/// Tuple form of a [`RoutingPaymentInstruction`], used as a ledger key so
/// two structurally identical instructions compare equal regardless of
/// where they came from. The public key is carried as its compressed
/// serialization so the tuple orders and hashes without relying on
/// `secp256k1::PublicKey` itself implementing `Ord`/`Hash`.
pub type RoutingTuple = (Vec<u8>, u64, [u8; 33]);

/// A single hop's fee and payment destination, collected as a broadcast
/// fans out so a replier knows whom to pay back along the route.
#[derive(Clone, PartialEq, Eq, Debug, StrictEncode, StrictDecode)]
pub struct RoutingPaymentInstruction {
    pub account: Vec<u8>,
    pub amount: u64,
    pub public_key: PublicKey,
}

impl RoutingPaymentInstruction {
    pub fn to_tuple(&self) -> RoutingTuple {
        (self.account.clone(), self.amount, self.public_key.serialize())
    }
}

/// The signed request a requester originates: an opaque topic plus the
/// requester's certificate, so repliers and relays can authenticate it.
#[derive(Clone, PartialEq, Eq, Debug, StrictEncode, StrictDecode)]
pub struct RequestPayload {
    pub id: RequestId,
    pub topic: Vec<u8>,
    pub sender_certificate: Certificate,
    signature: Option<Signature>,
}

impl RequestPayload {
    pub fn new(id: RequestId, topic: Vec<u8>, sender_certificate: Certificate) -> Self {
        Self { id, topic, sender_certificate, signature: None }
    }

    pub fn signature(&self) -> Option<Signature> {
        self.signature
    }

    /// Signs this payload in place with the requester's private key. Any
    /// previous signature is discarded before hashing, so the signed
    /// digest never depends on a prior signature.
    pub fn sign(&mut self, private_key: &PrivateKey) -> Result<(), crypto::Error> {
        self.signature = None;
        self.signature = Some(crypto::sign_object(self, private_key)?);
        Ok(())
    }

    /// Verifies the signature against `public_key`, which should be the
    /// key certified by `sender_certificate`.
    pub fn verify(&self, public_key: &PublicKey) -> bool {
        let signature = match self.signature {
            Some(signature) => signature,
            None => return false,
        };
        let mut unsigned = self.clone();
        unsigned.signature = None;
        crypto::verify_object(&unsigned, &signature, public_key).is_ok()
    }

    /// Verifies both the sender's certificate and the signature it made
    /// over this payload.
    pub fn verify_with_certificate(&self) -> bool {
        self.sender_certificate.verify() && self.verify(&self.sender_certificate.public_key())
    }
}

/// Request to forward a topic, sent by a peer that wants this node to
/// relay or answer it.
#[derive(Clone, PartialEq, Eq, Debug, StrictEncode, StrictDecode)]
pub struct AskForBroadcastFrame {
    pub ask_id: AskId,
    pub signed_request_payload: RequestPayload,
}

impl AskForBroadcastFrame {
    pub fn new(signed_request_payload: RequestPayload) -> Self {
        Self { ask_id: AskId::new_v4(), signed_request_payload }
    }
}

/// The admission conditions a node imposes before it will act on a
/// forwarded broadcast: a proof-of-work puzzle, a deadline, and the fee it
/// wants for relaying.
#[derive(Clone, PartialEq, Eq, Debug, StrictEncode, StrictDecode)]
pub struct PowBroadcastConditionsFrame {
    pub ask_id: AskId,
    pub valid_till: DateTime<Utc>,
    pub work_request: WorkRequest,
    pub routing_payment_instruction: RoutingPaymentInstruction,
}

/// Everything a relay needs to act on a broadcast: the original signed
/// request, the reverse onion route accumulated so far, and the list of
/// routing payment instructions for every hop on the way here.
#[derive(Clone, Debug, StrictEncode, StrictDecode)]
pub struct BroadcastPayload {
    pub signed_request_payload: RequestPayload,
    pub backward_onion: OnionRoute,
    pub routing_payment_instruction_list: Vec<RoutingPaymentInstruction>,
}

/// The proof-of-work-backed broadcast request a peer sends once it has
/// satisfied the conditions it was given.
#[derive(Clone, Debug, StrictEncode, StrictDecode)]
pub struct PowBroadcastFrame {
    pub ask_id: AskId,
    pub broadcast_payload: BroadcastPayload,
    pub proof_of_work: ProofOfWork,
}

impl PowBroadcastFrame {
    /// Verifies the requester's signature, the sender's certificate, and
    /// the proof of work over the broadcast payload.
    pub fn verify(&self) -> bool {
        self.broadcast_payload.signed_request_payload.verify_with_certificate()
            && self.proof_of_work.validate(&self.broadcast_payload)
    }
}

/// Payment instructions for a single hop: the fee, the preimage (encrypted
/// to that hop's public key) and the hash locking it.
#[derive(Clone, PartialEq, Eq, Debug, StrictEncode, StrictDecode)]
pub struct PaymentCryptoInstruction {
    pub account: Vec<u8>,
    pub amount: u64,
    pub encrypted_preimage: Vec<u8>,
    pub payment_hash: PaymentHash,
}

impl PaymentCryptoInstruction {
    pub fn new(
        account: Vec<u8>,
        amount: u64,
        preimage: &SymmetricKey,
        recipient_public_key: &PublicKey,
    ) -> Self {
        let encrypted_preimage = crypto::encrypt_bytes(preimage.as_bytes(), recipient_public_key);
        let payment_hash = crypto::compute_payment_hash(preimage);
        Self { account, amount, encrypted_preimage, payment_hash }
    }
}

/// The signed reply body: the request it answers, one payment instruction
/// per hop on the route, the (multiply-wrapped) encrypted reply message,
/// and the replier's own invoice.
#[derive(Clone, Debug, StrictEncode, StrictDecode)]
pub struct ReplyPayload {
    pub signed_request_payload: RequestPayload,
    pub payment_crypto_instruction_list: Vec<PaymentCryptoInstruction>,
    pub encrypted_reply_message: Vec<u8>,
    pub invoice: Invoice,
    signature: Option<Signature>,
}

impl ReplyPayload {
    pub fn sign(&mut self, private_key: &PrivateKey) -> Result<(), crypto::Error> {
        self.signature = None;
        self.signature = Some(crypto::sign_object(self, private_key)?);
        Ok(())
    }

    pub fn verify(&self, public_key: &PublicKey) -> bool {
        let signature = match self.signature {
            Some(signature) => signature,
            None => return false,
        };
        let mut unsigned = self.clone();
        unsigned.signature = None;
        crypto::verify_object(&unsigned, &signature, public_key).is_ok()
    }

    /// Verifies the replier's signature over this payload as well as the
    /// original request's own signature and certificate.
    pub fn verify_all(&self, replier_public_key: &PublicKey) -> bool {
        self.verify(replier_public_key) && self.signed_request_payload.verify_with_certificate()
    }
}

/// A reply travelling back along the reverse onion route. Each relay
/// peels one layer, mints an invoice for its own hop, and forwards; the
/// requester is reached once [`ResponseFrame::forward_onion`] is empty.
#[derive(Clone, Debug, StrictEncode, StrictDecode)]
pub struct ResponseFrame {
    pub replier_certificate: Certificate,
    pub signed_reply_payload: ReplyPayload,
    pub forward_onion: OnionRoute,
    pub invoices: Vec<Invoice>,
}

impl ResponseFrame {
    /// Builds a fresh, unsigned response: one payment instruction and
    /// invoice slot per routing hop, plus a reply message encrypted first
    /// to the requester and then, in route order, under every hop's
    /// preimage.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        replier_certificate: Certificate,
        routing_payment_instruction_list: &[RoutingPaymentInstruction],
        preimage_list: &[SymmetricKey],
        forward_onion: OnionRoute,
        signed_request_payload: RequestPayload,
        message: &[u8],
        invoice: Invoice,
    ) -> Self {
        assert_eq!(
            routing_payment_instruction_list.len(),
            preimage_list.len(),
            "one preimage per routing hop is required"
        );

        let payment_crypto_instruction_list = routing_payment_instruction_list
            .iter()
            .zip(preimage_list.iter())
            .map(|(instruction, preimage)| {
                PaymentCryptoInstruction::new(
                    instruction.account.clone(),
                    instruction.amount,
                    preimage,
                    &instruction.public_key,
                )
            })
            .collect();

        let requester_public_key = signed_request_payload.sender_certificate.public_key();
        let mut encrypted_reply_message = crypto::encrypt_bytes(message, &requester_public_key);
        for preimage in preimage_list {
            encrypted_reply_message = crypto::symmetric_encrypt(preimage, &encrypted_reply_message);
        }

        Self {
            replier_certificate,
            signed_reply_payload: ReplyPayload {
                signed_request_payload,
                payment_crypto_instruction_list,
                encrypted_reply_message,
                invoice,
                signature: None,
            },
            forward_onion,
            invoices: Vec::new(),
        }
    }

    pub fn sign(&mut self, replier_private_key: &PrivateKey) -> Result<(), crypto::Error> {
        self.signed_reply_payload.sign(replier_private_key)
    }

    /// Recovers the preimage owed to `account`/`amount` at `index` and, if
    /// it matches the committed hash, settles it into an invoice on the
    /// given channel.
    pub fn make_invoice(
        &self,
        index: usize,
        channel: &mut dyn crate::payments::PaymentChannel,
        valid_till: DateTime<Utc>,
        private_key: &PrivateKey,
    ) -> Option<Invoice> {
        let instruction = self.signed_reply_payload.payment_crypto_instruction_list.get(index)?;
        if instruction.account != channel.account() {
            return None;
        }
        let preimage_bytes = crypto::decrypt_bytes(&instruction.encrypted_preimage, private_key).ok()?;
        let preimage = SymmetricKey::from_slice(&preimage_bytes)?;
        if crypto::compute_payment_hash(&preimage) != instruction.payment_hash {
            return None;
        }
        channel.create_invoice_with_preimage(instruction.amount, preimage, valid_till).ok()
    }

    /// True if the settled invoices collected so far on the way back
    /// match, as an unordered set, the payment instructions the replier
    /// originally signed off on.
    pub fn invoices_are_coherent_with_signed_reply_payload(&self) -> bool {
        let mut settled: Vec<(Vec<u8>, u64, PaymentHash)> = self
            .invoices
            .iter()
            .map(|invoice| (invoice.account.clone(), invoice.amount, invoice.payment_hash))
            .collect();
        let mut committed: Vec<(Vec<u8>, u64, PaymentHash)> = self
            .signed_reply_payload
            .payment_crypto_instruction_list
            .iter()
            .map(|instruction| (instruction.account.clone(), instruction.amount, instruction.payment_hash))
            .collect();
        settled.sort();
        committed.sort();
        settled == committed
    }

    /// Index of the payment instruction addressed to `account` for
    /// `amount`, if any.
    pub fn find_route_payment_layer(&self, account: &[u8], amount: u64) -> Option<usize> {
        self.signed_reply_payload
            .payment_crypto_instruction_list
            .iter()
            .position(|instruction| instruction.account == account && instruction.amount == amount)
    }

    /// Verifies the replier's certificate and its signature over the
    /// reply, and the original request's signature and certificate.
    pub fn verify(&self) -> bool {
        self.replier_certificate.verify()
            && self.signed_reply_payload.verify_all(&self.replier_certificate.public_key())
    }
}

/// A quoted offer a requester can choose to pay.
#[derive(Clone, Debug)]
pub struct Offer {
    pub replier_certificate: Certificate,
    pub network_price: u64,
    pub offer_price: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use secp256k1::rand::rngs::OsRng;

    use crate::cert::{CertificateAuthority, LocalAuthority};
    use crate::payments::Invoice;

    fn keypair() -> (PrivateKey, PublicKey) {
        secp256k1::SECP256K1.generate_keypair(&mut OsRng)
    }

    fn signed_request(private_key: &PrivateKey, certificate: Certificate) -> RequestPayload {
        let mut request = RequestPayload::new(crate::RequestId::new_v4(), b"topic".to_vec(), certificate);
        request.sign(private_key).unwrap();
        request
    }

    /// Invariant 5: `verify()` on a tampered frame (flip any signed byte)
    /// returns false.
    #[test]
    fn tampered_request_payload_fails_verification() {
        let authority = LocalAuthority::generate();
        let (sk, pk) = keypair();
        let certificate = authority.issue(pk).unwrap();
        let request = signed_request(&sk, certificate);

        assert!(request.verify_with_certificate());

        let mut tampered = request.clone();
        tampered.topic = b"different topic".to_vec();
        assert!(!tampered.verify_with_certificate());
    }

    /// Invariant 5, applied to a reply rather than a request.
    #[test]
    fn tampered_reply_payload_fails_verification() {
        let authority = LocalAuthority::generate();
        let (requester_sk, requester_pk) = keypair();
        let requester_certificate = authority.issue(requester_pk).unwrap();
        let request = signed_request(&requester_sk, requester_certificate);

        let (replier_sk, replier_pk) = keypair();
        let invoice = Invoice {
            account: b"replier".to_vec(),
            amount: 10,
            payment_hash: crypto::compute_payment_hash(&SymmetricKey::generate()),
            valid_till: Utc::now(),
        };
        let mut reply = ReplyPayload {
            signed_request_payload: request,
            payment_crypto_instruction_list: Vec::new(),
            encrypted_reply_message: crypto::encrypt_bytes(b"hello", &requester_pk),
            invoice,
            signature: None,
        };
        reply.sign(&replier_sk).unwrap();
        assert!(reply.verify(&replier_pk));

        let mut tampered = reply.clone();
        tampered.encrypted_reply_message = b"corrupted".to_vec();
        assert!(!tampered.verify(&replier_pk));
    }

    /// Invariant 2: `invoices_are_coherent_with_signed_reply_payload` holds
    /// iff the settled-invoice multiset equals the committed multiset.
    #[test]
    fn invoices_coherent_iff_multisets_match() {
        let authority = LocalAuthority::generate();
        let (requester_sk, requester_pk) = keypair();
        let requester_certificate = authority.issue(requester_pk).unwrap();
        let request = signed_request(&requester_sk, requester_certificate);

        let (_hop_sk, hop_pk) = keypair();
        let hop_instruction = RoutingPaymentInstruction { account: b"hop".to_vec(), amount: 3, public_key: hop_pk };
        let preimage = SymmetricKey::generate();
        let payment_hash = crypto::compute_payment_hash(&preimage);

        let (replier_sk, replier_pk) = keypair();
        let invoice = Invoice {
            account: b"replier".to_vec(),
            amount: 10,
            payment_hash: crypto::compute_payment_hash(&SymmetricKey::generate()),
            valid_till: Utc::now(),
        };
        let mut response = ResponseFrame::new(
            authority.issue(replier_pk).unwrap(),
            &[hop_instruction.clone()],
            &[preimage],
            OnionRoute::empty(),
            request,
            b"hello",
            invoice,
        );
        response.sign(&replier_sk).unwrap();

        // Nothing has settled yet: the empty invoice list does not match
        // the one committed payment instruction.
        assert!(!response.invoices_are_coherent_with_signed_reply_payload());

        response.invoices.push(Invoice {
            account: b"hop".to_vec(),
            amount: 3,
            payment_hash,
            valid_till: Utc::now(),
        });
        assert!(response.invoices_are_coherent_with_signed_reply_payload());

        let mut mismatched = response.clone();
        mismatched.invoices[0].amount = 999;
        assert!(!mismatched.invoices_are_coherent_with_signed_reply_payload());
    }

    /// Invariants 1 and 6: the hash of the preimage a hop recovers by
    /// decrypting its `PaymentCryptoInstruction` matches the committed
    /// `payment_hash`, and `make_invoice` only settles on that match.
    #[test]
    fn make_invoice_recovers_the_committed_preimage() {
        let authority = LocalAuthority::generate();
        let (requester_sk, requester_pk) = keypair();
        let requester_certificate = authority.issue(requester_pk).unwrap();
        let request = signed_request(&requester_sk, requester_certificate);

        let (hop_sk, hop_pk) = keypair();
        let hop_instruction = RoutingPaymentInstruction { account: b"hop".to_vec(), amount: 3, public_key: hop_pk };
        let preimage = SymmetricKey::generate();

        let (_replier_sk, replier_pk) = keypair();
        let invoice = Invoice {
            account: b"replier".to_vec(),
            amount: 10,
            payment_hash: crypto::compute_payment_hash(&SymmetricKey::generate()),
            valid_till: Utc::now(),
        };
        let response = ResponseFrame::new(
            authority.issue(replier_pk).unwrap(),
            &[hop_instruction],
            &[preimage],
            OnionRoute::empty(),
            request,
            b"hello",
            invoice,
        );

        let instruction = &response.signed_reply_payload.payment_crypto_instruction_list[0];
        let recovered = crypto::decrypt_bytes(&instruction.encrypted_preimage, &hop_sk).unwrap();
        assert_eq!(crypto::compute_payment_hash(&SymmetricKey::from_slice(&recovered).unwrap()), instruction.payment_hash);

        let mut channel = crate::payments::InMemoryChannel::new(b"hop".to_vec());
        let settled = response.make_invoice(0, &mut channel, Utc::now(), &hop_sk).unwrap();
        assert_eq!(settled.amount, 3);
        assert_eq!(settled.payment_hash, instruction.payment_hash);

        let (other_sk, _other_pk) = keypair();
        assert!(response.make_invoice(0, &mut channel, Utc::now(), &other_sk).is_none());
    }

    /// Invariant 6 (routing-tuple integrity): two structurally identical
    /// routing instructions produce the same ledger key regardless of
    /// where they came from, so a shared hop resolves to one preimage.
    #[test]
    fn identical_routing_instructions_share_a_tuple() {
        let (_sk, pk) = keypair();
        let a = RoutingPaymentInstruction { account: b"relay".to_vec(), amount: 7, public_key: pk };
        let b = RoutingPaymentInstruction { account: b"relay".to_vec(), amount: 7, public_key: pk };
        assert_eq!(a.to_tuple(), b.to_tuple());

        let c = RoutingPaymentInstruction { account: b"relay".to_vec(), amount: 8, public_key: pk };
        assert_ne!(a.to_tuple(), c.to_tuple());
    }

    #[test]
    fn tampered_pow_broadcast_frame_fails_verification() {
        let authority = LocalAuthority::generate();
        let (sk, pk) = keypair();
        let certificate = authority.issue(pk).unwrap();
        let request = signed_request(&sk, certificate);

        let payload = BroadcastPayload {
            signed_request_payload: request,
            backward_onion: OnionRoute::empty(),
            routing_payment_instruction_list: Vec::new(),
        };
        let work_request = WorkRequest { pow_scheme: crate::pow::PowScheme::Sha256d, pow_target: 4 };
        let proof_of_work = work_request.compute_proof(&payload);
        let frame = PowBroadcastFrame { ask_id: AskId::new_v4(), broadcast_payload: payload, proof_of_work };
        assert!(frame.verify());

        let mut tampered = frame.clone();
        tampered.broadcast_payload.routing_payment_instruction_list.push(RoutingPaymentInstruction {
            account: b"injected".to_vec(),
            amount: 1,
            public_key: pk,
        });
        assert!(!tampered.verify());
    }
}
