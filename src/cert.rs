// Sweetgossip Core Library
// Written in 2020-2022 by
//     Dr. Maxim Orlovsky <orlovsky@pandoracore.com>
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.

//! Sender/replier identity certificates.
//!
//! A certificate binds a node's public key into a short-lived, signed
//! credential. The issuing authority is abstracted behind
//! [`CertificateAuthority`]; this crate ships one in-memory implementation,
//! [`LocalAuthority`], suitable for single-process tests and simulations.
//! Production deployments plug in their own authority.

use crate::crypto::{self, PrivateKey, PublicKey, Signature};

#[derive(Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum Error {
    /// certificate authority failed to sign the subject key
    #[from]
    Signing(crypto::Error),
}

/// Signed portion of a [`Certificate`]: the subject's public key.
#[derive(Clone, PartialEq, Eq, Debug, StrictEncode, StrictDecode)]
pub struct CertificateBody {
    pub subject_public_key: PublicKey,
}

/// A certificate binding a subject public key, issued and signed by an
/// issuer's private key.
#[derive(Clone, PartialEq, Eq, Debug, StrictEncode, StrictDecode)]
pub struct Certificate {
    body: CertificateBody,
    issuer_public_key: PublicKey,
    signature: Signature,
}

impl Certificate {
    /// Public key this certificate certifies.
    pub fn public_key(&self) -> PublicKey {
        self.body.subject_public_key
    }

    /// Public key of the authority that issued this certificate.
    pub fn issuer_public_key(&self) -> PublicKey {
        self.issuer_public_key
    }

    /// Checks that the certificate's signature was produced by the issuer
    /// over the subject's public key.
    pub fn verify(&self) -> bool {
        crypto::verify_object(&self.body, &self.signature, &self.issuer_public_key).is_ok()
    }
}

/// Abstraction over a certificate-issuing authority.
pub trait CertificateAuthority {
    /// Issues a certificate for `subject_public_key`.
    fn issue(&self, subject_public_key: PublicKey) -> Result<Certificate, Error>;

    /// Public key identifying this authority; matches
    /// [`Certificate::issuer_public_key`] on certificates it issued.
    fn public_key(&self) -> PublicKey;
}

/// An in-memory certificate authority holding its own signing key.
///
/// Intended for tests, simulations and single-operator deployments; it has
/// no revocation or expiry mechanism of its own.
pub struct LocalAuthority {
    private_key: PrivateKey,
    public_key: PublicKey,
}

impl LocalAuthority {
    pub fn new(private_key: PrivateKey) -> Self {
        let public_key = PublicKey::from_secret_key(secp256k1::SECP256K1, &private_key);
        Self { private_key, public_key }
    }

    /// Generates a fresh authority keypair.
    pub fn generate() -> Self {
        let (sk, _pk) = secp256k1::SECP256K1.generate_keypair(&mut secp256k1::rand::rngs::OsRng);
        Self::new(sk)
    }
}

impl CertificateAuthority for LocalAuthority {
    fn issue(&self, subject_public_key: PublicKey) -> Result<Certificate, Error> {
        let body = CertificateBody { subject_public_key };
        let signature = crypto::sign_object(&body, &self.private_key)?;
        Ok(Certificate {
            body,
            issuer_public_key: self.public_key,
            signature,
        })
    }

    fn public_key(&self) -> PublicKey {
        self.public_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_certificate_verifies() {
        let authority = LocalAuthority::generate();
        let (_sk, pk) = secp256k1::SECP256K1.generate_keypair(&mut secp256k1::rand::rngs::OsRng);
        let cert = authority.issue(pk).unwrap();
        assert!(cert.verify());
        assert_eq!(cert.public_key(), pk);
        assert_eq!(cert.issuer_public_key(), authority.public_key());
    }

    #[test]
    fn certificate_from_other_authority_does_not_verify() {
        let authority = LocalAuthority::generate();
        let other_authority = LocalAuthority::generate();
        let (_sk, pk) = secp256k1::SECP256K1.generate_keypair(&mut secp256k1::rand::rngs::OsRng);
        let mut cert = authority.issue(pk).unwrap();
        cert.issuer_public_key = other_authority.public_key();
        assert!(!cert.verify());
    }
}
