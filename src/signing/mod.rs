//! # Keyless Signing
//!
//! Everything needed to sign a provenance statement without a long-lived
//! key:
//!
//! - [`identity`] - ambient OIDC identity sources and the short-lived token
//! - [`fulcio`] - the certificate authority client and issued certificates
//! - [`keyless`] - the signing protocol tying the pieces together
//! - [`signable`] - the trait implemented by signable containers
//!
//! This module itself provides the ephemeral ECDSA P-256 key pair and the
//! raw sign/verify primitives.

use crate::error::{Error, Result};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private, Public};
use openssl::sign::{Signer, Verifier};
use std::fmt;
use zeroize::Zeroizing;

pub mod fulcio;
pub mod identity;
pub mod keyless;
pub mod signable;

/// A P-256 key pair that exists only for one signing operation.
///
/// The private half has no export method and is never serialized. OpenSSL
/// clears the private scalar when the key is freed, which happens when this
/// value is dropped.
pub struct EphemeralKeyPair {
    pkey: PKey<Private>,
}

impl EphemeralKeyPair {
    pub fn generate() -> Result<Self> {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1)
            .map_err(|e| Error::Signing(format!("Failed to load P-256 curve: {e}")))?;
        let ec_key = EcKey::generate(&group)
            .map_err(|e| Error::Signing(format!("Failed to generate ephemeral key: {e}")))?;
        let pkey = PKey::from_ec_key(ec_key)
            .map_err(|e| Error::Signing(format!("Failed to wrap ephemeral key: {e}")))?;

        Ok(Self { pkey })
    }

    pub fn public_key_pem(&self) -> Result<String> {
        let pem = self
            .pkey
            .public_key_to_pem()
            .map_err(|e| Error::Signing(format!("Failed to export public key: {e}")))?;
        String::from_utf8(pem).map_err(|e| Error::Signing(e.to_string()))
    }

    pub fn public_key_der(&self) -> Result<Vec<u8>> {
        self.pkey
            .public_key_to_der()
            .map_err(|e| Error::Signing(format!("Failed to export public key: {e}")))
    }

    pub fn public_key(&self) -> Result<PKey<Public>> {
        PKey::public_key_from_der(&self.public_key_der()?)
            .map_err(|e| Error::Signing(e.to_string()))
    }

    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        sign_data(data, &self.pkey)
    }
}

impl fmt::Debug for EphemeralKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralKeyPair")
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// ECDSA/SHA-256 signature (DER encoded) over `data`.
pub fn sign_data(data: &[u8], private_key: &PKey<Private>) -> Result<Vec<u8>> {
    let mut signer = Signer::new(MessageDigest::sha256(), private_key)
        .map_err(|e| Error::Signing(format!("Failed to create signer: {e}")))?;

    signer
        .update(data)
        .map_err(|e| Error::Signing(format!("Failed to update signer: {e}")))?;

    // Sign into a zeroizing buffer first so scratch space is cleared
    let sig_len = signer
        .len()
        .map_err(|e| Error::Signing(format!("Failed to get signature length: {e}")))?;
    let mut signature = Zeroizing::new(vec![0u8; sig_len]);
    let len = signer
        .sign(&mut signature)
        .map_err(|e| Error::Signing(format!("Failed to sign data: {e}")))?;

    Ok(signature[..len].to_vec())
}

/// Verify an ECDSA/SHA-256 signature. Malformed signatures verify as `false`.
pub fn verify_signature(data: &[u8], signature: &[u8], public_key: &PKey<Public>) -> Result<bool> {
    let mut verifier = Verifier::new(MessageDigest::sha256(), public_key)
        .map_err(|e| Error::Signing(e.to_string()))?;

    verifier
        .update(data)
        .map_err(|e| Error::Signing(e.to_string()))?;

    Ok(verifier.verify(signature).unwrap_or(false))
}

pub fn public_key_from_pem(pem: &[u8]) -> Result<PKey<Public>> {
    PKey::public_key_from_pem(pem).map_err(|e| Error::Signing(format!("Invalid public key: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() -> Result<()> {
        let key = EphemeralKeyPair::generate()?;
        let public_key = key.public_key()?;

        let data = b"DSSEv1 28 application/vnd.in-toto+json 2 {}";
        let signature = key.sign(data)?;

        assert!(!signature.is_empty());
        assert!(verify_signature(data, &signature, &public_key)?);
        assert!(!verify_signature(b"tampered", &signature, &public_key)?);
        assert!(!verify_signature(data, b"not a der signature", &public_key)?);

        Ok(())
    }

    #[test]
    fn test_each_key_is_fresh() -> Result<()> {
        let first = EphemeralKeyPair::generate()?;
        let second = EphemeralKeyPair::generate()?;
        assert_ne!(first.public_key_der()?, second.public_key_der()?);

        let signature = first.sign(b"data")?;
        assert!(!verify_signature(b"data", &signature, &second.public_key()?)?);

        Ok(())
    }

    #[test]
    fn test_public_key_pem_roundtrip() -> Result<()> {
        let key = EphemeralKeyPair::generate()?;
        let pem = key.public_key_pem()?;
        assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));

        let parsed = public_key_from_pem(pem.as_bytes())?;
        assert!(parsed.public_eq(&*key.public_key()?));

        Ok(())
    }

    #[test]
    fn test_debug_redacts_private_key() -> Result<()> {
        let key = EphemeralKeyPair::generate()?;
        let debug = format!("{key:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("PRIVATE"));
        Ok(())
    }
}
