//! # Signable Trait
//!
//! Common interface for containers that can be signed with an
//! [`EphemeralKeyPair`] and carry the certificate that authorizes the key.
//!
//! Implementors only decide *what* is signed and *where* the signature
//! goes. Key handling stays in [`sign_with`](Signable::sign_with) so every
//! container goes through the same primitive.
//!
//! ## Examples
//!
//! ```
//! use keyless_provenance::in_toto::dsse::Envelope;
//! use keyless_provenance::signing::signable::Signable;
//!
//! let envelope = Envelope::new(b"{}", "application/vnd.in-toto+json");
//! assert!(envelope.signing_input().starts_with(b"DSSEv1 "));
//! ```

use crate::error::Result;
use crate::signing::EphemeralKeyPair;
use crate::signing::fulcio::SigningCertificate;

/// A type that can be signed by a keyless signing operation.
pub trait Signable {
    /// Bytes the signature is computed over.
    fn signing_input(&self) -> Vec<u8>;

    /// Attach a finished signature together with the certificate for the key
    /// that produced it.
    fn attach_signature(&mut self, signature: Vec<u8>, certificate: &SigningCertificate)
    -> Result<()>;

    fn sign_with(&mut self, key: &EphemeralKeyPair, certificate: &SigningCertificate) -> Result<()> {
        let signature = key.sign(&self.signing_input())?;
        self.attach_signature(signature, certificate)
    }
}
