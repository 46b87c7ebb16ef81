//! The keyless signing protocol.
//!
//! One call to [`KeylessSigner::sign`] runs the whole exchange: token,
//! fresh key, certificate, DSSE signature. The key and token do not outlive
//! the call.

use crate::error::{Error, Result};
use crate::in_toto::DSSE_PAYLOAD_TYPE;
use crate::in_toto::dsse::Envelope;
use crate::signing::fulcio::{CertificateAuthority, CertificateRequest, SigningCertificate};
use crate::signing::identity::IdentityProvider;
use crate::signing::signable::Signable;
use crate::signing::{EphemeralKeyPair, verify_signature};
use crate::slsa::statement::ProvenanceStatement;
use crate::trust::TrustRoot;

/// Signed envelope plus the certificate its signature verifies against.
#[derive(Debug, Clone)]
pub struct SignedAttestation {
    pub envelope: Envelope,
    pub certificate: SigningCertificate,
}

pub struct KeylessSigner<'t> {
    identity: Option<Box<dyn IdentityProvider>>,
    authority: Box<dyn CertificateAuthority>,
    trust_root: &'t TrustRoot,
}

impl<'t> KeylessSigner<'t> {
    pub fn new(
        identity: Option<Box<dyn IdentityProvider>>,
        authority: Box<dyn CertificateAuthority>,
        trust_root: &'t TrustRoot,
    ) -> Self {
        Self {
            identity,
            authority,
            trust_root,
        }
    }

    pub fn sign(&self, statement: &ProvenanceStatement) -> Result<SignedAttestation> {
        let identity = self.identity.as_deref().ok_or_else(missing_identity)?;

        let payload = statement.canonical_bytes()?;

        let token = identity.fetch_token()?;
        if token.is_expired_at(chrono::Utc::now().timestamp()) {
            return Err(Error::Environment(format!(
                "identity token from {} has expired",
                identity.name()
            )));
        }
        log::info!(
            "Obtained identity token from {} (issuer {})",
            identity.name(),
            token.issuer()
        );

        let key = EphemeralKeyPair::generate()?;
        let request = CertificateRequest::new(&key, &token)?;

        let certificate = self
            .authority
            .request_certificate(&token, &request)
            .map_err(|e| match e {
                Error::CertificateIssuance(_) => e,
                other => Error::CertificateIssuance(other.to_string()),
            })?;
        drop(token);

        certificate.ensure_binds(&key)?;
        certificate.verify(self.trust_root)?;
        log::debug!("Signing certificate verified: {certificate:?}");

        let mut envelope = Envelope::new(&payload, DSSE_PAYLOAD_TYPE);
        envelope.sign_with(&key, &certificate)?;
        drop(key);

        if !verify_envelope(&envelope, &certificate)? {
            return Err(Error::Signing(
                "envelope signature does not verify against the issued certificate".to_string(),
            ));
        }
        log::info!("Signed provenance for {}", statement.subject_name());

        Ok(SignedAttestation {
            envelope,
            certificate,
        })
    }
}

/// True when every signature on `envelope` verifies with the certificate's key.
pub fn verify_envelope(envelope: &Envelope, certificate: &SigningCertificate) -> Result<bool> {
    if !envelope.validate() {
        return Ok(false);
    }

    let public_key = certificate.public_key()?;
    let pae = envelope.pae();
    for signature in envelope.signatures() {
        if !verify_signature(&pae, signature.sig(), &public_key)? {
            return Ok(false);
        }
    }

    Ok(true)
}

pub(crate) fn missing_identity() -> Error {
    Error::Environment(
        "no ambient OIDC identity is available; run inside GitHub Actions with \
         `id-token: write` or set SIGSTORE_ID_TOKEN"
            .to_string(),
    )
}
