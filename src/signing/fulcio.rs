//! Certificate authority client.
//!
//! Exchanges an identity token plus a proof of possession of the ephemeral
//! key for a short-lived X.509 certificate binding that key to the identity.

use crate::error::{Error, Result};
use crate::signing::EphemeralKeyPair;
use crate::signing::identity::IdentityToken;
use crate::trust::TrustRoot;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use openssl::pkey::{PKey, Public};
use openssl::x509::X509;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const SIGNING_CERT_PATH: &str = "/api/v2/signingCert";

/// Leaf certificate plus the issuing chain, leaf first.
#[derive(Clone)]
pub struct SigningCertificate {
    leaf: X509,
    chain: Vec<X509>,
}

impl SigningCertificate {
    /// Build from PEM certificates ordered leaf first.
    pub fn from_pem_chain<S: AsRef<str>>(pems: &[S]) -> Result<Self> {
        let mut certs = pems
            .iter()
            .map(|pem| {
                X509::from_pem(pem.as_ref().as_bytes()).map_err(|e| {
                    Error::CertificateIssuance(format!("invalid certificate in chain: {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        if certs.is_empty() {
            return Err(Error::CertificateIssuance(
                "certificate authority returned an empty chain".to_string(),
            ));
        }
        let leaf = certs.remove(0);

        Ok(Self { leaf, chain: certs })
    }

    pub fn leaf_pem(&self) -> Result<String> {
        let pem = self
            .leaf
            .to_pem()
            .map_err(|e| Error::Serialization(format!("certificate to PEM: {e}")))?;
        String::from_utf8(pem).map_err(|e| Error::Serialization(e.to_string()))
    }

    pub fn public_key(&self) -> Result<PKey<Public>> {
        self.leaf
            .public_key()
            .map_err(|e| Error::CertificateIssuance(format!("certificate public key: {e}")))
    }

    /// Fails unless the certificate certifies exactly `key`.
    pub fn ensure_binds(&self, key: &EphemeralKeyPair) -> Result<()> {
        if self.public_key()?.public_eq(&*key.public_key()?) {
            Ok(())
        } else {
            Err(Error::CertificateIssuance(
                "issued certificate does not match the ephemeral public key".to_string(),
            ))
        }
    }

    /// Verify the chain up to one of the trust root's certificate
    /// authority roots.
    pub fn verify(&self, trust_root: &TrustRoot) -> Result<()> {
        trust_root.verify_certificate(&self.leaf, &self.chain)
    }
}

impl std::fmt::Debug for SigningCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let serial = self
            .leaf
            .serial_number()
            .to_bn()
            .and_then(|bn| bn.to_hex_str())
            .map(|hex| hex.to_string())
            .ok();

        f.debug_struct("SigningCertificate")
            .field("serial", &serial)
            .field("not_after", &self.leaf.not_after().to_string())
            .field("chain_len", &self.chain.len())
            .finish()
    }
}

/// Public key plus a signature over the token subject made with the
/// matching private key.
#[derive(Debug, Clone)]
pub struct CertificateRequest {
    pub public_key_pem: String,
    pub proof_of_possession: Vec<u8>,
}

impl CertificateRequest {
    pub fn new(key: &EphemeralKeyPair, token: &IdentityToken) -> Result<Self> {
        Ok(Self {
            public_key_pem: key.public_key_pem()?,
            proof_of_possession: key.sign(token.proof_subject().as_bytes())?,
        })
    }
}

pub trait CertificateAuthority {
    fn request_certificate(
        &self,
        token: &IdentityToken,
        request: &CertificateRequest,
    ) -> Result<SigningCertificate>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SigningCertBody<'a> {
    credentials: Credentials<'a>,
    public_key_request: PublicKeyRequest<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Credentials<'a> {
    oidc_identity_token: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PublicKeyRequest<'a> {
    public_key: PublicKeyContent<'a>,
    proof_of_possession: String,
}

#[derive(Serialize)]
struct PublicKeyContent<'a> {
    algorithm: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct CertificateChain {
    certificates: Vec<String>,
}

#[derive(Deserialize)]
struct ChainHolder {
    chain: CertificateChain,
}

/// Extract the PEM chain from a `signingCert` response. Both the
/// embedded-SCT and the detached-SCT shapes are accepted.
pub fn parse_certificate_response(body: &str) -> Result<Vec<String>> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| Error::CertificateIssuance(format!("malformed response: {e}")))?;

    let holder = value
        .get("signedCertificateEmbeddedSct")
        .or_else(|| value.get("signedCertificateDetachedSct"))
        .ok_or_else(|| {
            Error::CertificateIssuance("response carries no signed certificate".to_string())
        })?;

    let holder: ChainHolder = serde_json::from_value(holder.clone())
        .map_err(|e| Error::CertificateIssuance(format!("malformed certificate chain: {e}")))?;

    Ok(holder.chain.certificates)
}

pub struct FulcioClient {
    client: Client,
    base_url: String,
}

impl FulcioClient {
    pub fn new(url: &str) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| Error::CertificateIssuance(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: url.trim_end_matches('/').to_string(),
        })
    }
}

impl CertificateAuthority for FulcioClient {
    fn request_certificate(
        &self,
        token: &IdentityToken,
        request: &CertificateRequest,
    ) -> Result<SigningCertificate> {
        let body = SigningCertBody {
            credentials: Credentials {
                oidc_identity_token: token.bearer(),
            },
            public_key_request: PublicKeyRequest {
                public_key: PublicKeyContent {
                    algorithm: "ECDSA",
                    content: &request.public_key_pem,
                },
                proof_of_possession: STANDARD.encode(&request.proof_of_possession),
            },
        };

        let url = format!("{}{}", self.base_url, SIGNING_CERT_PATH);
        log::debug!("Requesting signing certificate from {url}");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| Error::CertificateIssuance(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .map_err(|e| Error::CertificateIssuance(format!("reading response: {e}")))?;
        if !status.is_success() {
            return Err(Error::CertificateIssuance(format!(
                "certificate authority returned {status}: {}",
                text.trim()
            )));
        }

        SigningCertificate::from_pem_chain(&parse_certificate_response(&text)?)
    }
}
