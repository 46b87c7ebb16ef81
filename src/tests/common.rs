//! In-process stand-ins for the identity provider, certificate authority,
//! transparency log and trust bundle distribution point.

use crate::error::{Error, Result};
use crate::signing::fulcio::{CertificateAuthority, CertificateRequest, SigningCertificate};
use crate::signing::identity::{IdentityProvider, IdentityToken, StaticTokenProvider};
use crate::signing::{public_key_from_pem, sign_data, verify_signature};
use crate::storage::rekor::{
    InclusionProof, LogEntry, LogEntryBody, ProposedEntry, TransparencyLog, Verification,
};
use crate::trust::{
    BundleSource, CertificateAuthorityEntry, FetchedBundle, TransparencyLogEntry, TrustBundle,
    TrustMode, TrustRoot,
};
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private, Public};
use openssl::x509::extension::{
    BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectAlternativeName,
};
use openssl::x509::{X509, X509Builder, X509NameBuilder};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

pub const TEST_SUBJECT: &str = "repo:octo/myapp:ref:refs/heads/main";

pub fn p256_key() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

pub fn public_pem(key: &PKey<Private>) -> String {
    String::from_utf8(key.public_key_to_pem().unwrap()).unwrap()
}

pub fn make_jwt(claims: &serde_json::Value) -> String {
    format!(
        "{}.{}.{}",
        URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#),
        URL_SAFE_NO_PAD.encode(claims.to_string()),
        URL_SAFE_NO_PAD.encode(b"not-checked"),
    )
}

pub fn test_identity() -> Box<dyn IdentityProvider> {
    Box::new(StaticTokenProvider::new(make_jwt(&serde_json::json!({
        "iss": "https://token.actions.githubusercontent.com",
        "sub": TEST_SUBJECT,
    }))))
}

fn random_serial() -> openssl::asn1::Asn1Integer {
    let mut serial = BigNum::new().unwrap();
    serial.rand(64, MsbOption::MAYBE_ZERO, false).unwrap();
    serial.to_asn1_integer().unwrap()
}

/// Self-signed P-256 certificate authority.
pub struct TestCa {
    key: PKey<Private>,
    cert: X509,
}

impl TestCa {
    pub fn new(common_name: &str) -> Self {
        let key = p256_key();
        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_text("O", "keyless-provenance tests").unwrap();
        name.append_entry_by_text("CN", common_name).unwrap();
        let name = name.build();

        let mut builder = X509Builder::new().unwrap();
        builder.set_version(2).unwrap();
        builder.set_serial_number(&random_serial()).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(&key).unwrap();
        builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
        builder.set_not_after(&Asn1Time::days_from_now(30).unwrap()).unwrap();
        builder
            .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
            .unwrap();
        builder
            .append_extension(
                KeyUsage::new()
                    .critical()
                    .key_cert_sign()
                    .crl_sign()
                    .build()
                    .unwrap(),
            )
            .unwrap();
        builder.sign(&key, MessageDigest::sha256()).unwrap();

        Self {
            key,
            cert: builder.build(),
        }
    }

    pub fn cert_pem(&self) -> String {
        String::from_utf8(self.cert.to_pem().unwrap()).unwrap()
    }

    /// Short-lived code-signing certificate for `subject_key`.
    pub fn issue(&self, subject_key: &PKey<Public>, identity: &str) -> X509 {
        // certificate authorities of this kind issue leaves with an empty subject
        let empty_name = X509NameBuilder::new().unwrap().build();

        let mut builder = X509Builder::new().unwrap();
        builder.set_version(2).unwrap();
        builder.set_serial_number(&random_serial()).unwrap();
        builder.set_subject_name(&empty_name).unwrap();
        builder.set_issuer_name(self.cert.subject_name()).unwrap();
        builder.set_pubkey(subject_key).unwrap();
        builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
        builder.set_not_after(&Asn1Time::days_from_now(1).unwrap()).unwrap();
        builder
            .append_extension(BasicConstraints::new().critical().build().unwrap())
            .unwrap();
        builder
            .append_extension(KeyUsage::new().critical().digital_signature().build().unwrap())
            .unwrap();
        builder
            .append_extension(ExtendedKeyUsage::new().code_signing().build().unwrap())
            .unwrap();
        let san = SubjectAlternativeName::new()
            .critical()
            .uri(&format!("https://github.com/{identity}"))
            .build(&builder.x509v3_context(Some(&*self.cert), None))
            .unwrap();
        builder.append_extension(san).unwrap();
        builder.sign(&self.key, MessageDigest::sha256()).unwrap();
        builder.build()
    }
}

/// How [`FakeFulcio`] answers certificate requests.
pub enum FulcioBehavior {
    Honest,
    /// Certifies an unrelated key.
    WrongKey,
    /// Refuses every request.
    Unavailable,
}

pub struct FakeFulcio {
    ca: Rc<TestCa>,
    behavior: FulcioBehavior,
    calls: Rc<Cell<usize>>,
}

impl FakeFulcio {
    pub fn new(ca: Rc<TestCa>, behavior: FulcioBehavior) -> (Self, Rc<Cell<usize>>) {
        let calls = Rc::new(Cell::new(0));
        (
            Self {
                ca,
                behavior,
                calls: calls.clone(),
            },
            calls,
        )
    }
}

impl CertificateAuthority for FakeFulcio {
    fn request_certificate(
        &self,
        token: &IdentityToken,
        request: &CertificateRequest,
    ) -> Result<SigningCertificate> {
        self.calls.set(self.calls.get() + 1);

        let requested = public_key_from_pem(request.public_key_pem.as_bytes())?;
        if !verify_signature(
            token.proof_subject().as_bytes(),
            &request.proof_of_possession,
            &requested,
        )? {
            return Err(Error::CertificateIssuance(
                "proof of possession rejected".to_string(),
            ));
        }

        let certified = match self.behavior {
            FulcioBehavior::Honest => requested,
            FulcioBehavior::WrongKey => {
                PKey::public_key_from_pem(public_pem(&p256_key()).as_bytes()).unwrap()
            }
            FulcioBehavior::Unavailable => {
                return Err(Error::CertificateIssuance("503 Service Unavailable".to_string()));
            }
        };

        let leaf = self.ca.issue(&certified, token.proof_subject());
        let leaf_pem = String::from_utf8(leaf.to_pem().unwrap()).unwrap();
        SigningCertificate::from_pem_chain(&[leaf_pem, self.ca.cert_pem()])
    }
}

#[derive(Default)]
pub struct RekorState {
    pub entries: BTreeMap<String, LogEntry>,
    pub submissions: usize,
}

/// Append-only in-memory log that signs entry timestamps. Clones share
/// state, so a test can keep one handle after boxing another.
#[derive(Clone)]
pub struct FakeRekor {
    key: Rc<PKey<Private>>,
    pub state: Rc<RefCell<RekorState>>,
    pub fail: bool,
}

impl FakeRekor {
    pub fn new() -> Self {
        Self {
            key: Rc::new(p256_key()),
            state: Rc::new(RefCell::new(RekorState::default())),
            fail: false,
        }
    }

    /// A log that rejects every submission.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn public_key_pem(&self) -> String {
        public_pem(&self.key)
    }

    fn log_id(&self) -> String {
        crate::hash::calculate_hash_with_algorithm(
            &self.key.public_key_to_der().unwrap(),
            &crate::hash::DigestAlgorithm::Sha256,
        )
    }
}

impl TransparencyLog for FakeRekor {
    fn submit(&self, entry: &ProposedEntry) -> Result<LogEntry> {
        let mut state = self.state.borrow_mut();
        state.submissions += 1;
        if self.fail {
            return Err(Error::LogSubmission("500 Internal Server Error".to_string()));
        }

        let canonical = serde_json::to_vec(entry)?;
        let uuid = crate::hash::calculate_hash_with_algorithm(
            &canonical,
            &crate::hash::DigestAlgorithm::Sha256,
        );
        if let Some(existing) = state.entries.get(&uuid) {
            return Ok(existing.clone());
        }

        let log_index = state.entries.len() as i64;
        let mut log_entry = LogEntry::from_parts(
            uuid.clone(),
            LogEntryBody {
                body: STANDARD.encode(&canonical),
                integrated_time: 1_700_000_000 + log_index,
                log_id: self.log_id(),
                log_index,
                verification: Some(Verification {
                    inclusion_proof: Some(InclusionProof {
                        log_index,
                        root_hash: uuid.clone(),
                        tree_size: log_index + 1,
                        hashes: vec![],
                        checkpoint: None,
                    }),
                    signed_entry_timestamp: None,
                }),
            },
        );
        let set = sign_data(&log_entry.signed_entry_payload()?, &self.key)?;
        log_entry.signed_entry_timestamp = Some(STANDARD.encode(set));

        state.entries.insert(uuid, log_entry.clone());
        Ok(log_entry)
    }
}

pub fn test_bundle(environment: &str, ca: &TestCa, rekor_key_pem: Option<String>) -> TrustBundle {
    TrustBundle {
        version: 1,
        environment: environment.to_string(),
        fulcio: CertificateAuthorityEntry {
            url: "https://fulcio.test".to_string(),
            certificates: vec![ca.cert_pem()],
        },
        rekor: TransparencyLogEntry {
            url: "https://rekor.test".to_string(),
            public_key: rekor_key_pem,
        },
    }
}

pub fn test_trust_root(ca: &TestCa, rekor: &FakeRekor) -> TrustRoot {
    TrustRoot::from_bundle(
        &test_bundle("production", ca, Some(rekor.public_key_pem())),
        TrustMode::Production,
    )
    .unwrap()
}

/// Serves one fixed answer and counts fetches.
pub struct FakeBundleSource {
    answer: Option<FetchedBundle>,
    pub fetches: Rc<Cell<usize>>,
}

impl FakeBundleSource {
    pub fn serving(answer: Option<FetchedBundle>) -> (Self, Rc<Cell<usize>>) {
        let fetches = Rc::new(Cell::new(0));
        (
            Self {
                answer,
                fetches: fetches.clone(),
            },
            fetches,
        )
    }

    /// A bundle signed with `signer`.
    pub fn signed(bundle: &TrustBundle, signer: &PKey<Private>) -> FetchedBundle {
        let bytes = serde_json::to_vec(bundle).unwrap();
        FetchedBundle {
            signature: sign_data(&bytes, signer).unwrap(),
            bundle: bytes,
        }
    }
}

impl BundleSource for FakeBundleSource {
    fn location(&self) -> String {
        "memory://bundle".to_string()
    }

    fn fetch(&self) -> Result<FetchedBundle> {
        self.fetches.set(self.fetches.get() + 1);
        self.answer
            .clone()
            .ok_or_else(|| Error::TrustInitialization("404 Not Found".to_string()))
    }
}
