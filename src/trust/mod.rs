//! # Trust Root
//!
//! Root-of-trust material for the certificate authority and the
//! transparency log, for either the production or the staging instance.
//!
//! - Production trust is compiled into the binary and never touches the
//!   network or the local trust cache.
//! - Staging trust is fetched fresh on every run from the distribution
//!   point named by `STAGING_TRUST_URL`. The cached copy is thrown away
//!   first, and the downloaded bundle must carry a valid signature from the
//!   bootstrap key at `STAGING_TRUST_KEY` before anything is trusted or
//!   written back. No staging distribution point ships with the binary.
//!
//! A [`TrustRoot`] is validated as a whole when it is constructed and is
//! read-only afterwards. It is built once per run and handed to the signer
//! and the transparency client by reference.

use crate::error::{Error, Result};
use crate::signing::{public_key_from_pem, verify_signature};
use crate::utils::safe_create_file;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use openssl::asn1::Asn1Time;
use openssl::pkey::{PKey, Public};
use openssl::stack::Stack;
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::{X509, X509StoreContext, X509VerifyResult};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const PRODUCTION_BUNDLE: &str = include_str!("../../trust/production.json");

pub const STAGING_URL_VAR: &str = "STAGING_TRUST_URL";
pub const STAGING_KEY_VAR: &str = "STAGING_TRUST_KEY";
pub const BUNDLE_FILE: &str = "trust-bundle.json";
pub const BUNDLE_SIGNATURE_FILE: &str = "trust-bundle.json.sig";
pub const STAGING_CACHE_SUBDIR: &str = "staging";
pub const TUF_ROOT_VAR: &str = "TUF_ROOT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrustMode {
    #[default]
    Production,
    Staging,
}

impl TrustMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrustMode::Production => "production",
            TrustMode::Staging => "staging",
        }
    }
}

impl fmt::Display for TrustMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CertificateAuthorityEntry {
    pub url: String,
    /// PEM certificates: at least one self-signed root, optionally
    /// intermediates.
    pub certificates: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TransparencyLogEntry {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

/// On-disk/over-the-wire form of a trust root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrustBundle {
    pub version: u32,
    pub environment: String,
    pub fulcio: CertificateAuthorityEntry,
    pub rekor: TransparencyLogEntry,
}

impl TrustBundle {
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| Error::TrustInitialization(format!("malformed trust bundle: {e}")))
    }
}

/// Validated trust material plus the service endpoints it belongs to.
pub struct TrustRoot {
    mode: TrustMode,
    version: u32,
    fulcio_url: String,
    rekor_url: String,
    fulcio_roots: Vec<X509>,
    fulcio_intermediates: Vec<X509>,
    rekor_key: Option<PKey<Public>>,
}

impl TrustRoot {
    /// Validate `bundle` as trust material for `mode`.
    pub fn from_bundle(bundle: &TrustBundle, mode: TrustMode) -> Result<Self> {
        if bundle.environment != mode.as_str() {
            return Err(Error::TrustInitialization(format!(
                "bundle is for environment '{}', expected '{mode}'",
                bundle.environment
            )));
        }
        if bundle.version != 1 {
            return Err(Error::TrustInitialization(format!(
                "unsupported trust bundle version {}",
                bundle.version
            )));
        }
        for url in [&bundle.fulcio.url, &bundle.rekor.url] {
            if !url.starts_with("https://") {
                return Err(Error::TrustInitialization(format!(
                    "service endpoint must use https: '{url}'"
                )));
            }
        }

        let now = Asn1Time::days_from_now(0).map_err(trust_error)?;
        let mut fulcio_roots = Vec::new();
        let mut fulcio_intermediates = Vec::new();
        for pem in &bundle.fulcio.certificates {
            let cert = X509::from_pem(pem.as_bytes()).map_err(|e| {
                Error::TrustInitialization(format!("invalid certificate authority certificate: {e}"))
            })?;

            if cert.not_after().compare(&now).map_err(trust_error)? == Ordering::Less {
                return Err(Error::TrustInitialization(format!(
                    "certificate authority certificate expired at {}",
                    cert.not_after()
                )));
            }

            if cert.issued(&cert) == X509VerifyResult::OK {
                let public_key = cert.public_key().map_err(trust_error)?;
                if !cert.verify(&public_key).map_err(trust_error)? {
                    return Err(Error::TrustInitialization(
                        "root certificate has an invalid self-signature".to_string(),
                    ));
                }
                fulcio_roots.push(cert);
            } else {
                fulcio_intermediates.push(cert);
            }
        }
        if fulcio_roots.is_empty() {
            return Err(Error::TrustInitialization(
                "trust bundle contains no certificate authority root".to_string(),
            ));
        }

        let rekor_key = bundle
            .rekor
            .public_key
            .as_deref()
            .map(|pem| {
                public_key_from_pem(pem.as_bytes()).map_err(|e| {
                    Error::TrustInitialization(format!("invalid transparency log key: {e}"))
                })
            })
            .transpose()?;

        Ok(Self {
            mode,
            version: bundle.version,
            fulcio_url: bundle.fulcio.url.clone(),
            rekor_url: bundle.rekor.url.clone(),
            fulcio_roots,
            fulcio_intermediates,
            rekor_key,
        })
    }

    pub fn mode(&self) -> TrustMode {
        self.mode
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn fulcio_url(&self) -> &str {
        &self.fulcio_url
    }

    pub fn rekor_url(&self) -> &str {
        &self.rekor_url
    }

    pub fn rekor_key(&self) -> Option<&PKey<Public>> {
        self.rekor_key.as_ref()
    }

    /// Log ID of the trusted transparency log: hex SHA-256 of its DER key.
    pub fn rekor_log_id(&self) -> Result<Option<String>> {
        self.rekor_key
            .as_ref()
            .map(|key| {
                let der = key.public_key_to_der().map_err(trust_error)?;
                Ok(crate::hash::calculate_hash_with_algorithm(
                    &der,
                    &crate::hash::DigestAlgorithm::Sha256,
                ))
            })
            .transpose()
    }

    /// Verify `leaf` up to one of the certificate authority roots, using
    /// `chain` and the bundle's intermediates as untrusted helpers.
    pub fn verify_certificate(&self, leaf: &X509, chain: &[X509]) -> Result<()> {
        let issuance = |e: openssl::error::ErrorStack| Error::CertificateIssuance(e.to_string());

        let mut store = X509StoreBuilder::new().map_err(issuance)?;
        for root in &self.fulcio_roots {
            store.add_cert(root.clone()).map_err(issuance)?;
        }
        let store = store.build();

        let mut untrusted = Stack::new().map_err(issuance)?;
        for cert in chain.iter().chain(&self.fulcio_intermediates) {
            untrusted.push(cert.clone()).map_err(issuance)?;
        }

        let mut context = X509StoreContext::new().map_err(issuance)?;
        let failure = context
            .init(&store, leaf, &untrusted, |ctx| {
                Ok(if ctx.verify_cert()? {
                    None
                } else {
                    Some(ctx.error().error_string().to_string())
                })
            })
            .map_err(issuance)?;

        match failure {
            None => Ok(()),
            Some(reason) => Err(Error::CertificateIssuance(reason)),
        }
    }
}

impl fmt::Debug for TrustRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustRoot")
            .field("mode", &self.mode)
            .field("version", &self.version)
            .field("fulcio_url", &self.fulcio_url)
            .field("rekor_url", &self.rekor_url)
            .field("fulcio_roots", &self.fulcio_roots.len())
            .field("fulcio_intermediates", &self.fulcio_intermediates.len())
            .field("rekor_key", &self.rekor_key.is_some())
            .finish()
    }
}

fn trust_error(e: openssl::error::ErrorStack) -> Error {
    Error::TrustInitialization(e.to_string())
}

/// A trust bundle and its detached DER ECDSA signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedBundle {
    pub bundle: Vec<u8>,
    pub signature: Vec<u8>,
}

/// Where staging trust bundles come from.
pub trait BundleSource {
    fn location(&self) -> String;

    fn fetch(&self) -> Result<FetchedBundle>;
}

/// Fetches `trust-bundle.json` and its base64 `.sig` over HTTPS.
pub struct HttpBundleSource {
    client: Client,
    base_url: String,
}

impl HttpBundleSource {
    pub fn new(url: &str) -> Result<Self> {
        if !url.starts_with("https://") {
            return Err(Error::TrustInitialization(format!(
                "staging distribution point must use https: {url}"
            )));
        }
        let client = Client::builder()
            .build()
            .map_err(|e| Error::TrustInitialization(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: url.trim_end_matches('/').to_string(),
        })
    }

    fn get(&self, file: &str) -> Result<Vec<u8>> {
        let url = format!("{}/{}", self.base_url, file);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| Error::TrustInitialization(format!("fetching {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::TrustInitialization(format!(
                "fetching {url}: server returned {status}"
            )));
        }

        let bytes = response
            .bytes()
            .map_err(|e| Error::TrustInitialization(format!("reading {url}: {e}")))?;
        Ok(bytes.to_vec())
    }
}

impl BundleSource for HttpBundleSource {
    fn location(&self) -> String {
        self.base_url.clone()
    }

    fn fetch(&self) -> Result<FetchedBundle> {
        let bundle = self.get(BUNDLE_FILE)?;
        let encoded = self.get(BUNDLE_SIGNATURE_FILE)?;
        let signature = STANDARD
            .decode(String::from_utf8_lossy(&encoded).trim())
            .map_err(|e| Error::TrustInitialization(format!("bundle signature: {e}")))?;

        Ok(FetchedBundle { bundle, signature })
    }
}

/// Trust cache root: `$TUF_ROOT` when set, otherwise `~/.sigstore/root`.
pub fn default_cache_root(tuf_root: Option<OsString>) -> Result<PathBuf> {
    if let Some(root) = tuf_root.filter(|root| !root.is_empty()) {
        return Ok(PathBuf::from(root));
    }

    let dirs = directories::BaseDirs::new().ok_or_else(|| {
        Error::TrustInitialization("cannot determine the home directory".to_string())
    })?;
    Ok(dirs.home_dir().join(".sigstore").join("root"))
}

/// Builds the [`TrustRoot`] for a run.
///
/// Staging needs both a bundle source and a bootstrap key; without them a
/// staging run fails instead of guessing a distribution point.
pub struct TrustRootManager {
    cache_root: PathBuf,
    source: Option<Box<dyn BundleSource>>,
    bootstrap_key_pem: Option<String>,
}

impl TrustRootManager {
    pub fn new(cache_root: PathBuf) -> Self {
        Self {
            cache_root,
            source: None,
            bootstrap_key_pem: None,
        }
    }

    /// Apply the operator's staging settings: an HTTPS distribution point
    /// and the path of a PEM bootstrap public key.
    pub fn with_staging_settings(
        mut self,
        url: Option<&str>,
        key_path: Option<&Path>,
    ) -> Result<Self> {
        if let Some(url) = url {
            self.source = Some(Box::new(HttpBundleSource::new(url)?));
        }
        if let Some(path) = key_path {
            let pem = fs::read_to_string(path).map_err(|e| {
                Error::TrustInitialization(format!(
                    "cannot read bootstrap key {}: {e}",
                    path.display()
                ))
            })?;
            self.bootstrap_key_pem = Some(pem);
        }
        Ok(self)
    }

    pub fn with_source(mut self, source: Box<dyn BundleSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_bootstrap_key(mut self, pem: impl Into<String>) -> Self {
        self.bootstrap_key_pem = Some(pem.into());
        self
    }

    /// Directory holding the staging bundle; production never uses it.
    pub fn staging_cache_dir(&self) -> PathBuf {
        self.cache_root.join(STAGING_CACHE_SUBDIR)
    }

    pub fn initialize(&self, mode: TrustMode) -> Result<TrustRoot> {
        let root = match mode {
            TrustMode::Production => Self::initialize_production()?,
            TrustMode::Staging => self.initialize_staging()?,
        };
        log::info!(
            "Trust root initialized ({mode}, certificate authority {}, transparency log {})",
            root.fulcio_url(),
            root.rekor_url()
        );
        Ok(root)
    }

    fn initialize_production() -> Result<TrustRoot> {
        let bundle = TrustBundle::from_json(PRODUCTION_BUNDLE.as_bytes())?;
        TrustRoot::from_bundle(&bundle, TrustMode::Production)
    }

    fn initialize_staging(&self) -> Result<TrustRoot> {
        let (Some(source), Some(bootstrap_key_pem)) = (&self.source, &self.bootstrap_key_pem)
        else {
            return Err(Error::TrustInitialization(format!(
                "staging trust is not configured: set {STAGING_URL_VAR} and {STAGING_KEY_VAR}"
            )));
        };

        let cache_dir = self.staging_cache_dir();
        match fs::remove_dir_all(&cache_dir) {
            Ok(()) => log::debug!("Discarded cached staging trust at {}", cache_dir.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(Error::TrustInitialization(format!(
                    "cannot clear trust cache {}: {e}",
                    cache_dir.display()
                )));
            }
        }

        log::debug!("Fetching staging trust bundle from {}", source.location());
        let fetched = source.fetch().map_err(|e| match e {
            Error::TrustInitialization(_) => e,
            other => Error::TrustInitialization(other.to_string()),
        })?;

        let bootstrap = public_key_from_pem(bootstrap_key_pem.as_bytes())
            .map_err(|e| Error::TrustInitialization(format!("bootstrap key: {e}")))?;
        let signature_ok = verify_signature(&fetched.bundle, &fetched.signature, &bootstrap)
            .map_err(|e| Error::TrustInitialization(e.to_string()))?;
        if !signature_ok {
            return Err(Error::TrustInitialization(
                "staging trust bundle signature does not verify with the bootstrap key".to_string(),
            ));
        }

        let bundle = TrustBundle::from_json(&fetched.bundle)?;
        let root = TrustRoot::from_bundle(&bundle, TrustMode::Staging)?;

        write_cache(&cache_dir, &fetched).map_err(|e| {
            Error::TrustInitialization(format!(
                "cannot write trust cache {}: {e}",
                cache_dir.display()
            ))
        })?;

        Ok(root)
    }
}

fn write_cache(cache_dir: &Path, fetched: &FetchedBundle) -> Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(cache_dir)?;

    let mut file = safe_create_file(&cache_dir.join(BUNDLE_FILE), true)?;
    file.write_all(&fetched.bundle)?;
    file.sync_all()?;

    let mut file = safe_create_file(&cache_dir.join(BUNDLE_SIGNATURE_FILE), true)?;
    file.write_all(STANDARD.encode(&fetched.signature).as_bytes())?;
    file.sync_all()?;

    Ok(())
}
