//! Ambient OIDC identity for keyless signing.
//!
//! The token is the only credential the signer ever handles. It is held in
//! zeroizing storage, redacted from `Debug`, and never written anywhere.

use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::fmt;
use zeroize::Zeroizing;

/// Audience requested from identity providers; the certificate authority
/// only accepts tokens minted for it.
pub const SIGSTORE_AUDIENCE: &str = "sigstore";

pub const GITHUB_TOKEN_URL_VAR: &str = "ACTIONS_ID_TOKEN_REQUEST_URL";
pub const GITHUB_TOKEN_REQUEST_VAR: &str = "ACTIONS_ID_TOKEN_REQUEST_TOKEN";
pub const STATIC_TOKEN_VAR: &str = "SIGSTORE_ID_TOKEN";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenClaims {
    pub iss: String,
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
}

/// A short-lived OIDC bearer token plus its decoded (unverified) claims.
///
/// Claims are decoded only to build the proof of possession; the
/// certificate authority is the party that verifies the token.
pub struct IdentityToken {
    raw: Zeroizing<String>,
    claims: TokenClaims,
}

impl IdentityToken {
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = Zeroizing::new(raw.into().trim().to_string());

        let mut parts = raw.split('.');
        let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(_), Some(payload), Some(_), None) => payload,
            _ => {
                return Err(Error::Environment(
                    "identity token is not a JWT".to_string(),
                ));
            }
        };

        let decoded = Zeroizing::new(
            URL_SAFE_NO_PAD
                .decode(payload.trim_end_matches('='))
                .map_err(|e| Error::Environment(format!("identity token payload: {e}")))?,
        );
        let claims: TokenClaims = serde_json::from_slice(&decoded)
            .map_err(|e| Error::Environment(format!("identity token claims: {e}")))?;

        Ok(Self { raw, claims })
    }

    pub fn issuer(&self) -> &str {
        &self.claims.iss
    }

    /// The value the proof of possession is computed over: the `email`
    /// claim when present, the `sub` claim otherwise.
    pub fn proof_subject(&self) -> &str {
        self.claims.email.as_deref().unwrap_or(&self.claims.sub)
    }

    pub fn is_expired_at(&self, unix_seconds: i64) -> bool {
        self.claims.exp.is_some_and(|exp| exp <= unix_seconds)
    }

    pub(crate) fn bearer(&self) -> &str {
        &self.raw
    }
}

impl fmt::Debug for IdentityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityToken")
            .field("issuer", &self.claims.iss)
            .field("subject", &self.claims.sub)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Source of identity tokens for the signer.
pub trait IdentityProvider {
    fn name(&self) -> &str;

    fn fetch_token(&self) -> Result<IdentityToken>;
}

/// GitHub Actions workflow identity (`id-token: write` permission).
pub struct GithubActionsProvider {
    client: Client,
    request_url: String,
    request_token: Zeroizing<String>,
}

#[derive(Deserialize)]
struct GithubTokenResponse {
    value: String,
}

impl GithubActionsProvider {
    pub fn new(request_url: String, request_token: String) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| Error::Environment(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            request_url,
            request_token: Zeroizing::new(request_token),
        })
    }
}

impl IdentityProvider for GithubActionsProvider {
    fn name(&self) -> &str {
        "github-actions"
    }

    fn fetch_token(&self) -> Result<IdentityToken> {
        log::debug!("Requesting OIDC token from the GitHub Actions token service");

        let response = self
            .client
            .get(&self.request_url)
            .query(&[("audience", SIGSTORE_AUDIENCE)])
            .bearer_auth(self.request_token.as_str())
            .send()
            .map_err(|e| Error::Environment(format!("OIDC token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Environment(format!(
                "OIDC token request returned {status}"
            )));
        }

        let body: GithubTokenResponse = response
            .json()
            .map_err(|e| Error::Environment(format!("OIDC token response: {e}")))?;
        let token = Zeroizing::new(body.value);

        IdentityToken::parse(token.as_str())
    }
}

/// A token supplied up front, e.g. through `SIGSTORE_ID_TOKEN`.
pub struct StaticTokenProvider {
    token: Zeroizing<String>,
}

impl StaticTokenProvider {
    pub fn new(token: String) -> Self {
        Self {
            token: Zeroizing::new(token),
        }
    }
}

impl IdentityProvider for StaticTokenProvider {
    fn name(&self) -> &str {
        "static-token"
    }

    fn fetch_token(&self) -> Result<IdentityToken> {
        IdentityToken::parse(self.token.as_str())
    }
}

/// Pick the ambient identity source, GitHub Actions first.
///
/// `lookup` resolves environment variables; the CLI passes
/// `std::env::var`, tests pass a map. Empty values count as unset.
pub fn detect<F>(lookup: F) -> Result<Option<Box<dyn IdentityProvider>>>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let (Some(url), Some(token)) = (
        non_empty(GITHUB_TOKEN_URL_VAR),
        non_empty(GITHUB_TOKEN_REQUEST_VAR),
    ) {
        return Ok(Some(Box::new(GithubActionsProvider::new(url, token)?)));
    }

    if let Some(token) = non_empty(STATIC_TOKEN_VAR) {
        return Ok(Some(Box::new(StaticTokenProvider::new(token))));
    }

    Ok(None)
}
