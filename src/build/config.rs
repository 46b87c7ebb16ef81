//! Build configuration file (`slsa-releaser.yml` style).
//!
//! ```yaml
//! version: 1
//! goos: linux
//! goarch: amd64
//! binary: myapp-$GOOS-$GOARCH
//! env:
//!   - CGO_ENABLED=0
//! flags:
//!   - -trimpath
//! ldflags:
//!   - -X main.version=$VERSION
//! ```

use crate::error::{Error, Result};
use crate::utils::safe_open_file;
use serde::Deserialize;
use std::path::{Component, Path};

use super::env::is_valid_name;

pub const SUPPORTED_CONFIG_VERSION: u32 = 1;

/// Environment variable name prefixes a config may set for the build tool.
pub const ALLOWED_ENV_PREFIXES: &[&str] = &["GO", "CGO_"];

/// `go build` flags a config may pass. `-o` and `-ldflags` are managed by the
/// executor and therefore absent.
pub const ALLOWED_BUILD_FLAGS: &[&str] = &[
    "-a",
    "-race",
    "-msan",
    "-asan",
    "-v",
    "-x",
    "-buildinfo",
    "-buildmode",
    "-buildvcs",
    "-compiler",
    "-gccgoflags",
    "-gcflags",
    "-linkshared",
    "-mod",
    "-tags",
    "-trimpath",
];

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    pub version: u32,
    pub goos: String,
    pub goarch: String,
    pub binary: String,
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub ldflags: Vec<String>,
    /// Package to build, e.g. `./cmd/server`.
    #[serde(default)]
    pub main: Option<String>,
    /// Directory, relative to the invocation directory, to build from.
    #[serde(default)]
    pub dir: Option<String>,
}

impl BuildConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = safe_open_file(path, false)?;
        let config: BuildConfig = serde_yaml::from_reader(file)?;
        config.validate()?;
        log::debug!("Loaded build config from {}", path.display());
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: BuildConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.version != SUPPORTED_CONFIG_VERSION {
            return Err(Error::Configuration(format!(
                "unsupported config version {} (expected {SUPPORTED_CONFIG_VERSION})",
                self.version
            )));
        }
        if self.goos.trim().is_empty() || self.goarch.trim().is_empty() {
            return Err(Error::Configuration(
                "goos and goarch must be set".to_string(),
            ));
        }
        if self.binary.trim().is_empty() {
            return Err(Error::Configuration("binary must be set".to_string()));
        }

        for entry in &self.env {
            let (name, _) = entry.split_once('=').ok_or_else(|| {
                Error::Configuration(format!("invalid env entry '{entry}': expected NAME=VALUE"))
            })?;
            if !is_valid_name(name) {
                return Err(Error::Configuration(format!(
                    "invalid env variable name '{name}'"
                )));
            }
            if !ALLOWED_ENV_PREFIXES.iter().any(|p| name.starts_with(p)) {
                return Err(Error::Configuration(format!(
                    "env variable '{name}' is not allowed; names must start with one of {ALLOWED_ENV_PREFIXES:?}"
                )));
            }
            if name == "GOOS" || name == "GOARCH" {
                return Err(Error::Configuration(format!(
                    "'{name}' must be set through the '{}' field",
                    name.to_lowercase()
                )));
            }
        }

        for flag in &self.flags {
            let name = flag.split_once('=').map_or(flag.as_str(), |(n, _)| n);
            if !ALLOWED_BUILD_FLAGS.contains(&name) {
                return Err(Error::Configuration(format!(
                    "build flag '{flag}' is not allowed"
                )));
            }
        }

        if let Some(dir) = &self.dir {
            ensure_relative_subpath(dir)?;
        }

        Ok(())
    }
}

/// Reject absolute paths and parent traversal in config-supplied directories.
fn ensure_relative_subpath(dir: &str) -> Result<()> {
    let path = Path::new(dir);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(Error::Configuration(format!(
            "dir '{dir}' must be a relative path inside the working directory"
        )));
    }
    Ok(())
}
