//! # Build Executor
//!
//! Resolves a [`BuildConfig`] against caller supplied `NAME=VALUE`
//! assignments and runs `go build` in a restricted subprocess.
//!
//! The resolved [`BuildInvocation`] is the exact command line and
//! environment that is later recorded in the provenance statement, so a dry
//! run and a real run always resolve to the same invocation.
//!
//! ## Examples
//!
//! ```
//! use keyless_provenance::build::{BuildExecutor, config::BuildConfig, env::EnvAssignments};
//!
//! let config = BuildConfig::from_yaml(
//!     "version: 1\ngoos: linux\ngoarch: amd64\nbinary: myapp\nldflags: ['-X main.version=$VERSION']\n",
//! ).unwrap();
//! let executor = BuildExecutor::new(config, "/src");
//! let invocation = executor
//!     .resolve(&EnvAssignments::parse("VERSION=1.2.3").unwrap())
//!     .unwrap();
//!
//! assert_eq!(
//!     invocation.command,
//!     ["go", "build", "-ldflags", "-X main.version=1.2.3", "-o", "myapp"]
//! );
//! ```

pub mod config;
pub mod env;
pub mod launcher;

use crate::error::{Error, Result};
use crate::hash::{ArtifactDigest, DigestAlgorithm};
use crate::utils::{ensure_plain_file_name, find_executable};
use config::BuildConfig;
use env::{EnvAssignments, resolve_arg, resolve_args};
use launcher::{ExitOutcome, ProcessLauncher, ProcessSpec, SystemLauncher};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;

pub const BUILD_TOOL: &str = "go";

/// Host variables the build tool needs to function. They are passed through
/// to the child but not recorded, since they describe the host rather than
/// the build.
pub const PASSTHROUGH_ENV: &[&str] = &["PATH", "HOME", "GOPATH", "GOCACHE", "GOMODCACHE", "TMPDIR"];

/// A fully resolved build command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInvocation {
    /// Recorded command line, starting with the tool name.
    pub command: Vec<String>,
    /// Recorded `NAME=VALUE` environment entries, in the order applied.
    pub env: Vec<String>,
    pub working_dir: PathBuf,
    /// Resolved artifact file name, relative to `working_dir`.
    pub binary: String,
}

impl BuildInvocation {
    pub fn artifact_path(&self) -> PathBuf {
        self.working_dir.join(&self.binary)
    }

    /// Key-value lines consumed by the orchestrator and later handed to
    /// `provenance --command/--env/--workingDir`.
    pub fn output_lines(&self) -> Result<Vec<String>> {
        Ok(vec![
            format!("go-binary-name={}", self.binary),
            format!("go-command={}", serde_json::to_string(&self.command)?),
            format!("go-env={}", serde_json::to_string(&self.env)?),
            format!("go-working-dir={}", self.working_dir.display()),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    pub invocation: BuildInvocation,
    /// `None` for dry runs.
    pub digest: Option<ArtifactDigest>,
}

impl BuildOutcome {
    /// Invocation lines plus `go-binary-sha256` after a real build.
    pub fn output_lines(&self) -> Result<Vec<String>> {
        let mut lines = self.invocation.output_lines()?;
        if let Some(digest) = &self.digest {
            lines.push(format!("go-binary-sha256={}", digest.hex()));
        }
        Ok(lines)
    }
}

pub struct BuildExecutor {
    config: BuildConfig,
    working_dir: PathBuf,
    host_env: BTreeMap<String, String>,
    launcher: Box<dyn ProcessLauncher>,
}

impl BuildExecutor {
    pub fn new(config: BuildConfig, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            working_dir: working_dir.into(),
            host_env: BTreeMap::new(),
            launcher: Box::new(SystemLauncher),
        }
    }

    /// Host environment to draw [`PASSTHROUGH_ENV`] values from. Anything
    /// else in it is ignored.
    pub fn with_host_env<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.host_env = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(k, _)| PASSTHROUGH_ENV.contains(&k.as_str()))
            .collect();
        self
    }

    pub fn with_launcher(mut self, launcher: Box<dyn ProcessLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    /// Resolve placeholders and validate without touching the system.
    pub fn resolve(&self, assignments: &EnvAssignments) -> Result<BuildInvocation> {
        let mut vars = assignments.clone();
        vars.pin("GOOS", &self.config.goos)?;
        vars.pin("GOARCH", &self.config.goarch)?;

        let binary = resolve_arg(&self.config.binary, &vars)?;
        ensure_plain_file_name(&binary)?;

        let mut command = vec![BUILD_TOOL.to_string(), "build".to_string()];
        command.extend(resolve_args(&self.config.flags, &vars)?);

        let ldflags = resolve_args(&self.config.ldflags, &vars)?;
        if !ldflags.is_empty() {
            command.push("-ldflags".to_string());
            command.push(ldflags.join(" "));
        }

        command.push("-o".to_string());
        command.push(binary.clone());
        if let Some(main) = &self.config.main {
            command.push(resolve_arg(main, &vars)?);
        }

        let mut env = vec![
            format!("GOOS={}", self.config.goos),
            format!("GOARCH={}", self.config.goarch),
        ];
        env.extend(self.config.env.iter().cloned());

        let working_dir = match &self.config.dir {
            Some(dir) => self.working_dir.join(dir),
            None => self.working_dir.clone(),
        };

        Ok(BuildInvocation {
            command,
            env,
            working_dir,
            binary,
        })
    }

    /// Resolve, then (unless `dry`) run the build and digest the artifact.
    pub fn run(&self, assignments: &EnvAssignments, dry: bool) -> Result<BuildOutcome> {
        let invocation = self.resolve(assignments)?;
        if dry {
            log::info!("Dry run: resolved `{}`", invocation.command.join(" "));
            return Ok(BuildOutcome {
                invocation,
                digest: None,
            });
        }

        let search_path = self.host_env.get("PATH").map(OsString::from);
        let program = find_executable(BUILD_TOOL, search_path.as_deref()).ok_or_else(|| {
            Error::ToolNotFound(format!("'{BUILD_TOOL}' was not found on PATH"))
        })?;

        let mut child_env = self.host_env.clone();
        for entry in &invocation.env {
            if let Some((name, value)) = entry.split_once('=') {
                child_env.insert(name.to_string(), value.to_string());
            }
        }

        let spec = ProcessSpec {
            program,
            args: invocation.command[1..].to_vec(),
            env: child_env,
            dir: invocation.working_dir.clone(),
        };

        log::info!("Running `{}`", invocation.command.join(" "));
        match self.launcher.run(&spec)? {
            ExitOutcome::Exited(0) => {}
            ExitOutcome::Exited(code) => {
                return Err(Error::BuildExecution(format!(
                    "`{}` exited with status {code}",
                    invocation.command.join(" ")
                )));
            }
            ExitOutcome::Terminated => {
                return Err(Error::BuildExecution(format!(
                    "`{}` was terminated by a signal",
                    invocation.command.join(" ")
                )));
            }
        }

        let artifact = invocation.artifact_path();
        if !artifact.is_file() {
            return Err(Error::BuildExecution(format!(
                "build did not produce {}",
                artifact.display()
            )));
        }
        let digest = ArtifactDigest::of_file(&artifact, DigestAlgorithm::Sha256)?;
        log::info!("Built {} ({digest})", artifact.display());

        Ok(BuildOutcome {
            invocation,
            digest: Some(digest),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::path::Path;
    use tempfile::tempdir;

    const CONFIG: &str = r#"
version: 1
goos: linux
goarch: amd64
binary: myapp-$GOOS-$GOARCH
env:
  - CGO_ENABLED=0
flags:
  - -trimpath
ldflags:
  - -X main.version=$VERSION
  - -X main.commit=${COMMIT}
"#;

    /// Records the spec and writes a fake artifact instead of compiling.
    struct FakeLauncher {
        seen: Rc<RefCell<Vec<ProcessSpec>>>,
        outcome: ExitOutcome,
        write_artifact: bool,
    }

    impl ProcessLauncher for FakeLauncher {
        fn run(&self, spec: &ProcessSpec) -> Result<ExitOutcome> {
            self.seen.borrow_mut().push(spec.clone());
            if self.write_artifact {
                let out = spec
                    .args
                    .iter()
                    .position(|a| a == "-o")
                    .map(|i| spec.args[i + 1].clone())
                    .unwrap();
                std::fs::write(spec.dir.join(out), b"\x7fELF fake binary")?;
            }
            Ok(self.outcome)
        }
    }

    fn fake_go(dir: &Path) -> String {
        let bin = dir.join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        let go = bin.join("go");
        std::fs::write(&go, b"#!/bin/sh\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&go, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        bin.to_string_lossy().into_owned()
    }

    fn assignments() -> EnvAssignments {
        EnvAssignments::parse("VERSION=1.2.3,COMMIT=abc123").unwrap()
    }

    #[test]
    fn test_resolve_builds_command_line() {
        let config = BuildConfig::from_yaml(CONFIG).unwrap();
        let invocation = BuildExecutor::new(config, "/src")
            .resolve(&assignments())
            .unwrap();

        assert_eq!(
            invocation.command,
            vec![
                "go",
                "build",
                "-trimpath",
                "-ldflags",
                "-X main.version=1.2.3 -X main.commit=abc123",
                "-o",
                "myapp-linux-amd64",
            ]
        );
        assert_eq!(
            invocation.env,
            vec!["GOOS=linux", "GOARCH=amd64", "CGO_ENABLED=0"]
        );
        assert_eq!(invocation.binary, "myapp-linux-amd64");
        assert_eq!(invocation.working_dir, PathBuf::from("/src"));
    }

    #[test]
    fn test_resolve_missing_assignment() {
        let config = BuildConfig::from_yaml(CONFIG).unwrap();
        let result = BuildExecutor::new(config, "/src")
            .resolve(&EnvAssignments::parse("VERSION=1.2.3").unwrap());
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_platform_assignment_cannot_rename_artifact() {
        let config = BuildConfig::from_yaml(CONFIG).unwrap();
        let executor = BuildExecutor::new(config, "/src");

        let conflicting = EnvAssignments::parse("VERSION=1,COMMIT=2,GOOS=darwin").unwrap();
        assert!(matches!(
            executor.resolve(&conflicting),
            Err(Error::Configuration(_))
        ));

        let agreeing = EnvAssignments::parse("VERSION=1,COMMIT=2,GOARCH=amd64").unwrap();
        let invocation = executor.resolve(&agreeing).unwrap();
        assert_eq!(invocation.binary, "myapp-linux-amd64");
        assert_eq!(invocation.env[..2], ["GOOS=linux", "GOARCH=amd64"]);
    }

    #[test]
    fn test_binary_must_be_plain_name() {
        let yaml = CONFIG.replace("myapp-$GOOS-$GOARCH", "$OUT");
        let config = BuildConfig::from_yaml(&yaml).unwrap();
        let executor = BuildExecutor::new(config, "/src");
        let vars = EnvAssignments::parse("VERSION=1,COMMIT=2,OUT=../escape").unwrap();
        assert!(matches!(
            executor.resolve(&vars),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_dry_run_matches_real_run() -> Result<()> {
        let dir = tempdir()?;
        let path = fake_go(dir.path());
        let seen = Rc::new(RefCell::new(Vec::new()));

        let config = BuildConfig::from_yaml(CONFIG)?;
        let dry = BuildExecutor::new(config.clone(), dir.path())
            .with_launcher(Box::new(FakeLauncher {
                seen: seen.clone(),
                outcome: ExitOutcome::Exited(0),
                write_artifact: true,
            }))
            .run(&assignments(), true)?;
        assert!(dry.digest.is_none());
        assert!(seen.borrow().is_empty(), "dry run must not launch anything");

        let real = BuildExecutor::new(config, dir.path())
            .with_host_env([("PATH", path.as_str()), ("AWS_SECRET_ACCESS_KEY", "leak")])
            .with_launcher(Box::new(FakeLauncher {
                seen: seen.clone(),
                outcome: ExitOutcome::Exited(0),
                write_artifact: true,
            }))
            .run(&assignments(), false)?;

        assert_eq!(dry.invocation, real.invocation);
        assert_eq!(dry.invocation.output_lines()?, real.invocation.output_lines()?);
        assert_eq!(dry.output_lines()?.len(), 4);

        let real_lines = real.output_lines()?;
        assert_eq!(real_lines[..4], dry.output_lines()?[..]);

        let digest = real.digest.expect("real build has a digest");
        assert_eq!(real_lines[4], format!("go-binary-sha256={}", digest.hex()));
        assert_eq!(
            digest,
            ArtifactDigest::of_bytes(b"\x7fELF fake binary", DigestAlgorithm::Sha256)
        );

        let specs = seen.borrow();
        assert_eq!(specs.len(), 1);
        let spec = &specs[0];
        assert_eq!(spec.program, PathBuf::from(&path).join("go"));
        assert_eq!(spec.args, real.invocation.command[1..].to_vec());
        assert_eq!(spec.env.get("CGO_ENABLED").map(String::as_str), Some("0"));
        assert_eq!(spec.env.get("GOOS").map(String::as_str), Some("linux"));
        assert!(!spec.env.contains_key("AWS_SECRET_ACCESS_KEY"));

        Ok(())
    }

    #[test]
    fn test_tool_not_found() -> Result<()> {
        let dir = tempdir()?;
        let config = BuildConfig::from_yaml(CONFIG)?;
        let result = BuildExecutor::new(config, dir.path())
            .with_host_env([("PATH", dir.path().to_string_lossy().into_owned())])
            .run(&assignments(), false);
        assert!(matches!(result, Err(Error::ToolNotFound(_))));
        Ok(())
    }

    #[test]
    fn test_non_zero_exit_is_build_error() -> Result<()> {
        let dir = tempdir()?;
        let path = fake_go(dir.path());
        let config = BuildConfig::from_yaml(CONFIG)?;

        for outcome in [ExitOutcome::Exited(2), ExitOutcome::Terminated] {
            let result = BuildExecutor::new(config.clone(), dir.path())
                .with_host_env([("PATH", path.as_str())])
                .with_launcher(Box::new(FakeLauncher {
                    seen: Rc::new(RefCell::new(Vec::new())),
                    outcome,
                    write_artifact: false,
                }))
                .run(&assignments(), false);
            assert!(matches!(result, Err(Error::BuildExecution(_))));
        }
        Ok(())
    }

    #[test]
    fn test_missing_artifact_is_build_error() -> Result<()> {
        let dir = tempdir()?;
        let path = fake_go(dir.path());
        let config = BuildConfig::from_yaml(CONFIG)?;
        let result = BuildExecutor::new(config, dir.path())
            .with_host_env([("PATH", path.as_str())])
            .with_launcher(Box::new(FakeLauncher {
                seen: Rc::new(RefCell::new(Vec::new())),
                outcome: ExitOutcome::Exited(0),
                write_artifact: false,
            }))
            .run(&assignments(), false);
        assert!(matches!(result, Err(Error::BuildExecution(_))));
        Ok(())
    }
}
