use crate::Config;
use crate::error::{Error, Result};

use super::commands::{BuildArgs, ProvenanceArgs};
use super::usage;
use crate::build::BuildExecutor;
use crate::build::config::BuildConfig;
use crate::build::env::EnvAssignments;
use crate::signing::fulcio::FulcioClient;
use crate::signing::identity;
use crate::signing::keyless::{KeylessSigner, missing_identity};
use crate::slsa::cli::{ProvenanceRequest, generate_signed_provenance};
use crate::storage::filesystem::{AttestationWriter, emit_lines};
use crate::storage::rekor::{RekorClient, TransparencyClient};
use crate::trust::{TrustMode, TrustRootManager, default_cache_root};
use std::io;

pub fn handle_build_command(args: BuildArgs) -> Result<()> {
    let settings = Config::from_env()?;

    let config = BuildConfig::from_file(&args.config_path)?;
    let assignments = EnvAssignments::parse(&args.env_assignments)?;

    let host_env = std::env::vars_os()
        .filter_map(|(name, value)| Some((name.into_string().ok()?, value.into_string().ok()?)));
    let outcome = BuildExecutor::new(config, &settings.working_dir)
        .with_host_env(host_env)
        .run(&assignments, args.dry)?;

    emit_lines(
        &outcome.output_lines()?,
        &mut io::stdout().lock(),
        settings.github_output.as_deref(),
    )
}

pub fn handle_provenance_command(args: ProvenanceArgs) -> Result<()> {
    let request = ProvenanceRequest {
        binary_name: args.binary_name,
        digest: args.digest,
        command: args.command,
        env: args.env,
        working_dir: args.working_dir,
    };

    let missing = request.missing_flags();
    if !missing.is_empty() {
        eprint!("{}", usage());
        return Err(Error::Configuration(format!(
            "missing required flag(s): {}",
            missing.join(", ")
        )));
    }
    // Everything checkable offline fails here, before any network traffic.
    request.validate()?;

    let settings = Config::from_env()?;

    let identity = identity::detect(|name| std::env::var(name).ok())?;
    if identity.is_none() {
        return Err(missing_identity());
    }

    let mut manager = TrustRootManager::new(default_cache_root(settings.tuf_root.clone())?);
    let mode = if args.staging {
        manager = manager.with_staging_settings(
            settings.staging_trust_url.as_deref(),
            settings.staging_trust_key.as_deref(),
        )?;
        TrustMode::Staging
    } else {
        TrustMode::Production
    };
    let trust_root = manager.initialize(mode)?;

    let signer = KeylessSigner::new(
        identity,
        Box::new(FulcioClient::new(trust_root.fulcio_url())?),
        &trust_root,
    );
    let transparency =
        TransparencyClient::new(Box::new(RekorClient::new(trust_root.rekor_url())?), &trust_root);
    let writer = AttestationWriter::new(&settings.working_dir)
        .with_github_output(settings.github_output.clone());

    let signed = generate_signed_provenance(
        &request,
        &signer,
        &transparency,
        &writer,
        &mut io::stdout().lock(),
    )?;
    log::info!(
        "Provenance for {} published as log entry {}",
        request.binary_name,
        signed.log_entry.uuid
    );

    Ok(())
}
