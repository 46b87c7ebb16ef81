use crate::error::{Error, Result};
use crate::tests::common::{FakeBundleSource, FakeRekor, TestCa, p256_key, public_pem, test_bundle};
use crate::trust::{
    BUNDLE_FILE, BUNDLE_SIGNATURE_FILE, FetchedBundle, STAGING_URL_VAR, TrustMode,
    TrustRootManager,
};
use std::fs;
use tempfile::tempdir;

#[test]
fn test_staging_replaces_cache_with_verified_bundle() -> Result<()> {
    let cache_root = tempdir()?;
    let bootstrap = p256_key();
    let ca = TestCa::new("staging fulcio");
    let rekor = FakeRekor::new();

    // stale staging material and unrelated production cache content
    let staging_dir = cache_root.path().join("staging");
    fs::create_dir_all(&staging_dir)?;
    fs::write(staging_dir.join("stale.json"), b"old")?;
    fs::write(cache_root.path().join("root.json"), b"production")?;

    let bundle = test_bundle("staging", &ca, Some(rekor.public_key_pem()));
    let fetched = FakeBundleSource::signed(&bundle, &bootstrap);
    let (source, fetches) = FakeBundleSource::serving(Some(fetched.clone()));

    let manager = TrustRootManager::new(cache_root.path().to_path_buf())
        .with_source(Box::new(source))
        .with_bootstrap_key(public_pem(&bootstrap));
    let root = manager.initialize(TrustMode::Staging)?;

    assert_eq!(fetches.get(), 1);
    assert_eq!(root.mode(), TrustMode::Staging);
    assert_eq!(root.fulcio_url(), "https://fulcio.test");
    assert!(root.rekor_key().is_some());

    assert!(!staging_dir.join("stale.json").exists());
    assert_eq!(fs::read(staging_dir.join(BUNDLE_FILE))?, fetched.bundle);
    assert!(staging_dir.join(BUNDLE_SIGNATURE_FILE).exists());
    assert_eq!(fs::read(cache_root.path().join("root.json"))?, b"production");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(staging_dir.join(BUNDLE_FILE))?.permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    Ok(())
}

#[test]
fn test_staging_rejects_bad_signature() -> Result<()> {
    let cache_root = tempdir()?;
    let bootstrap = p256_key();
    let ca = TestCa::new("staging fulcio");

    let bundle = test_bundle("staging", &ca, None);
    let forged = FakeBundleSource::signed(&bundle, &p256_key());
    let (source, _) = FakeBundleSource::serving(Some(forged));

    let manager = TrustRootManager::new(cache_root.path().to_path_buf())
        .with_source(Box::new(source))
        .with_bootstrap_key(public_pem(&bootstrap));

    assert!(matches!(
        manager.initialize(TrustMode::Staging),
        Err(Error::TrustInitialization(_))
    ));
    assert!(!manager.staging_cache_dir().exists());

    Ok(())
}

#[test]
fn test_staging_never_accepts_production_material() -> Result<()> {
    let cache_root = tempdir()?;
    let bootstrap = p256_key();
    let ca = TestCa::new("production fulcio");

    let bundle = test_bundle("production", &ca, None);
    let (source, _) =
        FakeBundleSource::serving(Some(FakeBundleSource::signed(&bundle, &bootstrap)));

    let manager = TrustRootManager::new(cache_root.path().to_path_buf())
        .with_source(Box::new(source))
        .with_bootstrap_key(public_pem(&bootstrap));

    assert!(matches!(
        manager.initialize(TrustMode::Staging),
        Err(Error::TrustInitialization(_))
    ));
    assert!(!manager.staging_cache_dir().exists());

    Ok(())
}

#[test]
fn test_staging_fetch_failure_has_no_fallback() -> Result<()> {
    let cache_root = tempdir()?;
    let bootstrap = p256_key();
    let (source, fetches) = FakeBundleSource::serving(None);
    let manager = TrustRootManager::new(cache_root.path().to_path_buf())
        .with_source(Box::new(source))
        .with_bootstrap_key(public_pem(&bootstrap));

    assert!(matches!(
        manager.initialize(TrustMode::Staging),
        Err(Error::TrustInitialization(_))
    ));
    assert_eq!(fetches.get(), 1);

    let garbage = FetchedBundle {
        bundle: b"{not json".to_vec(),
        signature: vec![1, 2, 3],
    };
    let (source, _) = FakeBundleSource::serving(Some(garbage));
    let manager = TrustRootManager::new(cache_root.path().to_path_buf())
        .with_source(Box::new(source))
        .with_bootstrap_key(public_pem(&bootstrap));
    assert!(matches!(
        manager.initialize(TrustMode::Staging),
        Err(Error::TrustInitialization(_))
    ));

    Ok(())
}

#[test]
fn test_production_never_fetches_or_touches_cache() -> Result<()> {
    let cache_root = tempdir()?;
    let staging_dir = cache_root.path().join("staging");
    fs::create_dir_all(&staging_dir)?;
    fs::write(staging_dir.join(BUNDLE_FILE), b"cached staging bundle")?;

    let (source, fetches) = FakeBundleSource::serving(None);
    let manager = TrustRootManager::new(cache_root.path().to_path_buf())
        .with_source(Box::new(source));
    let root = manager.initialize(TrustMode::Production)?;

    assert_eq!(root.mode(), TrustMode::Production);
    assert_eq!(root.rekor_url(), "https://rekor.sigstore.dev");
    assert_eq!(fetches.get(), 0);
    assert_eq!(
        fs::read(staging_dir.join(BUNDLE_FILE))?,
        b"cached staging bundle"
    );

    Ok(())
}

#[test]
fn test_unconfigured_staging_fails_without_fetching() -> Result<()> {
    let cache_root = tempdir()?;
    let staging_dir = cache_root.path().join("staging");
    fs::create_dir_all(&staging_dir)?;
    fs::write(staging_dir.join(BUNDLE_FILE), b"cached staging bundle")?;

    // a source alone is not enough
    let (source, fetches) = FakeBundleSource::serving(None);
    let manager = TrustRootManager::new(cache_root.path().to_path_buf())
        .with_source(Box::new(source));
    let err = manager.initialize(TrustMode::Staging).unwrap_err();
    assert!(matches!(err, Error::TrustInitialization(ref msg) if msg.contains(STAGING_URL_VAR)));
    assert_eq!(fetches.get(), 0);

    // neither is a bootstrap key alone
    let manager = TrustRootManager::new(cache_root.path().to_path_buf())
        .with_bootstrap_key(public_pem(&p256_key()));
    assert!(matches!(
        manager.initialize(TrustMode::Staging),
        Err(Error::TrustInitialization(_))
    ));
    assert_eq!(fs::read(staging_dir.join(BUNDLE_FILE))?, b"cached staging bundle");

    Ok(())
}

#[test]
fn test_staging_settings_from_operator() -> Result<()> {
    let cache_root = tempdir()?;
    let bootstrap = p256_key();
    let ca = TestCa::new("staging fulcio");

    let key_path = cache_root.path().join("bootstrap.pem");
    fs::write(&key_path, public_pem(&bootstrap))?;

    let bundle = test_bundle("staging", &ca, None);
    let (source, fetches) =
        FakeBundleSource::serving(Some(FakeBundleSource::signed(&bundle, &bootstrap)));
    let manager = TrustRootManager::new(cache_root.path().to_path_buf())
        .with_staging_settings(Some("https://trust.staging.test/bundle"), Some(&key_path))?
        .with_source(Box::new(source));
    assert_eq!(manager.initialize(TrustMode::Staging)?.mode(), TrustMode::Staging);
    assert_eq!(fetches.get(), 1);

    assert!(matches!(
        TrustRootManager::new(cache_root.path().to_path_buf())
            .with_staging_settings(Some("http://trust.staging.test/bundle"), None),
        Err(Error::TrustInitialization(_))
    ));
    assert!(matches!(
        TrustRootManager::new(cache_root.path().to_path_buf())
            .with_staging_settings(None, Some(&cache_root.path().join("missing.pem"))),
        Err(Error::TrustInitialization(_))
    ));

    Ok(())
}
