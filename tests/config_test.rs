//! Config, secrets and local favorites on disk.

use std::fs;
use std::time::Duration;

use huginn::{Config, LocalFavorites, Secrets};

#[test]
fn config_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
            [backend]
            url = "https://venue.example.co"

            [cache]
            stale_time_secs = 30
            gc_interval_secs = 0
        "#,
    )
    .unwrap();

    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.backend.url, "https://venue.example.co");
    assert_eq!(config.backend.timeout_secs, 30);

    let query = config.cache.query_config();
    assert_eq!(query.stale_time, Duration::from_secs(30));
    assert_eq!(query.gc_time, Duration::from_secs(600));
    // A zero interval would spin the sweeper.
    assert_eq!(query.gc_interval, Duration::from_secs(1));
}

#[test]
fn malformed_config_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[backend\nurl = ").unwrap();

    let err = Config::from_file(&path).unwrap_err();
    assert!(matches!(err, huginn::HuginnError::Configuration(_)));
}

#[cfg(unix)]
#[test]
fn secrets_require_private_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("secrets.toml");
    fs::write(&path, "[backend]\napi_key = \"anon-key\"\n").unwrap();

    fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
    let err = Secrets::load_from_file(&path).unwrap_err();
    assert!(err.to_string().contains("insecure permissions"));

    fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).unwrap();
    let secrets = Secrets::load_from_file(&path).unwrap();
    assert_eq!(secrets.api_key().as_deref(), Some("anon-key"));
}

#[test]
fn favorites_persist_across_loads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("favorites.json");

    let mut favorites = LocalFavorites::load(&path);
    assert!(favorites.is_empty());
    favorites.toggle("ev2");
    favorites.toggle("ev1");
    favorites.save().unwrap();

    let reloaded = LocalFavorites::load(&path);
    assert_eq!(reloaded.ids(), vec!["ev1".to_string(), "ev2".to_string()]);
    assert!(reloaded.contains("ev1"));
    assert!(!path.with_extension("json.tmp").exists());
}

#[test]
fn corrupt_favorites_start_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("favorites.json");
    fs::write(&path, "{not json").unwrap();

    let mut favorites = LocalFavorites::load(&path);
    assert!(favorites.is_empty());

    // Saving replaces the corrupt file.
    favorites.toggle("ev9");
    favorites.save().unwrap();
    let on_disk: Vec<String> = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(on_disk, vec!["ev9".to_string()]);
}
