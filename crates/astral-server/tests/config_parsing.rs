use std::{env, fs};

use astral_server::config::loader::load_config;
use astral_server::{BlobBackend, StorageBackend};

#[test]
fn config_parsing_and_env_overrides_and_validation() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("astral.toml");

    let toml_content = r#"
[server]
host = "127.0.0.1"
port = 8081
body_limit_bytes = 1024
root_token = "let-me-in"

[storage]
backend = "postgres"

[storage.postgres]
host = "db"
port = 5433
user = "astral"
password = "secret"
database = "docs"
pool_size = 4

[blob]
backend = "s3"
endpoint = "http://minio:9000"
access_key = "minioadmin"
secret_key = "minioadmin"

[cache]
idle_refresh_secs = 30

[logging]
level = "debug"
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) Valid config parses
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.server.port, 8081);
    assert_eq!(cfg.server.root_token, "let-me-in");
    assert_eq!(cfg.storage.backend, StorageBackend::Postgres);
    let pg = cfg.storage.postgres.as_ref().expect("postgres section");
    assert_eq!(
        pg.connection_url(),
        "postgres://astral:secret@db:5433/docs"
    );
    assert_eq!(pg.pool_size, 4);
    assert_eq!(cfg.blob.backend, BlobBackend::S3);
    assert_eq!(cfg.blob.bucket, "astral");
    assert_eq!(cfg.cache.idle_refresh_secs, 30);
    assert_eq!(cfg.logging.level.to_ascii_lowercase(), "debug");

    // 2) Env override should win over file
    unsafe {
        env::set_var("ASTRAL__CACHE__IDLE_REFRESH_SECS", "5");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.cache.idle_refresh_secs, 5);
    unsafe {
        env::remove_var("ASTRAL__CACHE__IDLE_REFRESH_SECS");
    }

    // 3) Zero idle interval is rejected
    let invalid_path = dir.path().join("invalid.toml");
    let invalid_toml = r#"
[server]
root_token = "let-me-in"

[storage]
backend = "memory"

[blob]
backend = "memory"

[cache]
idle_refresh_secs = 0
"#;
    fs::write(&invalid_path, invalid_toml).expect("write invalid toml");
    let err = load_config(invalid_path.to_str()).expect_err("expected validation error");
    assert!(err.contains("idle_refresh_secs must be > 0"));

    // 4) S3 without credentials is rejected
    let s3_path = dir.path().join("s3.toml");
    let s3_toml = r#"
[server]
root_token = "let-me-in"

[storage]
backend = "memory"

[blob]
backend = "s3"
endpoint = "http://minio:9000"
"#;
    fs::write(&s3_path, s3_toml).expect("write s3 toml");
    let err = load_config(s3_path.to_str()).expect_err("expected validation error");
    assert!(err.contains("blob.access_key"));
}
