use std::fs;
use std::path::PathBuf;

use rand::{rngs::StdRng, SeedableRng};

use synapse_load::config::RuntimeConfig;
use synapse_load::error::ConfigError;
use synapse_load::users::{Identity, UserPool};

fn fixture(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("synapse-load-{}-{}", std::process::id(), name));
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_load_identities() {
    let path = fixture(
        "users.json",
        r#"[
            { "userId": "@a:x", "accessToken": "ta" },
            { "userId": "@b:x", "accessToken": "" },
            { "userId": "@c:x" }
        ]"#,
    );

    let pool = UserPool::load_from_source(&path).unwrap();
    fs::remove_file(&path).unwrap();

    assert_eq!(pool.len(), 3);

    let mut rng = StdRng::seed_from_u64(0);
    for _ in 0..20 {
        let identity = pool.pick_random(&mut rng).unwrap();
        assert!(["@a:x", "@b:x", "@c:x"].contains(&identity.user_id.as_str()));
    }
}

#[test]
fn test_token_presence() {
    assert_eq!(Identity::new("@a:x", "ta").token(), Some("ta"));
    assert_eq!(Identity::new("@a:x", "").token(), None);
    assert_eq!(Identity::new("@a:x", " ").token(), None);
}

#[test]
fn test_missing_source_is_a_config_error() {
    let err = UserPool::load_from_source("/definitely/not/here/users.json").unwrap_err();
    assert!(matches!(err, ConfigError::Missing { .. }));
}

#[test]
fn test_malformed_source_is_a_config_error() {
    let path = fixture("bad-users.json", r#"{ "userId": "@a:x" }"#);
    let err = UserPool::load_from_source(&path).unwrap_err();
    fs::remove_file(&path).unwrap();

    assert!(matches!(err, ConfigError::Malformed { .. }));
}

#[test]
fn test_empty_source_is_a_config_error() {
    let path = fixture("empty-users.json", "[]");
    let err = UserPool::load_from_source(&path).unwrap_err();
    fs::remove_file(&path).unwrap();

    assert!(matches!(err, ConfigError::EmptyUserPool(_)));
}

#[test]
fn test_runtime_config_shared_secret() {
    let path = fixture("config.json", r#"{ "sharedSecret": "s3cret" }"#);
    let config = RuntimeConfig::load(&path).unwrap();
    fs::remove_file(&path).unwrap();

    assert_eq!(config.shared_secret.as_deref(), Some("s3cret"));

    let path = fixture("blank-config.json", r#"{ "sharedSecret": "" }"#);
    let config = RuntimeConfig::load(&path).unwrap();
    fs::remove_file(&path).unwrap();

    assert_eq!(config.shared_secret, None);

    let path = fixture("broken-config.json", "not json");
    assert!(RuntimeConfig::load(&path).is_err());
    fs::remove_file(&path).unwrap();
}
