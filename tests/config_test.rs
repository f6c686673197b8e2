//! Configuration loading tests: file merge, environment overrides, and
//! validation.

use std::io::Write;

use slipway::infrastructure::ConfigLoader;

fn config_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_file_overrides_defaults() {
    let file = config_file(
        r"
metal:
  api_url: http://metal.example:5240/api/2.0/
  api_key: secret
  max_retries: 7
bmc:
  worker_pool_size: 8
",
    );

    let config = ConfigLoader::load_from_file(file.path()).unwrap();
    assert_eq!(config.metal.api_url, "http://metal.example:5240/api/2.0/");
    assert_eq!(config.metal.max_retries, 7);
    assert_eq!(config.bmc.worker_pool_size, 8);
    // Untouched keys keep their defaults
    assert_eq!(config.metal.poll_interval_secs, 60);
    assert_eq!(config.bmc.power_state_change_max_retries, 18);
}

#[test]
fn test_environment_overrides_file() {
    let file = config_file(
        r"
bmc:
  worker_pool_size: 8
",
    );

    temp_env::with_var("SLIPWAY_BMC__WORKER_POOL_SIZE", Some("4"), || {
        let config = ConfigLoader::load_from_file(file.path()).unwrap();
        assert_eq!(config.bmc.worker_pool_size, 4);
    });
}

#[test]
fn test_invalid_level_rejected() {
    let file = config_file(
        r"
logging:
  level: loud
",
    );
    assert!(ConfigLoader::load_from_file(file.path()).is_err());
}
