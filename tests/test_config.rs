use image_transformer::config::Config;
use std::io::Write;
use std::time::Duration;

#[test]
fn test_config_defaults() {
    let cfg = Config::default();
    assert_eq!(cfg.server.listen_addr, "127.0.0.1:8080");
    assert_eq!(cfg.limits.max_body_bytes, 100 * 1024);
    assert_eq!(cfg.limits.max_dimension, 1000);
    assert!(cfg.server.max_in_flight > 0);
}

// Environment variables are process-wide, so every env-dependent check lives
// in this one test.
#[test]
fn test_config_env_overrides() {
    unsafe {
        std::env::remove_var("CONFIG");
        std::env::remove_var("LISTEN");
    }
    let cfg = Config::load().unwrap();
    assert_eq!(cfg.server.listen_addr, "127.0.0.1:8080");

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "server:\n  listen_addr: \"0.0.0.0:9000\"\n  max_in_flight: 4").unwrap();

    unsafe {
        std::env::set_var("CONFIG", file.path());
    }
    let cfg = Config::load().unwrap();
    assert_eq!(cfg.server.listen_addr, "0.0.0.0:9000");
    assert_eq!(cfg.server.max_in_flight, 4);

    unsafe {
        std::env::set_var("LISTEN", "127.0.0.1:3000");
    }
    let cfg = Config::load().unwrap();
    assert_eq!(cfg.server.listen_addr, "127.0.0.1:3000");
    assert_eq!(cfg.server.max_in_flight, 4);

    unsafe {
        std::env::set_var("CONFIG", "/nonexistent/image-transformer.yaml");
    }
    assert!(Config::load().is_err());

    unsafe {
        std::env::remove_var("CONFIG");
        std::env::remove_var("LISTEN");
    }
}

#[test]
fn test_config_partial_yaml_keeps_defaults() {
    let cfg = Config::from_yaml_str("limits:\n  max_dimension: 500\n").unwrap();

    assert_eq!(cfg.limits.max_dimension, 500);
    assert_eq!(cfg.limits.max_body_bytes, 100 * 1024);
    assert_eq!(cfg.server.listen_addr, "127.0.0.1:8080");
}

#[test]
fn test_config_timeouts() {
    let cfg = Config::from_yaml_str(
        "server:\n  request_timeout_ms: 250\n  read_timeout_ms: 1500\n",
    )
    .unwrap();

    assert_eq!(cfg.server.request_timeout(), Duration::from_millis(250));
    assert_eq!(cfg.server.read_timeout(), Duration::from_millis(1500));
}

#[test]
fn test_config_rejects_wrong_types() {
    let result = Config::from_yaml_str("server:\n  max_in_flight: lots\n");
    assert!(result.is_err());
}

#[test]
fn test_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "limits:\n  max_body_bytes: 2048").unwrap();

    let cfg = Config::from_file(file.path()).unwrap();
    assert_eq!(cfg.limits.max_body_bytes, 2048);
}
