use qbo_sync::config::ConfigLoader;
use std::{
    env, fs,
    path::PathBuf,
    sync::{Mutex, MutexGuard, OnceLock},
};
use tempfile::TempDir;

// base64 of 32 'a' bytes, a syntactically valid crypto key
const TEST_CRYPTO_KEY: &str = "YWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWE=";

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn env_guard() -> MutexGuard<'static, ()> {
    env_lock()
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
}

fn clear_env() {
    unsafe {
        for key in [
            "QBO_PROFILE",
            "QBO_HOST",
            "QBO_PORT",
            "QBO_LOG_LEVEL",
            "QBO_CRYPTO_KEY",
            "QBO_API_TOKEN",
            "QBO_API_TOKENS",
            "QBO_ENVIRONMENT",
            "QBO_CLIENT_ID",
            "QBO_CLIENT_SECRET",
            "QBO_REDIRECT_URI",
            "QBO_STATE_TTL_SECONDS",
        ] {
            env::remove_var(key);
        }
    }
}

fn set_required_env() {
    unsafe {
        env::set_var("QBO_CRYPTO_KEY", TEST_CRYPTO_KEY);
        env::set_var("QBO_API_TOKENS", "test-token");
    }
}

fn write_env_file(dir: &TempDir, name: &str, contents: &str) {
    let path = dir.path().join(name);
    fs::write(path, contents).unwrap();
}

#[test]
fn loads_defaults_when_no_env_files_present() {
    let _guard = env_guard();
    clear_env();
    set_required_env();

    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads with defaults");

    assert_eq!(cfg.profile, "local");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:8080");
    assert_eq!(cfg.qbo_environment, "sandbox");
    assert_eq!(cfg.state_ttl_seconds, 900);
    assert_eq!(cfg.pending_ttl_seconds, 600);
    assert_eq!(cfg.http_timeout_seconds, 30);
    cfg.bind_addr().expect("default bind addr parses");

    clear_env();
}

#[test]
fn host_and_port_compose_the_bind_address() {
    let _guard = env_guard();
    clear_env();
    set_required_env();

    unsafe {
        env::set_var("QBO_HOST", "127.0.0.1");
        env::set_var("QBO_PORT", "9001");
    }

    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads");

    assert_eq!(cfg.api_bind_addr, "127.0.0.1:9001");

    clear_env();
}

#[test]
fn layered_env_files_apply_in_order() {
    let _guard = env_guard();
    clear_env();
    set_required_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "QBO_PORT=3000\n");
    write_env_file(&temp_dir, ".env.test", "QBO_PORT=5000\n");
    write_env_file(&temp_dir, ".env.test.local", "QBO_PORT=6000\n");

    // Select the profile via .env.local before profile-specific files load.
    write_env_file(&temp_dir, ".env.local", "QBO_PROFILE=test\nQBO_PORT=4000\n");

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads with layered env files");

    assert_eq!(cfg.profile, "test");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:6000");

    clear_env();
}

#[test]
fn os_environment_has_highest_precedence() {
    let _guard = env_guard();
    clear_env();
    set_required_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "QBO_PORT=3000\n");

    unsafe {
        env::set_var("QBO_PORT", "9090");
    }

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads with env override");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:9090");

    clear_env();
}

#[test]
fn api_tokens_accept_a_comma_separated_list() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        env::set_var("QBO_CRYPTO_KEY", TEST_CRYPTO_KEY);
        env::set_var("QBO_API_TOKENS", "alpha, beta ,gamma,");
    }

    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads");

    assert_eq!(cfg.api_tokens, vec!["alpha", "beta", "gamma"]);

    clear_env();
}

#[test]
fn invalid_port_fails_with_bind_addr_error() {
    let _guard = env_guard();
    clear_env();
    set_required_env();

    unsafe {
        env::set_var("QBO_PORT", "not-a-port");
    }

    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let err = loader.load().expect_err("invalid port should fail");
    assert!(format!("{}", err).contains("invalid api bind address"));

    clear_env();
}

#[test]
fn invalid_crypto_key_base64_is_rejected() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        env::set_var("QBO_CRYPTO_KEY", "not base64!!!");
        env::set_var("QBO_API_TOKENS", "test-token");
    }

    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let err = loader.load().expect_err("invalid base64 should fail");
    assert!(format!("{}", err).contains("invalid base64"));

    clear_env();
}

#[test]
fn missing_api_tokens_is_rejected() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        env::set_var("QBO_CRYPTO_KEY", TEST_CRYPTO_KEY);
    }

    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let err = loader.load().expect_err("missing tokens should fail");
    assert!(format!("{}", err).contains("no api tokens configured"));

    clear_env();
}

#[test]
fn unknown_qbo_environment_is_rejected() {
    let _guard = env_guard();
    clear_env();
    set_required_env();

    unsafe {
        env::set_var("QBO_ENVIRONMENT", "staging");
    }

    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let err = loader.load().expect_err("unknown environment should fail");
    assert!(format!("{}", err).contains("sandbox"));

    clear_env();
}

#[test]
fn production_profile_requires_client_credentials() {
    let _guard = env_guard();
    clear_env();
    set_required_env();

    unsafe {
        env::set_var("QBO_PROFILE", "production");
    }

    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let err = loader
        .load()
        .expect_err("production without credentials should fail");
    assert!(format!("{}", err).contains("client ID"));

    clear_env();
}
