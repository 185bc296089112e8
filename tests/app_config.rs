use medpanel::AppConfig;
use once_cell::sync::Lazy;
use std::sync::Mutex;

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[test]
fn rejects_invalid_boolean_env_values() {
    let _guard = ENV_MUTEX.lock().unwrap();
    std::env::remove_var("MEDPANEL_LOG_REPORTS");
    std::env::remove_var("MEDPANEL_ENGINE_TIMEOUT_MS");

    std::env::set_var("MEDPANEL_LOG_REPORTS", "maybe");
    let err = AppConfig::from_env().expect_err("expected invalid boolean to error");
    assert!(format!("{}", err).contains("MEDPANEL_LOG_REPORTS"));
    std::env::remove_var("MEDPANEL_LOG_REPORTS");
}

#[test]
fn rejects_non_numeric_timeout() {
    let _guard = ENV_MUTEX.lock().unwrap();
    std::env::set_var("MEDPANEL_ENGINE_TIMEOUT_MS", "soon");
    let err = AppConfig::from_env().expect_err("expected invalid integer to error");
    assert!(format!("{}", err).contains("MEDPANEL_ENGINE_TIMEOUT_MS"));
    std::env::remove_var("MEDPANEL_ENGINE_TIMEOUT_MS");
}

#[test]
fn rejects_malformed_port() {
    let _guard = ENV_MUTEX.lock().unwrap();
    std::env::set_var("PORT", "ten-thousand");
    let err = AppConfig::from_env().expect_err("expected malformed PORT to error");
    assert!(format!("{}", err).contains("PORT"));
    std::env::set_var("PORT", "8081");
    let cfg = AppConfig::from_env().unwrap();
    assert_eq!(cfg.port, 8081);
    std::env::remove_var("PORT");
}
