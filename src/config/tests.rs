use super::*;

#[test]
fn defaults_are_sane() {
    let config = Config::default();
    assert_eq!(config.port, 8080);
    assert_eq!(config.upstream_url, DEFAULT_UPSTREAM_URL);
    assert!(!config.models.is_empty());
    assert!(config.validate().is_ok());
    assert_eq!(config.socket_addr(), "127.0.0.1:8080");
}

#[test]
fn empty_model_list_fails_validation() {
    let config = Config {
        models: Vec::new(),
        ..Config::default()
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::NoModels { .. })
    ));
}

#[test]
fn cors_default_allows_any_origin_without_credentials() {
    let cors = CorsConfig::default();
    assert!(cors.allows_any_origin());
    assert!(!cors.allow_credentials);
}

#[test]
fn model_list_parsing_trims_and_drops_empties() {
    let parsed = Config::split_list("gpt-4, gpt-4o ,,gpt-3.5-turbo");
    assert_eq!(parsed, vec!["gpt-4", "gpt-4o", "gpt-3.5-turbo"]);
}

#[test]
fn quota_period_spellings() {
    assert_eq!(QuotaPeriod::parse("daily"), Some(QuotaPeriod::Daily));
    assert_eq!(QuotaPeriod::parse("never"), Some(QuotaPeriod::Never));
    assert_eq!(QuotaPeriod::parse("fortnightly"), None);
}
