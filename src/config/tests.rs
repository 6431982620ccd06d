use super::*;

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.database.url = Some("postgres://file/docvault".to_string());
    raw.logging.level = Some("info".to_string());

    let overrides = Overrides {
        database_url: Some("postgres://cli/docvault".to_string()),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.database.url, "postgres://cli/docvault");
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn defaults_use_the_memory_store_and_builtin_extensions() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");
    assert_eq!(settings.database.url, "memory://");
    assert_eq!(
        settings.database.max_connections.get(),
        DEFAULT_DB_MAX_CONNECTIONS
    );
    assert!(settings.cache.enabled);
    assert_eq!(settings.cache.ttl, Duration::from_secs(300));
    assert_eq!(settings.hooks.extensions, vec!["normalize", "audit"]);
    assert_eq!(settings.logging.format, LogFormat::Compact);
}

#[test]
fn zero_capacity_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.capacity = Some(0);
    let err = Settings::from_raw(raw).expect_err("zero capacity");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.capacity",
            ..
        }
    ));
}

#[test]
fn zero_ttl_disables_expiry() {
    let mut raw = RawSettings::default();
    raw.cache.ttl_seconds = Some(0);
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.cache.ttl, Duration::ZERO);
}

#[test]
fn oversized_ttl_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.ttl_seconds = Some(i64::MAX as u64);
    let err = Settings::from_raw(raw).expect_err("ttl beyond bound");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.ttl_seconds",
            ..
        }
    ));

    let mut raw = RawSettings::default();
    raw.cache.ttl_seconds = Some(MAX_CACHE_TTL_SECS);
    let settings = Settings::from_raw(raw).expect("ttl at bound");
    assert_eq!(settings.cache.ttl, Duration::from_secs(MAX_CACHE_TTL_SECS));
}

#[test]
fn empty_extension_list_is_kept() {
    let mut raw = RawSettings::default();
    raw.hooks.extensions = Some(Vec::new());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.hooks.extensions.is_empty());
}

#[test]
fn duplicate_extensions_are_rejected() {
    let mut raw = RawSettings::default();
    raw.hooks.extensions = Some(vec!["audit".to_string(), " audit ".to_string()]);
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn blank_database_url_is_rejected() {
    let mut raw = RawSettings::default();
    raw.database.url = Some("   ".to_string());
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = Overrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.logging.format, LogFormat::Json);
}

#[test]
fn default_to_check_command() {
    let args = CliArgs::parse_from(["docvault"]);
    let command = args.command.unwrap_or_default();
    assert!(matches!(command, Command::Check(_)));
}

#[test]
fn parse_recount_arguments() {
    let args = CliArgs::parse_from([
        "docvault",
        "recount",
        "--collection",
        "7",
        "--database-url",
        "postgres://example",
        "--extensions",
        "audit,normalize",
    ]);

    match args.command.expect("recount command") {
        Command::Recount(recount) => {
            assert_eq!(recount.collection, Some(7));
            assert_eq!(
                recount.overrides.database_url.as_deref(),
                Some("postgres://example")
            );
            assert_eq!(
                recount.overrides.extensions,
                Some(vec!["audit".to_string(), "normalize".to_string()])
            );
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_cache_overrides() {
    let args = CliArgs::parse_from([
        "docvault",
        "check",
        "--cache-enabled",
        "false",
        "--cache-capacity",
        "64",
    ]);
    let command = args.command.expect("check command");
    let mut raw = RawSettings::default();
    raw.apply_overrides(command.overrides());
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(!settings.cache.enabled);
    assert_eq!(settings.cache.capacity.get(), 64);
}
