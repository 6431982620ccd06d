use std::io::Write;

use clap::Parser;
use docvault::config::{self, CliArgs, LoadError, LogFormat};
use serial_test::serial;
use tempfile::NamedTempFile;

const ENV_KEYS: [&str; 4] = [
    "DOCVAULT__DATABASE__URL",
    "DOCVAULT__CACHE__CAPACITY",
    "DOCVAULT__HOOKS__EXTENSIONS",
    "DOCVAULT_CONFIG_FILE",
];

struct EnvGuard;

impl EnvGuard {
    fn set(pairs: &[(&str, &str)]) -> Self {
        clear_env();
        for (key, value) in pairs {
            // SAFETY: every test touching the environment runs under #[serial].
            unsafe { std::env::set_var(key, value) };
        }
        Self
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        clear_env();
    }
}

fn clear_env() {
    for key in ENV_KEYS {
        // SAFETY: see EnvGuard::set.
        unsafe { std::env::remove_var(key) };
    }
}

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .prefix("docvault")
        .suffix(".toml")
        .tempfile()
        .expect("temp config file");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

fn args_with_file(file: &NamedTempFile, extra: &[&str]) -> CliArgs {
    let path = file.path().to_str().expect("utf-8 temp path");
    let mut argv = vec!["docvault", "--config-file", path];
    argv.extend_from_slice(extra);
    CliArgs::parse_from(argv)
}

#[test]
#[serial]
fn file_values_are_layered_over_defaults() {
    let _env = EnvGuard::set(&[]);
    let file = config_file(
        r#"
[logging]
json = true

[cache]
capacity = 32
ttl_seconds = 0

[hooks]
extensions = ["audit"]
"#,
    );

    let settings = config::load(&args_with_file(&file, &[])).expect("settings");
    assert_eq!(settings.logging.format, LogFormat::Json);
    assert_eq!(settings.cache.capacity.get(), 32);
    assert!(settings.cache.ttl.is_zero());
    assert_eq!(settings.hooks.extensions, ["audit"]);
    assert_eq!(settings.database.url, "memory://");
}

#[test]
#[serial]
fn environment_overrides_the_file_and_cli_overrides_both() {
    let _env = EnvGuard::set(&[
        ("DOCVAULT__DATABASE__URL", "postgres://env-host/docvault"),
        ("DOCVAULT__CACHE__CAPACITY", "128"),
        ("DOCVAULT__HOOKS__EXTENSIONS", "normalize"),
    ]);
    let file = config_file(
        r#"
[database]
url = "postgres://file-host/docvault"

[cache]
capacity = 32
"#,
    );

    let settings = config::load(&args_with_file(&file, &[])).expect("settings");
    assert_eq!(settings.database.url, "postgres://env-host/docvault");
    assert_eq!(settings.cache.capacity.get(), 128);
    assert_eq!(settings.hooks.extensions, ["normalize"]);

    let args = args_with_file(&file, &["check", "--cache-capacity", "7"]);
    let settings = config::load(&args).expect("settings");
    assert_eq!(settings.cache.capacity.get(), 7);
}

#[test]
#[serial]
fn missing_config_file_is_an_error() {
    let _env = EnvGuard::set(&[]);
    let args = CliArgs::parse_from(["docvault", "--config-file", "/nonexistent/docvault.toml"]);
    let err = config::load(&args).expect_err("missing file");
    assert!(matches!(err, LoadError::Build(_)));
}

#[test]
#[serial]
fn invalid_file_values_name_the_key() {
    let _env = EnvGuard::set(&[]);
    let file = config_file(
        r#"
[hooks]
extensions = ["audit", "audit"]
"#,
    );
    let err = config::load(&args_with_file(&file, &[])).expect_err("duplicate extension");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "hooks.extensions",
            ..
        }
    ));
}

#[test]
#[serial]
fn oversized_ttl_in_file_is_rejected() {
    let _env = EnvGuard::set(&[]);
    let file = config_file(
        r#"
[cache]
ttl_seconds = 9223372036854775807
"#,
    );
    let err = config::load(&args_with_file(&file, &[])).expect_err("oversized ttl");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.ttl_seconds",
            ..
        }
    ));
}
