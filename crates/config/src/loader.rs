use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{
    env_subst::substitute_env,
    error::{Context, Error, Result},
    schema::SiglineConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "sigline.toml",
    "sigline.yaml",
    "sigline.yml",
    "sigline.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<SiglineConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.display().to_string(),
        source,
    })?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Load configuration, then apply environment overrides.
///
/// An explicit `path` must exist and parse. Without one, the standard
/// locations are searched:
/// 1. `./sigline.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/sigline/sigline.{toml,yaml,yml,json}` (user-global)
///
/// A discovered file that fails to parse is logged and skipped.
pub fn discover_and_load(path: Option<&Path>) -> Result<SiglineConfig> {
    let mut config = match path {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            load_config(path)?
        },
        None => match find_config_file() {
            Some(found) => {
                debug!(path = %found.display(), "loading config");
                load_config(&found).unwrap_or_else(|e| {
                    warn!(path = %found.display(), error = %e, "failed to load config, using defaults");
                    SiglineConfig::default()
                })
            },
            None => {
                debug!("no config file found, using defaults");
                SiglineConfig::default()
            },
        },
    };
    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    Ok(config)
}

/// Apply well-known environment variables on top of file values.
///
/// The first name in each list that is set and non-empty wins. Numeric
/// values that fail to parse are logged and ignored.
pub fn apply_env_overrides(config: &mut SiglineConfig, lookup: impl Fn(&str) -> Option<String>) {
    let get = |names: &[&str]| {
        names
            .iter()
            .find_map(|name| lookup(name).filter(|v| !v.trim().is_empty()))
    };

    if let Some(account) = get(&["SIGNAL_ACCOUNT", "SIGNAL_PHONE_NUMBER"]) {
        config.signal.account = Some(account.trim().to_string());
    }
    if let Some(path) = get(&["SIGNAL_CLI_PATH"]) {
        config.signal.cli_path = path;
    }
    if let Some(ms) = parse_env(get(&["SIGNAL_CLI_TIMEOUT"]), "SIGNAL_CLI_TIMEOUT") {
        config.signal.timeout_ms = ms;
    }
    if let Some(dir) = get(&["SIGNAL_CLI_ATTACHMENTS_DIR"]) {
        config.signal.attachments_dir = Some(PathBuf::from(dir));
    }
    if let Some(host) = get(&["SIGLINE_HOST", "HOST"]) {
        config.server.host = host;
    }
    if let Some(port) = parse_env(get(&["SIGLINE_PORT", "PORT"]), "PORT") {
        config.server.port = port;
    }
    if let Some(url) = get(&["SIGLINE_PUBLIC_URL"]) {
        config.server.public_url = Some(url);
    }
    if let Some(path) = get(&["SIGLINE_DB_PATH"]) {
        config.history.database_path = Some(PathBuf::from(path));
    }
    if let Some(days) = parse_env(get(&["SIGLINE_RETENTION_DAYS"]), "SIGLINE_RETENTION_DAYS") {
        config.history.retention_days = days;
    }
}

fn parse_env<T: std::str::FromStr>(value: Option<String>, name: &str) -> Option<T> {
    let value = value?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!(var = name, value = %value, "ignoring unparsable environment override");
            None
        },
    }
}

/// Find the first config file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let config_dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| config_dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/sigline/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "sigline").map(|d| d.config_dir().to_path_buf())
}

/// Returns the data directory (`~/.local/share/sigline/` on Linux).
pub fn data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "sigline")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".sigline"))
}

fn parse_config(raw: &str, path: &Path) -> Result<SiglineConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");
    let what = || format!("failed to parse {}", path.display());

    match ext {
        "toml" => toml::from_str(raw).with_context(what),
        "yaml" | "yml" => serde_yaml::from_str(raw).with_context(what),
        "json" => serde_json::from_str(raw).with_context(what),
        _ => Err(Error::UnsupportedFormat(ext.to_string())),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, std::collections::HashMap};

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn env_overrides_file_values() {
        let mut cfg = SiglineConfig::default();
        cfg.signal.account = Some("+1000".into());
        apply_env_overrides(
            &mut cfg,
            lookup(&[
                ("SIGNAL_ACCOUNT", "+15551234567"),
                ("SIGNAL_CLI_TIMEOUT", "5000"),
                ("PORT", "8088"),
                ("HOST", "127.0.0.1"),
            ]),
        );
        assert_eq!(cfg.signal.account.as_deref(), Some("+15551234567"));
        assert_eq!(cfg.signal.timeout_ms, 5000);
        assert_eq!(cfg.server.port, 8088);
        assert_eq!(cfg.server.host, "127.0.0.1");
    }

    #[test]
    fn prefixed_names_win_over_generic_ones() {
        let mut cfg = SiglineConfig::default();
        apply_env_overrides(
            &mut cfg,
            lookup(&[("SIGLINE_PORT", "4000"), ("PORT", "5000")]),
        );
        assert_eq!(cfg.server.port, 4000);
    }

    #[test]
    fn bad_numbers_are_ignored() {
        let mut cfg = SiglineConfig::default();
        apply_env_overrides(
            &mut cfg,
            lookup(&[("SIGNAL_CLI_TIMEOUT", "soon"), ("SIGNAL_PHONE_NUMBER", "+1999")]),
        );
        assert_eq!(cfg.signal.timeout_ms, 30_000);
        assert_eq!(cfg.signal.account.as_deref(), Some("+1999"));
    }

    #[test]
    fn loads_yaml_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = dir.path().join("sigline.yaml");
        std::fs::write(&yaml, "signal:\n  account: \"+1222\"\nserver:\n  port: 9000\n").unwrap();
        let cfg = load_config(&yaml).unwrap();
        assert_eq!(cfg.signal.account.as_deref(), Some("+1222"));
        assert_eq!(cfg.server.port, 9000);

        let json = dir.path().join("sigline.json");
        std::fs::write(&json, r#"{"history": {"retention_days": 7}}"#).unwrap();
        assert_eq!(load_config(&json).unwrap().history.retention_days, 7);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let err = discover_and_load(Some(Path::new("/nonexistent/sigline.toml"))).unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
    }

    #[test]
    fn parse_errors_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let toml = dir.path().join("sigline.toml");
        std::fs::write(&toml, "[server]\nport = \"not a number\"\n").unwrap();
        let err = load_config(&toml).unwrap_err();
        assert!(matches!(err, Error::Message { .. }));
        let text = err.to_string();
        assert!(
            text.starts_with(&format!("failed to parse {}: ", toml.display())),
            "{text}"
        );
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ini = dir.path().join("sigline.ini");
        std::fs::write(&ini, "x=1").unwrap();
        assert!(matches!(
            load_config(&ini).unwrap_err(),
            Error::UnsupportedFormat(ext) if ext == "ini"
        ));
    }
}
