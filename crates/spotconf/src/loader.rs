//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, SpotConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
/// Returns paths in load order (system, user, local/cli). Only existing files
/// are returned.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/spotter/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("spotter/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("spotter.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a TOML file into a raw table.
pub fn read_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_table(&contents, path)
}

pub(crate) fn parse_table(contents: &str, path: &Path) -> Result<toml::Table, ConfigError> {
    contents
        .parse()
        .map_err(|e: toml::de::Error| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Deep-merge `overlay` into `base`. Nested tables merge key by key; any other
/// value in the overlay replaces the base value.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        let incoming = match value {
            toml::Value::Table(incoming) => incoming,
            other => {
                base.insert(key, other);
                continue;
            }
        };

        if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
            merge_tables(existing, incoming);
            continue;
        }
        base.insert(key, toml::Value::Table(incoming));
    }
}

/// Deserialize a merged table into a config, expanding `~` in paths.
pub(crate) fn from_table(table: toml::Table, path: &Path) -> Result<SpotConfig, ConfigError> {
    let mut config = toml::Value::Table(table)
        .try_into::<SpotConfig>()
        .map_err(|e: toml::de::Error| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    let raw = config.paths.history_dir.to_string_lossy().to_string();
    config.paths.history_dir = expand_path(&raw);

    Ok(config)
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut SpotConfig, sources: &mut ConfigSources) {
    if let Ok(v) = env::var("SPOTTER_HISTORY_DIR") {
        config.paths.history_dir = expand_path(&v);
        sources.env_overrides.push("SPOTTER_HISTORY_DIR".to_string());
    }

    if let Ok(v) = env::var("SPOTTER_REST_SECS") {
        if let Ok(secs) = v.parse() {
            config.timers.default_rest_secs = secs;
            sources.env_overrides.push("SPOTTER_REST_SECS".to_string());
        }
    }
    if let Ok(v) = env::var("SPOTTER_CONFIRMATION_SECS") {
        if let Ok(secs) = v.parse() {
            config.timers.confirmation_secs = secs;
            sources
                .env_overrides
                .push("SPOTTER_CONFIRMATION_SECS".to_string());
        }
    }
    if let Ok(v) = env::var("SPOTTER_FREE_MAX_SETS") {
        if let Ok(max) = v.parse() {
            config.entitlement.free_max_sets_per_exercise = max;
            sources.env_overrides.push("SPOTTER_FREE_MAX_SETS".to_string());
        }
    }

    if let Ok(v) = env::var("SPOTTER_LOG_LEVEL") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("SPOTTER_LOG_LEVEL".to_string());
    }
    // Also support RUST_LOG
    if let Ok(v) = env::var("RUST_LOG") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("RUST_LOG".to_string());
    }
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            home.join(stripped)
        } else {
            PathBuf::from(path)
        }
    } else if let Some(stripped) = path.strip_prefix('$') {
        // $VAR/rest/of/path
        if let Some(slash_pos) = stripped.find('/') {
            let var_name = &stripped[..slash_pos];
            if let Ok(var_value) = env::var(var_name) {
                PathBuf::from(var_value).join(&stripped[slash_pos + 1..])
            } else {
                PathBuf::from(path)
            }
        } else {
            env::var(stripped)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(path))
        }
    } else {
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_expand_path_tilde() {
        let expanded = expand_path("~/test/path");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.to_string_lossy().contains("test/path"));
    }

    #[test]
    fn test_expand_path_absolute() {
        let expanded = expand_path("/absolute/path");
        assert_eq!(expanded, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = SpotConfig::from_toml_str(
            r#"
[phase]
intensity_threshold = 0.02
"#,
        )
        .unwrap();
        assert_eq!(config.phase.intensity_threshold, 0.02);
        // untouched fields keep defaults
        assert_eq!(config.phase.confirmation_ms, 1000);
        assert_eq!(config.timers.default_rest_secs, 90);
    }

    #[test]
    fn test_later_file_wins_per_key() {
        let mut base: toml::Table = r#"
[timers]
default_rest_secs = 60
tick_ms = 100
"#
        .parse()
        .unwrap();
        let overlay: toml::Table = r#"
[timers]
default_rest_secs = 120
"#
        .parse()
        .unwrap();

        merge_tables(&mut base, overlay);
        let config = from_table(base, Path::new("test.toml")).unwrap();
        assert_eq!(config.timers.default_rest_secs, 120);
        assert_eq!(config.timers.tick_ms, 100);
    }

    #[test]
    fn test_explicit_path_is_loaded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[entitlement]\nfree_max_sets_per_exercise = 3").unwrap();

        let (config, sources) = SpotConfig::load_with_sources_from(Some(file.path())).unwrap();
        assert_eq!(config.entitlement.free_max_sets_per_exercise, 3);
        assert!(sources.files.iter().any(|f| f == file.path()));
    }

    #[test]
    fn test_parse_error_names_file() {
        let err = parse_table("[timers\n", Path::new("broken.toml")).unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }
}
