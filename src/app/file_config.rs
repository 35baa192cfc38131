//! Optional `key = value` config file supplying CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

/// Values read from `config.toml`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct FileConfig {
    pub(crate) output_dir: Option<PathBuf>,
    pub(crate) workers: Option<u8>,
    pub(crate) retry: Option<u8>,
    /// MB/s
    pub(crate) throttle: Option<f64>,
    pub(crate) smart_check: Option<bool>,
    pub(crate) extension: Option<String>,
    pub(crate) timeout_secs: Option<u64>,
    pub(crate) log_file: Option<bool>,
}

impl FileConfig {
    /// Validates values against the same ranges the CLI enforces.
    pub(crate) fn validate(&self) -> Result<()> {
        if let Some(workers) = self.workers
            && !(1..=100).contains(&workers)
        {
            bail!("Invalid config value for `workers`: {workers}. Expected range: 1..=100");
        }
        if let Some(retry) = self.retry
            && !(1..=20).contains(&retry)
        {
            bail!("Invalid config value for `retry`: {retry}. Expected range: 1..=20");
        }
        if let Some(throttle) = self.throttle
            && !(throttle.is_finite() && throttle >= 0.0)
        {
            bail!("Invalid config value for `throttle`: {throttle}. Expected a non-negative number");
        }
        if let Some(timeout) = self.timeout_secs
            && !(1..=3600).contains(&timeout)
        {
            bail!("Invalid config value for `timeout_secs`: {timeout}. Expected range: 1..=3600");
        }
        Ok(())
    }
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/bulkfetch/config.toml`
/// 2. `$HOME/.config/bulkfetch/config.toml`
#[must_use]
pub(crate) fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("bulkfetch")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("bulkfetch")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config file from the default path, if one exists.
pub(crate) fn load_default_file_config() -> Result<Option<FileConfig>> {
    match resolve_default_config_path() {
        Some(path) if path.exists() => load_file_config(&path).map(Some),
        _ => Ok(None),
    }
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

pub(crate) fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }
        let line_no = line_index + 1;

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let context = || format!("Invalid `{key}` value on line {line_no}");

        match key {
            "output_dir" => {
                cfg.output_dir = Some(PathBuf::from(
                    parse_string_literal(value).with_context(context)?,
                ));
            }
            "extension" => {
                cfg.extension = Some(parse_string_literal(value).with_context(context)?);
            }
            "workers" => cfg.workers = Some(parse_integer_u8(value).with_context(context)?),
            "retry" => cfg.retry = Some(parse_integer_u8(value).with_context(context)?),
            "throttle" => cfg.throttle = Some(parse_float(value).with_context(context)?),
            "timeout_secs" => {
                cfg.timeout_secs = Some(parse_integer_u64(value).with_context(context)?);
            }
            "smart_check" => cfg.smart_check = Some(parse_boolean(value).with_context(context)?),
            "log_file" => cfg.log_file = Some(parse_boolean(value).with_context(context)?),
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_no}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u8(raw_value: &str) -> Result<u8> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<u16>()?;
    u8::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u8"))
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_float(raw_value: &str) -> Result<f64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected numeric value");
    }
    Ok(token.parse::<f64>()?)
}

fn parse_boolean(raw_value: &str) -> Result<bool> {
    match raw_value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Expected 'true' or 'false'"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_partial_fields() {
        let cfg = parse_config_str(
            r#"
workers = 8
extension = "zip"
"#,
        )
        .unwrap();
        assert_eq!(cfg.workers, Some(8));
        assert_eq!(cfg.extension.as_deref(), Some("zip"));
        assert!(cfg.output_dir.is_none());
    }

    #[test]
    fn test_parse_config_all_fields() {
        let cfg = parse_config_str(
            r#"
output_dir = "/data/files"
workers = 3
retry = 7
throttle = 2.5
timeout_secs = 30
smart_check = false
log_file = false
"#,
        )
        .unwrap();
        assert_eq!(cfg.output_dir, Some(PathBuf::from("/data/files")));
        assert_eq!(cfg.retry, Some(7));
        assert_eq!(cfg.throttle, Some(2.5));
        assert_eq!(cfg.timeout_secs, Some(30));
        assert_eq!(cfg.smart_check, Some(false));
        assert_eq!(cfg.log_file, Some(false));
    }

    #[test]
    fn test_parse_config_supports_inline_comments() {
        let cfg = parse_config_str(
            r#"
workers = 4 # parallel
output_dir = "/tmp/with#hash" # quoted hash kept
"#,
        )
        .unwrap();
        assert_eq!(cfg.workers, Some(4));
        assert_eq!(cfg.output_dir, Some(PathBuf::from("/tmp/with#hash")));
    }

    #[test]
    fn test_parse_config_rejects_invalid_workers() {
        let err = parse_config_str("workers = 0").unwrap_err();
        assert!(err.to_string().contains("workers"));
    }

    #[test]
    fn test_parse_config_rejects_trailing_tokens() {
        let err = parse_config_str("retry = 4 trailing").unwrap_err();
        assert!(err.to_string().contains("retry"));
    }

    #[test]
    fn test_parse_config_rejects_negative_throttle() {
        let err = parse_config_str("throttle = -1").unwrap_err();
        assert!(err.to_string().contains("throttle"));
    }

    #[test]
    fn test_parse_config_rejects_invalid_boolean() {
        let err = parse_config_str("smart_check = yes").unwrap_err();
        assert!(format!("{err:#}").contains("smart_check"));
    }

    #[test]
    fn test_parse_config_rejects_unknown_keys() {
        let err = parse_config_str("unknown_key = 123").unwrap_err();
        assert!(err.to_string().contains("Unknown configuration key"));
        assert!(err.to_string().contains("unknown_key"));
    }

    #[test]
    fn test_parse_config_rejects_missing_equals() {
        let err = parse_config_str("workers 4").unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }
}
