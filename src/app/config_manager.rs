use anyhow::Result;
use bulkfetch_core::Configuration;

use crate::app::config_runtime::{
    CliValueSources, apply_config_defaults, build_configuration,
};
use crate::app::file_config::load_default_file_config;
use crate::cli::Args;

/// Arguments after merging the config file, plus the engine configuration built from them.
pub(crate) struct ResolvedConfig {
    pub(crate) args: Args,
    pub(crate) configuration: Configuration,
}

/// Loads the config file, lets CLI values override it, and builds the engine configuration.
pub(crate) fn resolve_config(args: Args, cli_sources: &CliValueSources) -> Result<ResolvedConfig> {
    let file_config = load_default_file_config()?;
    let args = apply_config_defaults(args, cli_sources, file_config.as_ref())?;
    let configuration = build_configuration(&args);
    Ok(ResolvedConfig {
        args,
        configuration,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bulkfetch_core::DEFAULT_CONCURRENCY;
    use clap::Parser;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_config_reads_xdg_config_file() {
        let temp = TempDir::new().unwrap();
        let config_dir = temp.path().join("bulkfetch");
        std::fs::create_dir_all(&config_dir).unwrap();

        let prev = std::env::var_os("XDG_CONFIG_HOME");
        // SAFETY: test isolates env change and restores on drop.
        unsafe {
            std::env::set_var("XDG_CONFIG_HOME", temp.path());
        }
        let _restore = RestoreEnv::new("XDG_CONFIG_HOME", prev);

        let args = Args::try_parse_from(["bulkfetch"]).unwrap();
        let resolved = resolve_config(args.clone(), &CliValueSources::default()).unwrap();
        assert_eq!(
            resolved.configuration.concurrency, DEFAULT_CONCURRENCY,
            "concurrency should be default when no config"
        );

        std::fs::write(config_dir.join("config.toml"), "workers = 3\nretry = 2\n").unwrap();
        let resolved = resolve_config(args.clone(), &CliValueSources::default()).unwrap();
        assert_eq!(resolved.configuration.concurrency, 3);
        assert_eq!(resolved.configuration.max_retries, 2);

        std::fs::write(config_dir.join("config.toml"), "workers = 300\n").unwrap();
        assert!(resolve_config(args, &CliValueSources::default()).is_err());
    }

    /// Restores an env var to its previous value (or removes it) when dropped.
    struct RestoreEnv {
        key: &'static str,
        value: Option<std::ffi::OsString>,
    }
    impl RestoreEnv {
        fn new(key: &'static str, value: Option<std::ffi::OsString>) -> Self {
            Self { key, value }
        }
    }
    impl Drop for RestoreEnv {
        fn drop(&mut self) {
            // SAFETY: test restores env to prior state.
            match &self.value {
                Some(v) => unsafe { std::env::set_var(self.key, v) },
                None => unsafe { std::env::remove_var(self.key) },
            }
        }
    }
}
