//! `tarsyd` command-line surface: `serve` (default), `doctor`, and
//! `config` subcommands, plus shared config-file loading.

use clap::{Parser, Subcommand};

use tarsy_domain::config::{Config, ConfigSeverity};

#[derive(Debug, Parser)]
#[command(name = "tarsyd", version, about = "Tarsy alert-response orchestrator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the HTTP/WebSocket server (default when no subcommand is given).
    Serve,
    /// Run diagnostic checks against the current configuration.
    Doctor,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

/// Env var naming the config file path. Defaults to `config.toml` in the
/// current directory when unset.
pub const CONFIG_PATH_ENV: &str = "TARSY_CONFIG";

/// Loads the configuration from the path named by [`CONFIG_PATH_ENV`],
/// falling back to `Config::default()` if the file doesn't exist.
/// Shared by `serve`, `doctor`, and `config` subcommands.
pub fn load_config() -> anyhow::Result<(Config, String)> {
    let config_path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config.toml".into());

    let config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path).map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        Config::default()
    };

    Ok((config, config_path))
}

/// Validates `config` and aborts the process with the collected issues
/// on any `Error`-severity finding, warning (but continuing) on
/// `Warning`-severity ones.
pub fn validate_or_bail(config: &Config) -> anyhow::Result<()> {
    let issues = config.validate();
    let mut has_error = false;
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Error => {
                has_error = true;
                tracing::error!("{issue}");
            }
            ConfigSeverity::Warning => tracing::warn!("{issue}"),
        }
    }
    if has_error {
        anyhow::bail!("configuration has {} error(s); see above", issues.iter().filter(|e| e.severity == ConfigSeverity::Error).count());
    }
    Ok(())
}

/// `tarsyd doctor`: runs config validation plus light connectivity
/// checks and prints a pass/fail summary.
pub async fn run_doctor(config: &Config, config_path: &str) -> anyhow::Result<bool> {
    println!("tarsyd doctor");
    println!("=============\n");

    let mut all_passed = true;

    let exists = std::path::Path::new(config_path).exists();
    print_check(
        "Config file exists",
        exists,
        if exists { config_path.to_owned() } else { format!("{config_path} not found (using defaults)") },
    );
    if !exists {
        all_passed = false;
    }

    let issues = config.validate();
    let error_count = issues.iter().filter(|e| e.severity == ConfigSeverity::Error).count();
    if issues.is_empty() {
        print_check("Config validation", true, "no issues".into());
    } else {
        print_check("Config validation", error_count == 0, format!("{} issue(s) ({error_count} error(s))", issues.len()));
        for issue in &issues {
            println!("      {issue}");
        }
        if error_count > 0 {
            all_passed = false;
        }
    }

    print_check("LLM providers configured", !config.llm.providers.is_empty(), format!("{} provider(s)", config.llm.providers.len()));
    print_check("Chains configured", !config.chains.chains.is_empty(), format!("{} chain(s)", config.chains.chains.len()));

    println!();
    if all_passed {
        println!("All checks passed.");
    } else {
        println!("Some checks failed. Review the output above.");
    }

    Ok(all_passed)
}

fn print_check(name: &str, passed: bool, detail: String) {
    let mark = if passed { "ok" } else { "FAIL" };
    println!("  [{mark}] {name}: {detail}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_config_falls_back_to_default_when_file_missing() {
        // SAFETY: tests run single-threaded within this module; no
        // other test mutates TARSY_CONFIG concurrently.
        unsafe { std::env::set_var(CONFIG_PATH_ENV, "/nonexistent/tarsy-config-test.toml") };
        let (config, path) = load_config().unwrap();
        assert_eq!(path, "/nonexistent/tarsy-config-test.toml");
        assert_eq!(config.server.port, 3210);
        unsafe { std::env::remove_var(CONFIG_PATH_ENV) };
    }

    #[test]
    fn validate_or_bail_passes_for_default_config() {
        assert!(validate_or_bail(&Config::default()).is_ok());
    }
}
