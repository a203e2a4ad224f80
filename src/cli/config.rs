//! Conversion of CLI arguments into a library configuration

use crate::cli::main_impl::Cli;
use crate::config::RemovalConfig;
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Converts parsed CLI arguments into a [`RemovalConfig`]
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build the configuration: `--config` file first, flags on top, then the
    /// `BG_REMOVER_MODEL_DIR` fallback for the model directory.
    pub(crate) fn from_cli(cli: &Cli) -> Result<RemovalConfig> {
        let mut config = match &cli.config {
            Some(path) => RemovalConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            None => RemovalConfig::default(),
        };

        if let Some(dir) = &cli.model_dir {
            config.model_dir = Some(dir.clone());
        }
        if let Some(backend) = cli.backend {
            config.backend_type = backend.into();
        }
        if cli.threads > 0 {
            config.intra_threads = cli.threads;
        }
        if cli.no_cache {
            config.disable_cache = true;
        }
        if cli.no_progress {
            config.show_progress = false;
        }

        let config = config.with_env_defaults();
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Reject argument combinations that cannot work
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        if let (Some(input), Some(output)) = (&cli.input, &cli.output) {
            if input == output {
                anyhow::bail!(
                    "Output path must differ from the input path ({})",
                    input.display()
                );
            }
        }
        Ok(())
    }

    /// Output path: `-o` when given, otherwise `<stem>_nobg.png` beside the input
    pub(crate) fn output_path(cli: &Cli) -> Option<PathBuf> {
        cli.output
            .clone()
            .or_else(|| cli.input.as_deref().map(crate::default_output_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendType;
    use clap::Parser;
    use std::path::Path;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("cleancut").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = parse(&[
            "photo.jpg",
            "--model-dir",
            "/tmp/models",
            "--backend",
            "tract",
            "--no-cache",
            "--no-progress",
            "--threads",
            "2",
        ]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();

        assert_eq!(config.model_dir.as_deref(), Some(Path::new("/tmp/models")));
        assert_eq!(config.backend_type, BackendType::Tract);
        assert!(config.disable_cache);
        assert!(!config.show_progress);
        assert_eq!(config.intra_threads, 2);
    }

    #[test]
    fn test_flags_override_config_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cleancut.json");
        std::fs::write(
            &path,
            r#"{"model_dir": "/from/file", "show_progress": false, "intra_threads": 4}"#,
        )
        .unwrap();

        let cli = parse(&[
            "photo.jpg",
            "--config",
            path.to_str().unwrap(),
            "--model-dir",
            "/from/flag",
        ]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();

        assert_eq!(config.model_dir.as_deref(), Some(Path::new("/from/flag")));
        assert!(!config.show_progress);
        assert_eq!(config.intra_threads, 4);
    }

    #[test]
    fn test_missing_config_file_fails() {
        let cli = parse(&["photo.jpg", "--config", "/nonexistent/cleancut.json"]);
        assert!(CliConfigBuilder::from_cli(&cli).is_err());
    }

    #[test]
    fn test_default_output_path_next_to_input() {
        let cli = parse(&["shots/cat.jpeg"]);
        assert_eq!(
            CliConfigBuilder::output_path(&cli),
            Some(PathBuf::from("shots/cat_nobg.png"))
        );

        let cli = parse(&["shots/cat.jpeg", "-o", "out.png"]);
        assert_eq!(CliConfigBuilder::output_path(&cli), Some(PathBuf::from("out.png")));
    }

    #[test]
    fn test_output_equal_to_input_is_rejected() {
        let cli = parse(&["a.png", "-o", "a.png"]);
        assert!(CliConfigBuilder::validate_cli(&cli).is_err());
    }
}
