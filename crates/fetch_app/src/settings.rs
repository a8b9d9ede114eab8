//! Optional RON settings file. Command line flags override what it says.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use fetch_core::{normalize_seed, parse_keywords, FilterSpec, SuffixRules};
use fetch_engine::{default_worker_count, EngineConfig, FetchSettings};
use fetch_logging::{fetch_debug, fetch_info};
use serde::{Deserialize, Serialize};

use crate::cli::Args;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub destination: PathBuf,
    pub sources_file: PathBuf,
    pub inventory_roots: Vec<PathBuf>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub workers: Option<usize>,
    pub content_suffixes: Vec<String>,
    pub archive_suffixes: Vec<String>,
    pub skip_size_check: bool,
    pub decompress: bool,
    pub delete_archives: bool,
    pub recursive: bool,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub report_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            destination: PathBuf::from("download/maps"),
            sources_file: PathBuf::from("fastdl_sources.txt"),
            inventory_roots: vec![PathBuf::from("maps")],
            include: Vec::new(),
            exclude: Vec::new(),
            workers: None,
            content_suffixes: vec![".bsp".to_string()],
            archive_suffixes: vec![".bz2".to_string()],
            skip_size_check: false,
            decompress: false,
            delete_archives: false,
            recursive: false,
            connect_timeout_secs: 10,
            read_timeout_secs: 120,
            report_dir: PathBuf::from("."),
        }
    }
}

impl Settings {
    /// Reads `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                fetch_debug!("No settings file at {:?}, using defaults", path);
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("could not read settings {}", path.display()))
            }
        };
        let settings = ron::from_str(&text)
            .with_context(|| format!("invalid settings file {}", path.display()))?;
        fetch_info!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    pub fn suffix_rules(&self) -> SuffixRules {
        SuffixRules::new(&self.content_suffixes, &self.archive_suffixes)
    }

    pub fn sources_path(&self, args: &Args) -> PathBuf {
        args.sources.clone().unwrap_or_else(|| self.sources_file.clone())
    }

    pub fn report_dir(&self, args: &Args) -> PathBuf {
        args.report_dir.clone().unwrap_or_else(|| self.report_dir.clone())
    }

    /// Merges the file settings, the command line and the seed file contents.
    pub fn resolve(&self, args: &Args, file_seeds: Vec<String>) -> EngineConfig {
        let rules = self.suffix_rules();

        let mut seeds: Vec<String> = Vec::new();
        let cli_seeds = args.seeds.iter().map(|seed| normalize_seed(seed, &rules));
        for seed in file_seeds.into_iter().chain(cli_seeds) {
            if !seeds.contains(&seed) {
                seeds.push(seed);
            }
        }

        let include = args
            .include
            .as_deref()
            .map(parse_keywords)
            .unwrap_or_else(|| self.include.clone());
        let exclude = args
            .exclude
            .as_deref()
            .map(parse_keywords)
            .unwrap_or_else(|| self.exclude.clone());

        let mut config = EngineConfig::new(args.dest.clone().unwrap_or_else(|| self.destination.clone()));
        config.inventory_roots = self
            .inventory_roots
            .iter()
            .chain(&args.scan)
            .cloned()
            .collect();
        config.seeds = seeds;
        config.filters = FilterSpec::new(include, exclude);
        config.rules = rules;
        config.workers = args
            .workers
            .map(usize::from)
            .or(self.workers)
            .unwrap_or_else(default_worker_count)
            .max(1);
        config.fetch = FetchSettings {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            ..FetchSettings::default()
        };
        config.skip_size_check = args.skip_size_check || self.skip_size_check;
        config.decompress = args.decompress || self.decompress;
        config.delete_archives = args.delete_archives || self.delete_archives;
        config.recursive = args.recursive || self.recursive;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let settings = Settings::load(&temp.path().join("absent.ron")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("assetfetch.ron");
        fs::write(
            &path,
            r#"(destination: "cstrike/download/maps", workers: Some(6), exclude: ["beta"])"#,
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.destination, PathBuf::from("cstrike/download/maps"));
        assert_eq!(settings.workers, Some(6));
        assert_eq!(settings.exclude, vec!["beta".to_string()]);
        assert_eq!(settings.sources_file, PathBuf::from("fastdl_sources.txt"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("assetfetch.ron");
        fs::write(&path, "(workers: \"many\"").unwrap();
        assert!(Settings::load(&path).is_err());
    }

    #[test]
    fn command_line_overrides_file_values() {
        let settings = Settings {
            workers: Some(6),
            include: vec!["surf".to_string()],
            decompress: true,
            ..Settings::default()
        };
        let args = Args::try_parse_from([
            "assetfetch",
            "--dest",
            "out",
            "--workers",
            "3",
            "--include",
            "Arena, dm_",
            "--seed",
            "http://fastdl.example/maps",
            "--scan",
            "extra",
        ])
        .unwrap();

        let config = settings.resolve(&args, vec!["http://fastdl.example/maps/".to_string()]);

        assert_eq!(config.destination, PathBuf::from("out"));
        assert_eq!(config.workers, 3);
        assert_eq!(config.filters.include_terms(), &["arena".to_string(), "dm_".to_string()]);
        assert_eq!(config.seeds, vec!["http://fastdl.example/maps/".to_string()]);
        assert_eq!(
            config.inventory_roots,
            vec![PathBuf::from("maps"), PathBuf::from("extra")]
        );
        assert!(config.decompress);
        assert!(!config.recursive);
    }
}
