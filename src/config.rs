// src/config.rs

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The tracked API surface of one framework, loaded from a TOML file:
///
/// ```toml
/// framework = "react"
/// language = "JavaScript"
/// commands = ["useState", "useEffect"]
/// extensions = ["js", "jsx"]
/// manifest_file = "package.json"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct FrameworkDescriptor {
    pub framework: String,
    pub language: String,
    pub commands: Vec<String>,
    pub extensions: Vec<String>,
    pub manifest_file: String,
}

impl FrameworkDescriptor {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read framework descriptor {}: {}", path.display(), e))
        })?;
        let descriptor: FrameworkDescriptor = toml::from_str(&content)?;
        descriptor.validated()
    }

    /// Normalizes extensions and rejects descriptors the pipeline cannot run with.
    pub fn validated(mut self) -> Result<Self> {
        if self.framework.trim().is_empty() {
            return Err(Error::Config("framework name is empty".into()));
        }
        if self.language.trim().is_empty() {
            return Err(Error::Config("language is empty".into()));
        }
        if self.manifest_file.trim().is_empty() {
            return Err(Error::Config("manifest_file is empty".into()));
        }
        if self.commands.is_empty() {
            return Err(Error::Config("no commands to track".into()));
        }
        let mut seen = HashSet::new();
        for command in &self.commands {
            if command.trim().is_empty() {
                return Err(Error::Config("blank entry in commands".into()));
            }
            if !seen.insert(command.as_str()) {
                return Err(Error::Config(format!("duplicate command `{command}`")));
            }
        }

        self.extensions = self
            .extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_string())
            .filter(|e| !e.is_empty())
            .collect();
        if self.extensions.is_empty() {
            return Err(Error::Config("no file extensions to track".into()));
        }
        Ok(self)
    }
}

/// Parameters of the external search queries
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub min_stars: u32,
    pub max_stars: u32,
    pub population_per_page: u32,
    pub population_pages: u32,
    pub commits_per_page: u32,
    pub commit_max_pages: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            min_stars: 50,
            max_stars: 1000,
            population_per_page: 50,
            population_pages: 1,
            commits_per_page: 100,
            commit_max_pages: 10,
        }
    }
}

/// Bounded exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Adds up to this fraction of the delay as random jitter
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based), without jitter.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub github_token: Option<String>,
    pub discovery: DiscoveryConfig,
    pub clone_retry: RetryPolicy,
    /// Wall-clock budget for walking one repository's history
    pub scan_budget: Duration,
    /// Repositories cloned and scanned at the same time
    pub concurrency: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            github_token: None,
            discovery: DiscoveryConfig::default(),
            clone_retry: RetryPolicy::default(),
            scan_budget: Duration::from_secs(30 * 60),
            concurrency: 1,
        }
    }
}

impl Settings {
    pub fn framework_dir(&self, framework: &str) -> PathBuf {
        self.data_dir.join(framework)
    }

    pub fn scratch_path(&self, framework: &str, owner: &str, name: &str) -> PathBuf {
        self.framework_dir(framework).join("repos").join(owner).join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> FrameworkDescriptor {
        FrameworkDescriptor {
            framework: "react".into(),
            language: "JavaScript".into(),
            commands: vec!["useState".into(), "useEffect".into()],
            extensions: vec![".js".into(), "jsx".into()],
            manifest_file: "package.json".into(),
        }
    }

    #[test]
    fn strips_leading_dots_from_extensions() {
        let d = descriptor().validated().unwrap();
        assert_eq!(d.extensions, vec!["js", "jsx"]);
    }

    #[test]
    fn rejects_empty_and_duplicate_commands() {
        let mut d = descriptor();
        d.commands.clear();
        assert!(matches!(d.validated(), Err(Error::Config(_))));

        let mut d = descriptor();
        d.commands.push("useState".into());
        assert!(matches!(d.validated(), Err(Error::Config(_))));
    }

    #[test]
    fn parses_toml_descriptor() {
        let d: FrameworkDescriptor = toml::from_str(
            r#"
            framework = "react"
            language = "JavaScript"
            commands = ["render", "useRef"]
            extensions = ["tsx"]
            manifest_file = "package.json"
            "#,
        )
        .unwrap();
        assert_eq!(d.commands, vec!["render", "useRef"]);
    }

    #[test]
    fn shipped_react_descriptor_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("frameworks/react.toml");
        let d = FrameworkDescriptor::load(&path).unwrap();
        assert_eq!(d.framework, "react");
        assert_eq!(d.commands.len(), 11);
        assert_eq!(d.extensions, vec!["js", "jsx", "ts", "tsx"]);
    }

    #[test]
    fn missing_descriptor_is_a_config_error() {
        let err = FrameworkDescriptor::load(Path::new("/nonexistent/descriptor.toml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
            jitter: 0.0,
        };
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
        assert_eq!(policy.backoff(4), Duration::from_secs(10));
        assert_eq!(policy.backoff(40), Duration::from_secs(10));
    }
}
