//! Shared setup for CLI commands.
//!
//! Loads configuration, builds the resolver and assembles the overlay
//! context from `[mounts]` plus any `--mount` flags.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use strata::backend::FileResource;
use strata::config::StrataConfig;
use strata::overlay::{ContextGuard, OverlayContext};
use strata::{ResourceRef, Resolver};

use crate::error::CliError;

/// Everything a command needs to resolve resources.
pub struct CliRunner {
    config: StrataConfig,
    resolver: Resolver,
    context: Arc<OverlayContext>,
}

impl CliRunner {
    /// Build a runner from an optional config path and `name=uri` mounts.
    ///
    /// Without an explicit path the platform default is used if present.
    pub fn new(config_path: Option<&Path>, mounts: &[String]) -> Result<Self, CliError> {
        let mut config = match config_path {
            Some(path) => StrataConfig::load(path)?,
            None => match StrataConfig::default_path() {
                Some(path) => StrataConfig::load_or_default(&path)?,
                None => StrataConfig::default(),
            },
        };

        for mount in mounts {
            let (name, uri) = parse_mount(mount)?;
            config.mounts.insert(name, uri);
        }

        let resolver = config.build_resolver()?;
        let context = config.mount_context(&resolver)?;

        Ok(Self {
            config,
            resolver,
            context,
        })
    }

    /// Log the command being run.
    pub fn log_startup(&self, command: &str) {
        tracing::debug!(
            command,
            version = strata::VERSION,
            schemes = ?self.resolver.schemes(),
            mounts = ?self.context.mounted_names(),
            "Starting command"
        );
    }

    /// Loaded configuration.
    pub fn config(&self) -> &StrataConfig {
        &self.config
    }

    /// Make the mount context current for the calling thread.
    pub fn enter(&self) -> ContextGuard {
        self.context.push()
    }

    /// Resolve a URI, or a plain filesystem path.
    pub fn resolve(&self, target: &str) -> Result<ResourceRef, CliError> {
        if looks_like_uri(target) {
            Ok(self.resolver.resolve_str(target)?)
        } else {
            Ok(Arc::new(FileResource::new(PathBuf::from(target))?))
        }
    }
}

/// Split a `name=uri` mount argument.
pub fn parse_mount(value: &str) -> Result<(String, String), CliError> {
    let (name, uri) = value
        .split_once('=')
        .ok_or_else(|| CliError::InvalidMount(value.to_string()))?;
    let (name, uri) = (name.trim(), uri.trim());
    if uri.is_empty() {
        return Err(CliError::InvalidMount(value.to_string()));
    }
    Ok((name.to_string(), uri.to_string()))
}

/// A scheme of two or more characters followed by `:`.
///
/// Single-letter schemes are treated as Windows drive letters.
fn looks_like_uri(target: &str) -> bool {
    match target.split_once(':') {
        Some((scheme, _)) => {
            scheme.len() > 1
                && scheme
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::fs;
    use strata::Resource;
    use tempfile::TempDir;

    #[test]
    fn test_parse_mount() {
        assert_eq!(
            parse_mount("site=file:///srv/site/").unwrap(),
            ("site".to_string(), "file:///srv/site/".to_string())
        );
        assert_eq!(
            parse_mount("=file:///root/").unwrap(),
            (String::new(), "file:///root/".to_string())
        );
        assert!(parse_mount("site").is_err());
        assert!(parse_mount("site=").is_err());
    }

    #[test]
    fn test_looks_like_uri() {
        assert!(looks_like_uri("file:///tmp/a"));
        assert!(looks_like_uri("jar:file:///a.zip!/x"));
        assert!(looks_like_uri("ovl://site/a"));
        assert!(!looks_like_uri("relative/path.txt"));
        assert!(!looks_like_uri("C:\\data\\file.txt"));
        assert!(!looks_like_uri("/abs/path"));
    }

    #[test]
    fn test_runner_resolves_paths_and_mounts() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("config.ini");
        fs::write(&config_path, "[archive]\ncheck_interval_ms = 0\n").unwrap();
        let site = temp.path().join("site");
        fs::create_dir_all(&site).unwrap();
        fs::write(site.join("index.html"), "<html/>").unwrap();

        let mount = format!("site={}", FileResource::new(&site).unwrap().uri());
        let runner = CliRunner::new(Some(&config_path), &[mount]).unwrap();
        let _guard = runner.enter();

        let by_path = runner
            .resolve(site.join("index.html").to_str().unwrap())
            .unwrap();
        assert!(by_path.exists());

        let by_name = runner.resolve("ovl://site/index.html").unwrap();
        assert_eq!(by_name.size().unwrap(), 7);
    }

    #[test]
    fn test_missing_explicit_config_fails() {
        let temp = TempDir::new().unwrap();
        let result = CliRunner::new(Some(&temp.path().join("absent.ini")), &[]);
        assert!(matches!(result, Err(CliError::Resource(_))));
    }

    proptest! {
        #[test]
        fn test_parse_mount_splits_on_first_equals(
            name in "[a-z][a-z0-9_]{0,12}",
            path in "[a-z0-9/=]{1,20}",
        ) {
            let value = format!("{}=file:///{}", name, path);
            let (parsed_name, parsed_uri) = parse_mount(&value).unwrap();
            prop_assert_eq!(parsed_name, name);
            prop_assert_eq!(parsed_uri, format!("file:///{}", path));
        }
    }
}
