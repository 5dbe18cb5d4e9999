//! INI configuration.
//!
//! # Format
//!
//! ```ini
//! [archive]
//! check_interval_ms = 5000
//!
//! [watcher]
//! poll_interval_ms = 1000
//!
//! [http]
//! timeout_secs = 30
//! user_agent = strata/0.3.0
//!
//! [overlay]
//! marker_name = overlay.properties
//!
//! [mounts]
//! site = file:///srv/site/
//! theme = ovl:file:///srv/theme/
//! ```
//!
//! Every key is optional. Entries under `[mounts]` become named roots of the
//! root [`OverlayContext`], addressable as `ovl://<name>/...`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ini::Ini;

use crate::archive::{ArchiveRegistry, DEFAULT_CHECK_INTERVAL};
use crate::backend::{UrlFactory, DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT};
use crate::error::{ResourceError, ResourceResult};
use crate::overlay::{OverlayContext, DEFAULT_MARKER_NAME};
use crate::resolver::Resolver;
use crate::watch::DEFAULT_POLL_INTERVAL;

/// Directory under the platform config dir.
const CONFIG_DIR_NAME: &str = "strata";

/// Configuration file name.
const CONFIG_FILE_NAME: &str = "config.ini";

/// Loaded configuration with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrataConfig {
    /// Minimum time between archive re-scans.
    pub check_interval: Duration,

    /// Default resource watcher poll interval.
    pub poll_interval: Duration,

    /// HTTP request timeout.
    pub http_timeout: Duration,

    /// HTTP `User-Agent` header.
    pub user_agent: String,

    /// File name of overlay marker files.
    pub marker_name: String,

    /// Named overlay roots, name → URI.
    pub mounts: BTreeMap<String, String>,
}

impl Default for StrataConfig {
    fn default() -> Self {
        Self {
            check_interval: DEFAULT_CHECK_INTERVAL,
            poll_interval: DEFAULT_POLL_INTERVAL,
            http_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            marker_name: DEFAULT_MARKER_NAME.to_string(),
            mounts: BTreeMap::new(),
        }
    }
}

impl StrataConfig {
    /// Platform default location, e.g. `~/.config/strata/config.ini`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load from a file.
    pub fn load(path: &Path) -> ResourceResult<Self> {
        let ini = Ini::load_from_file(path).map_err(|e| {
            ResourceError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Self::from_ini(&ini)
    }

    /// Load from a file, falling back to defaults if it does not exist.
    pub fn load_or_default(path: &Path) -> ResourceResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse INI text.
    pub fn parse(text: &str) -> ResourceResult<Self> {
        let ini = Ini::load_from_str(text)
            .map_err(|e| ResourceError::Config(format!("malformed configuration: {}", e)))?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> ResourceResult<Self> {
        let mut config = Self::default();

        if let Some(ms) = parse_u64(ini, "archive", "check_interval_ms")? {
            config.check_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_u64(ini, "watcher", "poll_interval_ms")? {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_u64(ini, "http", "timeout_secs")? {
            config.http_timeout = Duration::from_secs(secs);
        }
        if let Some(agent) = get_str(ini, "http", "user_agent") {
            config.user_agent = agent.to_string();
        }
        if let Some(marker) = get_str(ini, "overlay", "marker_name") {
            config.marker_name = marker.to_string();
        }
        if let Some(section) = ini.section(Some("mounts")) {
            for (name, uri) in section.iter() {
                config
                    .mounts
                    .insert(name.trim().to_string(), uri.trim().to_string());
            }
        }

        Ok(config)
    }

    /// Serialize to INI text.
    pub fn to_ini_string(&self) -> String {
        let mut ini = Ini::new();
        ini.with_section(Some("archive"))
            .set("check_interval_ms", self.check_interval.as_millis().to_string());
        ini.with_section(Some("watcher"))
            .set("poll_interval_ms", self.poll_interval.as_millis().to_string());
        ini.with_section(Some("http"))
            .set("timeout_secs", self.http_timeout.as_secs().to_string())
            .set("user_agent", self.user_agent.as_str());
        ini.with_section(Some("overlay"))
            .set("marker_name", self.marker_name.as_str());
        for (name, uri) in &self.mounts {
            ini.with_section(Some("mounts"))
                .set(name.as_str(), uri.as_str());
        }

        let mut out = Vec::new();
        // Writing to a Vec cannot fail.
        let _ = ini.write_to(&mut out);
        String::from_utf8_lossy(&out).into_owned()
    }

    /// Archive registry using the configured check interval.
    pub fn archive_registry(&self) -> Arc<ArchiveRegistry> {
        Arc::new(ArchiveRegistry::new(self.check_interval))
    }

    /// Resolver with the standard factories, configured from this file.
    pub fn build_resolver(&self) -> ResourceResult<Resolver> {
        let url_factory = UrlFactory::with_settings(self.http_timeout, &self.user_agent)?;
        Resolver::with_standard_factories(
            self.archive_registry(),
            url_factory,
            self.marker_name.as_str(),
        )
    }

    /// Context holding every configured mount, resolved through `resolver`.
    pub fn mount_context(&self, resolver: &Resolver) -> ResourceResult<Arc<OverlayContext>> {
        let context = OverlayContext::new();
        for (name, uri) in &self.mounts {
            let root = resolver.resolve_str(uri)?;
            context.mount(name.clone(), root);
        }
        tracing::info!(mounts = self.mounts.len(), "Built mount context");
        Ok(context)
    }
}

fn get_str<'a>(ini: &'a Ini, section: &str, key: &str) -> Option<&'a str> {
    ini.get_from(Some(section), key)
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn parse_u64(ini: &Ini, section: &str, key: &str) -> ResourceResult<Option<u64>> {
    get_str(ini, section, key)
        .map(|v| {
            v.parse::<u64>().map_err(|_| {
                ResourceError::Config(format!(
                    "{}.{} must be a non-negative integer, got '{}'",
                    section, key, v
                ))
            })
        })
        .transpose()
}
