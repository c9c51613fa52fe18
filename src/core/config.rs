//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{DeckhandError, Result};

/// Full deckhand configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
#[derive(Default)]
pub struct Config {
    pub widgets: Vec<WidgetConfig>,
    pub security: SecurityConfig,
    pub layout: LayoutConfig,
    pub store: StoreConfig,
    pub execution: ExecutionConfig,
    pub paths: PathsConfig,
}

/// Which search root a widget is expected to come from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WidgetLocation {
    /// Shipped with the application; checksum known at build time.
    Bundled,
    /// User-supplied; requires an explicit trust decision.
    #[default]
    Custom,
}

/// One widget entry as authored by the user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WidgetConfig {
    /// Unique key across the widget set.
    pub id: String,
    /// Shorthand name (searched across widget roots) or explicit path.
    pub path: String,
    pub location: WidgetLocation,
    /// Required for custom widgets when `security.require_checksums` is set.
    pub sha256: Option<String>,
    pub refresh_seconds: u64,
    pub enabled: bool,
    /// 1 = highest. Drives pinned-strip ordering and space-constrained drops.
    pub priority: u8,
    pub pinned: bool,
    pub max_lines: usize,
    /// Column-span override for the layout grid.
    pub width: Option<u16>,
    /// Row-height override for the layout grid.
    pub height: Option<u16>,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            path: String::new(),
            location: WidgetLocation::Custom,
            sha256: None,
            refresh_seconds: 10,
            enabled: true,
            priority: 2,
            pinned: false,
            max_lines: 10,
            width: None,
            height: None,
        }
    }
}

/// Script trust policy knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SecurityConfig {
    /// Hard-fail custom widgets that carry no checksum.
    pub require_checksums: bool,
    /// Allow resolution from the user-custom widget directory at all.
    pub allow_user_widgets: bool,
    /// Downgrades custom-widget checksum absence to informational.
    /// Never persisted: supplied per-run via `--dev` or `DKH_SECURITY_DEV_MODE`.
    #[serde(skip)]
    pub dev_mode: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            require_checksums: false,
            allow_user_widgets: true,
            dev_mode: false,
        }
    }
}

/// Grid layout tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LayoutConfig {
    /// Explicit widget ordering for the grid. Ids not listed flow after, in
    /// config order. Duplicate ids are collapsed to the first occurrence.
    pub order: Vec<String>,
    /// Terminal-width breakpoints; n breakpoints yield up to n+1 columns.
    pub breakpoints: Vec<u16>,
    pub row_min_height: u16,
    pub row_max_height: u16,
    pub pinned_strip_height: u16,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            breakpoints: vec![100, 160, 220],
            row_min_height: 5,
            row_max_height: 30,
            pinned_strip_height: 5,
        }
    }
}

/// Time-series store retention policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    pub retention_days: u32,
    pub prune_interval_minutes: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            retention_days: 30,
            prune_interval_minutes: 60,
        }
    }
}

/// Subprocess execution limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Timeout for scheduled widget refresh runs.
    pub refresh_timeout_seconds: u64,
    /// Timeout for user-invoked actions (0 = unbounded).
    pub action_timeout_seconds: u64,
    pub stdout_cap_bytes: usize,
    pub stderr_cap_bytes: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            refresh_timeout_seconds: 10,
            action_timeout_seconds: 60,
            stdout_cap_bytes: 64 * 1024,
            stderr_cap_bytes: 32 * 1024,
        }
    }
}

/// Filesystem paths used by deckhand.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    /// Widgets shipped with the application (checksums embedded at build time).
    pub bundled_dir: PathBuf,
    /// User-authored widgets.
    pub custom_dir: PathBuf,
    /// Optional extra search root, consulted before the other two.
    pub override_dir: Option<PathBuf>,
    pub sqlite_db: PathBuf,
    pub jsonl_log: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!(
                    "[DKH-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths"
                );
                PathBuf::from("/tmp")
            },
            PathBuf::from,
        );
        let cfg = home_dir.join(".config").join("deckhand").join("config.toml");
        let data = home_dir.join(".local").join("share").join("deckhand");
        Self {
            config_file: cfg,
            bundled_dir: PathBuf::from("/usr/lib/deckhand/widgets"),
            custom_dir: data.join("widgets"),
            override_dir: None,
            sqlite_db: data.join("metrics.sqlite3"),
            jsonl_log: data.join("events.jsonl"),
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from the default
    /// path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| DeckhandError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(DeckhandError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides()?;
        cfg.normalize_paths();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Persist the current config back to its file.
    ///
    /// Written via temp-file + rename so a crash mid-write never truncates
    /// the previous config. This is the explicit save operation behind
    /// layout resize/reorder persistence.
    pub fn save(&self) -> Result<()> {
        let path = &self.paths.config_file;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| DeckhandError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let rendered =
            toml::to_string_pretty(self).map_err(|error| DeckhandError::Serialization {
                context: "toml",
                details: error.to_string(),
            })?;
        let tmp = path.with_extension("toml.tmp");
        fs::write(&tmp, rendered).map_err(|source| DeckhandError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, path).map_err(|source| DeckhandError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(())
    }

    /// Look up a widget entry by id.
    #[must_use]
    pub fn widget(&self, id: &str) -> Option<&WidgetConfig> {
        self.widgets.iter().find(|w| w.id == id)
    }

    /// Mutable lookup, used by layout resize ops.
    pub fn widget_mut(&mut self, id: &str) -> Option<&mut WidgetConfig> {
        self.widgets.iter_mut().find(|w| w.id == id)
    }

    /// Enabled widgets in declaration order.
    pub fn enabled_widgets(&self) -> impl Iterator<Item = &WidgetConfig> {
        self.widgets.iter().filter(|w| w.enabled)
    }

    /// Deterministic hash of the effective config for logging/telemetry.
    ///
    /// Uses FNV-1a for cross-process-stable hashing (no `DefaultHasher`
    /// whose seed may vary across Rust releases).
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        // security
        set_env_bool(
            "DKH_SECURITY_REQUIRE_CHECKSUMS",
            &mut self.security.require_checksums,
        )?;
        set_env_bool(
            "DKH_SECURITY_ALLOW_USER_WIDGETS",
            &mut self.security.allow_user_widgets,
        )?;
        set_env_bool("DKH_SECURITY_DEV_MODE", &mut self.security.dev_mode)?;

        // store
        set_env_u32("DKH_STORE_RETENTION_DAYS", &mut self.store.retention_days)?;
        set_env_u64(
            "DKH_STORE_PRUNE_INTERVAL_MINUTES",
            &mut self.store.prune_interval_minutes,
        )?;

        // execution
        set_env_u64(
            "DKH_EXEC_REFRESH_TIMEOUT_SECONDS",
            &mut self.execution.refresh_timeout_seconds,
        )?;
        set_env_u64(
            "DKH_EXEC_ACTION_TIMEOUT_SECONDS",
            &mut self.execution.action_timeout_seconds,
        )?;
        set_env_usize(
            "DKH_EXEC_STDOUT_CAP_BYTES",
            &mut self.execution.stdout_cap_bytes,
        )?;
        set_env_usize(
            "DKH_EXEC_STDERR_CAP_BYTES",
            &mut self.execution.stderr_cap_bytes,
        )?;

        // paths
        if let Some(raw) = env_var("DKH_PATHS_BUNDLED_DIR") {
            self.paths.bundled_dir = PathBuf::from(raw);
        }
        if let Some(raw) = env_var("DKH_PATHS_CUSTOM_DIR") {
            self.paths.custom_dir = PathBuf::from(raw);
        }
        if let Some(raw) = env_var("DKH_PATHS_OVERRIDE_DIR") {
            self.paths.override_dir = Some(PathBuf::from(raw));
        }
        if let Some(raw) = env_var("DKH_PATHS_SQLITE_DB") {
            self.paths.sqlite_db = PathBuf::from(raw);
        }
        if let Some(raw) = env_var("DKH_PATHS_JSONL_LOG") {
            self.paths.jsonl_log = PathBuf::from(raw);
        }

        Ok(())
    }

    /// Normalize widget-root paths for consistent prefix comparison.
    fn normalize_paths(&mut self) {
        for path in [&mut self.paths.bundled_dir, &mut self.paths.custom_dir]
            .into_iter()
            .chain(self.paths.override_dir.as_mut())
        {
            let s = path.to_string_lossy();
            if s.len() > 1
                && let Some(stripped) = s.strip_suffix('/')
            {
                *path = PathBuf::from(stripped);
            }
        }
    }

    fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for widget in &self.widgets {
            if widget.id.trim().is_empty() {
                return Err(DeckhandError::InvalidConfig {
                    details: "widget id must be non-empty".to_string(),
                });
            }
            if !seen.insert(widget.id.as_str()) {
                return Err(DeckhandError::InvalidConfig {
                    details: format!("duplicate widget id: {:?}", widget.id),
                });
            }
            if widget.path.trim().is_empty() {
                return Err(DeckhandError::InvalidConfig {
                    details: format!("widget {:?}: path must be non-empty", widget.id),
                });
            }
            if widget.refresh_seconds == 0 {
                return Err(DeckhandError::InvalidConfig {
                    details: format!("widget {:?}: refresh_seconds must be > 0", widget.id),
                });
            }
            if !(1..=3).contains(&widget.priority) {
                return Err(DeckhandError::InvalidConfig {
                    details: format!(
                        "widget {:?}: priority must be in [1, 3], got {}",
                        widget.id, widget.priority
                    ),
                });
            }
            if widget.max_lines == 0 {
                return Err(DeckhandError::InvalidConfig {
                    details: format!("widget {:?}: max_lines must be > 0", widget.id),
                });
            }
        }

        if self.layout.breakpoints.is_empty()
            || !self.layout.breakpoints.is_sorted_by(|a, b| a < b)
        {
            return Err(DeckhandError::InvalidConfig {
                details: "layout.breakpoints must be non-empty and strictly ascending".to_string(),
            });
        }

        if self.layout.row_min_height == 0
            || self.layout.row_min_height > self.layout.row_max_height
        {
            return Err(DeckhandError::InvalidConfig {
                details: format!(
                    "layout row heights must satisfy 0 < min ({}) <= max ({})",
                    self.layout.row_min_height, self.layout.row_max_height
                ),
            });
        }

        if self.store.retention_days == 0 {
            return Err(DeckhandError::InvalidConfig {
                details: "store.retention_days must be > 0".to_string(),
            });
        }
        if self.store.prune_interval_minutes == 0 {
            return Err(DeckhandError::InvalidConfig {
                details: "store.prune_interval_minutes must be > 0".to_string(),
            });
        }

        if self.execution.refresh_timeout_seconds == 0 {
            return Err(DeckhandError::InvalidConfig {
                details: "execution.refresh_timeout_seconds must be > 0".to_string(),
            });
        }
        if self.execution.stdout_cap_bytes == 0 || self.execution.stderr_cap_bytes == 0 {
            return Err(DeckhandError::InvalidConfig {
                details: "execution output caps must be > 0".to_string(),
            });
        }

        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn set_env_u32(name: &str, slot: &mut u32) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw
            .parse::<u32>()
            .map_err(|error| DeckhandError::ConfigParse {
                context: "env",
                details: format!("{name}={raw:?}: {error}"),
            })?;
    }
    Ok(())
}

fn set_env_u64(name: &str, slot: &mut u64) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw
            .parse::<u64>()
            .map_err(|error| DeckhandError::ConfigParse {
                context: "env",
                details: format!("{name}={raw:?}: {error}"),
            })?;
    }
    Ok(())
}

fn set_env_usize(name: &str, slot: &mut usize) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw
            .parse::<usize>()
            .map_err(|error| DeckhandError::ConfigParse {
                context: "env",
                details: format!("{name}={raw:?}: {error}"),
            })?;
    }
    Ok(())
}

fn set_env_bool(name: &str, slot: &mut bool) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw
            .parse::<bool>()
            .map_err(|error| DeckhandError::ConfigParse {
                context: "env",
                details: format!("{name}={raw:?}: {error}"),
            })?;
    }
    Ok(())
}
