//! Data-root resolution and optional `config.toml` tunables.
//!
//! Every field is optional. Getters apply the default and a floor so that a
//! zero or tiny value in the file cannot wedge the index writer or the sweep.

use crate::error::{Result, StoreError};
use crate::index::retry::Backoff;
use crate::model::{default_ttl, parse_ttl};
use crate::paths::StoragePaths;
use chrono::TimeDelta;
use dirs_next::home_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the data root.
pub const HOME_ENV: &str = "KEEPSAKE_HOME";

const DEFAULT_WRITER_MEMORY_MB: usize = 50;
/// The engine refuses writer budgets below 15 MB.
const MIN_WRITER_MEMORY_MB: usize = 15;
/// Stays under the engine's per-thread ceiling of just below 4 GiB.
const MAX_WRITER_MEMORY_MB: usize = 4_000;
const DEFAULT_MAX_WRITE_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 100;
const DEFAULT_RETRY_MAX_JITTER_MS: u64 = 100;
const DEFAULT_STALE_LOCK_SECS: u64 = 300;
const DEFAULT_FRAGMENT_MAX_CHARS: usize = 200;
const MIN_FRAGMENT_MAX_CHARS: usize = 20;
const DEFAULT_FRAGMENT_SURROUND_CHARS: usize = 50;

/// Contents of `<root>/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct KeepsakeConfig {
    /// TTL applied by callers that do not pick one, e.g. `"7d"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_ttl: Option<String>,

    #[serde(default)]
    pub index: IndexSettings,
}

impl KeepsakeConfig {
    /// Load `config.toml` from `root`. A missing file yields the defaults; a
    /// file that does not parse is an error.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.to_path_buf().config_file();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)?;
        toml::from_str(&content).map_err(|e| StoreError::Config {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    pub fn default_ttl(&self) -> TimeDelta {
        self.default_ttl
            .as_deref()
            .map(parse_ttl)
            .unwrap_or_else(default_ttl)
    }
}

/// `[index]` table.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct IndexSettings {
    /// Writer heap budget in megabytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub writer_memory_mb: Option<usize>,

    /// Total writer attempts on lock contention, including the first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_write_attempts: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_base_delay_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_max_jitter_ms: Option<u64>,

    /// Lock markers older than this belong to a crashed writer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale_lock_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fragment_max_chars: Option<usize>,

    /// Context kept on each side of the highlighted terms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fragment_surround_chars: Option<usize>,
}

impl IndexSettings {
    /// Writer budget in bytes, clamped to what a single-threaded writer
    /// accepts (15 MB to 4000 MB).
    #[inline]
    pub fn writer_memory_bytes(&self) -> usize {
        self.writer_memory_mb
            .unwrap_or(DEFAULT_WRITER_MEMORY_MB)
            .clamp(MIN_WRITER_MEMORY_MB, MAX_WRITER_MEMORY_MB)
            .saturating_mul(1_000_000)
    }

    /// Retry policy for writer contention. At least one attempt.
    pub fn backoff(&self) -> Backoff {
        Backoff {
            max_attempts: self
                .max_write_attempts
                .unwrap_or(DEFAULT_MAX_WRITE_ATTEMPTS)
                .max(1),
            base_delay: Duration::from_millis(
                self.retry_base_delay_ms
                    .unwrap_or(DEFAULT_RETRY_BASE_DELAY_MS),
            ),
            max_jitter: Duration::from_millis(
                self.retry_max_jitter_ms
                    .unwrap_or(DEFAULT_RETRY_MAX_JITTER_MS),
            ),
        }
    }

    /// Age after which a lock marker is considered stale. Minimum 1 second.
    #[inline]
    pub fn stale_lock_age(&self) -> Duration {
        Duration::from_secs(
            self.stale_lock_secs
                .unwrap_or(DEFAULT_STALE_LOCK_SECS)
                .max(1),
        )
    }

    #[inline]
    pub fn fragment_max_chars(&self) -> usize {
        self.fragment_max_chars
            .unwrap_or(DEFAULT_FRAGMENT_MAX_CHARS)
            .max(MIN_FRAGMENT_MAX_CHARS)
    }

    #[inline]
    pub fn fragment_surround_chars(&self) -> usize {
        self.fragment_surround_chars
            .unwrap_or(DEFAULT_FRAGMENT_SURROUND_CHARS)
    }
}

/// Resolve the data root and make sure it exists.
///
/// Precedence:
/// 1. `home_override` (from `--home`)
/// 2. `KEEPSAKE_HOME` environment variable
/// 3. `~/.keepsake`
pub fn resolve_home(home_override: Option<PathBuf>) -> Result<PathBuf> {
    let root = if let Some(path) = home_override {
        path
    } else if let Ok(home) = std::env::var(HOME_ENV)
        && !home.trim().is_empty()
    {
        PathBuf::from(home)
    } else {
        let home = home_dir().ok_or_else(|| {
            StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Home directory not found",
            ))
        })?;
        home.join(".keepsake")
    };
    fs::create_dir_all(&root)?;
    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = IndexSettings::default();
        assert_eq!(settings.writer_memory_bytes(), 50_000_000);
        assert_eq!(settings.backoff(), Backoff::default());
        assert_eq!(settings.stale_lock_age(), Duration::from_secs(300));
        assert_eq!(settings.fragment_max_chars(), 200);
        assert_eq!(settings.fragment_surround_chars(), 50);
        assert_eq!(KeepsakeConfig::default().default_ttl(), TimeDelta::days(7));
    }

    #[test]
    fn test_huge_writer_budget_is_clamped() {
        let settings = IndexSettings {
            writer_memory_mb: Some(usize::MAX),
            ..Default::default()
        };
        assert_eq!(settings.writer_memory_bytes(), 4_000_000_000);
    }

    #[test]
    fn test_minimums_enforced() {
        let settings = IndexSettings {
            writer_memory_mb: Some(1),
            max_write_attempts: Some(0),
            stale_lock_secs: Some(0),
            fragment_max_chars: Some(3),
            ..Default::default()
        };
        assert_eq!(settings.writer_memory_bytes(), 15_000_000);
        assert_eq!(settings.backoff().max_attempts, 1);
        assert_eq!(settings.stale_lock_age(), Duration::from_secs(1));
        assert_eq!(settings.fragment_max_chars(), 20);
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        assert_eq!(KeepsakeConfig::load(dir.path()).unwrap(), KeepsakeConfig::default());
    }

    #[test]
    fn test_load_partial_file() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("config.toml"),
            "default_ttl = \"2h\"\n\n[index]\nmax_write_attempts = 5\n",
        )
        .unwrap();

        let config = KeepsakeConfig::load(dir.path()).unwrap();
        assert_eq!(config.default_ttl(), TimeDelta::hours(2));
        assert_eq!(config.index.backoff().max_attempts, 5);
        assert_eq!(config.index.stale_lock_age(), Duration::from_secs(300));
    }

    #[test]
    fn test_load_invalid_file_is_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("config.toml"), "[index\nbroken").unwrap();
        let err = KeepsakeConfig::load(dir.path()).unwrap_err();
        assert!(matches!(err, StoreError::Config { .. }));
    }

    #[test]
    fn test_unknown_key_is_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("config.toml"), "[index]\nwriter_heap = 10\n").unwrap();
        assert!(KeepsakeConfig::load(dir.path()).is_err());
    }

    #[test]
    #[serial]
    fn test_resolve_home_precedence() {
        let env_dir = TempDir::new().unwrap();
        let override_dir = TempDir::new().unwrap();
        let env_root = env_dir.path().join("from-env");
        let override_root = override_dir.path().join("from-flag");

        // SAFETY: serialized with other env-mutating tests
        unsafe { std::env::set_var(HOME_ENV, &env_root) };
        assert_eq!(resolve_home(None).unwrap(), env_root);
        assert!(env_root.is_dir());
        assert_eq!(resolve_home(Some(override_root.clone())).unwrap(), override_root);
        unsafe { std::env::remove_var(HOME_ENV) };
    }
}
