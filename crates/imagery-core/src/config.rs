//! ServiceConfig - 起動時に一度だけ読み込む設定
//!
//! 読み込み順（後勝ち）:
//! 1. 各フィールドのデフォルト値
//! 2. TOML ファイル（任意）
//! 3. 環境変数 `IMAGERY__<SECTION>__<FIELD>`（例: `IMAGERY__RETRY__ATTEMPTS=3`）
//!
//! 値は各コンポーネントの構築時に注入する。グローバルな可変状態は持たない。

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::app::KeyLayout;
use crate::domain::{DEFAULT_MAX_DIMENSION, ListingLimits, RetryStrategy};

const ENV_PREFIX: &str = "IMAGERY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub interval_secs: u64,
    pub stale_after_secs: u64,
    pub batch_limit: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            stale_after_secs: 600,
            batch_limit: 20,
        }
    }
}

impl RecoveryConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.stale_after_secs).unwrap_or(i64::MAX))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub retry: RetryStrategy,
    pub recovery: RecoveryConfig,
    pub keys: KeyLayout,
    pub listing: ListingLimits,
    /// Largest width or height intake accepts and the transformer produces.
    pub max_dimension: u32,
    pub log_filter: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            retry: RetryStrategy::default(),
            recovery: RecoveryConfig::default(),
            keys: KeyLayout::default(),
            listing: ListingLimits::default(),
            max_dimension: DEFAULT_MAX_DIMENSION,
            log_filter: "info".to_string(),
        }
    }
}

impl ServiceConfig {
    /// Load from an optional TOML file, then `IMAGERY__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }
        builder
            .add_source(environment())
            .build()?
            .try_deserialize()
    }

    /// Parse TOML text without consulting the environment.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}
