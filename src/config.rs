//! Layered configuration for the engine.
//!
//! Sources, lowest priority first:
//! - built-in defaults
//! - TOML file (`.codescout/settings.toml`, discovered by ancestor walk)
//! - environment variables prefixed `CS_`, with `__` separating nesting:
//!   `CS_BATCH__SIZE=200` sets `batch.size`.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(default)]
    pub query_cache: QueryCacheConfig,

    #[serde(default)]
    pub memory_limits: MemoryLimitsConfig,

    #[serde(default)]
    pub indexing: IndexingConfig,

    #[serde(default)]
    pub watcher: WatcherConfig,

    #[serde(default)]
    pub fusion: FusionConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub extractor: ExtractorConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexConfig {
    /// Base directory holding registry.json, per-workspace indexes, and the
    /// memory-store indexes.
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,

    /// Writer locks older than this are considered stuck and recovered.
    #[serde(default = "default_lock_timeout_minutes")]
    pub lock_timeout_minutes: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BatchConfig {
    /// Pending-document count that triggers a background flush.
    #[serde(default = "default_batch_size")]
    pub size: usize,

    /// Buffers older than this are flushed by the periodic timer.
    #[serde(default = "default_max_age_seconds")]
    pub max_age_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct QueryCacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_cache_mb")]
    pub max_size_mb: usize,

    /// Sliding expiration window.
    #[serde(default = "default_cache_ttl_minutes")]
    pub ttl_minutes: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MemoryLimitsConfig {
    /// System memory percentage above which pressure levels kick in.
    #[serde(default = "default_max_usage_percent")]
    pub max_usage_percent: f32,

    #[serde(default = "default_concurrency")]
    pub max_indexing_concurrency: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexingConfig {
    /// Files larger than this are skipped with a warning.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Glob patterns excluded from walking and watching.
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,

    /// Extensions considered source files, mapped to a language tag.
    #[serde(default = "default_extensions")]
    pub extensions: HashMap<String, String>,

    /// Skip re-indexing when the index was written within the last hour and
    /// no watcher delta is pending.
    #[serde(default = "default_true")]
    pub skip_if_fresh: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatcherConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Coalescing window for filesystem events on the same path.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FusionConfig {
    /// "linear", "rrf", or "multiplicative".
    #[serde(default = "default_fusion_strategy")]
    pub strategy: String,

    #[serde(default = "default_lexical_weight")]
    pub lexical_weight: f32,

    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f32,

    /// Multiplier applied when a document appears in both tiers.
    #[serde(default = "default_both_found_boost")]
    pub both_found_boost: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct EmbeddingConfig {
    /// HTTP endpoint of the embedding provider. None disables semantic search.
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    #[serde(default = "default_embed_batch")]
    pub batch_size: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ExtractorConfig {
    /// Command line of the external symbol extractor. The file path is
    /// appended as the last argument. None disables symbol extraction.
    #[serde(default)]
    pub command: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level filter ("error", "warn", "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module overrides, e.g. `watcher = "debug"`.
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_base_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("codescout")
}
fn default_lock_timeout_minutes() -> u64 {
    15
}
fn default_batch_size() -> usize {
    500
}
fn default_max_age_seconds() -> u64 {
    30
}
fn default_cache_mb() -> usize {
    100
}
fn default_cache_ttl_minutes() -> u64 {
    15
}
fn default_max_usage_percent() -> f32 {
    75.0
}
fn default_concurrency() -> usize {
    num_cpus::get()
}
fn default_max_file_size() -> u64 {
    2 * 1024 * 1024
}
fn default_debounce_ms() -> u64 {
    100
}
fn default_fusion_strategy() -> String {
    "linear".to_string()
}
fn default_lexical_weight() -> f32 {
    0.5
}
fn default_semantic_weight() -> f32 {
    0.5
}
fn default_both_found_boost() -> f32 {
    1.2
}
fn default_dimensions() -> usize {
    384
}
fn default_embed_batch() -> usize {
    32
}
fn default_log_level() -> String {
    "warn".to_string()
}
fn default_true() -> bool {
    true
}

fn default_ignore_patterns() -> Vec<String> {
    vec![
        "target/**".to_string(),
        "node_modules/**".to_string(),
        ".git/**".to_string(),
        "bin/**".to_string(),
        "obj/**".to_string(),
        "*.min.js".to_string(),
    ]
}

fn default_extensions() -> HashMap<String, String> {
    let mut map = HashMap::new();
    for (ext, lang) in [
        ("rs", "rust"),
        ("py", "python"),
        ("js", "javascript"),
        ("jsx", "javascript"),
        ("ts", "typescript"),
        ("tsx", "typescript"),
        ("go", "go"),
        ("java", "java"),
        ("cs", "csharp"),
        ("c", "c"),
        ("h", "c"),
        ("cpp", "cpp"),
        ("hpp", "cpp"),
        ("md", "markdown"),
        ("txt", "text"),
        ("json", "json"),
        ("toml", "toml"),
        ("yaml", "yaml"),
        ("yml", "yaml"),
    ] {
        map.insert(ext.to_string(), lang.to_string());
    }
    map
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            index: IndexConfig::default(),
            batch: BatchConfig::default(),
            query_cache: QueryCacheConfig::default(),
            memory_limits: MemoryLimitsConfig::default(),
            indexing: IndexingConfig::default(),
            watcher: WatcherConfig::default(),
            fusion: FusionConfig::default(),
            embedding: EmbeddingConfig::default(),
            extractor: ExtractorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
            lock_timeout_minutes: default_lock_timeout_minutes(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            size: default_batch_size(),
            max_age_seconds: default_max_age_seconds(),
        }
    }
}

impl Default for QueryCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size_mb: default_cache_mb(),
            ttl_minutes: default_cache_ttl_minutes(),
        }
    }
}

impl Default for MemoryLimitsConfig {
    fn default() -> Self {
        Self {
            max_usage_percent: default_max_usage_percent(),
            max_indexing_concurrency: default_concurrency(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            ignore_patterns: default_ignore_patterns(),
            extensions: default_extensions(),
            skip_if_fresh: true,
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            strategy: default_fusion_strategy(),
            lexical_weight: default_lexical_weight(),
            semantic_weight: default_semantic_weight(),
            both_found_boost: default_both_found_boost(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, figment::Error> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(".codescout/settings.toml"));

        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("CS_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
    }

    /// Load configuration from a specific file (tests, CLI override).
    pub fn load_from(path: impl AsRef<std::path::Path>) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("CS_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
    }

    /// Walk ancestors for a `.codescout` directory.
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;
        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(".codescout");
            if config_dir.is_dir() {
                return Some(config_dir.join("settings.toml"));
            }
        }
        None
    }

    /// Save current configuration to file.
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Create a default settings file in the current directory.
    pub fn init_config_file(force: bool) -> anyhow::Result<PathBuf> {
        let config_path = PathBuf::from(".codescout/settings.toml");
        if !force && config_path.exists() {
            anyhow::bail!("configuration file already exists; use --force to overwrite");
        }
        Settings::default().save(&config_path)?;
        Ok(config_path)
    }

    pub fn lock_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.index.lock_timeout_minutes * 60)
    }

    pub fn max_batch_age(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.batch.max_age_seconds)
    }

    pub fn cache_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.query_cache.ttl_minutes * 60)
    }
}
