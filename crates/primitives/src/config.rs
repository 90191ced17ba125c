//! Typed configuration surface (§6, §10 of SPEC_FULL.md).
//!
//! This crate does not parse configuration files or CLI flags — that is
//! explicitly out of scope. These structs describe the shape a caller is
//! expected to supply, already parsed, mirroring `calimero-network`'s
//! `NetworkConfig` (populated by a separate binary crate, not the library).

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    #[default]
    Full,
    Crawler,
    Search,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub struct NodeConfig {
    pub role: NodeRole,
    pub data_dir: String,
    pub listen_address: String,
    pub listen_port: u16,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[non_exhaustive]
pub struct NetworkConfig {
    #[serde(default)]
    pub bootstrap_nodes: Vec<String>,
    #[serde(default)]
    pub peer_acl: Vec<String>,
    #[serde(default)]
    pub index_submit_peers: Vec<String>,
    #[serde(default = "default_replication_factor")]
    pub replication_factor: usize,
    #[serde(default = "default_subnet_max_per_bucket")]
    pub subnet_max_per_bucket: usize,
    #[serde(default)]
    pub upload_limit_mbps: f64,
    #[serde(default)]
    pub download_limit_mbps: f64,
}

const fn default_replication_factor() -> usize {
    3
}

const fn default_subnet_max_per_bucket() -> usize {
    3
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub struct CrawlConfig {
    pub user_agent: String,
    #[serde(default = "default_politeness_delay", with = "duration_secs")]
    pub politeness_delay: Duration,
    #[serde(default)]
    pub urls_per_hour: u32,
    #[serde(default = "default_pending_per_domain")]
    pub pending_per_domain: usize,
    #[serde(default)]
    pub max_depth: u32,
    #[serde(default = "crate::config::bool_true")]
    pub respect_robots: bool,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

const fn default_politeness_delay() -> Duration {
    Duration::from_secs(1)
}

const fn default_pending_per_domain() -> usize {
    100
}

const fn default_max_concurrent() -> usize {
    8
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            user_agent: "InfoMeshBot/1.0".to_owned(),
            politeness_delay: default_politeness_delay(),
            urls_per_hour: 0,
            pending_per_domain: default_pending_per_domain(),
            max_depth: 0,
            respect_robots: true,
            max_concurrent: default_max_concurrent(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FtsTokenizer {
    #[default]
    Unicode61,
    Ascii,
    Porter,
    Trigram,
}

impl FtsTokenizer {
    #[must_use]
    pub const fn as_sql_name(self) -> &'static str {
        match self {
            Self::Unicode61 => "unicode61",
            Self::Ascii => "ascii",
            Self::Porter => "porter",
            Self::Trigram => "trigram",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub struct IndexConfig {
    pub db_path: String,
    #[serde(default)]
    pub fts_tokenizer: FtsTokenizer,
    #[serde(default)]
    pub vector_search: bool,
    #[serde(default)]
    pub embedding_model: Option<String>,
    #[serde(default = "default_max_doc_size_kb")]
    pub max_doc_size_kb: usize,
}

const fn default_max_doc_size_kb() -> usize {
    10 * 1024
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            db_path: "index.db".to_owned(),
            fts_tokenizer: FtsTokenizer::default(),
            vector_search: false,
            embedding_model: None,
            max_doc_size_kb: default_max_doc_size_kb(),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub struct StorageConfig {
    #[serde(default)]
    pub compression_enabled: bool,
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,
    #[serde(default = "default_cache_ttl_days")]
    pub cache_ttl_days: u32,
}

const fn default_compression_level() -> i32 {
    3
}

const fn default_cache_ttl_days() -> u32 {
    30
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            compression_enabled: false,
            compression_level: default_compression_level(),
            cache_ttl_days: default_cache_ttl_days(),
        }
    }
}

#[must_use]
pub const fn bool_true() -> bool {
    true
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        value.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}
