use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub pool: PoolConfig,

    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchConfig {
    /// Upper bound on a whole request, including the body (default: 15)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Upper bound on establishing the connection (default: 10)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Largest response body read into memory (default: 32 MiB)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: u64,

    /// Largest decoded width or height; 0 disables the check (default: 16384)
    #[serde(default = "default_max_image_dimension")]
    pub max_image_dimension: u32,

    /// Pixel budget across all frames of one image; 0 disables the check
    /// (default: 100 million)
    #[serde(default = "default_max_decoded_pixels")]
    pub max_decoded_pixels: u64,
}

fn default_timeout() -> u64 {
    15
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_user_agent() -> String {
    format!("mediafetch/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_body_bytes() -> u64 {
    32 * 1024 * 1024
}

fn default_max_image_dimension() -> u32 {
    16_384
}

fn default_max_decoded_pixels() -> u64 {
    100_000_000
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            user_agent: default_user_agent(),
            max_body_bytes: default_max_body_bytes(),
            max_image_dimension: default_max_image_dimension(),
            max_decoded_pixels: default_max_decoded_pixels(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PoolConfig {
    /// Lower bound on worker count, whatever the hardware reports
    #[serde(default = "default_min_workers")]
    pub min_workers: usize,

    /// Explicit worker count; defaults to the number of CPUs
    #[serde(default)]
    pub workers: Option<usize>,

    /// Jobs that may wait for a worker before submitters run them inline
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

fn default_min_workers() -> usize {
    2
}

fn default_queue_depth() -> usize {
    100
}

impl PoolConfig {
    /// Effective number of workers.
    pub fn worker_count(&self) -> usize {
        self.workers
            .unwrap_or_else(num_cpus::get)
            .max(self.min_workers)
            .max(1)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_workers: default_min_workers(),
            workers: None,
            queue_depth: default_queue_depth(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResolverConfig {
    /// How long matched resolutions are reused (default: 10)
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,

    /// Base directory for `water://temp/`; the platform temp dir if unset
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,

    /// Base directory for `water://local/`; the working directory if unset
    #[serde(default)]
    pub local_dir: Option<PathBuf>,
}

fn default_ttl() -> u64 {
    10
}

impl ResolverConfig {
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl(),
            temp_dir: None,
            local_dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Directory for persisted fetch cache entries; in-memory when unset
    #[serde(default)]
    pub dir: Option<PathBuf>,
}
