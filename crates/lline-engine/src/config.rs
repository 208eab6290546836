use lline_sources::{GitHubConfig, IconSourceConfig};
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Icon CDN prefix; icons live at `<base>/<name>/<name>-<variant>.<ext>`.
    pub icon_base_url: String,
    pub icon_extension: String,
    pub icon_variant: String,
    /// Where fetched icons are kept between runs. `None` disables the cache.
    pub icon_cache_dir: Option<PathBuf>,
    pub github_api_url: String,
    pub github_token: Option<String>,
    /// Pagination ceiling when listing repositories.
    pub stats_max_pages: u32,
    pub stats_per_page: u32,
    pub stats_cache_ttl_secs: u64,
    /// Marker diameter at the 500px reference resolution.
    pub marker_diameter: f32,
    pub jpeg_quality: u8,
    pub http_timeout_secs: u64,
}

impl Config {
    /// Load configuration from `LLINE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("LLINE_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| lline_core::default_model_dir());

        let icon_cache_dir = match std::env::var("LLINE_ICON_CACHE_DIR") {
            Ok(v) if v.is_empty() => None,
            Ok(v) => Some(PathBuf::from(v)),
            Err(_) => Some(default_cache_dir().join("icons")),
        };

        Self {
            model_dir,
            icon_base_url: env_string(
                "LLINE_ICON_BASE_URL",
                lline_sources::icons::DEFAULT_ICON_BASE_URL,
            ),
            icon_extension: env_string(
                "LLINE_ICON_EXTENSION",
                lline_sources::icons::DEFAULT_ICON_EXTENSION,
            ),
            icon_variant: env_string("LLINE_ICON_VARIANT", lline_sources::icons::DEFAULT_ICON_VARIANT),
            icon_cache_dir,
            github_api_url: env_string(
                "LLINE_GITHUB_API_URL",
                lline_sources::stats::DEFAULT_GITHUB_API_URL,
            ),
            github_token: std::env::var("LLINE_GITHUB_TOKEN").ok().filter(|t| !t.is_empty()),
            stats_max_pages: env_u32("LLINE_STATS_MAX_PAGES", lline_sources::stats::DEFAULT_MAX_PAGES),
            stats_per_page: env_u32("LLINE_STATS_PER_PAGE", lline_sources::stats::DEFAULT_PER_PAGE),
            stats_cache_ttl_secs: env_u64("LLINE_STATS_CACHE_TTL_SECS", 3600),
            marker_diameter: env_f32(
                "LLINE_MARKER_DIAMETER",
                lline_core::layout::DEFAULT_MARKER_DIAMETER,
            ),
            jpeg_quality: env_u8("LLINE_JPEG_QUALITY", lline_core::export::DEFAULT_JPEG_QUALITY),
            http_timeout_secs: env_u64("LLINE_HTTP_TIMEOUT_SECS", 15),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> String {
        self.model_dir
            .join("det_10g.onnx")
            .to_string_lossy()
            .into_owned()
    }

    pub fn icon_source(&self) -> IconSourceConfig {
        IconSourceConfig {
            base_url: self.icon_base_url.clone(),
            extension: self.icon_extension.clone(),
            default_variant: self.icon_variant.clone(),
            cache_dir: self.icon_cache_dir.clone(),
            timeout: Duration::from_secs(self.http_timeout_secs),
        }
    }

    pub fn github(&self) -> GitHubConfig {
        GitHubConfig {
            api_url: self.github_api_url.clone(),
            token: self.github_token.clone(),
            per_page: self.stats_per_page.max(1),
            max_pages: self.stats_max_pages.max(1),
            timeout: Duration::from_secs(self.http_timeout_secs),
        }
    }

    pub fn stats_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.stats_cache_ttl_secs)
    }
}

fn default_cache_dir() -> PathBuf {
    std::env::var("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".cache")
        })
        .join("lline")
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u8(key: &str, default: u8) -> u8 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
