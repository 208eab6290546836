//! lline-sources — the outside world L-Line talks to: language icons and
//! per-user language statistics.

pub mod cache;
pub mod catalog;
pub mod icons;
pub mod stats;

pub use cache::{CachedStatsSource, StatsCache};
pub use icons::{CdnIconResolver, IconSourceConfig};
pub use stats::{GitHubConfig, GitHubStatsSource, LanguageStatsSource, StatsError};
