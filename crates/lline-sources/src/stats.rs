//! Language usage statistics from a user's public GitHub repositories.

use async_trait::async_trait;
use lline_core::LanguageEntry;
use reqwest::Client;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
pub const DEFAULT_PER_PAGE: u32 = 100;
pub const DEFAULT_MAX_PAGES: u32 = 50;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatsError {
    #[error("username is required")]
    MissingUser,
    #[error("invalid GitHub username: {0:?}")]
    InvalidUser(String),
    #[error("GitHub request failed: {0}")]
    Request(String),
    #[error("GitHub API error: {status} {reason}")]
    Status { status: u16, reason: String },
    #[error("unexpected GitHub response: {0}")]
    Parse(String),
}

/// Supplies a user's language breakdown.
#[async_trait]
pub trait LanguageStatsSource: Send + Sync {
    async fn fetch(&self, user: &str) -> Result<Vec<LanguageEntry>, StatsError>;
}

/// The two repository fields the aggregation needs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RepoSummary {
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

impl RepoSummary {
    pub fn new(language: Option<&str>, size: u64) -> Self {
        Self {
            language: language.map(str::to_string),
            size: Some(size),
        }
    }

    /// Repository weight: its size, or 1 when GitHub reports none.
    fn weight(&self) -> u64 {
        match self.size {
            Some(0) | None => 1,
            Some(size) => size,
        }
    }
}

/// GitHub logins are ASCII letters, digits and hyphens; nothing else may
/// reach the request path.
pub fn validate_login(user: &str) -> Result<&str, StatsError> {
    let user = user.trim();
    if user.is_empty() {
        return Err(StatsError::MissingUser);
    }
    if !user.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(StatsError::InvalidUser(user.to_string()));
    }
    Ok(user)
}

/// "rust" -> "Rust". Only the first character changes.
pub fn display_name(identifier: &str) -> String {
    let mut chars = identifier.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Sum repository weights per language and convert to rounded percentages.
///
/// Repositories without a language are ignored entirely, so they do not
/// dilute the total. Languages keep the order they first appear in.
pub fn aggregate_languages(repos: &[RepoSummary]) -> Vec<LanguageEntry> {
    let mut totals: Vec<(String, u64)> = Vec::new();
    let mut grand_total: u64 = 0;

    for repo in repos {
        let Some(language) = repo.language.as_deref() else {
            continue;
        };
        let id = language.to_lowercase();
        let weight = repo.weight();
        grand_total += weight;
        match totals.iter_mut().find(|(known, _)| *known == id) {
            Some((_, sum)) => *sum += weight,
            None => totals.push((id, weight)),
        }
    }

    if grand_total == 0 {
        return Vec::new();
    }

    totals
        .into_iter()
        .map(|(id, sum)| {
            let percent = (sum as f64 / grand_total as f64 * 100.0).round() as f32;
            let name = display_name(&id);
            LanguageEntry::new(id, name, percent)
        })
        .collect()
}

/// Walk pages starting at 1 until a short page or the page ceiling.
pub async fn collect_pages<F, Fut>(
    per_page: u32,
    max_pages: u32,
    mut fetch_page: F,
) -> Result<Vec<RepoSummary>, StatsError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Vec<RepoSummary>, StatsError>>,
{
    let mut repos = Vec::new();
    for page in 1..=max_pages {
        let batch = fetch_page(page).await?;
        let short = (batch.len() as u32) < per_page;
        repos.extend(batch);
        if short {
            return Ok(repos);
        }
    }
    tracing::warn!(max_pages, "reached repository page limit, stopping pagination");
    Ok(repos)
}

#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub api_url: String,
    pub token: Option<String>,
    pub per_page: u32,
    pub max_pages: u32,
    pub timeout: Duration,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_GITHUB_API_URL.to_string(),
            token: None,
            per_page: DEFAULT_PER_PAGE,
            max_pages: DEFAULT_MAX_PAGES,
            timeout: Duration::from_secs(15),
        }
    }
}

pub struct GitHubStatsSource {
    client: Client,
    config: GitHubConfig,
}

impl GitHubStatsSource {
    pub fn new(config: GitHubConfig) -> Result<Self, StatsError> {
        let client = Client::builder()
            .user_agent(concat!("lline/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| StatsError::Request(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn repos_url(&self, user: &str) -> String {
        format!(
            "{}/users/{user}/repos",
            self.config.api_url.trim_end_matches('/')
        )
    }

    async fn fetch_page(&self, user: &str, page: u32) -> Result<Vec<RepoSummary>, StatsError> {
        let mut request = self
            .client
            .get(self.repos_url(user))
            .header("Accept", "application/vnd.github+json")
            .query(&[
                ("per_page", self.config.per_page.to_string()),
                ("page", page.to_string()),
                ("sort", "updated".to_string()),
            ]);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StatsError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StatsError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("").to_string(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| StatsError::Request(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| StatsError::Parse(e.to_string()))
    }
}

#[async_trait]
impl LanguageStatsSource for GitHubStatsSource {
    async fn fetch(&self, user: &str) -> Result<Vec<LanguageEntry>, StatsError> {
        let user = validate_login(user)?;

        tracing::info!(user, "fetching repositories from GitHub");
        let repos = collect_pages(self.config.per_page, self.config.max_pages, |page| {
            self.fetch_page(user, page)
        })
        .await?;

        let languages = aggregate_languages(&repos);
        tracing::info!(user, repos = repos.len(), languages = languages.len(), "language stats ready");
        Ok(languages)
    }
}
