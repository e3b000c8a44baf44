// src/discovery.rs

use crate::config::DiscoveryConfig;
use crate::error::{Error, Result};
use crate::model::Repository;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const GITHUB_API: &str = "https://api.github.com";
/// Upper bound on how long a quota-exhaustion wait may be
const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Deserialize)]
pub struct Owner {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryItem {
    pub full_name: String,
    pub name: String,
    pub html_url: String,
    pub owner: Owner,
}

impl From<&RepositoryItem> for Repository {
    fn from(item: &RepositoryItem) -> Self {
        Repository {
            full_name: item.full_name.clone(),
            owner: item.owner.login.clone(),
            name: item.name.clone(),
            url: item.html_url.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitItem {
    pub sha: String,
    pub repository: RepositoryItem,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchPage<T> {
    pub total_count: u64,
    pub items: Vec<T>,
}

/// A paged code-hosting search service
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search_repositories(&self, query: &str, page: u32, per_page: u32) -> Result<SearchPage<RepositoryItem>>;

    async fn search_commits(&self, query: &str, page: u32, per_page: u32) -> Result<SearchPage<CommitItem>>;
}

/// GitHub REST search. A quota-exhaustion response is waited out and retried
/// once; a second one in a row is returned as `Error::RateLimited`.
pub struct GitHubSearch {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl GitHubSearch {
    pub fn new(token: Option<String>) -> Result<Self> {
        Self::with_base_url(GITHUB_API, token)
    }

    pub fn with_base_url(base_url: &str, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str, query: &str, page: u32, per_page: u32) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let page = page.to_string();
        let per_page = per_page.to_string();
        let mut exhausted_once = false;
        loop {
            let mut request = self
                .client
                .get(&url)
                .query(&[("q", query), ("page", page.as_str()), ("per_page", per_page.as_str())])
                .header(USER_AGENT, concat!("fwk-miner/", env!("CARGO_PKG_VERSION")))
                .header(ACCEPT, "application/vnd.github+json");
            if let Some(token) = &self.token {
                request = request.header(AUTHORIZATION, format!("Bearer {}", token));
            }

            let response = request.send().await?;
            let status = response.status();
            if status.is_success() {
                return Ok(response.json().await?);
            }

            if let Some(wait) = quota_exhausted(status, response.headers()) {
                if exhausted_once {
                    return Err(Error::RateLimited { url, retry_after: wait });
                }
                exhausted_once = true;
                warn!(url = %url, wait_secs = wait.as_secs(), "Request quota exhausted, retrying once");
                tokio::time::sleep(wait).await;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(Error::Search(format!("{} returned {}: {}", url, status, body)));
        }
    }
}

#[async_trait]
impl SearchBackend for GitHubSearch {
    async fn search_repositories(&self, query: &str, page: u32, per_page: u32) -> Result<SearchPage<RepositoryItem>> {
        self.get("/search/repositories", query, page, per_page).await
    }

    async fn search_commits(&self, query: &str, page: u32, per_page: u32) -> Result<SearchPage<CommitItem>> {
        self.get("/search/commits", query, page, per_page).await
    }
}

/// Returns how long to wait when the response signals an exhausted quota.
fn quota_exhausted(status: StatusCode, headers: &HeaderMap) -> Option<Duration> {
    if status != StatusCode::FORBIDDEN && status != StatusCode::TOO_MANY_REQUESTS {
        return None;
    }
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
    };

    if let Some(secs) = header("retry-after") {
        return Some(Duration::from_secs(secs).min(MAX_RATE_LIMIT_WAIT));
    }
    if header("x-ratelimit-remaining") == Some(0) {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        let wait = header("x-ratelimit-reset")
            .map(|reset| reset.saturating_sub(now) + 1)
            .unwrap_or(60);
        return Some(Duration::from_secs(wait).min(MAX_RATE_LIMIT_WAIT));
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Some(Duration::from_secs(60));
    }
    None
}

/// Repositories matching the framework and language inside the star window,
/// deduplicated by full name. Errors end the search with what was collected.
pub async fn find_population(
    backend: &dyn SearchBackend,
    config: &DiscoveryConfig,
    framework: &str,
    language: &str,
) -> Vec<Repository> {
    let query = format!(
        "stars:{}..{} {} language:{}",
        config.min_stars, config.max_stars, framework, language
    );
    let mut seen = HashSet::new();
    let mut list = Vec::new();

    for page in 1..=config.population_pages.max(1) {
        match backend.search_repositories(&query, page, config.population_per_page).await {
            Ok(resp) => {
                if resp.items.is_empty() {
                    break;
                }
                for item in &resp.items {
                    if seen.insert(item.full_name.clone()) {
                        list.push(Repository::from(item));
                    }
                }
            }
            Err(e) => {
                error!(query = %query, page, "Repository search failed: {}", e);
                break;
            }
        }
    }

    info!("{} repositories found", list.len());
    list
}

/// Repositories containing commits authored by `email`, deduplicated by full
/// name and by commit hash, so a commit surfaced through several forks only
/// contributes its first repository.
pub async fn find_by_author(backend: &dyn SearchBackend, config: &DiscoveryConfig, email: &str) -> Vec<Repository> {
    info!(email, "Getting user repositories");
    let query = format!("author-email:{}", email);
    let mut items = Vec::new();

    let mut page = 1;
    while page <= config.commit_max_pages {
        match backend.search_commits(&query, page, config.commits_per_page).await {
            Ok(resp) => {
                let fetched = resp.items.len();
                items.extend(resp.items);
                if fetched == 0 || items.len() as u64 >= resp.total_count {
                    break;
                }
            }
            Err(e) => {
                error!(email, page, "Commit search failed: {}", e);
                break;
            }
        }
        page += 1;
    }

    let mut repos_seen = HashSet::new();
    let mut commits_seen = HashSet::new();
    let mut list = Vec::new();
    for item in &items {
        if repos_seen.contains(&item.repository.full_name) || commits_seen.contains(&item.sha) {
            continue;
        }
        commits_seen.insert(item.sha.clone());
        repos_seen.insert(item.repository.full_name.clone());
        list.push(Repository::from(&item.repository));
    }

    debug!(email, commits = items.len(), repositories = list.len(), "User repositories found");
    list
}
