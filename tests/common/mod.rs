//! Shared fixtures for pipeline integration tests

use async_trait::async_trait;
use fwk_miner::discovery::{CommitItem, Owner, RepositoryItem, SearchBackend, SearchPage};
use fwk_miner::Result;
use std::collections::HashMap;

#[allow(dead_code)]
#[path = "../../src/test_repo.rs"]
mod test_repo;

pub use test_repo::{TestRepo, MARCH_2021};

/// A repository standing in for a remote; its directory is the clone URL.
pub struct Remote {
    pub full_name: String,
    pub repo: TestRepo,
}

impl Remote {
    pub fn new(full_name: &str) -> Self {
        Self {
            full_name: full_name.to_string(),
            repo: TestRepo::new(),
        }
    }

    pub fn url(&self) -> String {
        self.repo.path().to_string_lossy().into_owned()
    }

    pub fn commit(&self, email: &str, timestamp: i64, files: &[(&str, &str)]) -> &Self {
        self.repo.commit(email, timestamp, files);
        self
    }

    pub fn item(&self) -> RepositoryItem {
        let (owner, name) = self.full_name.split_once('/').unwrap();
        RepositoryItem {
            full_name: self.full_name.clone(),
            name: name.to_string(),
            html_url: self.url(),
            owner: Owner {
                login: owner.to_string(),
            },
        }
    }
}

/// Serves fixed search results: one population page, commits per author email.
#[derive(Default)]
pub struct FakeSearch {
    pub population: Vec<RepositoryItem>,
    pub commits_by_email: HashMap<String, Vec<CommitItem>>,
}

#[async_trait]
impl SearchBackend for FakeSearch {
    async fn search_repositories(&self, _query: &str, page: u32, _per_page: u32) -> Result<SearchPage<RepositoryItem>> {
        let items = if page == 1 { self.population.clone() } else { Vec::new() };
        Ok(SearchPage {
            total_count: self.population.len() as u64,
            items,
        })
    }

    async fn search_commits(&self, query: &str, page: u32, _per_page: u32) -> Result<SearchPage<CommitItem>> {
        let email = query.trim_start_matches("author-email:");
        let all = self.commits_by_email.get(email).cloned().unwrap_or_default();
        let items = if page == 1 { all.clone() } else { Vec::new() };
        Ok(SearchPage {
            total_count: all.len() as u64,
            items,
        })
    }
}

pub fn commit_item(sha: &str, remote: &Remote) -> CommitItem {
    CommitItem {
        sha: sha.to_string(),
        repository: remote.item(),
    }
}
