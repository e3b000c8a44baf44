// src/pipeline.rs

use crate::adoption;
use crate::analyzer::{Deadline, Scanner};
use crate::clone::{CloneManager, Cloner};
use crate::config::{FrameworkDescriptor, Settings};
use crate::discovery::{self, SearchBackend};
use crate::error::{Error, Result};
use crate::metrics;
use crate::model::{AnalysisResult, CommandSummary, Repository, UserRecord, YearSummary};
use crate::store::ResultStore;
use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// What one repository contributed to a pass
#[derive(Debug)]
enum RepoOutcome {
    /// Could not be cloned or inspected
    Skipped,
    NotAdopted,
    /// Adopted; the per-user counters, or `None` when the scan failed
    Adopted(Option<Vec<UserRecord>>),
}

/// Framework-wide figures returned alongside one user's analysis
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameworkView {
    pub commands: Vec<CommandSummary>,
    pub average_coverage: f64,
    pub average_frequency: f64,
    pub average_loc: f64,
    pub years: BTreeMap<i32, YearSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserAnalysis {
    pub user: Option<UserRecord>,
    pub framework: FrameworkView,
}

pub struct Pipeline {
    settings: Settings,
    search: Arc<dyn SearchBackend>,
    clones: CloneManager,
    store: ResultStore,
}

impl Pipeline {
    pub fn new(settings: Settings, search: Arc<dyn SearchBackend>, cloner: Arc<dyn Cloner>) -> Self {
        let clones = CloneManager::new(cloner, settings.clone_retry.clone());
        let store = ResultStore::new(settings.data_dir.clone());
        Self {
            settings,
            search,
            clones,
            store,
        }
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// Population pass, then one pass per discovered contributor over the
    /// repositories they touched outside the population. The result is saved
    /// after every pass and sub-pass.
    pub async fn integrate(&self, descriptor: &FrameworkDescriptor) -> Result<AnalysisResult> {
        let started = Instant::now();
        let target = Arc::new(descriptor.clone());
        let framework = descriptor.framework.as_str();
        info!(framework, "Starting population pass");

        let repositories = discovery::find_population(
            self.search.as_ref(),
            &self.settings.discovery,
            framework,
            &descriptor.language,
        )
        .await;

        let mut result = AnalysisResult::new(framework);
        self.do_analysis(&target, &repositories, None, &mut HashSet::new(), &mut result)
            .await;
        result.repositories = repositories.clone();
        self.store.save(framework, &result).await?;
        info!(
            framework,
            adopting = result.repo_count,
            users = result.users.len(),
            elapsed = ?started.elapsed(),
            "Population pass finished"
        );

        info!(framework, "Starting per-user pass");
        let population_urls: HashSet<&str> = repositories.iter().map(|r| r.url.as_str()).collect();
        let emails: Vec<String> = result.users.iter().map(|u| u.email.clone()).collect();
        // contributors share side repositories; each adopting one counts once
        let mut counted = HashSet::new();
        for email in &emails {
            let pending: Vec<Repository> =
                discovery::find_by_author(self.search.as_ref(), &self.settings.discovery, email)
                    .await
                    .into_iter()
                    .filter(|r| !population_urls.contains(r.url.as_str()))
                    .collect();
            self.do_analysis(&target, &pending, Some(email.as_str()), &mut counted, &mut result)
                .await;
            self.store.save(framework, &result).await?;
        }
        info!(
            framework,
            adopting = result.users_repo_count,
            elapsed = ?started.elapsed(),
            "Per-user pass finished"
        );

        let mut result = metrics::finalize(result, &descriptor.commands);
        result.language = descriptor.language.clone();
        result.extensions = descriptor.extensions.clone();
        result.framework_file = descriptor.manifest_file.clone();
        self.store.save(framework, &result).await?;

        info!(framework, elapsed = ?started.elapsed(), "Integration finished");
        Ok(result)
    }

    /// Analyzes the repositories of `email` that the stored population did not
    /// cover, and returns them next to the stored framework-wide figures.
    /// Nothing is persisted.
    pub async fn analyze_user(&self, framework: &str, email: &str) -> Result<UserAnalysis> {
        let started = Instant::now();
        info!(framework, email, "Analyzing user");

        let prior = self
            .store
            .load(framework)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no stored result for framework `{}`", framework)))?;
        let descriptor = FrameworkDescriptor {
            framework: framework.to_string(),
            language: prior.language.clone(),
            commands: prior.commands.iter().map(|c| c.command.clone()).collect(),
            extensions: prior.extensions.clone(),
            manifest_file: prior.framework_file.clone(),
        }
        .validated()?;

        let known: HashSet<&str> = prior.repositories.iter().map(|r| r.url.as_str()).collect();
        let pending: Vec<Repository> = discovery::find_by_author(self.search.as_ref(), &self.settings.discovery, email)
            .await
            .into_iter()
            .filter(|r| !known.contains(r.url.as_str()))
            .collect();

        let target = Arc::new(descriptor);
        let mut result = AnalysisResult::new(framework);
        self.do_analysis(&target, &pending, Some(email), &mut HashSet::new(), &mut result)
            .await;
        let result = metrics::finalize(result, &target.commands);

        info!(framework, email, elapsed = ?started.elapsed(), "User analyzed");
        Ok(UserAnalysis {
            user: result.user(email).cloned(),
            framework: FrameworkView {
                commands: prior.commands,
                average_coverage: prior.average_coverage,
                average_frequency: prior.average_frequency,
                average_loc: prior.average_loc,
                years: prior.years,
            },
        })
    }

    /// Runs every repository through clone, adoption check, scan and cleanup,
    /// folding the outcomes into `result` one at a time. An adopting repository
    /// bumps the pass's repository counter only the first time its full name
    /// enters `counted`.
    async fn do_analysis(
        &self,
        target: &Arc<FrameworkDescriptor>,
        repositories: &[Repository],
        author: Option<&str>,
        counted: &mut HashSet<String>,
        result: &mut AnalysisResult,
    ) {
        if repositories.is_empty() {
            return;
        }
        let bar = ProgressBar::new(repositories.len() as u64);
        bar.set_message(match author {
            Some(email) => format!("Analyzing repositories of {}", email),
            None => "Analyzing repositories".to_string(),
        });

        let mut outcomes = stream::iter(repositories)
            .map(|repo| async move { (repo, self.process_repository(target, repo, author).await) })
            .buffer_unordered(self.settings.concurrency.max(1));

        while let Some((repo, outcome)) = outcomes.next().await {
            match outcome {
                RepoOutcome::Skipped => {}
                RepoOutcome::NotAdopted => {
                    info!(repo = %repo.full_name, "Framework not adopted, skipping");
                }
                RepoOutcome::Adopted(users) => {
                    if counted.insert(repo.full_name.clone()) {
                        if author.is_some() {
                            result.users_repo_count += 1;
                        } else {
                            result.repo_count += 1;
                        }
                    }
                    if let Some(users) = users {
                        result.absorb(users);
                        if let Some(email) = author {
                            if let Some(user) = result.user_mut(email) {
                                user.repo_count += 1;
                            }
                        }
                    }
                }
            }
            bar.inc(1);
        }
        bar.finish_with_message("Repositories analyzed");
    }

    async fn process_repository(
        &self,
        target: &Arc<FrameworkDescriptor>,
        repo: &Repository,
        author: Option<&str>,
    ) -> RepoOutcome {
        let path = self.settings.scratch_path(&target.framework, &repo.owner, &repo.name);
        let scratch = match self.clones.acquire(&repo.url, &path).await {
            Ok(scratch) => scratch,
            Err(e) => {
                warn!(repo = %repo.full_name, "Skipping repository: {}", e);
                return RepoOutcome::Skipped;
            }
        };

        info!(repo = %repo.full_name, "Analyzing repository");
        let target = Arc::clone(target);
        let author = author.map(str::to_string);
        let deadline = Deadline::after(self.settings.scan_budget);
        let full_name = repo.full_name.clone();

        // the scratch clone moves into the worker and is deleted once the
        // read phase there is over, whatever happened
        let outcome = tokio::task::spawn_blocking(move || {
            let path = scratch.path();
            if !adoption::adopts(path, &target.manifest_file, &target.framework, Some(deadline)) {
                return RepoOutcome::NotAdopted;
            }
            let scanner = Scanner {
                commands: &target.commands,
                extensions: &target.extensions,
                author: author.as_deref(),
                deadline: Some(deadline),
            };
            match scanner.scan(path) {
                Ok(tally) => RepoOutcome::Adopted(Some(tally.into_users())),
                Err(e) => {
                    error!(repo = %full_name, "Scan failed: {}", e);
                    RepoOutcome::Adopted(None)
                }
            }
        })
        .await;

        outcome.unwrap_or_else(|e| {
            error!(repo = %repo.full_name, "Repository worker failed: {}", e);
            RepoOutcome::Skipped
        })
    }
}
