// src/analyzer.rs

use crate::error::{Error, Result};
use crate::model::UserRecord;
use chrono::{DateTime, Datelike, FixedOffset, Utc};
use git2::{Commit, Diff, DiffOptions, Patch, Repository};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::debug;

/// Per-user counters gathered from one repository, folded into the shared
/// result afterwards by the single writer.
#[derive(Debug, Default)]
pub struct RepoTally {
    users: Vec<UserRecord>,
    index: HashMap<String, usize>,
    pub commits_scanned: usize,
}

impl RepoTally {
    fn user(&mut self, email: &str) -> &mut UserRecord {
        let idx = match self.index.get(email) {
            Some(&idx) => idx,
            None => {
                self.users.push(UserRecord::new(email));
                self.index.insert(email.to_string(), self.users.len() - 1);
                self.users.len() - 1
            }
        };
        &mut self.users[idx]
    }

    pub fn get(&self, email: &str) -> Option<&UserRecord> {
        self.index.get(email).map(|&idx| &self.users[idx])
    }

    pub fn into_users(self) -> Vec<UserRecord> {
        self.users
    }
}

/// Wall-clock allowance for inspecting one repository
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    pub fn check(&self, repo_path: &Path) -> Result<()> {
        if self.started.elapsed() >= self.budget {
            return Err(Error::ScanBudgetExceeded {
                path: repo_path.to_path_buf(),
                budget: self.budget,
            });
        }
        Ok(())
    }
}

/// Trimmed lines a merge commit added relative to every one of its parents,
/// keyed by path
type MergeLines = HashMap<String, HashSet<String>>;

/// Walks a repository's history and counts tracked commands in added lines.
pub struct Scanner<'a> {
    pub commands: &'a [String],
    pub extensions: &'a [String],
    /// Only commits authored by this exact email are scanned
    pub author: Option<&'a str>,
    pub deadline: Option<Deadline>,
}

impl<'a> Scanner<'a> {
    pub fn scan(&self, repo_path: &Path) -> Result<RepoTally> {
        let repo = Repository::open(repo_path)?;
        debug!(path = %repo_path.display(), author = ?self.author, "Scanning history");
        let started = Instant::now();

        let mut revwalk = repo.revwalk()?;
        revwalk.push_head()?;
        revwalk.set_sorting(git2::Sort::TIME)?;

        let mut tally = RepoTally::default();
        for oid in revwalk {
            if let Some(deadline) = &self.deadline {
                deadline.check(repo_path)?;
            }

            let commit = repo.find_commit(oid?)?;
            let author = commit.author();
            let email = String::from_utf8_lossy(author.email_bytes()).into_owned();
            if let Some(wanted) = self.author {
                if email != wanted {
                    continue;
                }
            }
            let (year, month) = year_month(&author.when());

            let diff = commit_diff(&repo, &commit, None)?;
            if commit.parent_count() > 1 {
                // the merged branches' own commits are walked too; only what
                // the merge itself wrote counts here
                let own = self.merge_lines(&repo, &commit)?;
                self.scan_diff(&diff, Some(&own), &email, year, month, &mut tally)?;
            } else {
                self.scan_diff(&diff, None, &email, year, month, &mut tally)?;
            }
            tally.commits_scanned += 1;
        }

        debug!(
            path = %repo_path.display(),
            commits = tally.commits_scanned,
            users = tally.users.len(),
            elapsed = ?started.elapsed(),
            "Scan complete"
        );
        Ok(tally)
    }

    /// Lines of tracked files that `merge` added against each of its parents.
    fn merge_lines(&self, repo: &Repository, merge: &Commit) -> Result<MergeLines> {
        let mut common: Option<MergeLines> = None;
        for parent in 1..merge.parent_count() {
            let diff = diff_against(repo, merge, Some(parent), None)?;
            let mut added = MergeLines::new();
            self.for_each_tracked_patch(&diff, |path, patch| {
                let lines = added.entry(path.to_string()).or_default();
                for hunk in 0..patch.num_hunks() {
                    for line_idx in 0..patch.num_lines_in_hunk(hunk)? {
                        let line = patch.line_in_hunk(hunk, line_idx)?;
                        if line.origin() == '+' {
                            lines.insert(String::from_utf8_lossy(line.content()).trim().to_string());
                        }
                    }
                }
                Ok(())
            })?;

            common = Some(match common {
                None => added,
                Some(mut acc) => {
                    acc.retain(|path, lines| match added.get(path) {
                        Some(theirs) => {
                            lines.retain(|l| theirs.contains(l));
                            true
                        }
                        None => false,
                    });
                    acc
                }
            });
        }
        Ok(common.unwrap_or_default())
    }

    /// Counts command hits in added lines. For a merge (`own` given) only the
    /// merge's own lines count, and they are also its size; otherwise every
    /// line of a hunk counts towards the size.
    fn scan_diff(
        &self,
        diff: &Diff,
        own: Option<&MergeLines>,
        email: &str,
        year: i32,
        month: u32,
        tally: &mut RepoTally,
    ) -> Result<()> {
        self.for_each_tracked_patch(diff, |path, patch| {
            let own_lines = match own {
                Some(own) => match own.get(path) {
                    Some(lines) => Some(lines),
                    None => return Ok(()),
                },
                None => None,
            };

            for hunk in 0..patch.num_hunks() {
                let line_count = patch.num_lines_in_hunk(hunk)?;
                let mut kept = 0u64;
                for line_idx in 0..line_count {
                    let line = patch.line_in_hunk(hunk, line_idx)?;
                    if line.origin() != '+' {
                        continue;
                    }
                    let content = String::from_utf8_lossy(line.content());
                    let code = content.trim();
                    if own_lines.map_or(false, |lines| !lines.contains(code)) {
                        continue;
                    }
                    kept += 1;
                    for command in self.commands {
                        if code.contains(command.as_str()) {
                            tally.user(email).record_command(command, year, month);
                        }
                    }
                }
                match own_lines {
                    Some(_) if kept > 0 => tally.user(email).record_loc(kept, year),
                    Some(_) => {}
                    // every line of the hunk counts towards the size, not only additions
                    None => tally.user(email).record_loc(line_count as u64, year),
                }
            }
            Ok(())
        })
    }

    fn for_each_tracked_patch<F>(&self, diff: &Diff, mut f: F) -> Result<()>
    where
        F: FnMut(&str, &Patch) -> Result<()>,
    {
        for idx in 0..diff.deltas().len() {
            let Some(path) = diff
                .get_delta(idx)
                .and_then(|delta| delta.new_file().path().map(|p| p.to_string_lossy().into_owned()))
            else {
                continue;
            };
            if !self.is_tracked(&path) {
                continue;
            }

            // binary files have no patch
            let Some(patch) = Patch::from_diff(diff, idx)? else {
                continue;
            };
            f(&path, &patch)?;
        }
        Ok(())
    }

    fn is_tracked(&self, path: &str) -> bool {
        let extension = path.rsplit('.').next().unwrap_or(path);
        self.extensions.iter().any(|e| e == extension)
    }
}

/// Diff of `commit` against its first parent, or against the empty tree for a
/// root commit. `pathspec` restricts the diff to that exact path.
pub(crate) fn commit_diff<'r>(repo: &'r Repository, commit: &Commit, pathspec: Option<&str>) -> Result<Diff<'r>> {
    let parent = if commit.parent_count() > 0 { Some(0) } else { None };
    diff_against(repo, commit, parent, pathspec)
}

/// Diff of `commit` against its parent number `parent`, or against the empty
/// tree when `None`.
pub(crate) fn diff_against<'r>(
    repo: &'r Repository,
    commit: &Commit,
    parent: Option<usize>,
    pathspec: Option<&str>,
) -> Result<Diff<'r>> {
    let parent_tree = match parent {
        Some(idx) => Some(commit.parent(idx)?.tree()?),
        None => None,
    };
    let current_tree = commit.tree()?;

    let mut diff_opts = DiffOptions::new();
    diff_opts.ignore_filemode(true);
    if let Some(path) = pathspec {
        diff_opts.pathspec(path);
        diff_opts.disable_pathspec_match(true);
    }

    Ok(repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&current_tree), Some(&mut diff_opts))?)
}

/// Calendar year and month (1-12) of a signature time, in the signer's offset.
pub(crate) fn year_month(time: &git2::Time) -> (i32, u32) {
    let utc = DateTime::<Utc>::from_timestamp(time.seconds(), 0).unwrap_or_default();
    let local = match FixedOffset::east_opt(time.offset_minutes() * 60) {
        Some(offset) => utc.with_timezone(&offset).date_naive(),
        None => utc.date_naive(),
    };
    (local.year(), local.month())
}
