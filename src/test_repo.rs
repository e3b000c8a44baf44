// src/test_repo.rs

//! Git fixtures for tests. Also compiled into the integration tests through
//! `tests/common/mod.rs`.

use git2::{Commit, Index, IndexEntry, IndexTime, Oid, Repository, Signature, Time};
use std::path::Path;
use tempfile::TempDir;

/// 2021-03-15T00:00:00Z
pub const MARCH_2021: i64 = 1_615_766_400;

pub struct TestRepo {
    repo: Repository,
    dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        Self { repo, dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn head(&self) -> Option<Oid> {
        self.repo.head().ok().and_then(|h| h.target())
    }

    /// Commits `files` (path, full content) on top of HEAD as `email`.
    pub fn commit(&self, email: &str, timestamp: i64, files: &[(&str, &str)]) -> Oid {
        let parents: Vec<Oid> = self.head().into_iter().collect();
        self.commit_on(&parents, Some("HEAD"), email, timestamp, files)
    }

    /// Commits `files` over the tree of the first parent. `update_ref` is
    /// moved to the new commit when given, so side branches can be built
    /// without touching HEAD.
    pub fn commit_on(
        &self,
        parents: &[Oid],
        update_ref: Option<&str>,
        email: &str,
        timestamp: i64,
        files: &[(&str, &str)],
    ) -> Oid {
        let parent_commits: Vec<Commit> = parents.iter().map(|p| self.repo.find_commit(*p).unwrap()).collect();

        let mut index = Index::new().unwrap();
        if let Some(first) = parent_commits.first() {
            index.read_tree(&first.tree().unwrap()).unwrap();
        }
        for (path, content) in files {
            let blob = self.repo.blob(content.as_bytes()).unwrap();
            index.add(&file_entry(path, blob, content.len())).unwrap();
        }
        let tree = self.repo.find_tree(index.write_tree_to(&self.repo).unwrap()).unwrap();

        let sig = Signature::new("Dev", email, &Time::new(timestamp, 0)).unwrap();
        let parent_refs: Vec<&Commit> = parent_commits.iter().collect();
        self.repo
            .commit(update_ref, &sig, &sig, "change", &tree, &parent_refs)
            .unwrap()
    }
}

fn file_entry(path: &str, id: Oid, size: usize) -> IndexEntry {
    IndexEntry {
        ctime: IndexTime::new(0, 0),
        mtime: IndexTime::new(0, 0),
        dev: 0,
        ino: 0,
        mode: 0o100644,
        uid: 0,
        gid: 0,
        file_size: size as u32,
        id,
        flags: 0,
        flags_extended: 0,
        path: path.as_bytes().to_vec(),
    }
}
