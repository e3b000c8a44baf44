// src/adoption.rs

use crate::analyzer::{diff_against, Deadline};
use crate::error::Result;
use git2::{Patch, Repository};
use std::path::Path;
use tracing::{debug, error};

/// Whether the repository ever declared `framework` in its top-level
/// `manifest_file`, as a quoted string in a line added by any commit.
///
/// A manifest that only exists in a subdirectory does not count, so
/// monorepos with an unrelated sub-project are rejected. Inspection errors
/// are logged and reported as not adopted, as is running past `deadline`.
pub fn adopts(repo_path: &Path, manifest_file: &str, framework: &str, deadline: Option<Deadline>) -> bool {
    match find_declaration(repo_path, manifest_file, framework, deadline) {
        Ok(found) => {
            debug!(path = %repo_path.display(), manifest_file, found, "Adoption check");
            found
        }
        Err(e) => {
            error!(path = %repo_path.display(), "Adoption check failed: {}", e);
            false
        }
    }
}

fn find_declaration(
    repo_path: &Path,
    manifest_file: &str,
    framework: &str,
    deadline: Option<Deadline>,
) -> Result<bool> {
    let repo = Repository::open(repo_path)?;
    let double_quoted = format!("\"{}\"", framework);
    let single_quoted = format!("'{}'", framework);

    let mut revwalk = repo.revwalk()?;
    revwalk.push_head()?;

    for oid in revwalk {
        if let Some(deadline) = &deadline {
            deadline.check(repo_path)?;
        }

        let commit = repo.find_commit(oid?)?;
        // a merge is checked against each of its parents
        let parents: Vec<Option<usize>> = match commit.parent_count() {
            0 => vec![None],
            n => (0..n).map(Some).collect(),
        };
        for parent in parents {
            let diff = diff_against(&repo, &commit, parent, Some(manifest_file))?;
            if declares(&diff, &double_quoted, &single_quoted)? {
                return Ok(true);
            }
        }
    }

    Ok(false)
}

fn declares(diff: &git2::Diff, double_quoted: &str, single_quoted: &str) -> Result<bool> {
    for idx in 0..diff.deltas().len() {
        let Some(patch) = Patch::from_diff(diff, idx)? else {
            continue;
        };
        for hunk in 0..patch.num_hunks() {
            for line_idx in 0..patch.num_lines_in_hunk(hunk)? {
                let line = patch.line_in_hunk(hunk, line_idx)?;
                if line.origin() != '+' {
                    continue;
                }
                let content = String::from_utf8_lossy(line.content());
                let code = content.trim();
                if code.contains(double_quoted) || code.contains(single_quoted) {
                    return Ok(true);
                }
            }
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_repo::{TestRepo, MARCH_2021};
    use std::time::Duration;

    #[test]
    fn detects_quoted_dependency_in_root_manifest() {
        let fixture = TestRepo::new();
        fixture.commit("a@x.com", MARCH_2021, &[("index.js", "x\n")]);
        fixture.commit(
            "a@x.com",
            MARCH_2021 + 60,
            &[("package.json", "{\n  \"dependencies\": {\n    \"react\": \"^17.0.0\"\n  }\n}\n")],
        );

        assert!(adopts(fixture.path(), "package.json", "react", None));
    }

    #[test]
    fn single_quotes_count_too() {
        let fixture = TestRepo::new();
        fixture.commit("a@x.com", MARCH_2021, &[("setup.py", "install_requires=['flask']\n")]);

        assert!(adopts(fixture.path(), "setup.py", "flask", None));
    }

    #[test]
    fn adoption_survives_later_removal() {
        let fixture = TestRepo::new();
        fixture.commit("a@x.com", MARCH_2021, &[("package.json", "{ \"react\": \"16\" }\n")]);
        fixture.commit("a@x.com", MARCH_2021 + 60, &[("package.json", "{ \"preact\": \"10\" }\n")]);

        assert!(adopts(fixture.path(), "package.json", "react", None));
    }

    #[test]
    fn longer_identifiers_do_not_match() {
        let fixture = TestRepo::new();
        fixture.commit(
            "a@x.com",
            MARCH_2021,
            &[("package.json", "{ \"react-dom\": \"17\", \"preact\": \"10\" }\n")],
        );

        assert!(!adopts(fixture.path(), "package.json", "react", None));
    }

    #[test]
    fn manifest_in_subdirectory_is_ignored() {
        let fixture = TestRepo::new();
        fixture.commit("a@x.com", MARCH_2021, &[("web/package.json", "{ \"react\": \"17\" }\n")]);
        fixture.commit("a@x.com", MARCH_2021 + 60, &[("package.json", "{ \"name\": \"root\" }\n")]);

        assert!(!adopts(fixture.path(), "package.json", "react", None));
    }

    #[test]
    fn declaration_made_by_a_merge_counts() {
        let fixture = TestRepo::new();
        let base = fixture.commit("a@x.com", MARCH_2021, &[("index.js", "x\n")]);
        let main = fixture.commit("a@x.com", MARCH_2021 + 60, &[("main.js", "y\n")]);
        let side = fixture.commit_on(&[base], None, "b@x.com", MARCH_2021 + 120, &[("side.js", "z\n")]);
        fixture.commit_on(
            &[main, side],
            Some("HEAD"),
            "a@x.com",
            MARCH_2021 + 180,
            &[("side.js", "z\n"), ("package.json", "{ \"react\": \"17\" }\n")],
        );

        assert!(adopts(fixture.path(), "package.json", "react", None));
    }

    #[test]
    fn exhausted_deadline_is_not_adoption() {
        let fixture = TestRepo::new();
        fixture.commit("a@x.com", MARCH_2021, &[("package.json", "{ \"react\": \"17\" }\n")]);

        assert!(adopts(fixture.path(), "package.json", "react", Some(Deadline::after(Duration::from_secs(60)))));
        assert!(!adopts(fixture.path(), "package.json", "react", Some(Deadline::after(Duration::ZERO))));
    }

    #[test]
    fn missing_manifest_or_repository_is_not_adoption() {
        let fixture = TestRepo::new();
        fixture.commit("a@x.com", MARCH_2021, &[("index.js", "require('react')\n")]);
        assert!(!adopts(fixture.path(), "package.json", "react", None));

        let empty = tempfile::TempDir::new().unwrap();
        assert!(!adopts(empty.path(), "package.json", "react", None));
    }
}
