// src/store.rs

use crate::error::Result;
use crate::model::AnalysisResult;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One JSON document per framework at `<root>/<framework>/result.json`,
/// rewritten in full on every save.
#[derive(Debug, Clone)]
pub struct ResultStore {
    root: PathBuf,
}

impl ResultStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self, framework: &str) -> PathBuf {
        self.root.join(framework).join("result.json")
    }

    pub async fn load(&self, framework: &str) -> Result<Option<AnalysisResult>> {
        let path = self.path(framework);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes to a sibling temp file first, so a crash mid-write keeps the
    /// previous checkpoint intact.
    pub async fn save(&self, framework: &str, result: &AnalysisResult) -> Result<()> {
        let path = self.path(framework);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec(result)?;
        let tmp = tmp_path(&path);
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(path = %path.display(), bytes = json.len(), "Result saved");
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UserRecord;
    use tempfile::TempDir;

    #[tokio::test]
    async fn save_then_load_returns_same_document() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path());

        let mut result = AnalysisResult::new("react");
        let mut user = UserRecord::new("a@x.com");
        user.record_command("useState", 2021, 3);
        user.record_loc(5, 2021);
        result.users.push(user);
        result.repo_count = 4;

        store.save("react", &result).await.unwrap();
        assert!(dir.path().join("react").join("result.json").exists());
        assert!(!dir.path().join("react").join("result.json.tmp").exists());

        let loaded = store.load("react").await.unwrap();
        assert_eq!(loaded, Some(result));
    }

    #[tokio::test]
    async fn missing_document_loads_as_none() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path());
        assert_eq!(store.load("vue").await.unwrap(), None);
    }
}
