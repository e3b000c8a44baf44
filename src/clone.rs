// src/clone.rs

use crate::config::RetryPolicy;
use crate::error::{Error, Result};
use git2::build::RepoBuilder;
use rand::Rng;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const RELEASE_ATTEMPTS: u32 = 3;
const RELEASE_DELAY: Duration = Duration::from_millis(50);

/// Materializes a remote repository's history at a local path
pub trait Cloner: Send + Sync {
    fn clone_history(&self, url: &str, path: &Path) -> Result<()>;
}

/// History-only clone through libgit2: bare, so no working tree is written.
pub struct GitCloner;

impl Cloner for GitCloner {
    fn clone_history(&self, url: &str, path: &Path) -> Result<()> {
        RepoBuilder::new().bare(true).clone(url, path)?;
        Ok(())
    }
}

/// Clones with bounded exponential backoff and hands out scoped scratch clones.
#[derive(Clone)]
pub struct CloneManager {
    cloner: Arc<dyn Cloner>,
    policy: RetryPolicy,
}

impl CloneManager {
    pub fn new(cloner: Arc<dyn Cloner>, policy: RetryPolicy) -> Self {
        Self { cloner, policy }
    }

    /// Makes `url` available at `path`. An existing path is reused as is.
    /// A failed attempt's partial clone is deleted on the blocking pool before
    /// the next one; the guard only exists once a clone is in place.
    pub async fn acquire(&self, url: &str, path: &Path) -> Result<ScratchClone> {
        if path.exists() {
            debug!(path = %path.display(), "Reusing existing clone");
            return Ok(ScratchClone::new(path.to_path_buf()));
        }

        let max_attempts = self.policy.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            let cloner = Arc::clone(&self.cloner);
            let (owned_url, owned_path) = (url.to_string(), path.to_path_buf());
            let outcome = tokio::task::spawn_blocking(move || {
                let cloned = match owned_path.parent() {
                    Some(parent) => std::fs::create_dir_all(parent).map_err(Error::from),
                    None => Ok(()),
                }
                .and_then(|()| cloner.clone_history(&owned_url, &owned_path));
                if cloned.is_err() {
                    remove_dir(&owned_path);
                }
                cloned
            })
            .await
            .map_err(Error::from)
            .and_then(|r| r);

            match outcome {
                Ok(()) => {
                    info!(url, attempt, "Cloned repository");
                    return Ok(ScratchClone::new(path.to_path_buf()));
                }
                Err(e) => {
                    warn!(url, attempt, max_attempts, "Clone failed: {}", e);
                    if attempt < max_attempts {
                        tokio::time::sleep(self.delay_with_jitter(attempt)).await;
                    }
                }
            }
        }

        Err(Error::CloneUnavailable {
            url: url.to_string(),
            attempts: max_attempts,
        })
    }

    fn delay_with_jitter(&self, retry: u32) -> Duration {
        let delay = self.policy.backoff(retry);
        if self.policy.jitter <= 0.0 {
            return delay;
        }
        let extra = rand::thread_rng().gen_range(0.0..self.policy.jitter);
        delay + delay.mul_f64(extra)
    }
}

/// A scratch clone that is deleted when released or dropped. Deletion may
/// block briefly, so release it from blocking code.
#[derive(Debug)]
pub struct ScratchClone {
    path: PathBuf,
    released: bool,
}

impl ScratchClone {
    fn new(path: PathBuf) -> Self {
        Self { path, released: false }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.released {
            self.released = true;
            remove_dir(&self.path);
        }
    }
}

impl Drop for ScratchClone {
    fn drop(&mut self) {
        self.release_inner();
    }
}

/// Recursive delete that tolerates handles not yet released by libgit2:
/// retried a few times, then logged and given up on.
fn remove_dir(path: &Path) {
    for attempt in 1..=RELEASE_ATTEMPTS {
        match std::fs::remove_dir_all(path) {
            Ok(()) => return,
            Err(e) if e.kind() == ErrorKind::NotFound => return,
            Err(e) if attempt == RELEASE_ATTEMPTS => {
                error!(path = %path.display(), "Failed to delete scratch clone: {}", e);
            }
            Err(_) => std::thread::sleep(RELEASE_DELAY),
        }
    }
}
