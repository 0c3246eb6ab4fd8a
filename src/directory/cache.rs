//! TTL cache in front of a directory.
//!
//! Only `student_display` is cached; it is the lookup that statistics repeat
//! for every top student. Sentinel results are not cached so a student added
//! to the directory shows up on the next request.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::directory::{Directory, LecturerProfile, StudentDisplay, StudentProfile};
use crate::error::StoreError;

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct DirectoryCacheConfig {
    /// How long a resolved display stays valid; zero disables caching
    pub ttl: Duration,
}

impl Default for DirectoryCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
        }
    }
}

struct CachedDisplay {
    display: StudentDisplay,
    expires_at: Instant,
}

impl CachedDisplay {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

// =============================================================================
// Cached directory
// =============================================================================

pub struct CachedDirectory<D> {
    inner: D,
    config: DirectoryCacheConfig,
    displays: DashMap<String, CachedDisplay>,
}

impl<D: Directory> CachedDirectory<D> {
    pub fn new(inner: D, config: DirectoryCacheConfig) -> Self {
        Self {
            inner,
            config,
            displays: DashMap::new(),
        }
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.displays.iter().filter(|e| !e.is_expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let before = self.displays.len();
        self.displays.retain(|_, entry| !entry.is_expired());
        before.saturating_sub(self.displays.len())
    }

    fn cached(&self, student_id: &str) -> Option<StudentDisplay> {
        let entry = self.displays.get(student_id)?;
        if entry.is_expired() {
            drop(entry);
            self.displays.remove(student_id);
            return None;
        }
        Some(entry.display.clone())
    }
}

#[async_trait]
impl<D: Directory> Directory for CachedDirectory<D> {
    async fn student_display(&self, student_id: &str) -> StudentDisplay {
        if self.config.ttl.is_zero() {
            return self.inner.student_display(student_id).await;
        }

        if let Some(display) = self.cached(student_id) {
            return display;
        }

        let display = self.inner.student_display(student_id).await;
        if !display.is_unknown() {
            debug!(student_id, "Caching student display");
            self.displays.insert(
                student_id.to_string(),
                CachedDisplay {
                    display: display.clone(),
                    expires_at: Instant::now() + self.config.ttl,
                },
            );
        }
        display
    }

    async fn student_for_user(&self, user_id: &str) -> Result<Option<StudentProfile>, StoreError> {
        self.inner.student_for_user(user_id).await
    }

    async fn lecturer_for_user(
        &self,
        user_id: &str,
    ) -> Result<Option<LecturerProfile>, StoreError> {
        self.inner.lecturer_for_user(user_id).await
    }

    async fn advisee_ids(&self, lecturer_id: &str) -> Result<Vec<String>, StoreError> {
        self.inner.advisee_ids(lecturer_id).await
    }
}

/// Periodically purge expired entries
pub fn spawn_cleanup_task<D: Directory + 'static>(
    cache: Arc<CachedDirectory<D>>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let removed = cache.purge_expired();
            if removed > 0 {
                debug!("Directory cache cleanup: removed {} expired entries", removed);
            }
        }
    })
}
