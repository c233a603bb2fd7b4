//! Preview resources for selected images
//!
//! A preview is a revocable URL pointing at the selected file's bytes. The
//! session owns at most one `PreviewHandle`; replacing the file, resetting,
//! or dropping the session releases it. Release is idempotent.

use crate::models::SelectedFile;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

/// Creates and revokes preview URLs
pub trait PreviewRegistry: Send + Sync {
    /// Allocate a preview URL for `file`
    fn create(&self, file: &SelectedFile) -> String;

    /// Free a preview URL; unknown URLs are ignored
    fn revoke(&self, url: &str);
}

/// Owned preview URL, revoked on release or drop
pub struct PreviewHandle {
    url: String,
    registry: Arc<dyn PreviewRegistry>,
    released: bool,
}

impl PreviewHandle {
    /// Acquire a preview for `file`
    pub fn acquire(registry: Arc<dyn PreviewRegistry>, file: &SelectedFile) -> Self {
        let url = registry.create(file);
        debug!(url = %url, file = %file.name, "Preview acquired");
        Self {
            url,
            registry,
            released: false,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Revoke the URL; later calls do nothing
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.registry.revoke(&self.url);
        self.released = true;
        debug!(url = %self.url, "Preview released");
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for PreviewHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewHandle")
            .field("url", &self.url)
            .field("released", &self.released)
            .finish()
    }
}

/// In-memory `blob:` URL registry
///
/// Counts creations and revocations so leaks show up in tests and logs.
#[derive(Debug, Default)]
pub struct ObjectUrlRegistry {
    inner: Mutex<RegistryState>,
}

#[derive(Debug, Default)]
struct RegistryState {
    live: HashSet<String>,
    created: usize,
    revoked: usize,
}

impl ObjectUrlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// URLs created and not yet revoked
    pub fn live_count(&self) -> usize {
        self.inner.lock().map(|s| s.live.len()).unwrap_or(0)
    }

    pub fn created_count(&self) -> usize {
        self.inner.lock().map(|s| s.created).unwrap_or(0)
    }

    pub fn revoked_count(&self) -> usize {
        self.inner.lock().map(|s| s.revoked).unwrap_or(0)
    }

    pub fn is_live(&self, url: &str) -> bool {
        self.inner
            .lock()
            .map(|s| s.live.contains(url))
            .unwrap_or(false)
    }
}

impl PreviewRegistry for ObjectUrlRegistry {
    fn create(&self, _file: &SelectedFile) -> String {
        let url = format!("blob:labtrack/{}", Uuid::new_v4());
        if let Ok(mut state) = self.inner.lock() {
            state.live.insert(url.clone());
            state.created += 1;
        }
        url
    }

    fn revoke(&self, url: &str) {
        if let Ok(mut state) = self.inner.lock() {
            if state.live.remove(url) {
                state.revoked += 1;
            }
        }
    }
}
