use arc_swap::ArcSwap;
use std::path::PathBuf;
use std::sync::Arc;

use super::PermissionsPolicy;
use crate::config::PolicyConfig;

/// Shared, explicitly reloadable policy.
///
/// Readers take a lock-free snapshot with [`PolicyHandle::current`]. Callers
/// that must see operator changes made since startup (approval re-checks, the
/// daemon tick) call [`PolicyHandle::reload`], which re-reads the override
/// file and safe-mode switch and swaps the snapshot in.
#[derive(Clone)]
pub struct PolicyHandle {
    inner: Arc<ArcSwap<PermissionsPolicy>>,
    source: Option<Arc<PolicySource>>,
}

struct PolicySource {
    config: PolicyConfig,
    state_dir: PathBuf,
}

impl PolicyHandle {
    pub fn load(config: PolicyConfig, state_dir: impl Into<PathBuf>) -> Self {
        let state_dir = state_dir.into();
        let policy = PermissionsPolicy::load(&config, &state_dir);
        Self {
            inner: Arc::new(ArcSwap::from_pointee(policy)),
            source: Some(Arc::new(PolicySource { config, state_dir })),
        }
    }

    /// A handle pinned to `policy`; `reload` keeps returning it until `store` is called.
    pub fn fixed(policy: PermissionsPolicy) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(policy)),
            source: None,
        }
    }

    pub fn current(&self) -> Arc<PermissionsPolicy> {
        self.inner.load_full()
    }

    pub fn reload(&self) -> Arc<PermissionsPolicy> {
        if let Some(source) = &self.source {
            let fresh = Arc::new(PermissionsPolicy::load(&source.config, &source.state_dir));
            self.inner.store(Arc::clone(&fresh));
            tracing::debug!(safe_mode = fresh.safe_mode(), "policy reloaded");
            return fresh;
        }
        self.current()
    }

    pub fn store(&self, policy: PermissionsPolicy) {
        self.inner.store(Arc::new(policy));
    }
}

impl std::fmt::Debug for PolicyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyHandle")
            .field("current", &self.current())
            .field("reloadable", &self.source.is_some())
            .finish()
    }
}
