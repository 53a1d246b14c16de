//! Topology Cache
//!
//! Three independently refreshed snapshots (all registered nodes, nodes above
//! the reputation threshold, removed nodes). Reads never wait on a rebuild:
//!
//! - fresh snapshot: returned as is
//! - stale snapshot: the first reader to flip the view's `refreshing` flag
//!   rebuilds it, everyone else gets the stale snapshot immediately
//!
//! The flag is cleared by a drop guard so a failed or panicking rebuild
//! cannot wedge the view. Each view also carries a generation bumped by
//! `invalidate`; a rebuild that started before an invalidation publishes its
//! snapshot but leaves the view stale.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::clock::{duration_nanos, Clock};
use crate::database::{NodeFilter, StatusStore};
use crate::error::StoreError;
use crate::models::Topology;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopologyView {
    Full,
    Active,
    Removed,
}

impl TopologyView {
    pub const ALL: [TopologyView; 3] = [TopologyView::Full, TopologyView::Active, TopologyView::Removed];

    pub fn as_str(&self) -> &'static str {
        match self {
            TopologyView::Full => "full",
            TopologyView::Active => "active",
            TopologyView::Removed => "removed",
        }
    }
}

/// Where snapshots are rebuilt from
#[async_trait]
pub trait TopologySource: Send + Sync {
    async fn build(&self, view: TopologyView) -> Result<Topology, StoreError>;
}

/// Builds snapshots straight from the status store
pub struct StoreTopologySource {
    store: Arc<dyn StatusStore>,
    active_threshold: i64,
}

impl StoreTopologySource {
    pub fn new(store: Arc<dyn StatusStore>, active_threshold: i64) -> Self {
        Self {
            store,
            active_threshold,
        }
    }
}

#[async_trait]
impl TopologySource for StoreTopologySource {
    async fn build(&self, view: TopologyView) -> Result<Topology, StoreError> {
        let nodes = match view {
            TopologyView::Full => self.store.list_registered_nodes(NodeFilter::All).await?,
            TopologyView::Active => {
                self.store
                    .list_registered_nodes(NodeFilter::ReputationAtLeast(self.active_threshold))
                    .await?
            }
            TopologyView::Removed => self.store.list_removed_nodes().await?,
        };
        Ok(Topology::from_nodes(nodes))
    }
}

const NEVER_REFRESHED: i64 = i64::MIN;

struct CachedView {
    snapshot: RwLock<Arc<Topology>>,
    last_refreshed: AtomicI64,
    refreshing: AtomicBool,
    generation: AtomicU64,
}

impl CachedView {
    fn new() -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(Topology::default())),
            last_refreshed: AtomicI64::new(NEVER_REFRESHED),
            refreshing: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    fn is_fresh(&self, now: i64, ttl: i64) -> bool {
        let last = self.last_refreshed.load(Ordering::Acquire);
        last != NEVER_REFRESHED && now.saturating_sub(last) <= ttl
    }

    fn snapshot(&self) -> Arc<Topology> {
        self.snapshot.read().clone()
    }
}

/// Clears the refreshing flag on every exit path
struct RefreshGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct TopologyCache {
    source: Arc<dyn TopologySource>,
    clock: Arc<dyn Clock>,
    ttl: i64,
    full: CachedView,
    active: CachedView,
    removed: CachedView,
}

impl TopologyCache {
    pub fn new(source: Arc<dyn TopologySource>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            source,
            clock,
            ttl: duration_nanos(ttl),
            full: CachedView::new(),
            active: CachedView::new(),
            removed: CachedView::new(),
        }
    }

    fn view(&self, view: TopologyView) -> &CachedView {
        match view {
            TopologyView::Full => &self.full,
            TopologyView::Active => &self.active,
            TopologyView::Removed => &self.removed,
        }
    }

    pub async fn get(&self, view: TopologyView) -> Arc<Topology> {
        let cached = self.view(view);
        let now = self.clock.now_nanos();

        if cached.is_fresh(now, self.ttl) {
            return cached.snapshot();
        }

        if cached
            .refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(view = view.as_str(), "Topology refresh in flight, serving stale snapshot");
            return cached.snapshot();
        }

        let _guard = RefreshGuard {
            flag: &cached.refreshing,
        };
        self.rebuild(view, cached).await
    }

    async fn rebuild(&self, view: TopologyView, cached: &CachedView) -> Arc<Topology> {
        let generation = cached.generation.load(Ordering::SeqCst);
        match self.source.build(view).await {
            Ok(topology) => {
                let topology = Arc::new(topology);
                debug!(
                    view = view.as_str(),
                    mix_nodes = topology.mix_nodes.len(),
                    gateways = topology.gateways.len(),
                    "Topology refreshed"
                );
                *cached.snapshot.write() = topology.clone();
                cached
                    .last_refreshed
                    .store(self.clock.now_nanos(), Ordering::SeqCst);
                // Invalidated mid-build: the snapshot may predate the change
                if cached.generation.load(Ordering::SeqCst) != generation {
                    debug!(view = view.as_str(), "Topology invalidated during refresh");
                    cached.last_refreshed.store(NEVER_REFRESHED, Ordering::SeqCst);
                }
                topology
            }
            Err(e) => {
                error!(view = view.as_str(), error = %e, "Topology refresh failed, keeping previous snapshot");
                cached.snapshot()
            }
        }
    }

    /// Force the next `get` of this view to rebuild
    pub fn invalidate(&self, view: TopologyView) {
        let cached = self.view(view);
        cached.generation.fetch_add(1, Ordering::SeqCst);
        cached.last_refreshed.store(NEVER_REFRESHED, Ordering::SeqCst);
    }

    pub fn invalidate_all(&self) {
        for view in TopologyView::ALL {
            self.invalidate(view);
        }
    }

    /// Build every view once
    pub async fn prime(&self) {
        for view in TopologyView::ALL {
            let topology = self.get(view).await;
            info!(view = view.as_str(), nodes = topology.len(), "Topology primed");
        }
    }
}
