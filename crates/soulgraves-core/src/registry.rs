//! The set of souls this node owns.
//!
//! [`SoulRegistry`] is owned by the engine and only ever mutated from the
//! tick loop. Everything else reads the [`RegistryView`], a snapshot the
//! engine republishes at the end of every tick.
//!
//! Souls are held behind [`Arc`] and shared with the view. Publishing copies
//! pointers; a soul is deep-copied only when the engine writes to it while
//! the view still holds the previous version.

use std::collections::BTreeMap;
use std::sync::Arc;

use soulgraves_types::{MarkerId, PlayerId};
use tokio::sync::RwLock;

use crate::soul::Soul;

/// Souls owned by this node, keyed by marker.
#[derive(Debug, Default)]
pub struct SoulRegistry {
    souls: BTreeMap<MarkerId, Arc<Soul>>,
}

impl SoulRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a soul. Returns `false` and leaves the registry untouched if the
    /// marker is already present.
    pub fn insert(&mut self, soul: Soul) -> bool {
        if self.souls.contains_key(&soul.marker_id()) {
            return false;
        }
        self.souls.insert(soul.marker_id(), Arc::new(soul));
        true
    }

    /// Remove a soul.
    pub fn remove(&mut self, marker: MarkerId) -> Option<Soul> {
        self.souls.remove(&marker).map(Arc::unwrap_or_clone)
    }

    /// Look up a soul.
    pub fn get(&self, marker: MarkerId) -> Option<&Soul> {
        self.souls.get(&marker).map(Arc::as_ref)
    }

    /// Look up a soul for mutation, unsharing it from the view first.
    pub fn get_mut(&mut self, marker: MarkerId) -> Option<&mut Soul> {
        self.souls.get_mut(&marker).map(Arc::make_mut)
    }

    /// Whether the marker is owned here.
    pub fn contains(&self, marker: MarkerId) -> bool {
        self.souls.contains_key(&marker)
    }

    /// All markers, in order.
    pub fn markers(&self) -> Vec<MarkerId> {
        self.souls.keys().copied().collect()
    }

    /// Iterate over every soul.
    pub fn iter(&self) -> impl Iterator<Item = &Soul> {
        self.souls.values().map(Arc::as_ref)
    }

    /// Souls still shared with the view. Callers unshare with
    /// [`Arc::make_mut`] only when they write.
    pub(crate) fn iter_shared_mut(&mut self) -> impl Iterator<Item = &mut Arc<Soul>> {
        self.souls.values_mut()
    }

    /// Number of souls.
    pub fn len(&self) -> usize {
        self.souls.len()
    }

    /// Whether there are no souls.
    pub fn is_empty(&self) -> bool {
        self.souls.is_empty()
    }
}

/// Read-only snapshot of the registry, shared with query callers.
#[derive(Debug, Clone, Default)]
pub struct RegistryView {
    inner: Arc<RwLock<BTreeMap<MarkerId, Arc<Soul>>>>,
}

impl RegistryView {
    /// Create an empty view.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot with the registry's current contents.
    pub async fn publish(&self, registry: &SoulRegistry) {
        let snapshot = registry.souls.clone();
        *self.inner.write().await = snapshot;
    }

    /// A soul by marker.
    pub async fn get(&self, marker: MarkerId) -> Option<Soul> {
        self.inner.read().await.get(&marker).map(|s| Soul::clone(s))
    }

    /// Whether the marker was owned here at the last publish.
    pub async fn contains(&self, marker: MarkerId) -> bool {
        self.inner.read().await.contains_key(&marker)
    }

    /// Every soul belonging to `owner`.
    pub async fn for_owner(&self, owner: PlayerId) -> Vec<Soul> {
        self.inner
            .read()
            .await
            .values()
            .filter(|s| s.owner_id() == owner)
            .map(|s| Soul::clone(s))
            .collect()
    }

    /// Every soul.
    pub async fn all(&self) -> Vec<Soul> {
        self.inner.read().await.values().map(|s| Soul::clone(s)).collect()
    }

    /// Number of souls at the last publish.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Whether the view was empty at the last publish.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
