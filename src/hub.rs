//! The Arctic hub: library lifecycle management (spec.md §4.11).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::auth::AuthProvider;
use crate::backend::{Backend, LibraryDescriptor, LibraryKind};
use crate::config::{ChunkingConfig, PruneConfig};
use crate::error::{Error, Result};
use crate::ids::LibraryName;
use crate::retry;
use crate::tick_store::toplevel::{TopLevelTickStore, UnroutedPolicy};
use crate::tick_store::TickStoreLibrary;
use crate::version_store::VersionStoreLibrary;

/// Produces a fresh `Backend` connection given a refreshed credential,
/// reconnecting the hub's backing document database on `reset()`.
#[async_trait]
pub trait BackendFactory: Send + Sync {
    /// Connect using the given credential, obtained from an
    /// [`AuthProvider`].
    async fn connect(&self, credential: &str) -> Result<Arc<dyn Backend>>;
}

/// A capability shared by every library facade, used when code needs to
/// operate generically over whichever kind a name resolves to (spec.md §9
/// "Polymorphic library types").
#[async_trait]
pub trait LibraryOps: Send + Sync {
    /// Distinct symbols with live data in this library.
    async fn list_symbols(&self) -> Result<Vec<String>>;
}

#[async_trait]
impl LibraryOps for VersionStoreLibrary {
    async fn list_symbols(&self) -> Result<Vec<String>> {
        VersionStoreLibrary::list_symbols(self).await
    }
}

#[async_trait]
impl LibraryOps for TickStoreLibrary {
    async fn list_symbols(&self) -> Result<Vec<String>> {
        TickStoreLibrary::list_symbols(self).await
    }
}

#[async_trait]
impl LibraryOps for TopLevelTickStore {
    async fn list_symbols(&self) -> Result<Vec<String>> {
        TopLevelTickStore::list_symbols(self).await
    }
}

/// Dispatches to the right facade for a library's kind.
pub enum LibraryHandle {
    /// A version-controlled symbol library.
    VersionStore(VersionStoreLibrary),
    /// An append-style tick library.
    TickStore(TickStoreLibrary),
    /// A routing aggregate over several tick libraries.
    TopLevelTickStore(TopLevelTickStore),
}

impl LibraryHandle {
    /// Borrow the common [`LibraryOps`] capability regardless of kind.
    pub fn as_ops(&self) -> &dyn LibraryOps {
        match self {
            LibraryHandle::VersionStore(lib) => lib,
            LibraryHandle::TickStore(lib) => lib,
            LibraryHandle::TopLevelTickStore(lib) => lib,
        }
    }
}

/// Entry point for library lifecycle management: create, rename, delete,
/// reset the connection, and open library facades.
pub struct ArcticHub {
    factory: Arc<dyn BackendFactory>,
    auth: Arc<dyn AuthProvider>,
    backend: RwLock<Arc<dyn Backend>>,
    re_authenticated: DashMap<LibraryName, bool>,
    chunking: ChunkingConfig,
    prune: PruneConfig,
    max_retry_backoff: Duration,
}

impl ArcticHub {
    /// Authenticate and connect, establishing the initial backend. The
    /// connection attempt is retried with exponential backoff up to
    /// `max_retry_backoff` if the factory reports a transient error
    /// (spec.md §7 Policy).
    pub async fn connect(
        factory: Arc<dyn BackendFactory>,
        auth: Arc<dyn AuthProvider>,
        chunking: ChunkingConfig,
        prune: PruneConfig,
        max_retry_backoff: Duration,
    ) -> Result<Self> {
        let credential = auth.refresh().await?;
        let backend = retry::with_retry(max_retry_backoff, || factory.connect(&credential)).await?;
        Ok(Self {
            factory,
            auth,
            backend: RwLock::new(backend),
            re_authenticated: DashMap::new(),
            chunking,
            prune,
            max_retry_backoff,
        })
    }

    fn backend(&self) -> Arc<dyn Backend> {
        self.backend.read().clone()
    }

    /// Drop and re-establish the backend connection, re-authenticating via
    /// the configured [`AuthProvider`] (spec.md §9 "Global credential
    /// cache", end-to-end scenario 6).
    pub async fn reset(&self) -> Result<()> {
        let credential = self.auth.refresh().await?;
        let backend = retry::with_retry(self.max_retry_backoff, || self.factory.connect(&credential)).await?;
        *self.backend.write() = backend;
        for mut entry in self.re_authenticated.iter_mut() {
            *entry.value_mut() = true;
        }
        Ok(())
    }

    /// Whether a library has observed a `reset()` since it was last used
    /// (test/observability hook, not part of the storage contract).
    pub fn was_reauthenticated(&self, library: &LibraryName) -> bool {
        self.re_authenticated.get(library).map(|v| *v).unwrap_or(false)
    }

    /// Register a new, empty library. Fails with [`Error::DuplicateLibrary`]
    /// if the name is already in use.
    pub async fn initialize_library(&self, name: LibraryName, kind: LibraryKind) -> Result<()> {
        self.backend()
            .create_library(LibraryDescriptor {
                name: name.clone(),
                kind,
                quota_bytes: None,
                last_sampled_bytes: None,
                last_sampled_at: None,
            })
            .await?;
        self.re_authenticated.insert(name, false);
        Ok(())
    }

    /// Rename a library. Both names must share a namespace (spec.md §4.11);
    /// crossing namespaces fails with [`Error::InvalidRename`].
    pub async fn rename_library(&self, from: &LibraryName, to: &LibraryName) -> Result<()> {
        if !from.same_namespace(to) {
            return Err(Error::InvalidRename(format!(
                "cannot rename '{from}' to '{to}': different namespaces"
            )));
        }
        self.backend().rename_library(from, to).await
    }

    /// Permanently delete a library and all its data.
    pub async fn delete_library(&self, name: &LibraryName) -> Result<()> {
        self.backend().drop_library(name).await?;
        self.re_authenticated.remove(name);
        Ok(())
    }

    /// The kind a library was registered as.
    pub async fn get_library_type(&self, name: &LibraryName) -> Result<LibraryKind> {
        self.backend()
            .library_descriptor(name)
            .await?
            .map(|d| d.kind)
            .ok_or_else(|| Error::library_not_found(name.as_str()))
    }

    /// Every registered library's descriptor.
    pub async fn list_libraries(&self) -> Result<Vec<LibraryDescriptor>> {
        self.backend().list_libraries().await
    }

    /// Current storage quota for a library, if any.
    pub async fn get_quota(&self, name: &LibraryName) -> Result<Option<u64>> {
        Ok(self.backend().library_descriptor(name).await?.and_then(|d| d.quota_bytes))
    }

    /// Set (or clear) a library's storage quota.
    pub async fn set_quota(&self, name: &LibraryName, quota_bytes: Option<u64>) -> Result<()> {
        self.backend().set_quota(name, quota_bytes).await
    }

    /// Whether a library's sampled storage usage is at or past its quota.
    pub async fn check_quota(&self, name: &LibraryName) -> Result<bool> {
        let descriptor = self
            .backend()
            .library_descriptor(name)
            .await?
            .ok_or_else(|| Error::library_not_found(name.as_str()))?;
        match descriptor.quota_bytes {
            Some(quota) => Ok(self.backend().collection_size_bytes(name).await? >= quota),
            None => Ok(false),
        }
    }

    /// Open a registered library as a [`VersionStoreLibrary`].
    pub fn version_store(&self, name: LibraryName) -> VersionStoreLibrary {
        VersionStoreLibrary::new(self.backend(), name, self.chunking.clone(), self.prune.clone())
    }

    /// Open a registered library as a [`TickStoreLibrary`].
    pub fn tick_store(&self, name: LibraryName) -> TickStoreLibrary {
        TickStoreLibrary::new(self.backend(), name, self.chunking.clone())
    }

    /// Open a routing aggregate over tick libraries. The routing table
    /// itself is not persisted; callers re-register intervals with `add`
    /// after reconnecting (see DESIGN.md).
    pub fn top_level_tick_store(&self, on_unrouted: UnroutedPolicy) -> TopLevelTickStore {
        TopLevelTickStore::new(self.backend(), on_unrouted, self.chunking.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::NullAuthProvider;
    use crate::backend::MemoryBackend;

    struct MemoryFactory;

    #[async_trait]
    impl BackendFactory for MemoryFactory {
        async fn connect(&self, _credential: &str) -> Result<Arc<dyn Backend>> {
            Ok(Arc::new(MemoryBackend::new()))
        }
    }

    async fn make_hub() -> ArcticHub {
        ArcticHub::connect(
            Arc::new(MemoryFactory),
            Arc::new(NullAuthProvider),
            ChunkingConfig::default(),
            PruneConfig::default(),
            Duration::from_secs(1),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn duplicate_library_name_rejected() {
        let hub = make_hub().await;
        let name = LibraryName::new("lib").unwrap();
        hub.initialize_library(name.clone(), LibraryKind::VersionStore).await.unwrap();
        assert!(hub.initialize_library(name, LibraryKind::VersionStore).await.is_err());
    }

    #[tokio::test]
    async fn rename_across_namespace_rejected() {
        let hub = make_hub().await;
        let from = LibraryName::new("ns1.lib").unwrap();
        hub.initialize_library(from.clone(), LibraryKind::VersionStore).await.unwrap();
        let to = LibraryName::new("ns2.lib").unwrap();
        assert!(matches!(hub.rename_library(&from, &to).await, Err(Error::InvalidRename(_))));
    }

    #[tokio::test]
    async fn rename_within_namespace_succeeds() {
        let hub = make_hub().await;
        let from = LibraryName::new("ns1.lib").unwrap();
        hub.initialize_library(from.clone(), LibraryKind::VersionStore).await.unwrap();
        let to = LibraryName::new("ns1.lib2").unwrap();
        hub.rename_library(&from, &to).await.unwrap();
        assert_eq!(hub.get_library_type(&to).await.unwrap(), LibraryKind::VersionStore);
    }

    #[tokio::test]
    async fn reset_marks_libraries_reauthenticated() {
        let hub = make_hub().await;
        let name = LibraryName::new("lib").unwrap();
        hub.initialize_library(name.clone(), LibraryKind::VersionStore).await.unwrap();
        assert!(!hub.was_reauthenticated(&name));
        hub.reset().await.unwrap();
        assert!(hub.was_reauthenticated(&name));
    }

    #[tokio::test]
    async fn reset_swaps_to_a_fresh_backend() {
        let hub = make_hub().await;
        let name = LibraryName::new("lib").unwrap();
        hub.initialize_library(name.clone(), LibraryKind::VersionStore).await.unwrap();
        hub.reset().await.unwrap();
        // The fresh MemoryBackend has no libraries registered.
        assert!(hub.get_library_type(&name).await.is_err());
    }
}
