//! Credential refresh hook for `ArcticHub::reset` (spec.md §4.11, §9 Design
//! Notes "Global credential cache").

use async_trait::async_trait;

use crate::error::Result;

/// Supplies fresh credentials to the hub's backend connection.
///
/// `reset()` drops the current connection and calls `refresh()` once before
/// reconnecting, matching the end-to-end re-authentication scenario in
/// spec.md §8.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Obtain a fresh credential/token for the backing connection.
    async fn refresh(&self) -> Result<String>;
}

/// An [`AuthProvider`] for connections that don't require credential
/// refresh, e.g. `MemoryBackend` or an unauthenticated local database.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAuthProvider;

#[async_trait]
impl AuthProvider for NullAuthProvider {
    async fn refresh(&self) -> Result<String> {
        Ok(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_provider_refreshes_to_empty_token() {
        let provider = NullAuthProvider;
        assert_eq!(provider.refresh().await.unwrap(), "");
    }
}
