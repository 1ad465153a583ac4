//! Scanner facade.
//!
//! Forwards scan set and scanning commands to the [`DeviceScanner`]
//! collaborator, resolving registry keys to device objects on the way.
//! Scanner state is never returned from these calls; it is observed through
//! [`TypedEvent::ScannerStateChanged`](crate::events::TypedEvent) events.

use std::sync::Arc;

use tracing::info;

use crate::error::Result;
use crate::registry::Registry;
use crate::traits::DeviceScanner;
use crate::util::require_non_empty;

/// Scan set and scanning control.
#[derive(Clone)]
pub struct ScannerFacade {
    scanner: Arc<dyn DeviceScanner>,
    registry: Arc<Registry>,
}

impl std::fmt::Debug for ScannerFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScannerFacade").finish_non_exhaustive()
    }
}

impl ScannerFacade {
    /// Create a facade over `scanner`, resolving keys through `registry`.
    pub fn new(scanner: Arc<dyn DeviceScanner>, registry: Arc<Registry>) -> Self {
        Self { scanner, registry }
    }

    /// Pass the host's session key on to the scanner.
    pub async fn set_session_key(&self, session_key: &str) -> Result<()> {
        require_non_empty("session key", session_key)?;
        self.scanner.set_session_key(session_key).await
    }

    /// Add the handle's device to the scan set.
    ///
    /// Fails with `InvalidHandle` without touching the scanner when `key` is
    /// not live.
    pub async fn add_to_scan(&self, key: &str) -> Result<()> {
        let handle = self.registry.acquire(key).await?;
        self.scanner.add_device(Arc::clone(handle.device())).await?;
        info!(key = %handle.key(), "Added device to scan set");
        Ok(())
    }

    /// Remove the handle's device from the scan set.
    pub async fn remove_from_scan(&self, key: &str) -> Result<()> {
        let handle = self.registry.acquire(key).await?;
        self.scanner.remove_device(Arc::clone(handle.device())).await?;
        info!(key = %handle.key(), "Removed device from scan set");
        Ok(())
    }

    /// Empty the scan set. Handles stay registered.
    pub async fn clear_scan_set(&self) -> Result<()> {
        self.scanner.clear_devices().await?;
        info!("Cleared scan set");
        Ok(())
    }

    /// Start scanning.
    pub async fn start(&self) -> Result<()> {
        info!("Starting scanner");
        self.scanner.start().await
    }

    /// Stop scanning.
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping scanner");
        self.scanner.stop().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::events::EventDispatcher;
    use crate::mock::{MockDeviceFactory, MockScanner};
    use crate::router::EventRouter;

    fn facade() -> (ScannerFacade, Arc<Registry>, Arc<MockScanner>) {
        let scanner = Arc::new(MockScanner::new());
        let registry = Arc::new(Registry::new(
            Arc::new(MockDeviceFactory::new()),
            scanner.clone(),
            EventRouter::new(EventDispatcher::new()),
        ));
        (
            ScannerFacade::new(scanner.clone(), Arc::clone(&registry)),
            registry,
            scanner,
        )
    }

    #[tokio::test]
    async fn test_add_and_remove() {
        let (facade, registry, scanner) = facade();
        let key = registry.create("wellue").await.unwrap();

        facade.add_to_scan(key.as_str()).await.unwrap();
        assert_eq!(scanner.scan_set(), vec![key.to_string()]);

        facade.remove_from_scan(key.as_str()).await.unwrap();
        assert!(scanner.scan_set().is_empty());
    }

    #[tokio::test]
    async fn test_add_unknown_key_does_not_touch_scanner() {
        let (facade, _, scanner) = facade();
        let err = facade.add_to_scan("missing").await.unwrap_err();
        assert!(matches!(err, Error::InvalidHandle(ref k) if k == "missing"));
        assert_eq!(scanner.add_calls(), 0);
    }

    #[tokio::test]
    async fn test_clear_scan_set_keeps_handles() {
        let (facade, registry, scanner) = facade();
        let key = registry.create("yuwell").await.unwrap();
        facade.add_to_scan(key.as_str()).await.unwrap();

        facade.clear_scan_set().await.unwrap();
        assert!(scanner.scan_set().is_empty());
        assert!(registry.lookup(key.as_str()).await.is_ok());
    }

    #[tokio::test]
    async fn test_session_key() {
        let (facade, _, scanner) = facade();
        assert!(matches!(
            facade.set_session_key("").await,
            Err(Error::InvalidArgument(_))
        ));
        facade.set_session_key("secret").await.unwrap();
        assert_eq!(scanner.session_key().as_deref(), Some("secret"));
    }

    #[tokio::test]
    async fn test_collaborator_failure_propagates() {
        let (facade, _, scanner) = facade();
        scanner.set_should_fail(true);
        assert!(matches!(facade.start().await, Err(Error::Collaborator(_))));
        assert!(!scanner.is_running());
    }
}
