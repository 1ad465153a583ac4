//! Backend environment selection.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use medlink_types::EnvMode;

use crate::error::{Error, Result};

/// Holds the backend environment the collaborators should talk to.
///
/// Clones share state. Collaborators that need to follow environment changes
/// can [`subscribe`](Self::subscribe) to a watch channel.
#[derive(Debug, Clone)]
pub struct EnvSelector {
    tx: Arc<watch::Sender<EnvMode>>,
}

impl EnvSelector {
    /// Create a selector starting at `initial`.
    pub fn new(initial: EnvMode) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Select a mode by its identifier.
    ///
    /// The current mode is left untouched when `raw` is not accepted.
    ///
    /// ```
    /// use medlink_core::EnvSelector;
    /// use medlink_types::EnvMode;
    ///
    /// let env = EnvSelector::default();
    /// assert_eq!(env.set("dev").unwrap(), EnvMode::Dev);
    /// assert!(env.set("staging").is_err());
    /// assert_eq!(env.current(), EnvMode::Dev);
    /// ```
    pub fn set(&self, raw: &str) -> Result<EnvMode> {
        let mode: EnvMode = raw.parse().map_err(|_| Error::invalid_env_mode(raw))?;
        let previous = self.tx.send_replace(mode);
        if previous != mode {
            info!(from = %previous, to = %mode, "Environment mode changed");
        }
        Ok(mode)
    }

    /// The currently selected mode.
    pub fn current(&self) -> EnvMode {
        *self.tx.borrow()
    }

    /// Follow mode changes.
    pub fn subscribe(&self) -> watch::Receiver<EnvMode> {
        self.tx.subscribe()
    }
}

impl Default for EnvSelector {
    fn default() -> Self {
        Self::new(EnvMode::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_default_is_prod() {
        assert_eq!(EnvSelector::default().current(), EnvMode::Prod);
    }

    #[test]
    fn test_rejected_mode_keeps_state() {
        let env = EnvSelector::new(EnvMode::Dev);
        let err = env.set("PROD").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidEnvMode);
        assert!(err.to_string().contains("PROD"));
        assert!(err.to_string().contains("prod, dev"));
        assert_eq!(env.current(), EnvMode::Dev);
    }

    #[tokio::test]
    async fn test_subscribers_observe_changes() {
        let env = EnvSelector::default();
        let mut rx = env.subscribe();

        env.set("dev").unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), EnvMode::Dev);
    }

    #[test]
    fn test_clones_share_state() {
        let env = EnvSelector::default();
        let clone = env.clone();
        clone.set("dev").unwrap();
        assert_eq!(env.current(), EnvMode::Dev);
    }
}
