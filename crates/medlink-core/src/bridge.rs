//! The bridge: one owner for every component.
//!
//! [`Bridge::new`] wires the event dispatcher, router, registry, scanner
//! facade, environment selector and command dispatcher together and
//! attaches the scanner state stream. [`Bridge::shutdown`] tears it all down
//! again in an order that guarantees no event is published afterwards.

use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::config::BridgeConfig;
use crate::dispatcher::{CommandContext, Dispatcher, DispatcherHandle};
use crate::env::EnvSelector;
use crate::error::Result;
use crate::events::{EventDispatcher, EventFilter, EventReceiver};
use crate::registry::Registry;
use crate::router::{DeliveryGate, EventRouter, Subscription};
use crate::scanner::ScannerFacade;
use crate::traits::{DeviceFactory, DeviceScanner};
use crate::util::lock;

/// Device and scanner implementations the bridge drives.
#[derive(Clone)]
pub struct Collaborators {
    pub scanner: Arc<dyn DeviceScanner>,
    pub factory: Arc<dyn DeviceFactory>,
}

impl Collaborators {
    pub fn new(scanner: Arc<dyn DeviceScanner>, factory: Arc<dyn DeviceFactory>) -> Self {
        Self { scanner, factory }
    }
}

/// Owns the registry, the routing tasks and the command dispatcher.
pub struct Bridge {
    config: BridgeConfig,
    events: EventDispatcher,
    registry: Arc<Registry>,
    scanner: ScannerFacade,
    env: EnvSelector,
    commands: DispatcherHandle,
    scanner_gate: Arc<DeliveryGate>,
    scanner_subscription: Mutex<Option<Subscription>>,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("config", &self.config)
            .field("env", &self.env.current())
            .finish_non_exhaustive()
    }
}

impl Bridge {
    /// Build a bridge over `collaborators`.
    ///
    /// The configuration is validated first. When it carries a session key,
    /// the key is handed to the scanner before this returns.
    pub async fn new(collaborators: Collaborators, config: BridgeConfig) -> Result<Self> {
        config.validate()?;

        let events = EventDispatcher::new();
        let router = EventRouter::new(events.clone());
        let registry = Arc::new(Registry::new(
            Arc::clone(&collaborators.factory),
            Arc::clone(&collaborators.scanner),
            router.clone(),
        ));
        let scanner = ScannerFacade::new(Arc::clone(&collaborators.scanner), Arc::clone(&registry));
        let env = EnvSelector::new(config.env_mode);

        let scanner_gate = Arc::new(DeliveryGate::new());
        let scanner_subscription =
            router.attach_scanner(collaborators.scanner.state_stream(), Arc::clone(&scanner_gate));

        if let Some(session_key) = config.session_key.as_deref() {
            scanner.set_session_key(session_key).await?;
        }

        let context = CommandContext::new(
            Arc::clone(&registry),
            scanner.clone(),
            env.clone(),
            config.scan_on_create,
        );
        let commands = Dispatcher::spawn(context, config.command_capacity);

        info!(env = %env.current(), "Bridge ready");
        Ok(Self {
            config,
            events,
            registry,
            scanner,
            env,
            commands,
            scanner_gate,
            scanner_subscription: Mutex::new(Some(scanner_subscription)),
        })
    }

    /// The configuration the bridge was built with.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// The typed event dispatcher.
    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    /// Subscribe to events matching `filter`.
    pub fn subscribe(&self, filter: EventFilter) -> EventReceiver {
        self.events.subscribe(filter)
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn scanner(&self) -> &ScannerFacade {
        &self.scanner
    }

    pub fn env(&self) -> &EnvSelector {
        &self.env
    }

    /// Handle for submitting commands.
    pub fn commands(&self) -> &DispatcherHandle {
        &self.commands
    }

    /// Stop accepting commands, delete every handle and stop routing
    /// scanner state. Returns how many handles were deleted.
    ///
    /// A command already executing finishes first, so a handle it creates is
    /// deleted here too. Commands still queued fail with `BRIDGE_CLOSED`.
    pub async fn shutdown(&self) -> usize {
        self.commands.shutdown();
        self.commands.stopped().await;
        let cleared = self.registry.clear_all().await;

        self.scanner_gate.close().await;
        if let Some(subscription) = lock(&self.scanner_subscription).take() {
            subscription.release();
        }
        if self.registry.subscription_count() != 0 {
            warn!(
                remaining = self.registry.subscription_count(),
                "Device subscriptions outlived shutdown"
            );
        }
        info!(cleared, "Bridge shut down");
        cleared
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.commands.shutdown();
    }
}
