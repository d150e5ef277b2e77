//! Component id to mailbox routing.

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::ComponentMessage;
use wasm_host_common::{ComponentId, MessagingError};

/// Routing table from component id to mailbox sender.
#[derive(Debug, Default)]
pub struct MessageRouter {
    routes: DashMap<ComponentId, mpsc::Sender<ComponentMessage>>,
}

impl MessageRouter {
    /// Create an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Route messages for `component_id` into `mailbox`, replacing any previous route.
    pub fn register(&self, component_id: ComponentId, mailbox: mpsc::Sender<ComponentMessage>) {
        debug!(%component_id, "Route registered");
        self.routes.insert(component_id, mailbox);
    }

    /// Drop the route for `component_id`. Returns whether one existed.
    pub fn unregister(&self, component_id: &ComponentId) -> bool {
        let removed = self.routes.remove(component_id).is_some();
        if removed {
            debug!(%component_id, "Route removed");
        }
        removed
    }

    /// Drop the route for `component_id` only if it still leads to `mailbox`.
    pub fn unregister_mailbox(
        &self,
        component_id: &ComponentId,
        mailbox: &mpsc::Sender<ComponentMessage>,
    ) -> bool {
        let removed = self
            .routes
            .remove_if(component_id, |_, current| current.same_channel(mailbox))
            .is_some();
        if removed {
            debug!(%component_id, "Route removed");
        }
        removed
    }

    /// Whether `component_id` is routable.
    pub fn has_route(&self, component_id: &ComponentId) -> bool {
        self.routes.contains_key(component_id)
    }

    /// Number of routes.
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Deliver `message` to `to`'s mailbox, waiting for capacity.
    ///
    /// # Errors
    ///
    /// - [`MessagingError::TargetNotFound`] if there is no route
    /// - [`MessagingError::DeliveryFailed`] if the mailbox is closed
    pub async fn route(
        &self,
        to: &ComponentId,
        message: ComponentMessage,
    ) -> Result<(), MessagingError> {
        // Clone the sender so no map guard is held across the await.
        let mailbox = self
            .routes
            .get(to)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| MessagingError::TargetNotFound(to.to_string()))?;

        trace!(to = %to, kind = message.kind(), "Routing message");

        mailbox
            .send(message)
            .await
            .map_err(|_| MessagingError::DeliveryFailed(format!("mailbox for {to} is closed")))
    }
}
