//! The actor contract.

use async_trait::async_trait;

/// An isolated unit that processes its mailbox one message at a time.
///
/// The [`ActorSystem`](crate::ActorSystem) owns the actor once spawned:
/// `pre_start` runs before the address is handed out, `handle` runs for each
/// message in order, and `post_stop` runs once after shutdown is requested.
#[async_trait]
pub trait Actor: Send + 'static {
    /// Mailbox message type.
    type Message: Send + 'static;

    /// Error returned by the hooks.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Called once before the first message. An error aborts the spawn.
    async fn pre_start(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Process one message. An error is logged and the actor keeps running.
    async fn handle(&mut self, message: Self::Message) -> Result<(), Self::Error>;

    /// Called once after the mailbox stops being read. An error makes
    /// [`ActorAddress::stop`](crate::ActorAddress::stop) fail.
    async fn post_stop(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
