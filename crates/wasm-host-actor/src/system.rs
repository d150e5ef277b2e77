//! Tokio-backed actor transport.
//!
//! Each actor runs on its own task with a bounded `mpsc` mailbox. Stopping
//! is signalled over a `watch` channel so it overtakes queued messages.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::Actor;
use wasm_host_common::TransportError;

type ActorTask = JoinHandle<Result<(), TransportError>>;

struct Lifecycle {
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<ActorTask>>,
}

/// Handle to a running actor.
///
/// Cheap to clone; every clone addresses the same actor.
pub struct ActorAddress<M> {
    id: Uuid,
    name: Arc<str>,
    mailbox: mpsc::Sender<M>,
    lifecycle: Arc<Lifecycle>,
}

impl<M> Clone for ActorAddress<M> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: Arc::clone(&self.name),
            mailbox: self.mailbox.clone(),
            lifecycle: Arc::clone(&self.lifecycle),
        }
    }
}

impl<M> fmt::Debug for ActorAddress<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorAddress")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}

impl<M> ActorAddress<M> {
    /// Unique id of this actor instance.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Name the actor was spawned with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A sender into the mailbox, for routing tables.
    pub fn mailbox(&self) -> mpsc::Sender<M> {
        self.mailbox.clone()
    }

    /// Enqueue a message, waiting for mailbox capacity.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::MailboxClosed`] if the actor has terminated.
    pub async fn send(&self, message: M) -> Result<(), TransportError> {
        self.mailbox
            .send(message)
            .await
            .map_err(|_| TransportError::MailboxClosed(self.name.to_string()))
    }

    /// Whether the actor has terminated or been asked to stop.
    pub fn is_stopped(&self) -> bool {
        *self.lifecycle.shutdown.borrow()
            || self.mailbox.is_closed()
            || self
                .lifecycle
                .task
                .lock()
                .as_ref()
                .is_none_or(JoinHandle::is_finished)
    }

    /// Ask the actor to stop and wait for `post_stop` to finish.
    ///
    /// Messages still queued are dropped. Stopping an already stopped actor
    /// returns `Ok(())`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::StopFailed`] if `post_stop` failed or the
    /// actor task panicked.
    pub async fn stop(&self) -> Result<(), TransportError> {
        self.lifecycle.shutdown.send_replace(true);

        let Some(task) = self.lifecycle.task.lock().take() else {
            return Ok(());
        };

        match task.await {
            Ok(result) => result,
            Err(e) => Err(TransportError::StopFailed {
                actor: self.name.to_string(),
                reason: format!("actor task failed: {e}"),
            }),
        }
    }
}

/// Spawns actors onto the tokio runtime.
#[derive(Debug, Clone)]
pub struct ActorSystem {
    mailbox_capacity: usize,
}

impl ActorSystem {
    /// Create a system whose actors get `mailbox_capacity` slots each.
    pub fn new(mailbox_capacity: usize) -> Self {
        Self {
            mailbox_capacity: mailbox_capacity.max(1),
        }
    }

    /// Mailbox slots per actor.
    pub fn mailbox_capacity(&self) -> usize {
        self.mailbox_capacity
    }

    /// Spawn `actor`, wait for `pre_start`, and return its address.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::StartFailed`] if `pre_start` failed or the
    /// actor task died before finishing it; the actor is not left running.
    pub async fn spawn<A: Actor>(
        &self,
        name: impl Into<String>,
        mut actor: A,
    ) -> Result<ActorAddress<A::Message>, TransportError> {
        let name: Arc<str> = Arc::from(name.into());
        let id = Uuid::new_v4();
        let (mailbox_tx, mut mailbox_rx) = mpsc::channel::<A::Message>(self.mailbox_capacity);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let (started_tx, started_rx) = oneshot::channel::<Result<(), A::Error>>();

        let span = info_span!("actor", name = %name, actor_id = %id);
        let task_name = Arc::clone(&name);

        let task = tokio::spawn(
            async move {
                if let Err(e) = actor.pre_start().await {
                    let _ = started_tx.send(Err(e));
                    return Ok(());
                }
                let _ = started_tx.send(Ok(()));
                debug!("Actor started");

                loop {
                    tokio::select! {
                        biased;
                        changed = shutdown_rx.changed() => {
                            if changed.is_err() || *shutdown_rx.borrow() {
                                break;
                            }
                        }
                        message = mailbox_rx.recv() => {
                            let Some(message) = message else { break };
                            if let Err(e) = actor.handle(message).await {
                                warn!(error = %e, "Actor failed to handle message");
                            }
                        }
                    }
                }

                mailbox_rx.close();

                match actor.post_stop().await {
                    Ok(()) => {
                        info!("Actor stopped");
                        Ok(())
                    }
                    Err(e) => {
                        warn!(error = %e, "Actor stop hook failed");
                        Err(TransportError::StopFailed {
                            actor: task_name.to_string(),
                            reason: e.to_string(),
                        })
                    }
                }
            }
            .instrument(span),
        );

        let address = ActorAddress {
            id,
            name,
            mailbox: mailbox_tx,
            lifecycle: Arc::new(Lifecycle {
                shutdown: shutdown_tx,
                task: Mutex::new(Some(task)),
            }),
        };

        let reason = match started_rx.await {
            Ok(Ok(())) => return Ok(address),
            Ok(Err(e)) => {
                let _ = address.stop().await;
                e.to_string()
            }
            // The task died before reporting, e.g. a panic in pre_start.
            Err(_) => match address.stop().await {
                Err(e) => e.to_string(),
                Ok(()) => "actor exited before starting".to_string(),
            },
        };

        warn!(%reason, "Actor failed to start");
        Err(TransportError::StartFailed {
            actor: address.name().to_string(),
            reason,
        })
    }
}

impl Default for ActorSystem {
    fn default() -> Self {
        Self::new(1024)
    }
}
