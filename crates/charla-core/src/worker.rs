//! Dedicated persistence thread.
//!
//! A single OS thread owns the store and drains a bounded FIFO of commands,
//! so writes land in exactly the order they were queued. Results go back to
//! the controller as [`ControllerEvent`]s.

use std::thread::JoinHandle;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::OwnedPermit;
use tracing::{debug, warn};

use crate::controller::ControllerEvent;
use crate::error::ChatError;
use crate::state::Message;
use crate::store::ConversationStore;

#[derive(Debug)]
enum StoreCommand {
    Append { index: usize, message: Message },
    ListAll,
}

/// A queue slot held for one future write.
pub struct AppendSlot(OwnedPermit<StoreCommand>);

impl AppendSlot {
    pub fn append(self, index: usize, message: Message) {
        self.0.send(StoreCommand::Append { index, message });
    }
}

pub struct StoreWorker {
    tx: Option<mpsc::Sender<StoreCommand>>,
    thread: Option<JoinHandle<()>>,
}

impl StoreWorker {
    pub fn spawn(
        store: Box<dyn ConversationStore>,
        capacity: usize,
        events: mpsc::UnboundedSender<ControllerEvent>,
    ) -> Result<Self, ChatError> {
        // A turn holds two slots at once.
        let (tx, mut rx) = mpsc::channel::<StoreCommand>(capacity.max(2));

        let thread = std::thread::Builder::new()
            .name("charla-store".to_string())
            .spawn(move || {
                let mut store = store;
                while let Some(command) = rx.blocking_recv() {
                    let event = match command {
                        StoreCommand::Append { index, message } => {
                            let result = store.append(&message);
                            if let Ok(id) = &result {
                                debug!(index, id, sender = message.sender.as_str(), "Message persisted");
                            }
                            ControllerEvent::Persisted { index, result }
                        }
                        StoreCommand::ListAll => ControllerEvent::History(store.list_all()),
                    };
                    if events.send(event).is_err() {
                        // Controller is gone; keep draining so queued writes still land.
                        debug!("Controller event channel closed");
                    }
                }
                debug!("Store worker stopped");
            })
            .map_err(|e| ChatError::Persistence(format!("Failed to start store worker: {}", e)))?;

        Ok(Self {
            tx: Some(tx),
            thread: Some(thread),
        })
    }

    /// Queue a full read; the result arrives as [`ControllerEvent::History`].
    pub fn list_all(&self) -> Result<(), ChatError> {
        self.enqueue(StoreCommand::ListAll)
    }

    /// Reserve the slots for a user message and its reply, or none at all.
    pub fn reserve_turn(&self) -> Result<(AppendSlot, AppendSlot), ChatError> {
        let user = self.reserve()?;
        let reply = self.reserve()?;
        Ok((user, reply))
    }

    /// Reserve a slot for a single write.
    pub fn reserve(&self) -> Result<AppendSlot, ChatError> {
        self.sender()?
            .clone()
            .try_reserve_owned()
            .map(AppendSlot)
            .map_err(|e| match e {
                TrySendError::Full(_) => ChatError::Persistence("store queue is full".to_string()),
                TrySendError::Closed(_) => ChatError::Persistence("store worker stopped".to_string()),
            })
    }

    fn sender(&self) -> Result<&mpsc::Sender<StoreCommand>, ChatError> {
        self.tx
            .as_ref()
            .ok_or_else(|| ChatError::Persistence("store is closed".to_string()))
    }

    fn enqueue(&self, command: StoreCommand) -> Result<(), ChatError> {
        self.sender()?.try_send(command).map_err(|e| match e {
            TrySendError::Full(cmd) => {
                warn!(?cmd, "Store queue full, dropping command");
                ChatError::Persistence("store queue is full".to_string())
            }
            TrySendError::Closed(_) => ChatError::Persistence("store worker stopped".to_string()),
        })
    }

    /// Close the queue, let the worker finish what is already queued, and
    /// wait for the thread to exit.
    pub async fn shutdown(mut self) {
        self.tx.take();
        if let Some(thread) = self.thread.take() {
            let joined = tokio::task::spawn_blocking(move || thread.join()).await;
            if !matches!(joined, Ok(Ok(()))) {
                warn!("Store worker did not shut down cleanly");
            }
        }
    }
}
