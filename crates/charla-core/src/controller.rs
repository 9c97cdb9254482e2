//! The conversation controller.
//!
//! Owns the in-memory message list and keeps it in step with the persisted
//! log and the view. Every mutation happens on the task that owns the
//! controller: background work (the model call, store writes, voice capture)
//! reports back through [`ControllerEvent`]s, which the owner feeds into
//! [`Controller::handle_event`].

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::ai::ConversationService;
use crate::error::ChatError;
use crate::state::Message;
use crate::store::ConversationStore;
use crate::voice::VoiceCapture;
use crate::worker::{AppendSlot, StoreWorker};

/// Bot text used when the model answers without any text.
pub const EMPTY_REPLY_FALLBACK: &str = "Error";

/// Completions of background work, applied by [`Controller::handle_event`].
#[derive(Debug)]
pub enum ControllerEvent {
    Reply(Result<Option<String>, ChatError>),
    Persisted {
        index: usize,
        result: Result<i64, ChatError>,
    },
    History(Result<Vec<Message>, ChatError>),
    Voice(Result<Option<String>, ChatError>),
}

/// Notifications a renderer needs to mirror the conversation.
pub trait ChatView {
    /// The whole list changed; redraw from scratch.
    fn reset(&mut self, messages: &[Message]);
    /// `message` was appended at `index`.
    fn inserted(&mut self, index: usize, message: &Message);
    fn busy(&mut self, busy: bool);
    /// A transcript should replace whatever is in the input field.
    fn input_replaced(&mut self, text: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HistoryState {
    NotRequested,
    Loading,
    Loaded,
}

pub struct Controller {
    messages: Vec<Message>,
    service: Arc<dyn ConversationService>,
    voice: Arc<dyn VoiceCapture>,
    store: StoreWorker,
    events: mpsc::UnboundedSender<ControllerEvent>,
    in_flight: Option<JoinHandle<()>>,
    reply_slot: Option<AppendSlot>,
    history: HistoryState,
    pending_writes: usize,
    capturing: bool,
}

impl Controller {
    /// Take ownership of an opened store and start its worker thread.
    ///
    /// The returned receiver must be drained by the same task that owns the
    /// controller, passing each event to [`Controller::handle_event`].
    pub fn new(
        store: Box<dyn ConversationStore>,
        service: Arc<dyn ConversationService>,
        voice: Arc<dyn VoiceCapture>,
        store_queue_capacity: usize,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ControllerEvent>), ChatError> {
        let (events, events_rx) = mpsc::unbounded_channel();
        let store = StoreWorker::spawn(store, store_queue_capacity, events.clone())?;

        let controller = Self {
            messages: Vec::new(),
            service,
            voice,
            store,
            events,
            in_flight: None,
            reply_slot: None,
            history: HistoryState::NotRequested,
            pending_writes: 0,
            capturing: false,
        };
        Ok((controller, events_rx))
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn is_history_loaded(&self) -> bool {
        self.history == HistoryState::Loaded
    }

    /// Nothing outstanding: history loaded, no reply pending, every queued
    /// write acknowledged, no capture running.
    pub fn is_settled(&self) -> bool {
        self.is_history_loaded() && !self.is_busy() && self.pending_writes == 0 && !self.capturing
    }

    /// Read the persisted log once at startup.
    pub fn load_history(&mut self) {
        if self.history != HistoryState::NotRequested {
            debug!("History already requested");
            return;
        }

        match self.store.list_all() {
            Ok(()) => self.history = HistoryState::Loading,
            Err(e) => {
                warn!(error = %e, "Could not queue history load");
                self.history = HistoryState::Loaded;
            }
        }
    }

    /// Send a prompt. The user message is shown immediately; the reply
    /// follows as a [`ControllerEvent::Reply`].
    ///
    /// Only one request may be outstanding: a submit while a reply is pending
    /// fails with [`ChatError::RequestInFlight`] and changes nothing. Storage
    /// for both halves of the turn is reserved first; when the store queue
    /// has no room the submit fails with [`ChatError::Persistence`].
    pub fn submit(&mut self, prompt: &str, view: &mut dyn ChatView) -> Result<(), ChatError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ChatError::EmptyPrompt);
        }
        if !self.is_history_loaded() {
            return Err(ChatError::HistoryLoading);
        }
        if self.is_busy() {
            return Err(ChatError::RequestInFlight);
        }

        let (user_slot, reply_slot) = self.store.reserve_turn().map_err(|e| {
            warn!(error = %e, "No room in the store queue for a new turn");
            e
        })?;
        self.reply_slot = Some(reply_slot);
        self.append(Message::user(prompt), user_slot, view);

        view.busy(true);
        let service = Arc::clone(&self.service);
        let events = self.events.clone();
        let prompt = prompt.to_string();
        self.in_flight = Some(tokio::spawn(async move {
            // Run the call in its own task so a panic still produces a reply.
            let call = tokio::spawn(async move { service.generate(&prompt).await });
            let result = match call.await {
                Ok(result) => result,
                Err(e) => Err(ChatError::Service(format!("request task failed: {}", e))),
            };
            let _ = events.send(ControllerEvent::Reply(result));
        }));

        Ok(())
    }

    /// Fill the input field from speech. Asks for microphone permission
    /// first when needed; never submits anything.
    pub fn capture_voice_input(&mut self) {
        if self.capturing {
            debug!("Voice capture already running");
            return;
        }
        self.capturing = true;

        let voice = Arc::clone(&self.voice);
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = if voice.has_permission() || voice.request_permission().await {
                voice.capture().await
            } else {
                Err(ChatError::PermissionDenied)
            };
            let _ = events.send(ControllerEvent::Voice(result));
        });
    }

    pub fn handle_event(&mut self, event: ControllerEvent, view: &mut dyn ChatView) {
        match event {
            ControllerEvent::Reply(result) => {
                self.in_flight = None;
                let text = match result {
                    Ok(Some(text)) if !text.is_empty() => text,
                    Ok(_) => {
                        debug!("Model returned no text");
                        EMPTY_REPLY_FALLBACK.to_string()
                    }
                    Err(e) => {
                        warn!(error = %e, "Model request failed");
                        format!("Error: {}", e)
                    }
                };
                match self.reply_slot.take() {
                    Some(slot) => self.append(Message::bot(text), slot, view),
                    None => warn!("Reply arrived without a reserved store slot"),
                }
                view.busy(false);
            }
            ControllerEvent::Persisted { index, result } => {
                self.pending_writes = self.pending_writes.saturating_sub(1);
                match result {
                    Ok(id) => {
                        if let Some(message) = self.messages.get_mut(index) {
                            message.id = Some(id);
                        }
                    }
                    Err(e) => warn!(index, error = %e, "Failed to persist message"),
                }
            }
            ControllerEvent::History(result) => {
                self.history = HistoryState::Loaded;
                match result {
                    Ok(messages) => {
                        info!(count = messages.len(), "Loaded conversation history");
                        self.messages = messages;
                    }
                    Err(e) => warn!(
                        error = %e,
                        "Failed to load conversation history; new messages follow rows that are not shown"
                    ),
                }
                view.reset(&self.messages);
            }
            ControllerEvent::Voice(result) => {
                self.capturing = false;
                match result {
                    Ok(Some(transcript)) => view.input_replaced(&transcript),
                    Ok(None) => debug!("Voice capture heard nothing"),
                    Err(ChatError::PermissionDenied) => debug!("Microphone permission denied"),
                    Err(e) => warn!(error = %e, "Voice capture failed"),
                }
            }
        }
    }

    /// Stop any pending request and close the store after its queued
    /// writes have landed.
    pub async fn shutdown(mut self) {
        if let Some(task) = self.in_flight.take() {
            task.abort();
        }
        // A held slot keeps the queue open.
        self.reply_slot.take();
        self.store.shutdown().await;
    }

    fn append(&mut self, message: Message, slot: AppendSlot, view: &mut dyn ChatView) {
        let index = self.messages.len();
        self.messages.push(message.clone());
        view.inserted(index, &self.messages[index]);

        slot.append(index, message);
        self.pending_writes += 1;
    }
}
