use agentflow_core::{new_id, AgentflowError, AgentflowResult};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AgentCreated,
    AgentInitialized,
    AgentPaused,
    AgentResumed,
    AgentStopped,
    TaskAssigned,
    TaskStarted,
    TaskCompleted,
    TaskFailed,
    TaskCancelled,
    ToolCallStarted,
    ToolCallCompleted,
    ToolCallFailed,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::AgentCreated => "agent_created",
            EventKind::AgentInitialized => "agent_initialized",
            EventKind::AgentPaused => "agent_paused",
            EventKind::AgentResumed => "agent_resumed",
            EventKind::AgentStopped => "agent_stopped",
            EventKind::TaskAssigned => "task_assigned",
            EventKind::TaskStarted => "task_started",
            EventKind::TaskCompleted => "task_completed",
            EventKind::TaskFailed => "task_failed",
            EventKind::TaskCancelled => "task_cancelled",
            EventKind::ToolCallStarted => "tool_call_started",
            EventKind::ToolCallCompleted => "tool_call_completed",
            EventKind::ToolCallFailed => "tool_call_failed",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status change published on an agent's channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub agent_id: String,
    pub kind: EventKind,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(agent_id: impl Into<String>, kind: EventKind, data: serde_json::Value) -> Self {
        Self {
            id: new_id(),
            agent_id: agent_id.into(),
            kind,
            data,
            timestamp: Utc::now(),
        }
    }

    /// `data.task_id` when the event concerns a task.
    pub fn task_id(&self) -> Option<&str> {
        self.data.get("task_id").and_then(serde_json::Value::as_str)
    }
}

/// One agent's bounded event channel.
///
/// Emitting never blocks: when the buffer is full the event is dropped and
/// counted. The channel owns the only sender, so [`EventChannel::close`] ends
/// the subscriber's stream once buffered events are drained.
pub struct EventChannel {
    agent_id: String,
    capacity: usize,
    tx: Mutex<Option<mpsc::Sender<Event>>>,
    rx: Mutex<Option<mpsc::Receiver<Event>>>,
    dropped: AtomicU64,
}

impl EventChannel {
    pub fn new(agent_id: impl Into<String>, capacity: usize) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Arc::new(Self {
            agent_id: agent_id.into(),
            capacity: capacity.max(1),
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
            dropped: AtomicU64::new(0),
        })
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Publish an event. Returns whether it was buffered.
    pub fn emit(&self, kind: EventKind, data: serde_json::Value) -> bool {
        let event = Event::new(self.agent_id.clone(), kind, data);
        let tx = self.tx.lock();
        let Some(tx) = tx.as_ref() else {
            debug!(agent_id = %self.agent_id, kind = %kind, "Event channel closed, discarding event");
            return false;
        };
        match tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    agent_id = %self.agent_id,
                    kind = %kind,
                    dropped,
                    "Event channel full, dropping event"
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(agent_id = %self.agent_id, kind = %kind, "Event receiver gone, discarding event");
                false
            }
        }
    }

    /// Take the receive side. Only one subscription may be outstanding; the
    /// receiver returns to the channel when the subscription is dropped.
    pub fn subscribe(self: &Arc<Self>) -> AgentflowResult<EventSubscription> {
        let rx = self
            .rx
            .lock()
            .take()
            .ok_or_else(|| AgentflowError::InvalidConfig("already subscribed".to_string()))?;
        Ok(EventSubscription {
            agent_id: self.agent_id.clone(),
            rx: Some(rx),
            home: Arc::downgrade(self),
        })
    }

    /// Stop accepting events. Idempotent.
    pub fn close(&self) {
        if self.tx.lock().take().is_some() {
            debug!(agent_id = %self.agent_id, "Closed event channel");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.lock().is_none()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Receive side of an agent's event channel.
pub struct EventSubscription {
    agent_id: String,
    rx: Option<mpsc::Receiver<Event>>,
    home: Weak<EventChannel>,
}

impl EventSubscription {
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Next event; `None` once the channel is closed and drained.
    pub async fn recv(&mut self) -> Option<Event> {
        match self.rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    /// Next buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.as_mut().and_then(|rx| rx.try_recv().ok())
    }

    /// Everything currently buffered.
    pub fn drain(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(event) = self.try_recv() {
            events.push(event);
        }
        events
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        if let (Some(rx), Some(channel)) = (self.rx.take(), self.home.upgrade()) {
            *channel.rx.lock() = Some(rx);
        }
    }
}

/// Map of live agents' event channels.
#[derive(Default)]
pub struct EventBus {
    channels: RwLock<HashMap<String, Arc<EventChannel>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, channel: Arc<EventChannel>) {
        self.channels
            .write()
            .insert(channel.agent_id().to_string(), channel);
    }

    pub fn get(&self, agent_id: &str) -> Option<Arc<EventChannel>> {
        self.channels.read().get(agent_id).cloned()
    }

    /// Publish on an agent's channel. Unknown agents are ignored.
    pub fn emit(&self, agent_id: &str, kind: EventKind, data: serde_json::Value) -> bool {
        match self.get(agent_id) {
            Some(channel) => channel.emit(kind, data),
            None => false,
        }
    }

    pub fn subscribe(&self, agent_id: &str) -> AgentflowResult<EventSubscription> {
        self.get(agent_id)
            .ok_or_else(|| AgentflowError::AgentNotFound(agent_id.to_string()))?
            .subscribe()
    }

    /// Remove and close an agent's channel. Idempotent.
    pub fn close(&self, agent_id: &str) {
        if let Some(channel) = self.channels.write().remove(agent_id) {
            channel.close();
        }
    }

    pub fn dropped(&self, agent_id: &str) -> AgentflowResult<u64> {
        self.get(agent_id)
            .map(|c| c.dropped())
            .ok_or_else(|| AgentflowError::AgentNotFound(agent_id.to_string()))
    }
}
