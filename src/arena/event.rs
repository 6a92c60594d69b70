//! Arena event log.

use std::fmt;

use super::player::Team;
use super::ArenaMode;

/// Something noteworthy that happened in an arena
#[derive(Debug, Clone, PartialEq)]
pub enum ArenaEvent {
    Join { nickname: String },
    Quit { nickname: String },
    NickChange { old: String, new: String },
    TeamChange { nickname: String, old: Team, new: Team },
    ModeChange(ArenaMode),
    EnvChoose(String),
    Chat { nickname: String, message: String },
    Broadcast(String),
}

impl fmt::Display for ArenaEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArenaEvent::Join { nickname } => write!(f, "{} joined the arena", nickname),
            ArenaEvent::Quit { nickname } => write!(f, "{} left the arena", nickname),
            ArenaEvent::NickChange { old, new } => write!(f, "{} is now known as {}", old, new),
            ArenaEvent::TeamChange { nickname, old, new } => {
                write!(f, "{} changed team {} -> {}", nickname, old, new)
            }
            ArenaEvent::ModeChange(mode) => write!(f, "mode changed to {:?}", mode),
            ArenaEvent::EnvChoose(env) => write!(f, "next environment: {}", env),
            ArenaEvent::Chat { nickname, message } => write!(f, "<{}> {}", nickname, message),
            ArenaEvent::Broadcast(message) => write!(f, "[server] {}", message),
        }
    }
}

/// Sink for arena events
pub trait ArenaLogger: Send {
    fn on_event(&mut self, event: &ArenaEvent);
}

/// Default logger, forwards events to `tracing`
#[derive(Debug, Default)]
pub struct TracingLogger {
    arena: String,
}

impl TracingLogger {
    pub fn new(arena: impl Into<String>) -> Self {
        Self {
            arena: arena.into(),
        }
    }
}

impl ArenaLogger for TracingLogger {
    fn on_event(&mut self, event: &ArenaEvent) {
        tracing::info!(target: "arena", arena = %self.arena, "{}", event);
    }
}

/// Logger that keeps every event, useful for clients that show a message log
#[derive(Debug, Default, Clone)]
pub struct EventBuffer {
    events: std::sync::Arc<parking_lot::Mutex<Vec<ArenaEvent>>>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every event recorded so far
    pub fn drain(&self) -> Vec<ArenaEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl ArenaLogger for EventBuffer {
    fn on_event(&mut self, event: &ArenaEvent) {
        self.events.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let event = ArenaEvent::NickChange {
            old: "a".into(),
            new: "b".into(),
        };
        assert_eq!(event.to_string(), "a is now known as b");
    }

    #[test]
    fn test_event_buffer_shares_storage() {
        let buffer = EventBuffer::new();
        let mut sink = buffer.clone();
        sink.on_event(&ArenaEvent::Broadcast("hi".into()));
        assert_eq!(buffer.drain(), vec![ArenaEvent::Broadcast("hi".into())]);
        assert!(buffer.drain().is_empty());
    }
}
