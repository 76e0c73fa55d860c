//! Diagnostics sink passed explicitly through Prepare and Apply.

use std::sync::Mutex;

use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Something the user should look at; never changes control flow.
    Warning(String),
    /// Rollout progress (object became ready, still waiting...).
    Progress(String),
    /// Final user-facing output such as the deploy summary.
    Report(String),
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);

    fn warn(&self, msg: String) {
        self.emit(Event::Warning(msg));
    }

    fn progress(&self, msg: String) {
        self.emit(Event::Progress(msg));
    }

    fn report(&self, msg: String) {
        self.emit(Event::Report(msg));
    }
}

/// Routes warnings and progress to `tracing` and prints reports on stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: Event) {
        match event {
            Event::Warning(m) => warn!(target: "kdeploy", "{}", m),
            Event::Progress(m) => info!(target: "kdeploy", "{}", m),
            Event::Report(m) => println!("{}", m),
        }
    }
}

/// Records every event; handy for tests and for embedding callers.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.filtered(|e| match e {
            Event::Warning(m) => Some(m.clone()),
            _ => None,
        })
    }

    pub fn progress_messages(&self) -> Vec<String> {
        self.filtered(|e| match e {
            Event::Progress(m) => Some(m.clone()),
            _ => None,
        })
    }

    pub fn reports(&self) -> Vec<String> {
        self.filtered(|e| match e {
            Event::Report(m) => Some(m.clone()),
            _ => None,
        })
    }

    fn filtered(&self, f: impl Fn(&Event) -> Option<String>) -> Vec<String> {
        self.events().iter().filter_map(f).collect()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: Event) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
