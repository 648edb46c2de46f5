//! Decision log: one live sink plus durable sinks, with graceful degradation.
//!
//! Logging never aborts a run. When a durable sink fails, the failure is
//! announced once on the live sink and the sink keeps being retried; the
//! announcement repeats only after it has recovered and failed again.

use std::io;
use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use parking_lot::Mutex;

use crate::logger::events::DecisionEvent;

/// Destination for decision events.
pub trait LogSink {
    fn name(&self) -> &'static str;
    fn write_event(&mut self, stamp: &DateTime<Local>, event: &DecisionEvent) -> io::Result<()>;
}

struct DurableSink {
    sink: Box<dyn LogSink>,
    degraded: bool,
}

/// Fan-out logger used by every stage of a run.
pub struct DecisionLog {
    live: Box<dyn LogSink>,
    durable: Vec<DurableSink>,
    recorded: usize,
}

impl DecisionLog {
    #[must_use]
    pub fn new(live: Box<dyn LogSink>) -> Self {
        Self {
            live,
            durable: Vec::new(),
            recorded: 0,
        }
    }

    /// A log that discards everything.
    #[must_use]
    pub fn silent() -> Self {
        Self::new(Box::new(NullSink))
    }

    pub fn add_durable(&mut self, sink: Box<dyn LogSink>) {
        self.durable.push(DurableSink {
            sink,
            degraded: false,
        });
    }

    /// Number of events recorded so far.
    #[must_use]
    pub const fn recorded(&self) -> usize {
        self.recorded
    }

    pub fn record(&mut self, event: DecisionEvent) {
        let stamp = Utc::now().with_timezone(&Local);
        self.recorded += 1;
        let _ = self.live.write_event(&stamp, &event);

        for durable in &mut self.durable {
            match durable.sink.write_event(&stamp, &event) {
                Ok(()) => durable.degraded = false,
                Err(e) if !durable.degraded => {
                    durable.degraded = true;
                    let warning = DecisionEvent::PersistFailure {
                        sink: durable.sink.name().to_string(),
                        details: e.to_string(),
                    };
                    let _ = self.live.write_event(&stamp, &warning);
                }
                Err(_) => {}
            }
        }
    }
}

impl std::fmt::Debug for DecisionLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionLog")
            .field("live", &self.live.name())
            .field("durable", &self.durable.len())
            .field("recorded", &self.recorded)
            .finish()
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl LogSink for NullSink {
    fn name(&self) -> &'static str {
        "null"
    }

    fn write_event(&mut self, _stamp: &DateTime<Local>, _event: &DecisionEvent) -> io::Result<()> {
        Ok(())
    }
}

/// In-memory capture, shareable with the code that inspects it.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<DecisionEvent>>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<DecisionEvent> {
        self.events.lock().clone()
    }
}

impl LogSink for MemorySink {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn write_event(&mut self, _stamp: &DateTime<Local>, event: &DecisionEvent) -> io::Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}
