//! Streamed progress events for a search run.

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use super::graph::ThoughtId;

/// Typed progress event emitted during a search run.
///
/// Events form an ordered, append-only sequence. The tag field lets
/// consumers skip event names they do not recognize. Sibling
/// `thought_generated` events within one depth may arrive in any order.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SearchEvent {
    DepthStart {
        depth: usize,
    },
    ThoughtGenerated {
        id: ThoughtId,
        depth: usize,
        content: String,
    },
    ThoughtScored {
        id: ThoughtId,
        score: f64,
    },
    AggregationComplete {
        id: ThoughtId,
        parents: Vec<ThoughtId>,
    },
    GenerationFailed {
        id: ThoughtId,
        error: String,
    },
    EvaluationFailed {
        id: ThoughtId,
        error: String,
    },
    Progress {
        thoughts: usize,
        max_thoughts: usize,
    },
    Done {
        total_thoughts: usize,
    },
    Error {
        message: String,
    },
}

/// Optional event channel; a send failure means the consumer went away,
/// which never affects the run.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    sender: Option<UnboundedSender<SearchEvent>>,
}

impl EventSink {
    /// Sink that forwards events to the given channel
    pub fn new(sender: Option<UnboundedSender<SearchEvent>>) -> Self {
        Self { sender }
    }

    /// Emit an event, ignoring a disconnected consumer.
    pub fn emit(&self, event: SearchEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(event);
        }
    }
}
