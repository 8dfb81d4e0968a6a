// SPDX-License-Identifier: MIT

//! Run events
//!
//! Each workflow instance owns its own `EventDispatcher`; there is no
//! process-wide event bus. Subscribers are unbounded `mpsc` senders, so a
//! caller may await the run and drain its receiver afterwards.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum FlowEvent {
    FlowStarted {
        instance_id: String,
        flow: String,
        resumed: bool,
    },
    StepStarted {
        instance_id: String,
        step: String,
    },
    StepCompleted {
        instance_id: String,
        step: String,
        output: Value,
    },
    StepFailed {
        instance_id: String,
        step: String,
        error: String,
    },
    FlowFinished {
        instance_id: String,
        output: Value,
    },
}

impl FlowEvent {
    /// Step the event refers to, if any
    pub fn step(&self) -> Option<&str> {
        match self {
            FlowEvent::StepStarted { step, .. }
            | FlowEvent::StepCompleted { step, .. }
            | FlowEvent::StepFailed { step, .. } => Some(step),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct EventDispatcher {
    subscribers: Vec<EventSender>,
}

pub type EventSender = mpsc::UnboundedSender<FlowEvent>;

pub type EventReceiver = mpsc::UnboundedReceiver<FlowEvent>;

/// Create a channel suitable for `Flow::kickoff_with_events`
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, tx: EventSender) {
        self.subscribers.push(tx);
    }

    /// Deliver an event to every live subscriber; closed subscribers are
    /// dropped.
    pub fn emit(&mut self, event: FlowEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_emit_to_subscribers() {
        let (tx1, mut rx1) = event_channel();
        let (tx2, mut rx2) = event_channel();
        let mut dispatcher = EventDispatcher::new();
        dispatcher.subscribe(tx1);
        dispatcher.subscribe(tx2);

        let event = FlowEvent::StepCompleted {
            instance_id: "run".to_string(),
            step: "a".to_string(),
            output: json!(1),
        };
        dispatcher.emit(event.clone());

        assert_eq!(rx1.recv().await, Some(event.clone()));
        assert_eq!(rx2.recv().await, Some(event));
    }

    #[tokio::test]
    async fn test_closed_subscriber_is_dropped() {
        let (tx, rx) = event_channel();
        let mut dispatcher = EventDispatcher::new();
        dispatcher.subscribe(tx);
        drop(rx);

        dispatcher.emit(FlowEvent::FlowFinished {
            instance_id: "run".to_string(),
            output: json!(null),
        });
        assert_eq!(dispatcher.subscriber_count(), 0);
    }

    #[test]
    fn test_emit_never_waits_on_reader() {
        let (tx, mut rx) = event_channel();
        let mut dispatcher = EventDispatcher::new();
        dispatcher.subscribe(tx);

        for i in 0..500 {
            dispatcher.emit(FlowEvent::StepStarted {
                instance_id: "run".to_string(),
                step: format!("s{}", i),
            });
        }

        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, 500);
    }

    #[test]
    fn test_event_step_accessor() {
        let started = FlowEvent::StepStarted {
            instance_id: "run".to_string(),
            step: "draft".to_string(),
        };
        assert_eq!(started.step(), Some("draft"));
        let finished = FlowEvent::FlowFinished {
            instance_id: "run".to_string(),
            output: json!(null),
        };
        assert_eq!(finished.step(), None);
    }
}
