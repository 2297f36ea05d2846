use crossbeam_channel::{unbounded, Receiver, Sender};

use super::types::MovieState;
use crate::reader::ReaderError;
use crate::types::{Rect, Size};

/// Notifications published by a [`Movie`](super::Movie).
#[derive(Debug, Clone, PartialEq)]
pub enum MovieEvent {
    StateChanged(MovieState),
    Started,
    /// Frame dimensions differ from the previous frame.
    Resized(Size),
    FrameChanged(usize),
    /// Area to repaint for the frame just announced.
    Updated(Rect),
    Error(ReaderError),
    Finished,
}

/// Fan-out of events to any number of channel subscribers.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<Sender<MovieEvent>>,
}

impl EventBus {
    pub fn subscribe(&mut self) -> Receiver<MovieEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    /// Deliver events in order to every live subscriber. Prunes dropped receivers.
    pub fn publish(&mut self, events: Vec<MovieEvent>) {
        if events.is_empty() {
            return;
        }
        self.subscribers.retain(|tx| {
            events.iter().all(|event| tx.send(event.clone()).is_ok())
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
