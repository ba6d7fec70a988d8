//! Notifier that records every event.

use parking_lot::Mutex;

use crate::port::{Event, Notifier};

#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<Event>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Rejection codes, in order.
    pub fn rejection_codes(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Event::SignalRejected(r) => Some(r.code),
                _ => None,
            })
            .collect()
    }

    /// Number of events matching `pred`.
    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: Event) {
        self.events.lock().push(event);
    }
}
