use crate::cache::ConnectionHandle;
use slotmap::{new_key_type, SlotMap};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Instant;
use tokio::sync::mpsc;

new_key_type! {
    /// A timer registered with a [`Reactor`]; stays valid until it fires or is cancelled.
    pub struct TimerId;
}

struct TimerEntry {
    deadline: Instant,
    data: TimerData,
}

/// Opaque payload a caller attaches to a timer, returned verbatim in
/// [`ReactorEvent::TimerFired`]. The connection-lifecycle variants carry the
/// [`ConnectionHandle`] they were armed for so [`crate::cache::ConnectionCache::poll_timers`]
/// can tell which cached connection a fired timer belongs to.
#[derive(Debug, Clone)]
pub enum TimerData {
    Idle(ConnectionHandle),
    Accept(ConnectionHandle),
    Keepalive(ConnectionHandle),
    KeepaliveResponse(ConnectionHandle),
    User(u64),
}

/// An entry enqueued onto the reactor's wake-up queue from another thread:
/// `(handler id, opaque data)`, invoked on the reactor thread in FIFO order.
#[derive(Debug, Clone)]
pub struct WakeEntry {
    pub handler: u64,
    pub data: u64,
}

pub enum ReactorEvent {
    TimerFired { timer: TimerId, data: TimerData },
    Wake(WakeEntry),
}

/// Single-threaded event loop core: a timer wheel plus a thread-safe wake-up
/// queue. Socket readiness itself is not modeled here — reading OS sockets is
/// the embedding application's job; the reactor only sequences timers and
/// cross-thread notifications so engine state is touched from one thread.
pub struct Reactor {
    timers: SlotMap<TimerId, TimerEntry>,
    heap: BinaryHeap<Reverse<(Instant, TimerId)>>,
    wake_tx: mpsc::UnboundedSender<WakeEntry>,
    wake_rx: mpsc::UnboundedReceiver<WakeEntry>,
}

impl Reactor {
    pub fn new() -> Self {
        let (wake_tx, wake_rx) = mpsc::unbounded_channel();
        Self {
            timers: SlotMap::with_key(),
            heap: BinaryHeap::new(),
            wake_tx,
            wake_rx,
        }
    }

    /// A cloneable sender other threads use to enqueue wake-up entries.
    pub fn wake_queue(&self) -> mpsc::UnboundedSender<WakeEntry> {
        self.wake_tx.clone()
    }

    pub fn register_timer(&mut self, deadline: Instant, data: TimerData) -> TimerId {
        let id = self.timers.insert(TimerEntry { deadline, data });
        self.heap.push(Reverse((deadline, id)));
        id
    }

    pub fn cancel_timer(&mut self, id: TimerId) {
        self.timers.remove(id);
    }

    /// Earliest deadline across all live timers, for the caller's own sleep/select.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|Reverse((deadline, _))| *deadline)
    }

    /// Drain every timer due at or before `now` plus every pending wake entry.
    pub fn poll(&mut self, now: Instant) -> Vec<ReactorEvent> {
        let mut events = Vec::new();

        while let Some(&Reverse((deadline, id))) = self.heap.peek() {
            if deadline > now {
                break;
            }
            self.heap.pop();
            // the timer may have been cancelled (removed from the slotmap)
            // or rescheduled (a stale heap entry for an old deadline); only
            // the entry whose deadline matches what's still stored fires.
            if let Some(entry) = self.timers.get(id) {
                if entry.deadline != deadline {
                    continue;
                }
                let data = entry.data.clone();
                self.timers.remove(id);
                events.push(ReactorEvent::TimerFired { timer: id, data });
            }
        }

        while let Ok(entry) = self.wake_rx.try_recv() {
            events.push(ReactorEvent::Wake(entry));
        }

        events
    }
}

impl Default for Reactor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn timers_fire_in_deadline_order() {
        let mut r = Reactor::new();
        let base = Instant::now();
        let late = r.register_timer(base + Duration::from_millis(200), TimerData::User(1));
        let early = r.register_timer(base + Duration::from_millis(50), TimerData::User(2));

        let events = r.poll(base + Duration::from_millis(100));
        assert_eq!(events.len(), 1);
        match &events[0] {
            ReactorEvent::TimerFired { timer, .. } => assert_eq!(*timer, early),
            _ => panic!("expected a timer"),
        }

        let events = r.poll(base + Duration::from_millis(300));
        assert_eq!(events.len(), 1);
        match &events[0] {
            ReactorEvent::TimerFired { timer, .. } => assert_eq!(*timer, late),
            _ => panic!("expected a timer"),
        }
    }

    #[test]
    fn cancelled_timer_never_fires() {
        let mut r = Reactor::new();
        let now = Instant::now();
        let id = r.register_timer(now + Duration::from_millis(10), TimerData::User(0));
        r.cancel_timer(id);
        let events = r.poll(now + Duration::from_secs(1));
        assert!(events.is_empty());
    }

    #[test]
    fn wake_queue_entries_are_drained_fifo() {
        let mut r = Reactor::new();
        let tx = r.wake_queue();
        tx.send(WakeEntry { handler: 1, data: 10 }).unwrap();
        tx.send(WakeEntry { handler: 1, data: 20 }).unwrap();

        let events = r.poll(Instant::now());
        assert_eq!(events.len(), 2);
        let datas: Vec<u64> = events
            .into_iter()
            .map(|e| match e {
                ReactorEvent::Wake(w) => w.data,
                _ => panic!("expected a wake entry"),
            })
            .collect();
        assert_eq!(datas, vec![10, 20]);
    }
}
