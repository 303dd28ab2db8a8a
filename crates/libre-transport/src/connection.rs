use crate::reactor::TimerId;
use libre_buf::Buffer;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flavor {
    Tcp,
    Tls,
    Ws,
    Wss,
}

impl Flavor {
    pub fn is_secure(self) -> bool {
        matches!(self, Flavor::Tls | Flavor::Wss)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConnectionConfig {
    pub idle_timeout: Duration,
    pub accept_timeout: Duration,
    pub keepalive_interval: Option<Duration>,
    pub keepalive_response_timeout: Duration,
    pub reassembly_cap: usize,
}

impl ConnectionConfig {
    /// Defaults for SIP/BFCP-flavored connections: 900s idle, 32s accept,
    /// no keepalive unless the caller opts in, 65536-byte reassembly cap.
    pub fn new() -> Self {
        Self {
            idle_timeout: Duration::from_secs(900),
            accept_timeout: Duration::from_secs(32),
            keepalive_interval: None,
            keepalive_response_timeout: Duration::from_secs(10),
            reassembly_cap: 65_536,
        }
    }

    /// HTTP/RTMP-flavored connections: same timers, a wider 524288-byte cap.
    pub fn with_large_reassembly_cap() -> Self {
        Self {
            reassembly_cap: 524_288,
            ..Self::new()
        }
    }

    /// A 120s heartbeat interval must be at least twice the response timeout.
    pub fn with_keepalive(mut self, interval: Duration) -> Self {
        assert!(interval >= 2 * self.keepalive_response_timeout, "keepalive interval must be >= 2x response timeout");
        self.keepalive_interval = Some(interval);
        self
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new()
    }
}

pub struct PendingSend {
    pub bytes: Vec<u8>,
    pub completion: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Accepting,
    Connecting,
    Established,
    Closed,
}

/// A stream-flavor transport connection, shared by every protocol engine
/// that happens to route through the same `(peer, flavor)` 5-tuple.
pub struct Connection {
    pub peer: SocketAddr,
    pub local: SocketAddr,
    pub flavor: Flavor,
    pub state: ConnectionState,
    pub reassembly: Buffer,
    pub reassembly_cap: usize,
    pub send_queue: Vec<PendingSend>,
    pub users: usize,
    pub last_activity: Instant,
    pub keepalive_subscribers: Vec<u64>,
    next_completion: u64,
    /// Reactor-registered timers armed for this connection by
    /// [`crate::cache::ConnectionCache`]; `None` when the corresponding timer
    /// isn't currently armed (e.g. `accept_timer` once established, or
    /// `keepalive_timer`/`keepalive_response_timer` when no keepalive is
    /// configured).
    pub idle_timer: Option<TimerId>,
    pub accept_timer: Option<TimerId>,
    pub keepalive_timer: Option<TimerId>,
    pub keepalive_response_timer: Option<TimerId>,
}

impl Connection {
    pub fn new(peer: SocketAddr, local: SocketAddr, flavor: Flavor, cap: usize, now: Instant) -> Self {
        Self {
            peer,
            local,
            flavor,
            state: ConnectionState::Connecting,
            reassembly: Buffer::with_capacity(4096),
            reassembly_cap: cap,
            send_queue: Vec::new(),
            users: 0,
            last_activity: now,
            keepalive_subscribers: Vec::new(),
            next_completion: 1,
            idle_timer: None,
            accept_timer: None,
            keepalive_timer: None,
            keepalive_response_timer: None,
        }
    }

    pub fn enqueue(&mut self, bytes: Vec<u8>) -> u64 {
        let completion = self.next_completion;
        self.next_completion += 1;
        self.send_queue.push(PendingSend { bytes, completion });
        completion
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic]
    fn keepalive_interval_below_twice_response_timeout_panics() {
        ConnectionConfig::new().with_keepalive(Duration::from_secs(5));
    }

    #[test]
    fn enqueue_assigns_increasing_completion_ids() {
        let mut c = Connection::new(
            "127.0.0.1:1".parse().unwrap(),
            "127.0.0.1:2".parse().unwrap(),
            Flavor::Tcp,
            65536,
            Instant::now(),
        );
        let a = c.enqueue(vec![1]);
        let b = c.enqueue(vec![2]);
        assert!(b > a);
        assert_eq!(c.send_queue.len(), 2);
    }
}
