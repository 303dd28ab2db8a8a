use crate::connection::{Connection, ConnectionConfig, ConnectionState, Flavor};
use crate::reactor::{Reactor, ReactorEvent, TimerData};
use crate::Error;
use slotmap::{new_key_type, SlotMap};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;
use tracing::{debug, warn};

new_key_type! {
    pub struct ConnectionHandle;
}

/// Events the embedding application must act on: write bytes to a real
/// socket, fail a caller's completion, or notify a keepalive subscriber.
/// The cache never touches a socket itself.
pub enum TransportEvent {
    WriteBytes {
        connection: ConnectionHandle,
        bytes: Vec<u8>,
    },
    Connect {
        connection: ConnectionHandle,
        peer: SocketAddr,
    },
    Completion {
        connection: ConnectionHandle,
        completion: u64,
        result: Result<(), Error>,
    },
    KeepaliveDue {
        connection: ConnectionHandle,
    },
    Closed {
        connection: ConnectionHandle,
        err: Option<Error>,
    },
}

/// Stream-transport connection cache keyed by `(peer, flavor)`, per spec
/// §4.1: find-or-create on send, per-connection FIFO send queue drained on
/// establishment, accept/idle/keepalive timers, multi-user lifetime.
///
/// The cache owns a private [`Reactor`] purely to schedule its own
/// accept/idle/keepalive timers (spec.md:86); it is not the application's
/// main event loop. [`Self::poll_timers`] must be driven periodically (or
/// whenever [`Self::next_timer_deadline`] says one is due) for those timers
/// to actually evict connections.
pub struct ConnectionCache {
    connections: SlotMap<ConnectionHandle, Connection>,
    index: HashMap<(SocketAddr, Flavor), ConnectionHandle>,
    config: ConnectionConfig,
    reactor: Reactor,
}

impl ConnectionCache {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            connections: SlotMap::with_key(),
            index: HashMap::new(),
            config,
            reactor: Reactor::new(),
        }
    }

    /// Earliest deadline among this cache's own accept/idle/keepalive
    /// timers, for a caller folding `poll_timers` into a larger event loop.
    pub fn next_timer_deadline(&self) -> Option<Instant> {
        self.reactor.next_deadline()
    }

    pub fn get(&self, handle: ConnectionHandle) -> Option<&Connection> {
        self.connections.get(handle)
    }

    /// Direct mutable access for protocol engines that need to drain framed
    /// messages out of `Connection::reassembly` themselves (the cache only
    /// knows how to append to it, via [`Self::feed`]).
    pub fn get_mut(&mut self, handle: ConnectionHandle) -> Option<&mut Connection> {
        self.connections.get_mut(handle)
    }

    /// Find or create the connection for `(peer, flavor)`, enqueue `bytes`
    /// for it, and drive it towards establishment if this is a fresh
    /// connection (the caller is expected to actually open the socket on
    /// seeing [`TransportEvent::Connect`]).
    pub fn send(&mut self, local: SocketAddr, peer: SocketAddr, flavor: Flavor, bytes: Vec<u8>, now: Instant) -> (ConnectionHandle, u64, Vec<TransportEvent>) {
        let mut events = Vec::new();
        let handle = match self.index.get(&(peer, flavor)) {
            Some(&h) => h,
            None => {
                let conn = Connection::new(peer, local, flavor, self.config.reassembly_cap, now);
                let handle = self.connections.insert(conn);
                self.index.insert((peer, flavor), handle);
                events.push(TransportEvent::Connect { connection: handle, peer });
                handle
            }
        };

        self.touch(handle, now);
        let completion = self.connections[handle].enqueue(bytes);

        if self.connections[handle].state == ConnectionState::Established {
            self.drain(handle, &mut events);
        }

        (handle, completion, events)
    }

    /// The caller's transport connected (or TLS/DTLS handshake completed);
    /// flip to established, cancel the accept timer, arm keepalive if
    /// configured, and drain anything queued while connecting.
    pub fn mark_established(&mut self, handle: ConnectionHandle, now: Instant) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        if let Some(conn) = self.connections.get_mut(handle) {
            conn.state = ConnectionState::Established;
            debug!(?handle, peer = %conn.peer, "connection established");
        }
        if let Some(accept_timer) = self.connections.get_mut(handle).and_then(|c| c.accept_timer.take()) {
            self.reactor.cancel_timer(accept_timer);
        }
        self.touch(handle, now);
        self.arm_keepalive_timer(handle, now);
        self.drain(handle, &mut events);
        events
    }

    /// Reset `last_activity` and rearm the idle timer (spec.md:220: "reset
    /// on every successful I/O"). A no-op if `handle` isn't cached.
    fn touch(&mut self, handle: ConnectionHandle, now: Instant) {
        if let Some(conn) = self.connections.get_mut(handle) {
            conn.touch(now);
        } else {
            return;
        }
        self.arm_idle_timer(handle, now);
    }

    fn arm_idle_timer(&mut self, handle: ConnectionHandle, now: Instant) {
        if let Some(old) = self.connections.get_mut(handle).and_then(|c| c.idle_timer.take()) {
            self.reactor.cancel_timer(old);
        }
        let deadline = now + self.config.idle_timeout;
        let timer = self.reactor.register_timer(deadline, TimerData::Idle(handle));
        match self.connections.get_mut(handle) {
            Some(conn) => conn.idle_timer = Some(timer),
            None => self.reactor.cancel_timer(timer),
        }
    }

    fn arm_keepalive_timer(&mut self, handle: ConnectionHandle, now: Instant) {
        let Some(interval) = self.config.keepalive_interval else { return };
        if let Some(old) = self.connections.get_mut(handle).and_then(|c| c.keepalive_timer.take()) {
            self.reactor.cancel_timer(old);
        }
        let deadline = now + interval;
        let timer = self.reactor.register_timer(deadline, TimerData::Keepalive(handle));
        match self.connections.get_mut(handle) {
            Some(conn) => conn.keepalive_timer = Some(timer),
            None => self.reactor.cancel_timer(timer),
        }
    }

    /// The caller observed a keepalive response (e.g. the CRLF-CRLF pong):
    /// cancel the pending response deadline and rearm the next heartbeat.
    pub fn note_keepalive_response(&mut self, handle: ConnectionHandle, now: Instant) {
        if let Some(old) = self.connections.get_mut(handle).and_then(|c| c.keepalive_response_timer.take()) {
            self.reactor.cancel_timer(old);
        }
        self.touch(handle, now);
        self.arm_keepalive_timer(handle, now);
    }

    /// Drive this cache's own accept/idle/keepalive timers: evicts
    /// idle-timed-out connections with no remaining users (spec.md:224,
    /// "refcount 1 (cache-only)"), fails accept-timed-out and
    /// keepalive-response-timed-out connections outright, and turns a fired
    /// keepalive tick into a [`TransportEvent::KeepaliveDue`] plus an armed
    /// response deadline. Must be called periodically (see
    /// [`Self::next_timer_deadline`]) for §4.1's timers to have any effect.
    pub fn poll_timers(&mut self, now: Instant) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        let fired: Vec<TimerData> = self
            .reactor
            .poll(now)
            .into_iter()
            .filter_map(|e| match e {
                ReactorEvent::TimerFired { data, .. } => Some(data),
                ReactorEvent::Wake(_) => None,
            })
            .collect();

        for data in fired {
            match data {
                TimerData::Idle(handle) => {
                    let users = self.connections.get(handle).map(|c| c.users);
                    if users == Some(0) {
                        debug!(?handle, "idle timeout, evicting cache-only connection");
                        self.unlink(handle, None, &mut events);
                    }
                    // users > 0: still actively held by a caller; nothing
                    // idle-evicts a connection an engine is still using.
                }
                TimerData::Accept(handle) => {
                    warn!(?handle, "accept timeout");
                    self.unlink(handle, Some(Error::Timeout), &mut events);
                }
                TimerData::Keepalive(handle) => {
                    if matches!(self.connections.get(handle), Some(c) if c.state == ConnectionState::Established) {
                        events.push(TransportEvent::KeepaliveDue { connection: handle });
                        let deadline = now + self.config.keepalive_response_timeout;
                        let timer = self.reactor.register_timer(deadline, TimerData::KeepaliveResponse(handle));
                        if let Some(conn) = self.connections.get_mut(handle) {
                            conn.keepalive_response_timer = Some(timer);
                        }
                    }
                }
                TimerData::KeepaliveResponse(handle) => {
                    warn!(?handle, "keepalive response timeout");
                    self.unlink(handle, Some(Error::Timeout), &mut events);
                }
                TimerData::User(_) => {}
            }
        }

        events
    }

    fn drain(&mut self, handle: ConnectionHandle, events: &mut Vec<TransportEvent>) {
        let Some(conn) = self.connections.get_mut(handle) else { return };
        for pending in conn.send_queue.drain(..) {
            events.push(TransportEvent::WriteBytes { connection: handle, bytes: pending.bytes });
            events.push(TransportEvent::Completion { connection: handle, completion: pending.completion, result: Ok(()) });
        }
    }

    /// Register an inbound stream as accepted; starts the 32s accept timer
    /// (spec.md:86) which [`Self::poll_timers`] enforces.
    pub fn accept(&mut self, local: SocketAddr, peer: SocketAddr, flavor: Flavor, now: Instant) -> ConnectionHandle {
        let mut conn = Connection::new(peer, local, flavor, self.config.reassembly_cap, now);
        conn.state = ConnectionState::Accepting;
        let handle = self.connections.insert(conn);
        self.index.insert((peer, flavor), handle);
        let deadline = now + self.config.accept_timeout;
        let timer = self.reactor.register_timer(deadline, TimerData::Accept(handle));
        self.connections[handle].accept_timer = Some(timer);
        self.touch(handle, now);
        handle
    }

    /// Feed reassembled bytes arriving on `handle`'s stream; returns
    /// `bad-message`-class [`Error::Overflow`] once the cap is exceeded.
    pub fn feed(&mut self, handle: ConnectionHandle, bytes: &[u8], now: Instant) -> Result<(), Error> {
        self.touch(handle, now);
        let conn = self.connections.get_mut(handle).ok_or(Error::NotConnected)?;
        if conn.reassembly.size() + bytes.len() > conn.reassembly_cap {
            return Err(Error::Overflow);
        }
        conn.reassembly.write_bytes(bytes);
        Ok(())
    }

    /// Acquire/release track how many logical users (SIP, BFCP, HTTP, …)
    /// share this connection; `close` only unlinks once both reach zero and
    /// the queue is drained, or the caller forces it with `err`.
    pub fn acquire(&mut self, handle: ConnectionHandle) {
        if let Some(conn) = self.connections.get_mut(handle) {
            conn.users += 1;
        }
    }

    pub fn release(&mut self, handle: ConnectionHandle) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        if let Some(conn) = self.connections.get_mut(handle) {
            conn.users = conn.users.saturating_sub(1);
            if conn.users == 0 && conn.send_queue.is_empty() {
                self.unlink(handle, None, &mut events);
            }
        }
        events
    }

    /// Fatal close: fail every pending completion with `err`, notify every
    /// keepalive subscriber, and unlink from the cache regardless of
    /// remaining users.
    pub fn close(&mut self, handle: ConnectionHandle, err: Error) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        self.unlink(handle, Some(err), &mut events);
        events
    }

    fn unlink(&mut self, handle: ConnectionHandle, err: Option<Error>, events: &mut Vec<TransportEvent>) {
        let Some(mut conn) = self.connections.remove(handle) else { return };
        self.index.remove(&(conn.peer, conn.flavor));
        conn.state = ConnectionState::Closed;

        for timer in [
            conn.idle_timer.take(),
            conn.accept_timer.take(),
            conn.keepalive_timer.take(),
            conn.keepalive_response_timer.take(),
        ]
        .into_iter()
        .flatten()
        {
            self.reactor.cancel_timer(timer);
        }

        for pending in conn.send_queue.drain(..) {
            let result = match &err {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            };
            events.push(TransportEvent::Completion { connection: handle, completion: pending.completion, result });
        }
        for _subscriber in conn.keepalive_subscribers.drain(..) {
            events.push(TransportEvent::KeepaliveDue { connection: handle });
        }
        if err.is_some() {
            warn!(?handle, peer = %conn.peer, "connection closed with error");
        }
        events.push(TransportEvent::Closed { connection: handle, err });
    }

    pub fn lookup(&self, peer: SocketAddr, flavor: Flavor) -> Option<ConnectionHandle> {
        self.index.get(&(peer, flavor)).copied()
    }
}
