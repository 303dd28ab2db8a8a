use crate::message::Message;
use crate::transaction::ClientTransactions;
use crate::Error;
use libre_transport::{ConnectionCache, ConnectionHandle, Flavor, TransportEvent};
use std::net::SocketAddr;
use std::time::Instant;

/// What came out of feeding a chunk of received bytes into a [`BfcpSocket`]
/// connection: zero or more complete messages, plus the raw transport events
/// the caller's reactor must act on (write bytes, fail a completion, ...).
pub struct Delivery {
    pub messages: Vec<Message>,
    pub events: Vec<TransportEvent>,
}

/// A reply matched against an outstanding client transaction.
pub struct Matched {
    pub completion: u64,
    pub reply: Message,
}

/// BFCP always runs over a reliable transport (TCP or TLS), so this is a
/// thin pairing of a [`ConnectionCache`] (framing, send queue, connection
/// lifetime) with [`ClientTransactions`] (request/reply matching by
/// transaction id) and [`Message::framed_len`] (where a frame ends in the
/// reassembly buffer). Per spec.md §4.1 the cache itself knows nothing about
/// BFCP's wire format; this is the glue that feeds it frames.
pub struct BfcpSocket {
    cache: ConnectionCache,
    transactions: ClientTransactions,
    flavor: Flavor,
}

impl BfcpSocket {
    pub fn new(cache: ConnectionCache, flavor: Flavor) -> Self {
        assert!(!flavor.is_secure() || flavor == Flavor::Tls, "BFCP runs over tcp or tls, not a datagram flavor");
        Self { cache, transactions: ClientTransactions::new(), flavor }
    }

    /// Send a client-originated request, registering a transaction so the
    /// matching reply (by transaction id) can be correlated back to this
    /// call's completion token.
    pub fn request(&mut self, local: SocketAddr, peer: SocketAddr, mut msg: Message, now: Instant) -> (u64, Vec<TransportEvent>) {
        let (tid, completion) = self.transactions.begin(msg.primitive, now);
        msg.transaction_id = tid;
        let (_handle, _send_completion, events) = self.cache.send(local, peer, self.flavor, msg.encode(), now);
        (completion, events)
    }

    /// Send a reply or a fire-and-forget message (no transaction to track:
    /// replies echo the request's own transaction triad per RFC 4582 §8.2).
    pub fn send(&mut self, local: SocketAddr, peer: SocketAddr, msg: Message, now: Instant) -> Vec<TransportEvent> {
        let (_handle, _completion, events) = self.cache.send(local, peer, self.flavor, msg.encode(), now);
        events
    }

    pub fn accept(&mut self, local: SocketAddr, peer: SocketAddr, now: Instant) -> ConnectionHandle {
        self.cache.accept(local, peer, self.flavor, now)
    }

    pub fn mark_established(&mut self, handle: ConnectionHandle, now: Instant) -> Vec<TransportEvent> {
        self.cache.mark_established(handle, now)
    }

    /// Feed bytes read off `handle`'s stream; frames out every complete
    /// message the reassembly buffer now holds, in arrival order. A short
    /// trailing partial frame is left buffered for the next call.
    pub fn feed(&mut self, handle: ConnectionHandle, bytes: &[u8], now: Instant) -> Result<Delivery, Error> {
        let mut events = self.cache.feed(handle, bytes, now).map_err(transport_err)?.into_iter().collect::<Vec<_>>();
        let mut messages = Vec::new();

        loop {
            let conn = self.cache.get_mut(handle).ok_or(Error::NotConnected)?;
            let available = conn.reassembly.unread();
            match Message::framed_len(available) {
                Ok(len) => {
                    let frame = available[..len].to_vec();
                    let msg = Message::decode(&frame)?;
                    conn.reassembly.advance(len).expect("framed_len bounds checked against unread()");
                    messages.push(msg);
                }
                Err(Error::NeedsMoreData) => break,
                Err(e) => return Err(e),
            }
        }

        compact(self.cache.get_mut(handle).ok_or(Error::NotConnected)?);
        Ok(Delivery { messages, events })
    }

    /// Correlate a single reply against the client-transaction table. Call
    /// once per message returned from [`Self::feed`] that looks like a
    /// reply (`Primitive::is_reply`); requests and notifications are not
    /// transactions and should be handled by the caller directly.
    pub fn match_reply(&mut self, reply: Message) -> Option<Matched> {
        self.transactions.complete(reply.transaction_id).map(|completion| Matched { completion, reply })
    }

    /// Drain client transactions whose 10s timeout elapsed.
    pub fn poll_timeouts(&mut self, now: Instant) -> Vec<crate::transaction::TimedOut> {
        self.transactions.poll(now)
    }

    pub fn close(&mut self, handle: ConnectionHandle, err: Error) -> Vec<TransportEvent> {
        self.cache.close(handle, transport_err_from(err))
    }

    pub fn cache(&self) -> &ConnectionCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut ConnectionCache {
        &mut self.cache
    }
}

/// Drop what's already been read out of the reassembly buffer so it doesn't
/// grow unbounded across many small frames; this is a plain compaction, not
/// a resize, so the cap check in [`ConnectionCache::feed`] stays meaningful.
fn compact(conn: &mut libre_transport::Connection) {
    let remaining = conn.reassembly.unread().to_vec();
    conn.reassembly.reset();
    conn.reassembly.write_bytes(&remaining);
}

fn transport_err(err: libre_transport::Error) -> Error {
    match err {
        libre_transport::Error::BadMessage(m) => Error::BadMessage(m),
        libre_transport::Error::NeedsMoreData => Error::NeedsMoreData,
        libre_transport::Error::Overflow => Error::Overflow,
        libre_transport::Error::NotSupported(m) => Error::NotSupported(m),
        libre_transport::Error::NotConnected => Error::NotConnected,
        libre_transport::Error::Timeout => Error::Timeout,
        libre_transport::Error::ConnectionReset => Error::ConnectionReset,
        libre_transport::Error::InvalidArgument(m) => Error::InvalidArgument(m),
    }
}

fn transport_err_from(err: Error) -> libre_transport::Error {
    match err {
        Error::BadMessage(m) => libre_transport::Error::BadMessage(m),
        Error::NeedsMoreData => libre_transport::Error::NeedsMoreData,
        Error::Overflow => libre_transport::Error::Overflow,
        Error::NotSupported(m) => libre_transport::Error::NotSupported(m),
        Error::NotConnected => libre_transport::Error::NotConnected,
        Error::Timeout => libre_transport::Error::Timeout,
        Error::ConnectionReset => libre_transport::Error::ConnectionReset,
        Error::InvalidArgument(m) => libre_transport::Error::InvalidArgument(m),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::Kind;
    use crate::message::Primitive;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn feed_delivers_a_complete_message_and_buffers_a_partial_one() {
        let mut socket = BfcpSocket::new(ConnectionCache::new(libre_transport::ConnectionConfig::new()), Flavor::Tcp);
        let now = Instant::now();
        let handle = socket.accept(addr(1), addr(2), now);
        socket.mark_established(handle, now);

        let msg = Message::new(Primitive::Hello, 1, 1, 1);
        let mut bytes = msg.encode();
        let partial = Message::new(Primitive::HelloAck, 1, 2, 1).encode();
        bytes.extend_from_slice(&partial[..partial.len() - 1]);

        let delivery = socket.feed(handle, &bytes, now).unwrap();
        assert_eq!(delivery.messages, vec![msg]);

        let rest = socket.feed(handle, &partial[partial.len() - 1..], now).unwrap();
        assert_eq!(rest.messages.len(), 1);
        assert_eq!(rest.messages[0].transaction_id, 2);
    }

    #[test]
    fn request_then_matching_reply_resolves_the_same_completion() {
        let mut socket = BfcpSocket::new(ConnectionCache::new(libre_transport::ConnectionConfig::new()), Flavor::Tcp);
        let now = Instant::now();
        let request = Message::new(Primitive::FloorRequest, 1, 0, 7).with_attribute(Kind::FloorId(1));
        let (completion, _events) = socket.request(addr(1), addr(2), request, now);

        let handle = socket.cache().lookup(addr(2), Flavor::Tcp).unwrap();
        socket.mark_established(handle, now);

        let reply = Message::new(Primitive::FloorRequestStatus, 1, 1, 7);
        let matched = socket.match_reply(reply).unwrap();
        assert_eq!(matched.completion, completion);
    }

    #[test]
    fn unmatched_reply_returns_none() {
        let mut socket = BfcpSocket::new(ConnectionCache::new(libre_transport::ConnectionConfig::new()), Flavor::Tcp);
        let reply = Message::new(Primitive::HelloAck, 1, 99, 1);
        assert!(socket.match_reply(reply).is_none());
    }
}
