use crate::amf0::{self, Value};
use crate::chunk::{BasicHeader, Chunker, Dechunker, Delivered, EXTENDED_TIMESTAMP_MARKER};
use crate::command::{self, Command, CommandTable};
use crate::handshake::{Handshake, HandshakeState};
use crate::stream::Stream;
use crate::Error;
use libre_buf::Buffer;
use std::collections::HashMap;

pub use crate::handshake::Role;

const MSG_SET_CHUNK_SIZE: u8 = 1;
const MSG_ABORT: u8 = 2;
const MSG_ACKNOWLEDGEMENT: u8 = 3;
const MSG_USER_CONTROL: u8 = 4;
const MSG_WINDOW_ACK_SIZE: u8 = 5;
const MSG_SET_PEER_BANDWIDTH: u8 = 6;
const MSG_AUDIO: u8 = 8;
const MSG_VIDEO: u8 = 9;
const MSG_AMF0_DATA: u8 = 18;
const MSG_AMF0_COMMAND: u8 = 20;

const USER_CONTROL_STREAM_BEGIN: u16 = 0;
const USER_CONTROL_STREAM_EOF: u16 = 1;
const USER_CONTROL_PING_REQUEST: u16 = 6;
const USER_CONTROL_PING_RESPONSE: u16 = 7;

const DEFAULT_CHUNK_SIZE: u32 = 128;
const PROTOCOL_CONTROL_CHUNK_ID: u32 = 2;

/// Events a [`Connection`] produces after [`Connection::feed`]; the caller
/// writes any bytes back through whatever transport owns this connection
/// (the connection itself never touches a socket, matching every other
/// engine in this workspace).
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// An inbound command not recognized as a reply to one of ours: routed
    /// to the application on the server side, or to the connection-level
    /// status handler (e.g. `onStatus`) on the client side (spec.md §4.6).
    Command { stream_id: u32, command: Command },
    /// A `_result`/`_error` reply matched against an earlier outbound
    /// command by its transaction id.
    CommandReply { completion: u64, command: Command },
    /// `createStream`'s `_result` resolved to a new stream id.
    StreamCreated { completion: u64, stream_id: u32 },
    Audio { stream_id: u32, timestamp: u32, payload: Vec<u8> },
    Video { stream_id: u32, timestamp: u32, payload: Vec<u8> },
    Data { stream_id: u32, timestamp: u32, values: Vec<Value> },
    StreamBegin { stream_id: u32 },
    StreamEof { stream_id: u32 },
}

/// Handshake → chunk-stream → AMF command router, per spec.md §3/§4.6. Owns
/// the dechunker and the stream table; the chunker is stateless and called
/// directly by whichever method needs to emit bytes.
pub struct Connection {
    role: Role,
    handshake: Handshake,
    dechunker: Dechunker,
    send_chunk_size: u32,
    peer_window_ack_size: Option<u32>,
    next_transaction: CommandTable,
    next_chunk_id: u32,
    streams: HashMap<u32, Stream>,
    next_stream_id: u32,
    /// `createStream`'s own transaction id needs to map its `_result` to a
    /// freshly allocated stream id, not to an arbitrary command reply.
    pending_create_stream: HashMap<u64, u64>,
}

impl Connection {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            handshake: Handshake::new(role),
            dechunker: Dechunker::new(),
            send_chunk_size: DEFAULT_CHUNK_SIZE,
            peer_window_ack_size: None,
            next_transaction: CommandTable::new(),
            next_chunk_id: 3, // 2 is reserved for protocol control messages
            streams: HashMap::new(),
            next_stream_id: 1,
            pending_create_stream: HashMap::new(),
        }
    }

    pub fn handshake_state(&self) -> HandshakeState {
        self.handshake.state()
    }

    pub fn is_ready(&self) -> bool {
        self.handshake.is_done()
    }

    pub fn start_client_handshake(&mut self) -> Vec<u8> {
        self.handshake.start_client()
    }

    /// Feed raw bytes off the wire (handshake or post-handshake chunk
    /// stream, whichever applies). Returns bytes consumed, any bytes to
    /// write back, and the protocol-level events observed.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<(usize, Vec<u8>, Vec<Event>), Error> {
        if !self.handshake.is_done() {
            let (consumed, response) = self.handshake.feed(bytes)?;
            return Ok((consumed, response, Vec::new()));
        }

        let mut buf = Buffer::from_vec(bytes.to_vec());
        let mut writes = Vec::new();
        let mut events = Vec::new();

        loop {
            let before = buf.pos();
            let header = match BasicHeader::decode(&mut buf) {
                Ok(h) => h,
                Err(Error::NeedsMoreData) => {
                    buf.set_pos(before);
                    break;
                }
                Err(e) => return Err(e),
            };
            match self.dechunker.feed_chunk(header, &mut buf) {
                Ok(Some(delivered)) => {
                    if let Some(reply) = self.handle_message(delivered, &mut writes)? {
                        events.push(reply);
                    }
                }
                Ok(None) => {}
                Err(Error::NeedsMoreData) => {
                    buf.set_pos(before);
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        Ok((buf.pos(), writes, events))
    }

    fn handle_message(&mut self, msg: Delivered, writes: &mut Vec<u8>) -> Result<Option<Event>, Error> {
        match msg.msg_type_id {
            MSG_SET_CHUNK_SIZE => {
                let mut buf = Buffer::from_vec(msg.payload);
                let size = buf.read_u32()?;
                self.dechunker.set_max_chunk_size(size);
                Ok(None)
            }
            MSG_ABORT => {
                let mut buf = Buffer::from_vec(msg.payload);
                let chunk_id = buf.read_u32()?;
                self.dechunker.abort(chunk_id);
                Ok(None)
            }
            MSG_ACKNOWLEDGEMENT => Ok(None),
            MSG_USER_CONTROL => self.handle_user_control(msg.payload, writes),
            MSG_WINDOW_ACK_SIZE => {
                let mut buf = Buffer::from_vec(msg.payload);
                self.peer_window_ack_size = Some(buf.read_u32()?);
                Ok(None)
            }
            MSG_SET_PEER_BANDWIDTH => {
                // respond by sending our own Window Ack Size back, per spec.md §4.6.
                let echoed = self.peer_window_ack_size.unwrap_or(2_500_000);
                writes.extend(self.control_message(MSG_WINDOW_ACK_SIZE, &echoed.to_be_bytes()));
                Ok(None)
            }
            MSG_AUDIO => Ok(Some(Event::Audio { stream_id: msg.msg_stream_id, timestamp: msg.timestamp, payload: msg.payload })),
            MSG_VIDEO => Ok(Some(Event::Video { stream_id: msg.msg_stream_id, timestamp: msg.timestamp, payload: msg.payload })),
            MSG_AMF0_DATA => {
                let values = amf0::decode_root(&msg.payload)?;
                Ok(Some(Event::Data { stream_id: msg.msg_stream_id, timestamp: msg.timestamp, values }))
            }
            MSG_AMF0_COMMAND => {
                let values = amf0::decode_root(&msg.payload)?;
                let command = command::parse(values).ok_or(Error::BadMessage("malformed AMF0 command"))?;
                self.route_command(msg.msg_stream_id, command)
            }
            _ => Ok(None),
        }
    }

    fn handle_user_control(&mut self, payload: Vec<u8>, writes: &mut Vec<u8>) -> Result<Option<Event>, Error> {
        let mut buf = Buffer::from_vec(payload);
        let event_type = buf.read_u16()?;
        match event_type {
            USER_CONTROL_STREAM_BEGIN => {
                let stream_id = buf.read_u32()?;
                if stream_id != 0 {
                    if let Some(stream) = self.streams.get_mut(&stream_id) {
                        stream.created = true;
                    }
                }
                Ok(Some(Event::StreamBegin { stream_id }))
            }
            USER_CONTROL_STREAM_EOF => {
                let stream_id = buf.read_u32()?;
                Ok(Some(Event::StreamEof { stream_id }))
            }
            USER_CONTROL_PING_REQUEST => {
                let value = buf.read_u32()?;
                let mut body = Buffer::with_capacity(6);
                body.write_u16(USER_CONTROL_PING_RESPONSE);
                body.write_u32(value);
                writes.extend(self.control_message(MSG_USER_CONTROL, &body.into_vec()));
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    fn route_command(&mut self, stream_id: u32, command: Command) -> Result<Option<Event>, Error> {
        if command::is_reply_name(&command.name) {
            if let Some(completion) = self.next_transaction.complete(command.transaction_id) {
                if let Some(&stream_completion) = self.pending_create_stream.get(&completion) {
                    self.pending_create_stream.remove(&completion);
                    let stream_id = match command.body.first() {
                        Some(Value::Number(n)) => *n as u32,
                        _ => return Err(Error::BadMessage("createStream _result missing numeric stream id")),
                    };
                    self.streams.insert(stream_id, Stream::new(stream_id));
                    return Ok(Some(Event::StreamCreated { completion: stream_completion, stream_id }));
                }
                return Ok(Some(Event::CommandReply { completion, command }));
            }
            // unmatched/late reply: drop silently, matching STUN/BFCP's
            // "unmatched transaction is the caller's to ignore" convention.
            return Ok(None);
        }
        Ok(Some(Event::Command { stream_id, command }))
    }

    /// Send a command expecting a reply; returns the completion token.
    pub fn send_command(&mut self, chunk_id: u32, msg_stream_id: u32, name: &str, body: Vec<Value>) -> (u64, Vec<u8>) {
        let (tid, completion) = self.next_transaction.begin();
        let values = command::encode(&Command { name: name.to_string(), transaction_id: tid, body });
        let bytes = amf0::encode_root(&values);
        let out = Chunker::chunk(0, chunk_id, 0, 0, MSG_AMF0_COMMAND, msg_stream_id, &bytes, self.send_chunk_size as usize);
        (completion, out)
    }

    /// `createStream`: a fire-expecting command whose `_result` is tracked
    /// specially so the caller gets a stream id back, not a raw reply.
    pub fn create_stream(&mut self, chunk_id: u32) -> (u64, Vec<u8>) {
        let (tid, completion) = self.next_transaction.begin();
        self.pending_create_stream.insert(completion, completion);
        let values = command::encode(&Command { name: "createStream".into(), transaction_id: tid, body: vec![Value::Null] });
        let bytes = amf0::encode_root(&values);
        let out = Chunker::chunk(0, chunk_id, 0, 0, MSG_AMF0_COMMAND, 0, &bytes, self.send_chunk_size as usize);
        (completion, out)
    }

    /// Fire-and-forget command (transaction id `0`), e.g. a server's
    /// `onStatus` notification.
    pub fn send_notify(&mut self, chunk_id: u32, msg_stream_id: u32, name: &str, body: Vec<Value>) -> Vec<u8> {
        let values = command::encode(&Command { name: name.to_string(), transaction_id: 0.0, body });
        let bytes = amf0::encode_root(&values);
        Chunker::chunk(0, chunk_id, 0, 0, MSG_AMF0_COMMAND, msg_stream_id, &bytes, self.send_chunk_size as usize)
    }

    pub fn allocate_chunk_id(&mut self) -> u32 {
        let id = self.next_chunk_id;
        self.next_chunk_id += 1;
        id
    }

    pub fn set_send_chunk_size(&mut self, size: u32) -> Vec<u8> {
        self.send_chunk_size = size;
        self.control_message(MSG_SET_CHUNK_SIZE, &size.to_be_bytes())
    }

    fn control_message(&self, msg_type_id: u8, payload: &[u8]) -> Vec<u8> {
        Chunker::chunk(0, PROTOCOL_CONTROL_CHUNK_ID, 0, 0, msg_type_id, 0, payload, self.send_chunk_size as usize)
    }

    pub fn stream(&self, stream_id: u32) -> Option<&Stream> {
        self.streams.get(&stream_id)
    }

    pub fn remove_stream(&mut self, stream_id: u32) {
        self.streams.remove(&stream_id);
    }
}

const _: () = assert!(EXTENDED_TIMESTAMP_MARKER == 0xFFFFFF);

#[cfg(test)]
mod tests {
    use super::*;

    fn handshaked_pair() -> (Connection, Connection) {
        let mut client = Connection::new(Role::Client);
        let mut server = Connection::new(Role::Server);

        let c0c1 = client.start_client_handshake();
        let (_, s0s1s2, _) = server.feed(&c0c1).unwrap();
        let (_, c2, _) = client.feed(&s0s1s2).unwrap();
        let (_, empty, _) = server.feed(&c2).unwrap();
        assert!(empty.is_empty());
        assert!(server.is_ready());

        let s2 = s0s1s2[1 + crate::handshake::CHUNK_LEN..].to_vec();
        let (_, empty, _) = client.feed(&s2).unwrap();
        assert!(empty.is_empty());
        assert!(client.is_ready());

        (client, server)
    }

    #[test]
    fn handshake_completes_through_connection_feed() {
        let (client, server) = handshaked_pair();
        assert!(client.is_ready());
        assert!(server.is_ready());
    }

    #[test]
    fn connect_command_round_trips_and_replies_resolve() {
        let (mut client, mut server) = handshaked_pair();
        let chunk_id = client.allocate_chunk_id();

        let connect_body = vec![Value::Object(
            amf0::OrderedDict::new().with("app", Value::String("live".into())),
        )];
        let (completion, bytes) = client.send_command(chunk_id, 0, "connect", connect_body);

        let (_, _, events) = server.feed(&bytes).unwrap();
        assert_eq!(events.len(), 1);
        let Event::Command { command, .. } = &events[0] else { panic!("expected a command") };
        assert_eq!(command.name, "connect");

        // server replies _result with the same tid.
        let reply_values = command::encode(&Command {
            name: "_result".into(),
            transaction_id: command.transaction_id,
            body: vec![Value::Null],
        });
        let reply_bytes = amf0::encode_root(&reply_values);
        let chunked = Chunker::chunk(0, chunk_id, 0, 0, MSG_AMF0_COMMAND, 0, &reply_bytes, 128);

        let (_, _, events) = client.feed(&chunked).unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::CommandReply { completion: c, command } => {
                assert_eq!(*c, completion);
                assert_eq!(command.name, "_result");
            }
            _ => panic!("expected a command reply"),
        }
    }

    #[test]
    fn create_stream_resolves_to_a_stream_id() {
        let (mut client, _server) = handshaked_pair();
        let chunk_id = client.allocate_chunk_id();
        let (completion, _bytes) = client.create_stream(chunk_id);

        let reply_values = command::encode(&Command { name: "_result".into(), transaction_id: 1.0, body: vec![Value::Number(5.0)] });
        let reply_bytes = amf0::encode_root(&reply_values);
        let chunked = Chunker::chunk(0, chunk_id, 0, 0, MSG_AMF0_COMMAND, 0, &reply_bytes, 128);

        let (_, _, events) = client.feed(&chunked).unwrap();
        assert_eq!(events, vec![Event::StreamCreated { completion, stream_id: 5 }]);
        assert!(client.stream(5).is_some());
    }

    #[test]
    fn ping_request_gets_a_ping_response_with_the_same_value() {
        let (_client, mut server) = handshaked_pair();
        let mut body = Buffer::with_capacity(6);
        body.write_u16(USER_CONTROL_PING_REQUEST);
        body.write_u32(0xDEAD_BEEF);
        let bytes = Chunker::chunk(0, PROTOCOL_CONTROL_CHUNK_ID, 0, 0, MSG_USER_CONTROL, 0, &body.into_vec(), 128);

        let (_, writes, _) = server.feed(&bytes).unwrap();
        let mut out = Buffer::from_vec(writes);
        let header = BasicHeader::decode(&mut out).unwrap();
        assert_eq!(header.chunk_id, PROTOCOL_CONTROL_CHUNK_ID);
        // skip the 11-byte format-0 message header
        out.advance(11).unwrap();
        let event_type = out.read_u16().unwrap();
        let value = out.read_u32().unwrap();
        assert_eq!(event_type, USER_CONTROL_PING_RESPONSE);
        assert_eq!(value, 0xDEAD_BEEF);
    }

    #[test]
    fn set_peer_bandwidth_triggers_a_window_ack_size_reply() {
        let (_client, mut server) = handshaked_pair();
        let mut body = Buffer::with_capacity(5);
        body.write_u32(5_000_000);
        body.write_u8(2); // dynamic limit type
        let bytes = Chunker::chunk(0, PROTOCOL_CONTROL_CHUNK_ID, 0, 0, MSG_SET_PEER_BANDWIDTH, 0, &body.into_vec(), 128);

        let (_, writes, _) = server.feed(&bytes).unwrap();
        assert!(!writes.is_empty());
    }
}
