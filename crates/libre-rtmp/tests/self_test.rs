use libre_rtmp::amf0::{self, OrderedDict, Value};
use libre_rtmp::command::{self, Command};
use libre_rtmp::{Chunker, Connection, Event, Role};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Drive two [`Connection`]s through a full handshake by feeding each side's
/// output straight into the other, exactly like `connection.rs`'s own
/// `handshaked_pair` test helper but across the crate boundary.
fn handshaked_pair() -> (Connection, Connection) {
    let mut client = Connection::new(Role::Client);
    let mut server = Connection::new(Role::Server);

    let c0c1 = client.start_client_handshake();
    let (_, s0s1s2, _) = server.feed(&c0c1).unwrap();
    let (_, c2, _) = client.feed(&s0s1s2).unwrap();
    let (_, empty, _) = server.feed(&c2).unwrap();
    assert!(empty.is_empty());
    assert!(server.is_ready());

    // s0s1s2 is S0(1) + S1(1536) + S2(1536); feed only S2 back to the client
    // (it already consumed C2's matching bytes as part of its own handshake).
    let s2_offset = 1 + 1536;
    let (_, empty, _) = client.feed(&s0s1s2[s2_offset..]).unwrap();
    assert!(empty.is_empty());
    assert!(client.is_ready());

    (client, server)
}

/// End-to-end scenario: handshake, `connect`, `createStream`, `publish`, a
/// small-`max_chunk_size` AMF0 metadata message (forcing the dechunker to
/// reassemble several chunks) and an audio payload, all routed through the
/// chunk stream exactly as a real client/server pair would see it.
#[test]
fn connect_publish_and_metadata_round_trip_through_chunking() {
    init();
    let (mut client, mut server) = handshaked_pair();

    let connect_chunk_id = client.allocate_chunk_id();
    let connect_body = vec![Value::Object(
        OrderedDict::new().with("app", Value::String("live".into())).with("tcUrl", Value::String("rtmp://localhost/live".into())),
    )];
    let (connect_completion, bytes) = client.send_command(connect_chunk_id, 0, "connect", connect_body);
    let (_, _, events) = server.feed(&bytes).unwrap();
    let Event::Command { command, .. } = &events[0] else { panic!("expected connect command") };
    assert_eq!(command.name, "connect");
    let connect_tid = command.transaction_id;

    let result = command::encode(&Command { name: "_result".into(), transaction_id: connect_tid, body: vec![Value::Null] });
    let reply = Chunker::chunk(0, connect_chunk_id, 0, 0, 20, 0, &amf0::encode_root(&result), 128);
    let (_, _, events) = client.feed(&reply).unwrap();
    assert_eq!(events.len(), 1);
    match &events[0] {
        Event::CommandReply { completion, .. } => assert_eq!(*completion, connect_completion),
        _ => panic!("expected connect _result"),
    }

    // createStream -> _result(5) gives the client a stream id to publish on.
    let create_chunk_id = client.allocate_chunk_id();
    let (create_completion, bytes) = client.create_stream(create_chunk_id);
    server.feed(&bytes).unwrap();
    let create_result = command::encode(&Command { name: "_result".into(), transaction_id: 1.0, body: vec![Value::Number(5.0)] });
    let reply = Chunker::chunk(0, create_chunk_id, 0, 0, 20, 0, &amf0::encode_root(&create_result), 128);
    let (_, _, events) = client.feed(&reply).unwrap();
    assert_eq!(events, vec![Event::StreamCreated { completion: create_completion, stream_id: 5 }]);

    // publish(stream_name, "live") body: (null, "camera", "live").
    let publish_chunk_id = client.allocate_chunk_id();
    let publish_body = vec![Value::Null, Value::String("camera".into()), Value::String("live".into())];
    let (_, bytes) = client.send_command(publish_chunk_id, 5, "publish", publish_body);
    let (_, _, events) = server.feed(&bytes).unwrap();
    let Event::Command { stream_id, command } = &events[0] else { panic!("expected publish command") };
    assert_eq!(*stream_id, 5);
    assert_eq!(command.name, "publish");
    assert_eq!(command.body[1], Value::String("camera".into()));

    // An AMF0 `@setDataFrame`/metadata-style message, forced through a tiny
    // max_chunk_size so the dechunker has to stitch several chunks back
    // together before the server sees one `Event::Data`.
    let metadata = vec![
        Value::String("onMetaData".into()),
        Value::Object(
            OrderedDict::new()
                .with("width", Value::Number(1920.0))
                .with("height", Value::Number(1080.0))
                .with("framerate", Value::Number(30.0)),
        ),
    ];
    let metadata_bytes = amf0::encode_root(&metadata);
    let data_chunk_id = client.allocate_chunk_id();
    let chunked = Chunker::chunk(0, data_chunk_id, 0, 0, 18, 5, &metadata_bytes, 8);
    let (_, _, events) = server.feed(&chunked).unwrap();
    assert_eq!(events.len(), 1);
    match &events[0] {
        Event::Data { stream_id, values, .. } => {
            assert_eq!(*stream_id, 5);
            assert_eq!(values[0], Value::String("onMetaData".into()));
            let Value::Object(dict) = &values[1] else { panic!("expected metadata object") };
            assert_eq!(dict.get_number("width"), Some(1920.0));
            assert_eq!(dict.get_number("height"), Some(1080.0));
        }
        other => panic!("expected a Data event, got {other:?}"),
    }

    // A small audio payload, also forced through a chunk size smaller than
    // the payload so reassembly is exercised again on a binary (non-AMF0)
    // message type.
    let audio_chunk_id = client.allocate_chunk_id();
    let payload: Vec<u8> = (0..50).collect();
    let chunked = Chunker::chunk(0, audio_chunk_id, 0, 0, 8, 5, &payload, 16);
    let (_, _, events) = server.feed(&chunked).unwrap();
    assert_eq!(events, vec![Event::Audio { stream_id: 5, timestamp: 0, payload }]);
}

/// Scenario 3 (spec.md §8): handshake state transitions exactly as narrated,
/// driven through `Connection` rather than the bare `Handshake` type.
#[test]
fn handshake_state_transitions_uninitialized_to_done() {
    init();
    use libre_rtmp::HandshakeState;

    let mut client = Connection::new(Role::Client);
    assert_eq!(client.handshake_state(), HandshakeState::Uninitialized);
    let c0c1 = client.start_client_handshake();
    assert_eq!(client.handshake_state(), HandshakeState::VersionSent);

    let mut server = Connection::new(Role::Server);
    assert_eq!(server.handshake_state(), HandshakeState::Uninitialized);
    let (_, s0s1s2, _) = server.feed(&c0c1).unwrap();
    assert_eq!(server.handshake_state(), HandshakeState::AckSent);

    let s2 = s0s1s2[1 + 1536..].to_vec();
    let (_, c2, _) = client.feed(&s2).unwrap();
    assert_eq!(client.handshake_state(), HandshakeState::Done);

    server.feed(&c2).unwrap();
    assert_eq!(server.handshake_state(), HandshakeState::Done);
}
