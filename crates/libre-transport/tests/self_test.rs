use libre_transport::{ConnectionCache, ConnectionConfig, Flavor, TransportEvent};
use std::time::{Duration, Instant};

fn init() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A connection's idle timer, armed by the cache's own reactor on every
/// touch, fires once `idle_timeout` elapses with no activity and evicts the
/// connection since nothing still holds it (spec.md:86/220/224).
#[test]
fn idle_timer_fires_after_inactivity() {
    init();
    let config = ConnectionConfig::new();
    let mut cache = ConnectionCache::new(config);

    let start = Instant::now();
    let peer = "198.51.100.1:5060".parse().unwrap();
    let local = "192.0.2.1:5060".parse().unwrap();

    let (handle, _completion, _events) = cache.send(local, peer, Flavor::Tcp, b"SUBSCRIBE".to_vec(), start);

    assert!(cache.poll_timers(start + Duration::from_secs(100)).is_empty());
    assert!(cache.get(handle).is_some());

    let events = cache.poll_timers(start + Duration::from_secs(901));
    assert!(events.iter().any(|e| matches!(e, TransportEvent::Closed { connection, .. } if *connection == handle)));
    assert!(cache.get(handle).is_none());
    assert!(cache.lookup(peer, Flavor::Tcp).is_none());
}

/// End-to-end: a send on a not-yet-connected peer asks the caller to dial
/// out; once the caller reports establishment the queued bytes (and any
/// sent while still connecting) drain in FIFO order with matching completions.
#[test]
fn connect_then_drain_preserves_send_order() {
    init();
    let mut cache = ConnectionCache::new(ConnectionConfig::new());
    let now = Instant::now();
    let peer = "198.51.100.2:443".parse().unwrap();
    let local = "192.0.2.2:0".parse().unwrap();

    let (handle, first, events) = cache.send(local, peer, Flavor::Tls, b"one".to_vec(), now);
    assert!(events.iter().any(|e| matches!(e, TransportEvent::Connect { .. })));

    let (handle2, second, events) = cache.send(local, peer, Flavor::Tls, b"two".to_vec(), now);
    assert_eq!(handle, handle2);
    assert!(events.is_empty(), "second send on the same peer must not redial");

    let drained = cache.mark_established(handle, now);
    let writes: Vec<Vec<u8>> = drained
        .iter()
        .filter_map(|e| match e {
            TransportEvent::WriteBytes { bytes, .. } => Some(bytes.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(writes, vec![b"one".to_vec(), b"two".to_vec()]);

    let completions: Vec<u64> = drained
        .iter()
        .filter_map(|e| match e {
            TransportEvent::Completion { completion, result: Ok(()), .. } => Some(*completion),
            _ => None,
        })
        .collect();
    assert_eq!(completions, vec![first, second]);
}

/// A fatal close fails every still-pending completion with the given error
/// and removes the connection from the cache so the next send redials.
#[test]
fn fatal_close_fails_pending_sends_and_forgets_the_connection() {
    init();
    let mut cache = ConnectionCache::new(ConnectionConfig::new());
    let now = Instant::now();
    let peer = "198.51.100.3:80".parse().unwrap();
    let local = "192.0.2.3:0".parse().unwrap();

    let (handle, completion, _) = cache.send(local, peer, Flavor::Tcp, b"x".to_vec(), now);
    let events = cache.close(handle, libre_transport::Error::ConnectionReset);

    let failed = events.iter().any(|e| {
        matches!(e, TransportEvent::Completion { completion: c, result: Err(_), .. } if *c == completion)
    });
    assert!(failed);
    assert!(cache.lookup(peer, Flavor::Tcp).is_none());

    let (new_handle, _, redial_events) = cache.send(local, peer, Flavor::Tcp, b"y".to_vec(), now);
    assert_ne!(handle, new_handle);
    assert!(redial_events.iter().any(|e| matches!(e, TransportEvent::Connect { .. })));
}
