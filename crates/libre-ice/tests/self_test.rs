use libre_ice::{AgentMode, CandidateType, ChecklistState, IceEvent, Role};
use libre_stun::{Class, IceControlling, MessageBuilder, Method, Priority, TransactionId, UseCandidate, Username};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// End-to-end scenario 2: a controlling-side Binding request carries
/// USERNAME, PRIORITY, ICE-CONTROLLING, USE-CANDIDATE, MESSAGE-INTEGRITY
/// and FINGERPRINT in that order, and both verify against the password used
/// to build the message.
#[test]
fn controlling_binding_request_attribute_order() {
    init();
    let mut session = libre_ice::IceSession::new(AgentMode::Full, Role::Controlling);
    session.tie_breaker = 0x1122_3344_5566_7788;
    session.local_ufrag = "aaaa".to_string();
    session.local_pwd = "aaaaaaaaaaaaaaaaaaaa".to_string();

    let stream = session.add_media_stream(true);
    let local = session.add_local_candidate(stream, 1, None, CandidateType::Host, "192.0.2.10:4000".parse().unwrap());
    let remote = libre_ice::Candidate::new_host(1, "198.51.100.20:5000".parse().unwrap(), 65535);
    session.add_remote_candidate(stream, remote.clone());
    session.set_remote_credentials(stream, "bbbb", "bbbbbbbbbbbbbbbbbbbb");
    session.form_checklist(stream, true);
    session.stream_mut(stream).checklist[0].use_candidate = true;

    let events = session.poll(Instant::now());
    let bytes = events
        .into_iter()
        .find_map(|e| match e {
            IceEvent::SendStun { bytes, .. } => Some(bytes),
            _ => None,
        })
        .expect("a connectivity check should have been sent");

    let msg = libre_stun::Message::decode(&bytes).unwrap();
    assert_eq!(msg.class(), Class::Request);
    assert_eq!(msg.method(), Method::Binding);
    assert_eq!(msg.attribute::<Username>().unwrap().unwrap().0, "bbbb:aaaa");
    assert!(msg.attribute::<Priority>().is_some());
    assert_eq!(
        msg.attribute::<libre_stun::IceControlling>().unwrap().unwrap().0,
        0x1122_3344_5566_7788
    );
    assert!(msg.attribute::<UseCandidate>().is_some());
    msg.verify_message_integrity(b"bbbbbbbbbbbbbbbbbbbb").unwrap();
    msg.verify_fingerprint().unwrap();

    let _ = local;
}

enum Wire {
    ToA { from: SocketAddr, bytes: Vec<u8> },
    ToB { from: SocketAddr, bytes: Vec<u8> },
}

fn route(owner_addr: SocketAddr, to_a: SocketAddr, to_b: SocketAddr, event: IceEvent, queue: &mut Vec<Wire>) {
    let (dest, bytes) = match event {
        IceEvent::SendStun { dest, bytes, .. } | IceEvent::SendStunResponse { dest, bytes, .. } => (dest, bytes),
        _ => return,
    };
    if dest == to_b {
        queue.push(Wire::ToB { from: owner_addr, bytes });
    } else if dest == to_a {
        queue.push(Wire::ToA { from: owner_addr, bytes });
    }
}

/// Drive a controlling and a controlled agent through a full loopback
/// connectivity check without a real socket: outbound bytes are decoded and
/// handed straight to the peer's `recv`, whose own outbound events (e.g. a
/// response, or a triggered check) are queued right back. The checklist on
/// both sides should converge to Completed with a nominated pair.
#[test]
fn loopback_checklist_converges_and_nominates() {
    init();

    let mut a = libre_ice::IceSession::new(AgentMode::Full, Role::Controlling);
    let mut b = libre_ice::IceSession::new(AgentMode::Full, Role::Controlled);

    let a_addr: SocketAddr = "127.0.0.1:40000".parse().unwrap();
    let b_addr: SocketAddr = "127.0.0.1:40001".parse().unwrap();

    let stream_a = a.add_media_stream(true);
    let stream_b = b.add_media_stream(true);

    let a_local = a.add_local_candidate(stream_a, 1, None, CandidateType::Host, a_addr);
    let b_local = b.add_local_candidate(stream_b, 1, None, CandidateType::Host, b_addr);

    a.add_remote_candidate(stream_a, b_local.clone());
    b.add_remote_candidate(stream_b, a_local.clone());

    a.set_remote_credentials(stream_a, b.local_ufrag.clone(), b.local_pwd.clone());
    b.set_remote_credentials(stream_b, a.local_ufrag.clone(), a.local_pwd.clone());

    a.form_checklist(stream_a, true);
    b.form_checklist(stream_b, true);

    let mut now = Instant::now();
    let mut completed_a = false;
    let mut completed_b = false;

    for _ in 0..50 {
        now += Duration::from_millis(25);
        let mut queue = Vec::new();

        for event in a.poll(now) {
            route(a_addr, a_addr, b_addr, event, &mut queue);
        }
        for event in b.poll(now) {
            route(b_addr, a_addr, b_addr, event, &mut queue);
        }

        while let Some(item) = queue.pop() {
            let (events, is_a) = match item {
                Wire::ToA { from, bytes } => {
                    let msg = libre_stun::Message::decode(&bytes).unwrap();
                    (a.recv(stream_a, &msg, from, a_addr, now).unwrap_or_default(), true)
                }
                Wire::ToB { from, bytes } => {
                    let msg = libre_stun::Message::decode(&bytes).unwrap();
                    (b.recv(stream_b, &msg, from, b_addr, now).unwrap_or_default(), false)
                }
            };

            for ev in events {
                match &ev {
                    IceEvent::ChecklistCompleted { .. } if is_a => completed_a = true,
                    IceEvent::ChecklistCompleted { .. } => completed_b = true,
                    _ => {}
                }
                if is_a {
                    route(a_addr, a_addr, b_addr, ev, &mut queue);
                } else {
                    route(b_addr, a_addr, b_addr, ev, &mut queue);
                }
            }
        }

        if completed_a && completed_b {
            break;
        }
    }

    assert!(completed_a, "controlling agent's checklist never completed");
    assert!(completed_b, "controlled agent's checklist never completed");
    assert_eq!(a.stream(stream_a).state, ChecklistState::Completed);
    assert_eq!(b.stream(stream_b).state, ChecklistState::Completed);
    assert!(a.stream(stream_a).checklist.iter().any(|p| p.nominated));
}

/// A lite agent never paces its own checks (`pace_tick` short-circuits for
/// `AgentMode::Lite`), so it can only ever answer inbound requests. A
/// Controlled+Lite agent receiving a peer's nominating Binding request must
/// still select the pair and complete its checklist, even though the pair
/// never goes through its own `Succeeded` state.
#[test]
fn lite_controlled_agent_completes_on_a_nominating_request() {
    init();

    let mut lite = libre_ice::IceSession::new(AgentMode::Lite, Role::Controlled);
    lite.local_ufrag = "bbbb".to_string();
    lite.local_pwd = "bbbbbbbbbbbbbbbbbbbb".to_string();

    let stream = lite.add_media_stream(true);
    let local_addr: SocketAddr = "127.0.0.1:40010".parse().unwrap();
    let peer_addr: SocketAddr = "127.0.0.1:40011".parse().unwrap();
    lite.add_local_candidate(stream, 1, None, CandidateType::Host, local_addr);
    lite.set_remote_credentials(stream, "aaaa", "aaaaaaaaaaaaaaaaaaaa");
    lite.form_checklist(stream, true);

    // a lite agent never originates checks of its own.
    let events = lite.poll(Instant::now());
    assert!(events.iter().all(|e| !matches!(e, IceEvent::SendStun { .. })));

    let mut builder = MessageBuilder::new(Class::Request, Method::Binding, TransactionId::random());
    builder.add_attr(&Username("bbbb:aaaa".to_string()));
    builder.add_attr(&Priority(65535));
    builder.add_attr(&IceControlling(0x1));
    builder.add_attr(&UseCandidate);
    builder.add_message_integrity(b"bbbbbbbbbbbbbbbbbbbb");
    builder.add_fingerprint();
    let bytes = builder.finish();
    let msg = libre_stun::Message::decode(&bytes).unwrap();

    let events = lite.recv(stream, &msg, peer_addr, local_addr, Instant::now()).unwrap();

    assert!(events.iter().any(|e| matches!(e, IceEvent::SendStunResponse { .. })), "should still answer with a success response");
    assert!(
        events.iter().any(|e| matches!(e, IceEvent::ChecklistCompleted { stream: s } if *s == stream)),
        "lite checklist must complete on the peer's nominating request"
    );
    assert_eq!(lite.stream(stream).state, ChecklistState::Completed);
    assert!(lite.stream(stream).checklist.iter().any(|p| p.valid));
}
