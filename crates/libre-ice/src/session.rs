use crate::candidate::{Candidate, CandidateHandle, CandidateType};
use crate::checklist::form_checklist;
use crate::pair::{CandidatePair, PairState};
use crate::Error;
use log::{debug, trace, warn};
use libre_stun::{
    Class, ClientTransactions, IceControlled, IceControlling, Message, MessageBuilder, Method,
    Priority, TransactionConfig, TransactionEvent, TransactionId, UseCandidate, Username,
};
use rand::RngCore;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Controlling,
    Controlled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentMode {
    Full,
    Lite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nomination {
    Regular,
    Aggressive,
}

#[derive(Debug, Clone, Copy)]
pub struct AgentConfig {
    pub nomination: Nomination,
    pub rto: Duration,
    pub rc: u32,
}

impl AgentConfig {
    pub fn new() -> Self {
        Self {
            nomination: Nomination::Regular,
            rto: Duration::from_millis(100),
            rc: 7,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecklistState {
    Null,
    Running,
    Completed,
    Failed,
}

/// Events emitted by [`IceSession::poll`] / [`IceSession::recv`] for the
/// caller to act on (send bytes, surface nomination, etc). The session
/// itself never touches a socket.
pub enum IceEvent {
    SendStun {
        stream: usize,
        local: SocketAddr,
        dest: SocketAddr,
        bytes: Vec<u8>,
    },
    SendStunResponse {
        stream: usize,
        local: SocketAddr,
        dest: SocketAddr,
        bytes: Vec<u8>,
    },
    NewPeerReflexiveLocal {
        stream: usize,
        component_id: u8,
        address: SocketAddr,
    },
    PairNominated {
        stream: usize,
        component_id: u8,
        local: SocketAddr,
        remote: SocketAddr,
    },
    ChecklistCompleted {
        stream: usize,
    },
    ChecklistFailed {
        stream: usize,
    },
    RoleConflict,
}

struct PendingCheck {
    stream: usize,
    pair: usize,
    nominating: bool,
    started: Instant,
}

pub struct IceMediaStream {
    pub local_candidates: Vec<CandidateHandle>,
    pub remote_candidates: Vec<CandidateHandle>,
    pub checklist: Vec<CandidatePair>,
    pub valid: Vec<usize>,
    pub triggered: VecDeque<usize>,
    pub state: ChecklistState,
    pub remote_ufrag: Option<String>,
    pub remote_pwd: Option<String>,
    component_ids: Vec<u8>,
    pace_interval: Duration,
    next_tick: Option<Instant>,
}

impl IceMediaStream {
    pub fn new(rtp: bool) -> Self {
        Self {
            local_candidates: Vec::new(),
            remote_candidates: Vec::new(),
            checklist: Vec::new(),
            valid: Vec::new(),
            triggered: VecDeque::new(),
            state: ChecklistState::Null,
            remote_ufrag: None,
            remote_pwd: None,
            component_ids: Vec::new(),
            pace_interval: if rtp { Duration::from_millis(20) } else { Duration::from_millis(500) },
            next_tick: None,
        }
    }

    pub fn components(&self) -> &[u8] {
        &self.component_ids
    }
}

/// Owns its media streams; holds session-wide ICE identity and tunables.
pub struct IceSession {
    pub local_ufrag: String,
    pub local_pwd: String,
    pub tie_breaker: u64,
    pub role: Role,
    pub mode: AgentMode,
    pub conf: AgentConfig,
    streams: Vec<IceMediaStream>,
    transactions: ClientTransactions,
    pending: HashMap<TransactionId, PendingCheck>,
}

impl IceSession {
    pub fn new(mode: AgentMode, role: Role) -> Self {
        let mut rng = rand::thread_rng();
        let local_ufrag = random_string(&mut rng, 4);
        let local_pwd = random_string(&mut rng, 22);
        let tie_breaker = rng.next_u64();
        Self {
            local_ufrag,
            local_pwd,
            tie_breaker,
            role,
            mode,
            conf: AgentConfig::new(),
            streams: Vec::new(),
            transactions: ClientTransactions::new(TransactionConfig::ice_defaults()),
            pending: HashMap::new(),
        }
    }

    pub fn add_media_stream(&mut self, rtp: bool) -> usize {
        self.streams.push(IceMediaStream::new(rtp));
        self.streams.len() - 1
    }

    pub fn stream(&self, idx: usize) -> &IceMediaStream {
        &self.streams[idx]
    }

    pub fn stream_mut(&mut self, idx: usize) -> &mut IceMediaStream {
        &mut self.streams[idx]
    }

    pub fn set_remote_credentials(&mut self, stream: usize, ufrag: impl Into<String>, pwd: impl Into<String>) {
        let s = &mut self.streams[stream];
        s.remote_ufrag = Some(ufrag.into());
        s.remote_pwd = Some(pwd.into());
    }

    pub fn add_local_candidate(
        &mut self,
        stream: usize,
        component_id: u8,
        base: Option<CandidateHandle>,
        kind: CandidateType,
        address: SocketAddr,
    ) -> CandidateHandle {
        let s = &mut self.streams[stream];
        let local_pref = 65535u32.saturating_sub(s.local_candidates.iter().filter(|c| c.kind == kind).count() as u32);
        let handle = match (kind, base) {
            (CandidateType::Host, _) => Candidate::new_host(component_id, address, local_pref),
            (_, Some(base)) => Candidate::new_derived(kind, component_id, address, base, None, local_pref),
            (_, None) => panic!("non-host candidate requires a base"),
        };
        if !s.component_ids.contains(&component_id) {
            s.component_ids.push(component_id);
        }
        s.local_candidates.push(handle.clone());
        handle
    }

    pub fn add_remote_candidate(&mut self, stream: usize, candidate: CandidateHandle) {
        if !self.streams[stream].component_ids.contains(&candidate.component_id) {
            self.streams[stream].component_ids.push(candidate.component_id);
        }
        self.streams[stream].remote_candidates.push(candidate);
    }

    /// Build this stream's checklist from its currently known candidates.
    /// `first_stream` controls the initial Frozen/Waiting split (§4.5).
    pub fn form_checklist(&mut self, stream: usize, first_stream: bool) {
        let we_are_controlling = self.role == Role::Controlling;
        let s = &mut self.streams[stream];
        s.checklist = form_checklist(&s.local_candidates, &s.remote_candidates, we_are_controlling, first_stream);
        s.state = ChecklistState::Running;
    }

    pub fn poll_timeout(&self, now: Instant) -> Option<Duration> {
        let txn = self.transactions.poll_timeout(now);
        let pace = self
            .streams
            .iter()
            .filter_map(|s| match s.state {
                ChecklistState::Running => Some(s.next_tick.map_or(Duration::ZERO, |t| t.saturating_duration_since(now))),
                _ => None,
            })
            .min();
        [txn, pace].into_iter().flatten().min()
    }

    /// Drive retransmits and one pacing tick per running media stream.
    pub fn poll(&mut self, now: Instant) -> Vec<IceEvent> {
        let mut events = Vec::new();

        for txn_event in self.transactions.poll(now) {
            match txn_event {
                TransactionEvent::Retransmit { id, bytes } => {
                    if let Some(p) = self.pending.get(&id) {
                        if let Some(addr) = self.pair_addrs(p.stream, p.pair) {
                            events.push(IceEvent::SendStun {
                                stream: p.stream,
                                local: addr.0,
                                dest: addr.1,
                                bytes,
                            });
                        }
                    }
                }
                TransactionEvent::TimedOut { id } => {
                    if let Some(p) = self.pending.remove(&id) {
                        self.streams[p.stream].checklist[p.pair].state = PairState::Failed;
                        self.streams[p.stream].checklist[p.pair].last_error = Some(Error::Timeout);
                        self.maybe_conclude(p.stream, &mut events);
                    }
                }
            }
        }

        for idx in 0..self.streams.len() {
            if self.streams[idx].state != ChecklistState::Running {
                continue;
            }
            let due = self.streams[idx].next_tick.map_or(true, |t| now >= t);
            if !due {
                continue;
            }
            self.streams[idx].next_tick = Some(now + self.streams[idx].pace_interval);
            self.pace_tick(idx, now, &mut events);
        }

        events
    }

    fn pair_addrs(&self, stream: usize, pair: usize) -> Option<(SocketAddr, SocketAddr)> {
        let p = self.streams[stream].checklist.get(pair)?;
        Some((p.local.base().address, p.remote.address))
    }

    /// One pacing tick: triggered check first, else highest-priority waiting,
    /// else unfreeze highest-priority frozen, else the checklist is complete.
    fn pace_tick(&mut self, stream: usize, now: Instant, events: &mut Vec<IceEvent>) {
        if self.mode == AgentMode::Lite {
            // a lite agent never originates checks, only answers inbound ones.
            return;
        }

        let pair_idx = if let Some(idx) = self.streams[stream].triggered.pop_front() {
            Some(idx)
        } else if let Some(idx) = self.highest_priority_in_state(stream, PairState::Waiting) {
            Some(idx)
        } else if let Some(idx) = self.highest_priority_in_state(stream, PairState::Frozen) {
            self.streams[stream].checklist[idx].state = PairState::Waiting;
            Some(idx)
        } else {
            None
        };

        match pair_idx {
            Some(idx) => self.perform_check(stream, idx, now, events),
            None => self.maybe_conclude(stream, events),
        }
    }

    fn highest_priority_in_state(&self, stream: usize, state: PairState) -> Option<usize> {
        self.streams[stream]
            .checklist
            .iter()
            .enumerate()
            .filter(|(_, p)| p.state == state)
            .max_by_key(|(_, p)| p.priority)
            .map(|(i, _)| i)
    }

    fn perform_check(&mut self, stream: usize, pair_idx: usize, now: Instant, events: &mut Vec<IceEvent>) {
        let nominating = {
            let pair = &self.streams[stream].checklist[pair_idx];
            self.role == Role::Controlling && (self.conf.nomination == Nomination::Aggressive || pair.use_candidate)
        };

        if self.streams[stream].checklist[pair_idx].local.kind == CandidateType::Relay {
            // TURN permission/channel installation is an external collaborator's
            // concern (see spec.md Non-goals: "full TURN allocation refresh").
            self.streams[stream].checklist[pair_idx].state = PairState::Failed;
            self.streams[stream].checklist[pair_idx].last_error =
                Some(Error::NotSupported("relay candidate checks require a TURN collaborator"));
            return;
        }

        let remote_pwd = self.streams[stream].remote_pwd.clone().unwrap_or_default();
        let remote_ufrag = self.streams[stream].remote_ufrag.clone().unwrap_or_default();

        let (local_addr, dest, component_id) = {
            let pair = &self.streams[stream].checklist[pair_idx];
            (pair.local.base().address, pair.remote.address, pair.local.component_id)
        };

        let tid = TransactionId::random();
        let mut builder = MessageBuilder::new(Class::Request, Method::Binding, tid);
        builder.add_attr(&Username(format!("{}:{}", remote_ufrag, self.local_ufrag)));
        builder.add_attr(&Priority(crate::candidate::priority(CandidateType::PeerReflexive, 65535, component_id)));
        match self.role {
            Role::Controlling => builder.add_attr(&IceControlling(self.tie_breaker)),
            Role::Controlled => builder.add_attr(&IceControlled(self.tie_breaker)),
        }
        if nominating {
            builder.add_attr(&UseCandidate);
        }
        builder.add_message_integrity(remote_pwd.as_bytes());
        builder.add_fingerprint();
        let bytes = builder.finish();

        debug!("ice: stream {stream} pair {pair_idx} -> in-progress (nominating={nominating})");
        self.streams[stream].checklist[pair_idx].state = PairState::InProgress;
        self.streams[stream].checklist[pair_idx].use_candidate = nominating;

        self.transactions.send(tid, bytes.clone(), false, now);
        self.pending.insert(
            tid,
            PendingCheck {
                stream,
                pair: pair_idx,
                nominating,
                started: now,
            },
        );

        events.push(IceEvent::SendStun {
            stream,
            local: local_addr,
            dest,
            bytes,
        });
    }

    /// Handle a STUN message arriving on `stream`'s socket, Binding request or
    /// response alike (both share the socket per §4.5).
    pub fn recv(&mut self, stream: usize, msg: &Message, from: SocketAddr, local: SocketAddr, now: Instant) -> Result<Vec<IceEvent>, Error> {
        match msg.class() {
            Class::Request => self.recv_request(stream, msg, from, local),
            Class::Success | Class::Error => Ok(self.recv_response(stream, msg, from, now)),
            Class::Indication => Ok(Vec::new()),
        }
    }

    fn recv_response(&mut self, stream: usize, msg: &Message, from: SocketAddr, now: Instant) -> Vec<IceEvent> {
        let mut events = Vec::new();
        let tid = msg.transaction_id();
        let Some(pending) = self.pending.remove(&tid) else {
            return events;
        };
        if pending.stream != stream || !self.transactions.complete(&tid) {
            return events;
        }

        trace!("ice: stream {stream} response for {tid:?}");
        if msg.class() == Class::Error {
            if let Some(Ok(err)) = msg.attribute::<libre_stun::ErrorCode>() {
                if err.code == 487 {
                    self.handle_role_conflict(stream, pending.pair, &mut events);
                    return events;
                }
            }
            self.streams[stream].checklist[pending.pair].state = PairState::Failed;
            self.streams[stream].checklist[pending.pair].last_error = Some(Error::Protocol("STUN error response"));
            self.maybe_conclude(stream, &mut events);
            return events;
        }

        let remote_pwd = self.streams[stream].remote_pwd.clone().unwrap_or_default();
        if msg.verify_message_integrity(remote_pwd.as_bytes()).is_err() {
            self.streams[stream].checklist[pending.pair].state = PairState::Failed;
            self.streams[stream].checklist[pending.pair].last_error = Some(Error::AuthFailed);
            self.maybe_conclude(stream, &mut events);
            return events;
        }

        let Some(Ok(mapped)) = msg.xor_mapped_address() else {
            self.streams[stream].checklist[pending.pair].state = PairState::Failed;
            self.streams[stream].checklist[pending.pair].last_error = Some(Error::BadMessage("missing XOR-MAPPED-ADDRESS"));
            self.maybe_conclude(stream, &mut events);
            return events;
        };

        let component_id = self.streams[stream].checklist[pending.pair].local.component_id;

        let reflexive_local = if let Some(existing) = self.streams[stream]
            .local_candidates
            .iter()
            .find(|c| c.address == mapped && c.component_id == component_id)
        {
            existing.clone()
        } else {
            let base = self.streams[stream].checklist[pending.pair].local.base();
            let local_pref = 65535u32.saturating_sub(
                self.streams[stream]
                    .local_candidates
                    .iter()
                    .filter(|c| c.kind == CandidateType::PeerReflexive)
                    .count() as u32,
            );
            let new = Candidate::new_derived(CandidateType::PeerReflexive, component_id, mapped, base, None, local_pref);
            self.streams[stream].local_candidates.push(new.clone());
            events.push(IceEvent::NewPeerReflexiveLocal {
                stream,
                component_id,
                address: mapped,
            });
            new
        };

        let remote = self.streams[stream].checklist[pending.pair].remote.clone();
        debug_assert_eq!(remote.address, from);

        let we_are_controlling = self.role == Role::Controlling;
        let valid_idx = self.find_or_insert_valid(stream, reflexive_local, remote, we_are_controlling);

        let pair = &mut self.streams[stream].checklist[valid_idx];
        pair.state = PairState::Succeeded;
        pair.valid = true;
        pair.rtt = Some(now.saturating_duration_since(pending.started));

        if pending.nominating {
            pair.nominated = true;
            events.push(IceEvent::PairNominated {
                stream,
                component_id,
                local: pair.local.address,
                remote: pair.remote.address,
            });
        }

        self.maybe_conclude(stream, &mut events);
        events
    }

    /// A successful check's `(reflexive local, remote)` may differ from the
    /// pair originally sent (a new PRFLX local was learned); find the
    /// checklist entry for that combination, creating one if absent, and
    /// return its index so caller updates state there instead of the
    /// original pair.
    fn find_or_insert_valid(&mut self, stream: usize, local: CandidateHandle, remote: CandidateHandle, we_are_controlling: bool) -> usize {
        let checklist = &mut self.streams[stream].checklist;
        if let Some(i) = checklist.iter().position(|p| Rc::ptr_eq(&p.local, &local) && Rc::ptr_eq(&p.remote, &remote)) {
            return i;
        }
        let pair = CandidatePair::new(local, remote, we_are_controlling);
        checklist.push(pair);
        let idx = checklist.len() - 1;
        if !self.streams[stream].valid.contains(&idx) {
            self.streams[stream].valid.push(idx);
        }
        idx
    }

    fn handle_role_conflict(&mut self, stream: usize, pair_idx: usize, events: &mut Vec<IceEvent>) {
        warn!("ice: stream {stream} role conflict on pair {pair_idx}, switching role");
        self.role = match self.role {
            Role::Controlling => Role::Controlled,
            Role::Controlled => Role::Controlling,
        };
        self.streams[stream].checklist[pair_idx].state = PairState::Waiting;
        self.streams[stream].triggered.push_back(pair_idx);
        events.push(IceEvent::RoleConflict);
    }

    /// Handle an inbound Binding request on `stream`'s socket: validate,
    /// resolve role conflicts, learn peer-reflexive remotes, schedule a
    /// triggered check, and build the response the caller should send back.
    fn recv_request(&mut self, stream: usize, msg: &Message, from: SocketAddr, local: SocketAddr) -> Result<Vec<IceEvent>, Error> {
        let mut events = Vec::new();

        if msg.verify_fingerprint().is_err() {
            return Ok(events); // silently ignored per §4.5
        }

        if msg.verify_message_integrity(self.local_pwd.as_bytes()).is_err() {
            events.push(self.error_response(stream, msg, local, from, 401, "Unauthorized"));
            return Ok(events);
        }

        let Some(Ok(username)) = msg.attribute::<Username>() else {
            events.push(self.error_response(stream, msg, local, from, 400, "Bad Request"));
            return Ok(events);
        };
        let Some((local_part, _remote_part)) = username.0.split_once(':') else {
            events.push(self.error_response(stream, msg, local, from, 401, "Unauthorized"));
            return Ok(events);
        };
        if local_part != self.local_ufrag {
            events.push(self.error_response(stream, msg, local, from, 401, "Unauthorized"));
            return Ok(events);
        }

        if let Some(true) = self.resolve_inbound_role(msg) {
            events.push(self.error_response(stream, msg, local, from, 487, "Role Conflict"));
            return Ok(events);
        }

        let priority = msg.attribute::<Priority>().transpose().map_err(Error::from)?.map(|p| p.0).unwrap_or(0);
        let use_candidate = msg.attribute::<UseCandidate>().is_some();

        let component_id = self.streams[stream].component_ids.first().copied().unwrap_or(1);

        let remote = self.resolve_remote_candidate(stream, from, component_id, priority);

        let pair_idx = self.find_pair_by_remote(stream, &remote).unwrap_or_else(|| {
            let local_candidate = self.streams[stream]
                .local_candidates
                .iter()
                .find(|c| c.address == local)
                .cloned()
                .unwrap_or_else(|| Candidate::new_host(component_id, local, 1));
            let we_are_controlling = self.role == Role::Controlling;
            let pair = CandidatePair::new(local_candidate, remote.clone(), we_are_controlling);
            self.streams[stream].checklist.push(pair);
            self.streams[stream].checklist.len() - 1
        });

        if self.streams[stream].checklist[pair_idx].state != PairState::InProgress {
            self.streams[stream].checklist[pair_idx].state = PairState::Waiting;
            self.streams[stream].triggered.push_back(pair_idx);
        }

        if use_candidate && self.role == Role::Controlled {
            if self.mode == AgentMode::Lite {
                // a lite agent never originates checks (pace_tick short-circuits),
                // so this pair's state can never reach Succeeded via recv_response;
                // the peer's own validated nominating request is itself the proof
                // the path works. Only the nominated flag stays gated on Succeeded
                // (examples/original_source/src/ice/stunsrv.c:148-167).
                let already_succeeded = self.streams[stream].checklist[pair_idx].state == PairState::Succeeded;
                let pair = &mut self.streams[stream].checklist[pair_idx];
                pair.valid = true;
                if !self.streams[stream].valid.contains(&pair_idx) {
                    self.streams[stream].valid.push(pair_idx);
                }
                if already_succeeded {
                    self.streams[stream].checklist[pair_idx].nominated = true;
                    let pair = &self.streams[stream].checklist[pair_idx];
                    let (l, r) = (pair.local.address, pair.remote.address);
                    events.push(IceEvent::PairNominated {
                        stream,
                        component_id,
                        local: l,
                        remote: r,
                    });
                }
                self.conclude_lite(stream, &mut events);
            } else {
                let pair = &mut self.streams[stream].checklist[pair_idx];
                if pair.state == PairState::Succeeded {
                    pair.nominated = true;
                    let (l, r) = (pair.local.address, pair.remote.address);
                    events.push(IceEvent::PairNominated {
                        stream,
                        component_id,
                        local: l,
                        remote: r,
                    });
                    self.maybe_conclude(stream, &mut events);
                } else {
                    pair.use_candidate = true;
                }
            }
        }

        events.push(self.success_response(stream, msg, local, from));
        Ok(events)
    }

    fn find_pair_by_remote(&self, stream: usize, remote: &CandidateHandle) -> Option<usize> {
        self.streams[stream].checklist.iter().position(|p| Rc::ptr_eq(&p.remote, remote))
    }

    /// Synthesize a PRFLX remote candidate for an inbound check from an
    /// address not already on the remote candidate list.
    fn resolve_remote_candidate(&mut self, stream: usize, from: SocketAddr, component_id: u8, priority: u32) -> CandidateHandle {
        if let Some(existing) = self.streams[stream].remote_candidates.iter().find(|c| c.address == from) {
            return existing.clone();
        }
        let foundation = format!("prflx-{from}");
        let candidate = Rc::new(Candidate {
            kind: CandidateType::PeerReflexive,
            foundation,
            component_id,
            priority,
            address: from,
            base: None,
            related_address: None,
        });
        self.streams[stream].remote_candidates.push(candidate.clone());
        candidate
    }

    /// Detect a same-role collision per §4.5: the side with the smaller
    /// tie-breaker switches. Returns `Some(true)` if the peer should be told
    /// to switch (487), `Some(false)` if we silently switched instead, `None`
    /// if roles didn't collide.
    fn resolve_inbound_role(&mut self, msg: &Message) -> Option<bool> {
        let peer_controlling = msg.attribute::<IceControlling>().and_then(Result::ok);
        let peer_controlled = msg.attribute::<IceControlled>().and_then(Result::ok);

        match (self.role, peer_controlling, peer_controlled) {
            (Role::Controlling, Some(peer_tb), _) => {
                if peer_tb.0 >= self.tie_breaker {
                    self.role = Role::Controlled;
                    Some(false)
                } else {
                    Some(true)
                }
            }
            (Role::Controlled, _, Some(peer_tb)) => {
                if self.tie_breaker >= peer_tb.0 {
                    self.role = Role::Controlling;
                    Some(false)
                } else {
                    Some(true)
                }
            }
            _ => None,
        }
    }

    fn success_response(&self, stream: usize, req: &Message, local: SocketAddr, from: SocketAddr) -> IceEvent {
        let remote_pwd = self.streams[stream].remote_pwd.clone().unwrap_or_default();
        let mut builder = MessageBuilder::new(Class::Success, Method::Binding, req.transaction_id());
        builder.add_xor_mapped_address(from);
        builder.add_message_integrity(remote_pwd.as_bytes());
        builder.add_fingerprint();
        IceEvent::SendStunResponse {
            stream,
            local,
            dest: from,
            bytes: builder.finish(),
        }
    }

    fn error_response(&self, stream: usize, req: &Message, local: SocketAddr, from: SocketAddr, code: u16, reason: &str) -> IceEvent {
        let mut builder = MessageBuilder::new(Class::Error, Method::Binding, req.transaction_id());
        builder.add_attr(&libre_stun::ErrorCode {
            code,
            reason: reason.to_string(),
        });
        builder.add_fingerprint();
        IceEvent::SendStunResponse {
            stream,
            local,
            dest: from,
            bytes: builder.finish(),
        }
    }

    /// §4.5 "Concluding": once every pair is terminal, pick the best valid
    /// pair per component, nominate it (controlling + regular nomination)
    /// and mark the checklist completed; if any component has no valid pair
    /// the checklist fails.
    fn maybe_conclude(&mut self, stream: usize, events: &mut Vec<IceEvent>) {
        let s = &self.streams[stream];
        if s.checklist
            .iter()
            .any(|p| matches!(p.state, PairState::Waiting | PairState::InProgress | PairState::Frozen))
        {
            return;
        }

        let component_ids = s.component_ids.clone();
        let mut selected = Vec::new();
        for component_id in component_ids {
            let best = s
                .checklist
                .iter()
                .enumerate()
                .filter(|(_, p)| p.valid && p.local.component_id == component_id)
                .max_by_key(|(_, p)| p.priority);
            match best {
                Some((idx, _)) => selected.push((component_id, idx)),
                None => {
                    warn!("ice: stream {stream} has no valid pair for component {component_id}");
                    self.streams[stream].state = ChecklistState::Failed;
                    events.push(IceEvent::ChecklistFailed { stream });
                    return;
                }
            }
        }

        if self.role == Role::Controlling && self.conf.nomination == Nomination::Regular {
            for &(_, idx) in &selected {
                if !self.streams[stream].checklist[idx].nominated {
                    self.streams[stream].checklist[idx].use_candidate = true;
                    self.streams[stream].triggered.push_back(idx);
                    return; // re-check after nomination completes
                }
            }
        }

        debug!("ice: stream {stream} checklist completed");
        self.streams[stream].state = ChecklistState::Completed;
        events.push(IceEvent::ChecklistCompleted { stream });
    }

    /// A lite agent never paces checks of its own, so every checklist pair
    /// other than the one just validated by an inbound nominating request
    /// sits in `Waiting` forever — [`Self::maybe_conclude`]'s "every pair
    /// terminal" gate would never pass. Conclude as soon as every component
    /// has a valid pair instead.
    fn conclude_lite(&mut self, stream: usize, events: &mut Vec<IceEvent>) {
        if self.streams[stream].state == ChecklistState::Completed {
            return;
        }
        let s = &self.streams[stream];
        let component_ids = s.component_ids.clone();
        let all_have_valid = component_ids.iter().all(|&cid| s.checklist.iter().any(|p| p.valid && p.local.component_id == cid));
        if !all_have_valid {
            return;
        }

        debug!("ice: stream {stream} checklist completed (lite)");
        self.streams[stream].state = ChecklistState::Completed;
        events.push(IceEvent::ChecklistCompleted { stream });
    }
}

fn random_string(rng: &mut impl RngCore, len: usize) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    (0..len).map(|_| ALPHABET[(rng.next_u32() as usize) % ALPHABET.len()] as char).collect()
}
