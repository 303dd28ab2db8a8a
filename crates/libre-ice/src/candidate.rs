use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;
use std::rc::Rc;

/// ICE candidate type, ordered by preference per RFC 5245 §4.1.2.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CandidateType {
    Host,
    ServerReflexive,
    PeerReflexive,
    Relay,
}

impl CandidateType {
    fn type_preference(self) -> u32 {
        match self {
            CandidateType::Host => 126,
            CandidateType::PeerReflexive => 110,
            CandidateType::ServerReflexive => 100,
            CandidateType::Relay => 0,
        }
    }
}

pub type CandidateHandle = Rc<Candidate>;

/// `(type, foundation, component_id, priority, address, base, related-address)`.
///
/// `base` is an owning back-reference: `None` for a host candidate (its own
/// base), `Some(host)` for anything derived from one. This never cycles
/// since a base is always either `None` or a host candidate.
#[derive(Debug)]
pub struct Candidate {
    pub kind: CandidateType,
    pub foundation: String,
    pub component_id: u8,
    pub priority: u32,
    pub address: SocketAddr,
    pub base: Option<CandidateHandle>,
    pub related_address: Option<SocketAddr>,
}

impl Candidate {
    pub fn new_host(component_id: u8, address: SocketAddr, local_pref: u32) -> CandidateHandle {
        let foundation = foundation_for(CandidateType::Host, address, None);
        Rc::new(Candidate {
            kind: CandidateType::Host,
            foundation,
            component_id,
            priority: priority(CandidateType::Host, local_pref, component_id),
            address,
            base: None,
            related_address: None,
        })
    }

    /// A server-reflexive, peer-reflexive or relayed candidate derived from `base`.
    pub fn new_derived(
        kind: CandidateType,
        component_id: u8,
        address: SocketAddr,
        base: CandidateHandle,
        related_address: Option<SocketAddr>,
        local_pref: u32,
    ) -> CandidateHandle {
        debug_assert_ne!(kind, CandidateType::Host);
        let foundation = foundation_for(kind, base.address, related_address);
        Rc::new(Candidate {
            kind,
            foundation,
            component_id,
            priority: priority(kind, local_pref, component_id),
            address,
            base: Some(base),
            related_address,
        })
    }

    /// The base candidate: self for host, the owning host for anything derived.
    pub fn base(self: &CandidateHandle) -> CandidateHandle {
        self.base.clone().unwrap_or_else(|| Rc::clone(self))
    }
}

/// `type_pref<<24 | local_pref<<8 | (256 - component_id)`, RFC 5245 §4.1.2.1.
pub fn priority(kind: CandidateType, local_pref: u32, component_id: u8) -> u32 {
    (kind.type_preference() << 24) | ((local_pref & 0xffff) << 8) | (256 - component_id as u32)
}

/// Candidates of the same type, derived from the same base address and (for
/// srflx/relay) the same server share a foundation, so they freeze/unfreeze
/// together. A short hash stands in for the source's sequential counter.
fn foundation_for(kind: CandidateType, base_address: SocketAddr, related: Option<SocketAddr>) -> String {
    let mut hasher = DefaultHasher::new();
    kind.hash(&mut hasher);
    base_address.ip().hash(&mut hasher);
    related.map(|r| r.ip()).hash(&mut hasher);
    format!("f{:x}", hasher.finish() & 0xffff_ffff)
}
