use crate::candidate::CandidateHandle;
use crate::pair::{CandidatePair, PairState};
use std::collections::{HashMap, HashSet};

/// Build one media stream's checklist per RFC 5245 §5.7: pair same-component
/// same-family candidates, sort by priority descending, prune redundant
/// pairs, then initialize Frozen/Waiting state.
///
/// `first_stream` controls whether waiting pairs are unfrozen here at all —
/// per spec §4.5 this initial unfreeze only happens for the first media
/// stream; later streams wait for their foundation group to unfreeze via
/// cross-stream coupling, which is outside this engine's single-stream view.
pub fn form_checklist(
    locals: &[CandidateHandle],
    remotes: &[CandidateHandle],
    we_are_controlling: bool,
    first_stream: bool,
) -> Vec<CandidatePair> {
    let mut pairs = Vec::new();
    for local in locals {
        for remote in remotes {
            if local.component_id != remote.component_id {
                continue;
            }
            if local.address.is_ipv4() != remote.address.is_ipv4() {
                continue;
            }
            pairs.push(CandidatePair::new(local.clone(), remote.clone(), we_are_controlling));
        }
    }

    pairs.sort_by(|a, b| b.priority.cmp(&a.priority));
    prune(&mut pairs);

    if first_stream {
        unfreeze_initial(&mut pairs);
    } else {
        for pair in &mut pairs {
            pair.state = PairState::Frozen;
        }
    }

    pairs
}

/// Remove a pair whose `(base-of-local, remote)` duplicates one already kept;
/// since `pairs` is sorted descending, the first occurrence is the highest
/// priority and every later duplicate is the one removed.
fn prune(pairs: &mut Vec<CandidatePair>) {
    let mut seen = HashSet::new();
    pairs.retain(|pair| seen.insert(pair.prune_key()));
}

/// For each foundation group, set the pair with the lowest component id
/// (ties broken by highest priority, i.e. first in the sorted vec) to
/// Waiting; every other pair starts Frozen.
fn unfreeze_initial(pairs: &mut [CandidatePair]) {
    let mut best_per_foundation: HashMap<String, usize> = HashMap::new();
    for (i, pair) in pairs.iter().enumerate() {
        best_per_foundation
            .entry(pair.foundation.clone())
            .and_modify(|best| {
                if pair.local.component_id < pairs[*best].local.component_id {
                    *best = i;
                }
            })
            .or_insert(i);
    }

    let unfrozen: HashSet<usize> = best_per_foundation.into_values().collect();
    for (i, pair) in pairs.iter_mut().enumerate() {
        pair.state = if unfrozen.contains(&i) { PairState::Waiting } else { PairState::Frozen };
    }
}
