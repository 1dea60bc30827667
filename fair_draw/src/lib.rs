pub mod builder;
mod config;
pub mod machine;
use log::debug;
use rand::Rng;

use std::collections::BTreeSet;

pub use crate::config::*;
pub use crate::machine::{DrawMachine, Highlights, Phase, RosterSink, StepHandle, Timeline};

// ********* Fairness **********

/// All the participants tied at the lowest counter, in roster order.
///
/// Only an empty roster yields an empty cohort, and rosters cannot be empty.
pub fn eligible(roster: &Roster) -> Vec<ParticipantId> {
    let m = match roster.min_counter() {
        Some(m) => m,
        None => return vec![],
    };
    roster
        .iter()
        .filter(|(_, p)| p.counter == m)
        .map(|(id, _)| id)
        .collect()
}

/// Shifts all the counters down so that the lowest one is zero.
///
/// This is applied after every commit, not only when all the counters are equal,
/// so the counters stay bounded however many rounds are played.
/// Returns the amount subtracted.
pub fn normalize(roster: &mut Roster) -> u32 {
    let m = roster.min_counter().unwrap_or(0);
    if m > 0 {
        for c in roster.counters_mut() {
            *c -= m;
        }
        debug!("normalize: subtracted {} from all counters", m);
    }
    m
}

// ********* Batch tracking **********

/// Remembers who already won during the current multi-pick round.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct BatchTracker {
    selected: BTreeSet<ParticipantId>,
    excluded: BTreeSet<ParticipantId>,
}

impl BatchTracker {
    pub fn new() -> BatchTracker {
        BatchTracker::default()
    }

    /// The eligible participants that did not win yet in this round.
    ///
    /// When the whole cohort already won, the full cohort is returned again: a round
    /// asking for more winners than there are tied participants still gets all its picks.
    pub fn filter(&self, eligible: &[ParticipantId]) -> Vec<ParticipantId> {
        let candidates: Vec<ParticipantId> = eligible
            .iter()
            .filter(|id| !self.excluded.contains(id))
            .cloned()
            .collect();
        if candidates.is_empty() && !eligible.is_empty() {
            debug!(
                "BatchTracker::filter: cohort {:?} exhausted, allowing repeats",
                eligible
            );
            return eligible.to_vec();
        }
        candidates
    }

    pub fn record(&mut self, id: ParticipantId) {
        self.selected.insert(id);
        self.excluded.insert(id);
    }

    pub fn selected(&self) -> &BTreeSet<ParticipantId> {
        &self.selected
    }

    pub fn clear(&mut self) {
        self.selected.clear();
        self.excluded.clear();
    }
}

// ********* Animation path **********

/// The sequence of participants the scan cursor visits, ending on the winner.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct DrawPath {
    pub steps: Vec<ParticipantId>,
    pub winner: ParticipantId,
}

/// Length of the slowing-down phase of the animation for `num_candidates` candidates.
fn rollout_length(num_candidates: usize, rollout_factor: f64) -> usize {
    let raw = (num_candidates as f64 * rollout_factor).floor();
    // `as` saturates, and NaN becomes 0.
    std::cmp::max(1, raw as usize)
}

/// Picks a winner uniformly among the candidates and builds the path leading to it.
///
/// The path is made of `fast_rounds` full passes over the candidates, followed by a
/// rollout that starts at a random offset and walks around the candidates until it
/// has made at least `rollout_length` steps and stands on the winner. The rollout is
/// capped at `rollout_length + 2 * candidates.len()` steps; if the cap is hit, the
/// last step is the winner.
pub fn generate_path<R: Rng + ?Sized>(
    candidates: &[ParticipantId],
    config: &SpinConfig,
    rng: &mut R,
) -> Result<DrawPath, DrawErrors> {
    if candidates.is_empty() {
        return Err(DrawErrors::EligibilityExhaustion);
    }
    let n = candidates.len();
    let winner = candidates[rng.gen_range(0..n)];

    let mut steps: Vec<ParticipantId> = Vec::new();
    for _ in 0..config.fast_rounds {
        steps.extend_from_slice(candidates);
    }

    let rollout = rollout_length(n, config.rollout_factor);
    let max_steps = rollout.saturating_add(2 * n);
    let mut cur = rng.gen_range(0..n);
    let mut walked: usize = 0;
    loop {
        let id = candidates[cur];
        walked += 1;
        if walked >= rollout && id == winner {
            steps.push(id);
            break;
        }
        if walked >= max_steps {
            debug!("generate_path: step cap {} reached", max_steps);
            steps.push(winner);
            break;
        }
        steps.push(id);
        cur = (cur + 1) % n;
    }

    debug!(
        "generate_path: {} candidates, {} steps, winner {}",
        n,
        steps.len(),
        winner
    );
    Ok(DrawPath { steps, winner })
}
