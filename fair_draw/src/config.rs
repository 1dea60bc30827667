// ********* Roster data structures ***********

use std::error::Error;
use std::fmt::Display;

/// Stable position of a participant in its roster.
///
/// Ids are assigned in insertion order and never change for the lifetime of a roster.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct ParticipantId(pub usize);

impl Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Participant {
    pub name: String,
    /// How many more wins this participant has than the least drawn participant.
    pub counter: u32,
}

/// An ordered, non-empty list of participants.
///
/// The only way to get a roster is through [`Roster::new`] or the
/// [`crate::builder::RosterBuilder`], both of which reject empty lists.
/// Every name is trimmed and non-empty.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Roster {
    participants: Vec<Participant>,
}

impl Roster {
    /// Fails on an empty list or on a name that [`crate::builder::valid_name`] would
    /// not keep as is.
    pub fn new(participants: Vec<Participant>) -> Result<Roster, DrawErrors> {
        if participants.is_empty() {
            return Err(DrawErrors::EmptyRoster);
        }
        if let Some((index, p)) = participants
            .iter()
            .enumerate()
            .find(|(_, p)| crate::builder::valid_name(&p.name) != Some(p.name.as_str()))
        {
            return Err(DrawErrors::InvalidName {
                index,
                name: p.name.clone(),
            });
        }
        Ok(Roster { participants })
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    // A roster is never empty, but clippy wants the pair.
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn get(&self, id: ParticipantId) -> Option<&Participant> {
        self.participants.get(id.0)
    }

    pub fn name(&self, id: ParticipantId) -> Option<&str> {
        self.get(id).map(|p| p.name.as_str())
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParticipantId, &Participant)> {
        self.participants
            .iter()
            .enumerate()
            .map(|(idx, p)| (ParticipantId(idx), p))
    }

    pub fn counters(&self) -> Vec<u32> {
        self.participants.iter().map(|p| p.counter).collect()
    }

    pub fn min_counter(&self) -> Option<u32> {
        self.participants.iter().map(|p| p.counter).min()
    }

    pub(crate) fn counters_mut(&mut self) -> impl Iterator<Item = &mut u32> {
        self.participants.iter_mut().map(|p| &mut p.counter)
    }

    /// Adds one win to the participant. Nothing is changed if the id is unknown.
    pub(crate) fn increment(&mut self, id: ParticipantId) -> Result<(), DrawErrors> {
        let p = self
            .participants
            .get_mut(id.0)
            .ok_or(DrawErrors::UnknownParticipant(id))?;
        p.counter = p.counter.saturating_add(1);
        Ok(())
    }
}

/// A request for `count` winners, played as `count` sequential picks.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct DrawRequest {
    pub count: usize,
}

impl DrawRequest {
    pub fn new(count: usize) -> DrawRequest {
        DrawRequest { count }
    }

    pub(crate) fn validate(&self, roster: &Roster) -> Result<(), DrawErrors> {
        if self.count < 1 || self.count > roster.len() {
            return Err(DrawErrors::InvalidRequest {
                requested: self.count,
                available: roster.len(),
            });
        }
        Ok(())
    }
}

/// Errors that prevent a draw from starting or from completing.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum DrawErrors {
    /// No valid participant was provided.
    EmptyRoster,
    /// The name at this position is blank, untrimmed or a null marker.
    InvalidName { index: usize, name: String },
    /// The number of requested winners is zero or larger than the roster.
    InvalidRequest { requested: usize, available: usize },
    /// Draws are serialized: a round is already playing.
    RoundInProgress,
    /// Nobody is eligible even after normalization. Unreachable for a valid roster.
    EligibilityExhaustion,
    UnknownParticipant(ParticipantId),
}

impl Error for DrawErrors {}

impl Display for DrawErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DrawErrors::EmptyRoster => write!(f, "the roster contains no valid names"),
            DrawErrors::InvalidName { index, name } => {
                write!(f, "invalid name {:?} at position {}", name, index)
            }
            DrawErrors::InvalidRequest {
                requested,
                available,
            } => write!(
                f,
                "cannot draw {} winner(s) from {} participant(s)",
                requested, available
            ),
            DrawErrors::RoundInProgress => write!(f, "a draw is already in progress"),
            DrawErrors::EligibilityExhaustion => {
                write!(f, "no eligible participant left after normalization")
            }
            DrawErrors::UnknownParticipant(id) => write!(f, "unknown participant {}", id),
        }
    }
}

// ********* Configuration **********

/// Timing and shape of the draw animation.
///
/// Delays are expressed in milliseconds on the draw timeline.
#[derive(PartialEq, Debug, Clone)]
pub struct SpinConfig {
    /// Delay after the first scan step.
    pub fast_delay_ms: u64,
    /// Upper bound of the scan delay once it has grown.
    pub slow_delay_ms: u64,
    /// Multiplicative growth of the scan delay, strictly greater than 1.
    pub growth_factor: f64,
    /// Full passes over the candidates before the rollout.
    pub fast_rounds: u32,
    /// Rollout length as a multiple of the number of candidates.
    pub rollout_factor: f64,
    /// Number of blink pairs when revealing the winner.
    pub blink_count: u32,
    pub blink_delay_ms: u64,
    /// Pause between the last blink and the commit.
    pub commit_delay_ms: u64,
    pub next_pick_delay_ms: u64,
    pub finish_delay_ms: u64,
}

impl SpinConfig {
    pub const DEFAULT: SpinConfig = SpinConfig {
        fast_delay_ms: 18,
        slow_delay_ms: 240,
        growth_factor: 1.12,
        fast_rounds: 3,
        rollout_factor: 1.5,
        blink_count: 3,
        blink_delay_ms: 180,
        commit_delay_ms: 100,
        next_pick_delay_ms: 300,
        finish_delay_ms: 150,
    };

    /// Scan steps are never scheduled closer than this.
    pub const MIN_STEP_DELAY_MS: u64 = 5;
}

impl Default for SpinConfig {
    fn default() -> Self {
        SpinConfig::DEFAULT
    }
}

// ******** Notifications *********

/// Everything a front end needs to render a draw.
#[derive(PartialEq, Debug, Clone)]
pub enum DrawEvent {
    RoundStarted {
        picks_total: usize,
    },
    PickStarted {
        pick: usize,
        candidates: Vec<ParticipantId>,
    },
    /// The scan cursor moved to this participant.
    Scan {
        id: ParticipantId,
    },
    /// The winner highlight was switched on or off.
    Reveal {
        id: ParticipantId,
        highlighted: bool,
    },
    PickCommitted {
        winner: ParticipantId,
        name: String,
        picks_done: usize,
        picks_total: usize,
        /// Amount subtracted from every counter by the normalization following the increment.
        normalized_by: u32,
        counters: Vec<u32>,
    },
    /// Winners in the order they were picked.
    RoundCompleted {
        winners: Vec<(ParticipantId, String)>,
    },
    RoundCancelled {
        picks_done: usize,
    },
    RoundAborted {
        reason: DrawErrors,
    },
    Saved,
    SaveFailed {
        message: String,
    },
    HighlightsCleared,
}
