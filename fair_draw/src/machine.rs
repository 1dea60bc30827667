use log::{debug, error, info, warn};
use rand::rngs::StdRng;

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::error::Error;

use crate::config::*;
use crate::{eligible, generate_path, normalize, BatchTracker};

/// Milliseconds on the draw timeline.
pub type Millis = u64;

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct StepHandle(u64);

/// A virtual clock with an ordered queue of pending steps.
///
/// Steps are keyed by due time, then by scheduling order, so two steps due at the
/// same instant run in the order they were scheduled.
#[derive(Debug)]
pub struct Timeline<S> {
    now: Millis,
    next_seq: u64,
    queue: BTreeMap<(Millis, u64), S>,
}

impl<S> Default for Timeline<S> {
    fn default() -> Self {
        Timeline {
            now: 0,
            next_seq: 0,
            queue: BTreeMap::new(),
        }
    }
}

impl<S> Timeline<S> {
    pub fn new() -> Timeline<S> {
        Timeline::default()
    }

    pub fn now(&self) -> Millis {
        self.now
    }

    pub fn schedule(&mut self, delay: Millis, step: S) -> StepHandle {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.insert((self.now.saturating_add(delay), seq), step);
        StepHandle(seq)
    }

    /// Returns false if the step already ran or was cancelled.
    pub fn cancel(&mut self, handle: StepHandle) -> bool {
        let key = self.queue.keys().find(|(_, seq)| *seq == handle.0).cloned();
        match key {
            Some(k) => self.queue.remove(&k).is_some(),
            None => false,
        }
    }

    pub fn next_due(&self) -> Option<Millis> {
        self.queue.keys().next().map(|(due, _)| *due)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Removes the earliest step if it is due at or before `until`, moving the clock to its due time.
    pub fn pop_due(&mut self, until: Millis) -> Option<S> {
        let key = *self.queue.keys().next()?;
        if key.0 > until {
            return None;
        }
        self.now = std::cmp::max(self.now, key.0);
        self.queue.remove(&key)
    }

    fn advance_clock(&mut self, to: Millis) {
        self.now = std::cmp::max(self.now, to);
    }
}

/// Where the roster goes once a round is complete.
pub trait RosterSink {
    fn save(&mut self, roster: &Roster) -> Result<(), Box<dyn Error>>;
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum Phase {
    Idle,
    Scanning,
    Revealing,
    Committing,
    /// Waiting before the next pick of the same round.
    NextPick,
    /// All picks are committed, waiting to save and close the round.
    RoundComplete,
}

/// Visual state, independent of the counters.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct Highlights {
    pub scan: Option<ParticipantId>,
    pub winners: BTreeSet<ParticipantId>,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
enum Step {
    Scan,
    Blink,
    Commit,
    NextPick,
    FinishRound,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
struct Scheduled {
    round: u64,
    step: Step,
}

#[derive(Debug)]
struct PickState {
    path: VecDeque<ParticipantId>,
    winner: ParticipantId,
    delay: f64,
    toggles_left: u32,
    // The winner was already highlighted before this pick started.
    was_highlighted: bool,
}

#[derive(Debug)]
struct RoundState {
    picks_total: usize,
    winners: Vec<ParticipantId>,
    pick: Option<PickState>,
}

/// Plays rounds of picks on a timeline. This is the only place where counters change.
///
/// The machine never blocks: callers drive it with [`DrawMachine::advance_to`] (real
/// time) or [`DrawMachine::run_until_idle`] (as fast as possible), and collect the
/// notifications with [`DrawMachine::drain_events`].
///
/// Callers are expected to drain the notifications regularly. At most
/// [`DrawMachine::MAX_QUEUED_EVENTS`] are kept; past that the oldest ones are dropped.
pub struct DrawMachine {
    roster: Roster,
    config: SpinConfig,
    rng: StdRng,
    timeline: Timeline<Scheduled>,
    phase: Phase,
    // Incremented for every round, so that leftover steps of an old round are ignored.
    round_id: u64,
    // The step the live round is waiting on. There is at most one.
    pending: Option<StepHandle>,
    round: Option<RoundState>,
    batch: BatchTracker,
    highlights: Highlights,
    sink: Option<Box<dyn RosterSink>>,
    events: VecDeque<DrawEvent>,
    dropped_events: usize,
}

impl DrawMachine {
    pub const MAX_QUEUED_EVENTS: usize = 4096;

    pub fn new(roster: Roster, config: SpinConfig, rng: StdRng) -> DrawMachine {
        DrawMachine {
            roster,
            config,
            rng,
            timeline: Timeline::new(),
            phase: Phase::Idle,
            round_id: 0,
            pending: None,
            round: None,
            batch: BatchTracker::new(),
            highlights: Highlights::default(),
            sink: None,
            events: VecDeque::new(),
            dropped_events: 0,
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn RosterSink>) -> DrawMachine {
        self.sink = Some(sink);
        self
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn config(&self) -> &SpinConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase != Phase::Idle
    }

    pub fn highlights(&self) -> &Highlights {
        &self.highlights
    }

    pub fn batch(&self) -> &BatchTracker {
        &self.batch
    }

    pub fn now(&self) -> Millis {
        self.timeline.now()
    }

    pub fn next_due(&self) -> Option<Millis> {
        self.timeline.next_due()
    }

    pub fn drain_events(&mut self) -> Vec<DrawEvent> {
        if self.dropped_events > 0 {
            warn!(
                "drain_events: {} notification(s) were dropped, the queue was full",
                self.dropped_events
            );
            self.dropped_events = 0;
        }
        self.events.drain(..).collect()
    }

    fn push_event(&mut self, event: DrawEvent) {
        if self.events.len() >= DrawMachine::MAX_QUEUED_EVENTS {
            self.events.pop_front();
            self.dropped_events += 1;
        }
        self.events.push_back(event);
    }

    /// Starts a round of `request.count` picks. The first pick begins immediately.
    pub fn start_round(&mut self, request: DrawRequest) -> Result<(), DrawErrors> {
        if self.is_active() {
            warn!("start_round: rejected, a round is already in progress");
            return Err(DrawErrors::RoundInProgress);
        }
        request.validate(&self.roster)?;

        self.batch.clear();
        self.round_id += 1;
        self.round = Some(RoundState {
            picks_total: request.count,
            winners: Vec::new(),
            pick: None,
        });
        info!(
            "Round {}: drawing {} of {} participants",
            self.round_id,
            request.count,
            self.roster.len()
        );
        self.push_event(DrawEvent::RoundStarted {
            picks_total: request.count,
        });
        self.begin_pick();
        Ok(())
    }

    /// Stops the current round. Picks committed so far are kept, the pick in flight is dropped.
    /// Returns false if no round was running.
    pub fn cancel_round(&mut self) -> bool {
        if !self.is_active() {
            return false;
        }
        let picks_done = self.round.as_ref().map(|r| r.winners.len()).unwrap_or(0);
        self.stop_round();
        warn!(
            "Round {} cancelled after {} pick(s)",
            self.round_id, picks_done
        );
        self.push_event(DrawEvent::RoundCancelled { picks_done });
        true
    }

    /// Clears scan and winner highlights. Counters are not touched.
    pub fn reset_visual_highlights(&mut self) {
        self.highlights = Highlights::default();
        self.push_event(DrawEvent::HighlightsCleared);
    }

    /// Swaps in a freshly loaded roster, cancelling any round in progress first.
    pub fn replace_roster(&mut self, roster: Roster) {
        self.cancel_round();
        info!("Roster replaced: {} participant(s)", roster.len());
        self.roster = roster;
        self.reset_visual_highlights();
    }

    pub fn set_config(&mut self, config: SpinConfig) {
        self.config = config;
    }

    /// Runs every step due at or before `now`, in order.
    pub fn advance_to(&mut self, now: Millis) {
        while let Some(scheduled) = self.timeline.pop_due(now) {
            self.run_step(scheduled);
        }
        self.timeline.advance_clock(now);
    }

    /// Plays the timeline until nothing is scheduled anymore.
    pub fn run_until_idle(&mut self) {
        while let Some(due) = self.timeline.next_due() {
            self.advance_to(due);
        }
    }

    fn schedule(&mut self, delay: Millis, step: Step) {
        let handle = self.timeline.schedule(
            delay,
            Scheduled {
                round: self.round_id,
                step,
            },
        );
        self.pending = Some(handle);
    }

    fn run_step(&mut self, scheduled: Scheduled) {
        self.pending = None;
        if scheduled.round != self.round_id || self.round.is_none() {
            debug!("run_step: dropping stale step {:?}", scheduled);
            return;
        }
        match scheduled.step {
            Step::Scan => self.scan_step(),
            Step::Blink => self.blink_step(),
            Step::Commit => self.commit_step(),
            Step::NextPick => self.begin_pick(),
            Step::FinishRound => self.finish_round(),
        }
    }

    fn begin_pick(&mut self) {
        let mut cohort = eligible(&self.roster);
        if cohort.is_empty() {
            normalize(&mut self.roster);
            cohort = eligible(&self.roster);
        }
        let candidates = self.batch.filter(&cohort);
        let path = match generate_path(&candidates, &self.config, &mut self.rng) {
            Ok(p) => p,
            Err(e) => {
                self.abort(e);
                return;
            }
        };
        let was_highlighted = self.highlights.winners.contains(&path.winner);
        let pick_no = match self.round.as_mut() {
            Some(round) => {
                round.pick = Some(PickState {
                    path: path.steps.into(),
                    winner: path.winner,
                    delay: self.config.fast_delay_ms as f64,
                    toggles_left: self.config.blink_count.saturating_mul(2),
                    was_highlighted,
                });
                round.winners.len() + 1
            }
            None => return,
        };
        debug!(
            "begin_pick: pick {} among {} candidate(s)",
            pick_no,
            candidates.len()
        );
        self.push_event(DrawEvent::PickStarted {
            pick: pick_no,
            candidates,
        });
        self.phase = Phase::Scanning;
        self.schedule(0, Step::Scan);
    }

    fn scan_step(&mut self) {
        let growth = self.config.growth_factor;
        let slow = self.config.slow_delay_ms as f64;
        let pick = match self.round.as_mut().and_then(|r| r.pick.as_mut()) {
            Some(p) => p,
            None => return,
        };
        match pick.path.pop_front() {
            Some(id) => {
                pick.delay = f64::min(pick.delay * growth, slow);
                let delay = std::cmp::max(SpinConfig::MIN_STEP_DELAY_MS, pick.delay as Millis);
                self.highlights.scan = Some(id);
                self.push_event(DrawEvent::Scan { id });
                self.schedule(delay, Step::Scan);
            }
            None => {
                let winner = pick.winner;
                self.highlights.scan = None;
                self.set_winner_highlight(winner, true);
                self.phase = Phase::Revealing;
                self.schedule(0, Step::Blink);
            }
        }
    }

    fn blink_step(&mut self) {
        let pick = match self.round.as_mut().and_then(|r| r.pick.as_mut()) {
            Some(p) => p,
            None => return,
        };
        let winner = pick.winner;
        if pick.toggles_left == 0 {
            if !self.highlights.winners.contains(&winner) {
                self.set_winner_highlight(winner, true);
            }
            self.phase = Phase::Committing;
            self.schedule(self.config.commit_delay_ms, Step::Commit);
            return;
        }
        pick.toggles_left -= 1;
        let on = !self.highlights.winners.contains(&winner);
        self.set_winner_highlight(winner, on);
        self.schedule(self.config.blink_delay_ms, Step::Blink);
    }

    fn set_winner_highlight(&mut self, id: ParticipantId, highlighted: bool) {
        if highlighted {
            self.highlights.winners.insert(id);
        } else {
            self.highlights.winners.remove(&id);
        }
        self.push_event(DrawEvent::Reveal { id, highlighted });
    }

    fn commit_step(&mut self) {
        let winner = match self.round.as_ref().and_then(|r| r.pick.as_ref()) {
            Some(p) => p.winner,
            None => return,
        };
        // Nothing is mutated if the winner is not in the roster.
        if let Err(e) = self.roster.increment(winner) {
            self.abort(e);
            return;
        }
        self.batch.record(winner);
        let normalized_by = normalize(&mut self.roster);
        let name = self.roster.name(winner).unwrap_or_default().to_string();

        let (picks_done, picks_total) = match self.round.as_mut() {
            Some(round) => {
                round.pick = None;
                round.winners.push(winner);
                (round.winners.len(), round.picks_total)
            }
            None => return,
        };
        info!(
            "Pick {}/{}: {} ({})",
            picks_done, picks_total, name, winner
        );
        self.push_event(DrawEvent::PickCommitted {
            winner,
            name,
            picks_done,
            picks_total,
            normalized_by,
            counters: self.roster.counters(),
        });

        if picks_done < picks_total {
            self.phase = Phase::NextPick;
            self.schedule(self.config.next_pick_delay_ms, Step::NextPick);
        } else {
            self.phase = Phase::RoundComplete;
            self.schedule(self.config.finish_delay_ms, Step::FinishRound);
        }
    }

    fn finish_round(&mut self) {
        let round = match self.round.take() {
            Some(r) => r,
            None => return,
        };
        if let Some(sink) = self.sink.as_mut() {
            match sink.save(&self.roster) {
                Ok(()) => {
                    info!("Roster saved");
                    self.push_event(DrawEvent::Saved);
                }
                Err(e) => {
                    error!("Saving the roster failed: {}", e);
                    self.push_event(DrawEvent::SaveFailed {
                        message: e.to_string(),
                    });
                }
            }
        }
        self.batch.clear();
        self.phase = Phase::Idle;
        let winners: Vec<(ParticipantId, String)> = round
            .winners
            .iter()
            .map(|id| (*id, self.roster.name(*id).unwrap_or_default().to_string()))
            .collect();
        info!(
            "Round {} complete: {}",
            self.round_id,
            winners
                .iter()
                .map(|(_, n)| n.as_str())
                .collect::<Vec<&str>>()
                .join(", ")
        );
        self.push_event(DrawEvent::RoundCompleted { winners });
    }

    fn abort(&mut self, reason: DrawErrors) {
        error!("Round {} aborted: {}", self.round_id, reason);
        self.stop_round();
        self.push_event(DrawEvent::RoundAborted { reason });
    }

    // Drops the pending step before touching any state.
    fn stop_round(&mut self) {
        if let Some(handle) = self.pending.take() {
            let cancelled = self.timeline.cancel(handle);
            debug!("stop_round: pending step cancelled: {}", cancelled);
        }
        if let Some(pick) = self.round.as_ref().and_then(|r| r.pick.as_ref()) {
            if !pick.was_highlighted {
                self.highlights.winners.remove(&pick.winner);
            }
        }
        self.highlights.scan = None;
        self.round = None;
        self.batch.clear();
        self.phase = Phase::Idle;
        // Anything still referring to the old round is now stale.
        self.round_id += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn roster(counters: &[u32]) -> Roster {
        let ps = counters
            .iter()
            .enumerate()
            .map(|(idx, c)| Participant {
                name: ["A", "B", "C", "D", "E", "F"][idx].to_string(),
                counter: *c,
            })
            .collect();
        Roster::new(ps).unwrap()
    }

    fn machine(counters: &[u32], seed: u64) -> DrawMachine {
        DrawMachine::new(
            roster(counters),
            SpinConfig::DEFAULT,
            StdRng::seed_from_u64(seed),
        )
    }

    fn commits(events: &[DrawEvent]) -> Vec<(ParticipantId, Vec<u32>)> {
        events
            .iter()
            .filter_map(|e| match e {
                DrawEvent::PickCommitted {
                    winner, counters, ..
                } => Some((*winner, counters.clone())),
                _ => None,
            })
            .collect()
    }

    #[derive(Clone, Default)]
    struct MemorySink {
        saved: Rc<RefCell<Vec<Vec<u32>>>>,
        fail: bool,
    }

    impl RosterSink for MemorySink {
        fn save(&mut self, roster: &Roster) -> Result<(), Box<dyn Error>> {
            if self.fail {
                return Err("disk full".into());
            }
            self.saved.borrow_mut().push(roster.counters());
            Ok(())
        }
    }

    #[test]
    fn timeline_orders_by_due_time_then_schedule_order() {
        let mut t: Timeline<&str> = Timeline::new();
        t.schedule(10, "b");
        t.schedule(5, "a");
        let h = t.schedule(10, "c");
        t.schedule(10, "d");
        assert!(t.cancel(h));
        assert!(!t.cancel(h));
        assert_eq!(t.pop_due(4), None);
        assert_eq!(t.pop_due(100), Some("a"));
        assert_eq!(t.now(), 5);
        assert_eq!(t.pop_due(100), Some("b"));
        assert_eq!(t.pop_due(100), Some("d"));
        assert!(t.is_empty());
    }

    #[test]
    fn three_picks_among_three_equal_participants() {
        init();
        let mut m = machine(&[0, 0, 0], 5);
        m.start_round(DrawRequest::new(3)).unwrap();
        m.run_until_idle();
        let events = m.drain_events();

        let cs = commits(&events);
        assert_eq!(cs.len(), 3);
        let winners: BTreeSet<ParticipantId> = cs.iter().map(|(w, _)| *w).collect();
        assert_eq!(winners.len(), 3);
        // The first two winners stay one ahead until everybody has won once.
        assert_eq!(cs[0].1.iter().sum::<u32>(), 1);
        assert_eq!(cs[1].1.iter().sum::<u32>(), 2);
        assert_eq!(cs[2].1, vec![0, 0, 0]);
        assert_eq!(m.roster().counters(), vec![0, 0, 0]);
        assert_eq!(m.phase(), Phase::Idle);

        match events.last() {
            Some(DrawEvent::RoundCompleted { winners }) => assert_eq!(winners.len(), 3),
            e => panic!("unexpected last event {:?}", e),
        }
    }

    #[test]
    fn only_the_minimum_cohort_can_win() {
        for seed in 0..20 {
            let mut m = machine(&[0, 0, 1], seed);
            m.start_round(DrawRequest::new(1)).unwrap();
            m.run_until_idle();
            let cs = commits(&m.drain_events());
            assert_eq!(cs.len(), 1);
            let w = cs[0].0;
            assert!(w == ParticipantId(0) || w == ParticipantId(1));
            assert_eq!(m.roster().participants()[2].counter, 1);
            assert_eq!(m.roster().participants()[w.0].counter, 1);
        }
    }

    #[test]
    fn single_picks_stay_within_one() {
        let mut m = machine(&[0, 0, 0, 0, 0], 99);
        for _ in 0..40 {
            m.start_round(DrawRequest::new(1)).unwrap();
            m.run_until_idle();
            let cs = m.roster().counters();
            let max = cs.iter().max().unwrap();
            let min = cs.iter().min().unwrap();
            assert!(max - min <= 1, "counters drifted: {:?}", cs);
            assert_eq!(*min, 0);
        }
    }

    #[test]
    fn no_repeat_within_a_round_until_cohort_is_exhausted() {
        for seed in 0..10 {
            let mut m = machine(&[0, 0, 0, 0, 0], seed);
            m.start_round(DrawRequest::new(4)).unwrap();
            m.run_until_idle();
            let winners: Vec<ParticipantId> =
                commits(&m.drain_events()).iter().map(|(w, _)| *w).collect();
            let distinct: BTreeSet<ParticipantId> = winners.iter().cloned().collect();
            assert_eq!(distinct.len(), 4);
        }
    }

    #[test]
    fn exhausted_cohort_allows_repeats() {
        let mut m = machine(&[0, 0, 5], 3);
        m.start_round(DrawRequest::new(3)).unwrap();
        m.run_until_idle();
        let winners: Vec<ParticipantId> =
            commits(&m.drain_events()).iter().map(|(w, _)| *w).collect();
        assert_eq!(winners.len(), 3);
        assert!(!winners.contains(&ParticipantId(2)));
        assert_ne!(winners[0], winners[1]);
    }

    #[test]
    fn rejects_invalid_and_concurrent_requests() {
        let mut m = machine(&[0, 0], 1);
        assert_eq!(
            m.start_round(DrawRequest::new(0)),
            Err(DrawErrors::InvalidRequest {
                requested: 0,
                available: 2
            })
        );
        assert!(m.start_round(DrawRequest::new(3)).is_err());
        assert_eq!(m.phase(), Phase::Idle);
        assert!(m.drain_events().is_empty());

        m.start_round(DrawRequest::new(1)).unwrap();
        assert_eq!(m.phase(), Phase::Scanning);
        assert_eq!(
            m.start_round(DrawRequest::new(1)),
            Err(DrawErrors::RoundInProgress)
        );
    }

    #[test]
    fn scan_delays_grow_up_to_the_slow_delay() {
        let mut m = machine(&[0, 0, 0, 0], 8);
        m.start_round(DrawRequest::new(1)).unwrap();
        let mut scan_times: Vec<Millis> = Vec::new();
        while let Some(due) = m.next_due() {
            m.advance_to(due);
            if m.drain_events()
                .iter()
                .any(|e| matches!(e, DrawEvent::Scan { .. }))
            {
                scan_times.push(m.now());
            }
        }
        let gaps: Vec<Millis> = scan_times.windows(2).map(|w| w[1] - w[0]).collect();
        assert!(!gaps.is_empty());
        assert!(gaps.windows(2).all(|g| g[0] <= g[1]));
        assert_eq!(gaps[0], 20); // 18 * 1.12, truncated
        assert!(gaps.iter().all(|g| *g <= 240));
    }

    #[test]
    fn reveal_blinks_and_ends_highlighted() {
        let mut m = machine(&[0, 0], 4);
        m.start_round(DrawRequest::new(1)).unwrap();
        m.run_until_idle();
        let events = m.drain_events();
        let reveals: Vec<bool> = events
            .iter()
            .filter_map(|e| match e {
                DrawEvent::Reveal { highlighted, .. } => Some(*highlighted),
                _ => None,
            })
            .collect();
        // On, then three blink pairs.
        assert_eq!(reveals, vec![true, false, true, false, true, false, true]);
        let (winner, _) = commits(&events)[0].clone();
        assert!(m.highlights().winners.contains(&winner));
        assert_eq!(m.highlights().scan, None);

        m.reset_visual_highlights();
        assert!(m.highlights().winners.is_empty());
        assert_eq!(m.roster().participants()[winner.0].counter, 1);
    }

    #[test]
    fn cancel_mid_round_keeps_committed_picks_only() {
        let mut m = machine(&[0, 0, 0, 0], 12);
        m.start_round(DrawRequest::new(3)).unwrap();
        // Run until the first pick is committed, then a little more.
        loop {
            let due = m.next_due().unwrap();
            m.advance_to(due);
            if m.phase() == Phase::NextPick {
                break;
            }
        }
        let after_first = m.roster().counters();
        let due = m.next_due().unwrap();
        m.advance_to(due + 50);
        assert_eq!(m.phase(), Phase::Scanning);
        assert!(m.pending.is_some());

        assert!(m.cancel_round());
        assert_eq!(m.phase(), Phase::Idle);
        assert_eq!(m.pending, None);
        assert_eq!(m.next_due(), None);
        assert_eq!(m.highlights().scan, None);
        m.run_until_idle();
        assert_eq!(m.roster().counters(), after_first);
        assert!(m.batch().selected().is_empty());

        let events = m.drain_events();
        assert_eq!(commits(&events).len(), 1);
        assert!(matches!(
            events.last(),
            Some(DrawEvent::RoundCancelled { picks_done: 1 })
        ));
        assert!(!m.cancel_round());

        // A new round can start right away.
        m.start_round(DrawRequest::new(1)).unwrap();
        m.run_until_idle();
        assert_eq!(commits(&m.drain_events()).len(), 1);
    }

    #[test]
    fn cancel_during_reveal_drops_the_pending_winner() {
        let mut m = machine(&[0, 0, 0], 21);
        m.start_round(DrawRequest::new(1)).unwrap();
        while m.phase() != Phase::Revealing {
            let due = m.next_due().unwrap();
            m.advance_to(due);
        }
        m.cancel_round();
        assert!(m.highlights().winners.is_empty());
        assert_eq!(m.roster().counters(), vec![0, 0, 0]);
    }

    #[test]
    fn replacing_the_roster_cancels_the_round() {
        let mut m = machine(&[0, 0, 0], 2);
        m.start_round(DrawRequest::new(2)).unwrap();
        m.advance_to(100);
        m.replace_roster(roster(&[3, 1]));
        m.run_until_idle();
        assert_eq!(m.roster().counters(), vec![3, 1]);
        let events = m.drain_events();
        assert!(commits(&events).is_empty());
        assert!(events
            .iter()
            .any(|e| matches!(e, DrawEvent::RoundCancelled { picks_done: 0 })));
    }

    #[test]
    fn completed_round_is_saved() {
        let sink = MemorySink::default();
        let saved = sink.saved.clone();
        let mut m = machine(&[1, 0, 0], 6).with_sink(Box::new(sink));
        m.start_round(DrawRequest::new(2)).unwrap();
        m.run_until_idle();
        assert_eq!(saved.borrow().as_slice(), &[vec![0, 0, 0]]);
        assert!(m.drain_events().contains(&DrawEvent::Saved));
    }

    #[test]
    fn failed_save_keeps_the_roster() {
        let sink = MemorySink {
            fail: true,
            ..MemorySink::default()
        };
        let mut m = machine(&[0, 0], 6).with_sink(Box::new(sink));
        m.start_round(DrawRequest::new(1)).unwrap();
        m.run_until_idle();
        let events = m.drain_events();
        assert!(events.contains(&DrawEvent::SaveFailed {
            message: "disk full".to_string()
        }));
        assert_eq!(m.phase(), Phase::Idle);
        assert_eq!(m.roster().counters().iter().sum::<u32>(), 1);
    }

    #[test]
    fn failed_commit_aborts_without_touching_counters() {
        init();
        let mut m = machine(&[0, 0, 0], 9);
        m.start_round(DrawRequest::new(2)).unwrap();
        while m.phase() != Phase::NextPick {
            let due = m.next_due().unwrap();
            m.advance_to(due);
        }
        assert_eq!(m.batch().selected().len(), 1);
        while m.phase() != Phase::Committing {
            let due = m.next_due().unwrap();
            m.advance_to(due);
        }
        let counters = m.roster().counters();
        // The second commit refers to somebody who is not in the roster.
        m.round.as_mut().unwrap().pick.as_mut().unwrap().winner = ParticipantId(99);
        m.run_until_idle();

        assert_eq!(m.phase(), Phase::Idle);
        assert!(m.batch().selected().is_empty());
        assert_eq!(m.roster().counters(), counters);
        assert_eq!(m.next_due(), None);
        let events = m.drain_events();
        assert_eq!(commits(&events).len(), 1);
        assert!(matches!(
            events.last(),
            Some(DrawEvent::RoundAborted {
                reason: DrawErrors::UnknownParticipant(ParticipantId(99))
            })
        ));

        // The machine is usable again.
        m.start_round(DrawRequest::new(1)).unwrap();
        m.run_until_idle();
        assert_eq!(commits(&m.drain_events()).len(), 1);
    }

    #[test]
    fn huge_blink_count_saturates() {
        let config = SpinConfig {
            blink_count: 3_000_000_000,
            ..SpinConfig::DEFAULT
        };
        let mut m = DrawMachine::new(roster(&[0, 0]), config, StdRng::seed_from_u64(1));
        m.start_round(DrawRequest::new(1)).unwrap();
        let toggles = m.round.as_ref().unwrap().pick.as_ref().unwrap().toggles_left;
        assert_eq!(toggles, u32::MAX);
        assert!(m.cancel_round());
    }

    #[test]
    fn undrained_notifications_are_capped() {
        let mut m = machine(&[0, 0, 0, 0, 0], 4);
        for _ in 0..300 {
            m.start_round(DrawRequest::new(1)).unwrap();
            m.run_until_idle();
        }
        let events = m.drain_events();
        assert_eq!(events.len(), DrawMachine::MAX_QUEUED_EVENTS);
        assert!(matches!(
            events.last(),
            Some(DrawEvent::RoundCompleted { .. })
        ));
        assert!(m.drain_events().is_empty());
    }
}
