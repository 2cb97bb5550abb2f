// Review scheduling: turns a prior state and a rating into the next state.
// Every call reads one parameter snapshot and returns a fresh SchedulingState;
// inputs are never modified. A Scheduler is Send + Sync and can be shared behind an Arc.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SchedulerError};
use crate::fsrs::{self, MAX_DIFFICULTY, MIN_DIFFICULTY, Rating, ensure_finite};
use crate::interval::{self, FuzzSource, SeededFuzz};
use crate::params::{FsrsParameters, ParameterStore, ParameterUpdate};

const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum LearningPhase {
    New = 0,
    Learning = 1,
    Review = 2,
    Relearning = 3,
}

impl LearningPhase {
    pub fn from_u8(n: u8) -> Option<LearningPhase> {
        match n {
            0 => Some(LearningPhase::New),
            1 => Some(LearningPhase::Learning),
            2 => Some(LearningPhase::Review),
            3 => Some(LearningPhase::Relearning),
            _ => None,
        }
    }
}

impl From<LearningPhase> for u8 {
    fn from(p: LearningPhase) -> u8 {
        p as u8
    }
}

impl TryFrom<u8> for LearningPhase {
    type Error = SchedulerError;

    fn try_from(n: u8) -> Result<LearningPhase> {
        LearningPhase::from_u8(n)
            .ok_or_else(|| SchedulerError::InvalidState(format!("unknown learning phase {n}")))
    }
}

/// Persisted memory model for one learner/exercise pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulingState {
    pub due: DateTime<Utc>,
    pub stability: f64,
    pub difficulty: f64,
    pub elapsed_days: f64,
    pub scheduled_days: u32,
    pub reps: u32,
    pub lapses: u32,
    pub state: LearningPhase,
    pub last_review: DateTime<Utc>,
}

impl SchedulingState {
    /// Rejects states that could only come from a corrupted store.
    pub fn validate(&self) -> Result<()> {
        if !(self.stability.is_finite() && self.stability > 0.0) {
            return Err(SchedulerError::InvalidState(format!(
                "stability must be positive, got {}",
                self.stability
            )));
        }
        if !(MIN_DIFFICULTY..=MAX_DIFFICULTY).contains(&self.difficulty) {
            return Err(SchedulerError::InvalidState(format!(
                "difficulty {} outside [{MIN_DIFFICULTY}, {MAX_DIFFICULTY}]",
                self.difficulty
            )));
        }
        if !(self.elapsed_days.is_finite() && self.elapsed_days >= 0.0) {
            return Err(SchedulerError::InvalidState(format!(
                "elapsed_days must be non-negative, got {}",
                self.elapsed_days
            )));
        }
        if self.reps < self.lapses {
            return Err(SchedulerError::InvalidState(format!(
                "reps ({}) < lapses ({})",
                self.reps, self.lapses
            )));
        }
        Ok(())
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due <= now
    }

    /// Forgetting-curve recall probability at `now`.
    pub fn retrievability(&self, now: DateTime<Utc>) -> f64 {
        fsrs::retrievability(elapsed_days(self.last_review, now), self.stability)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulingResult {
    pub state: SchedulingState,
    pub next_due: DateTime<Utc>,
    pub interval: u32,
}

/// Simulated outcome for every rating against one prior state.
#[derive(Debug, Clone, PartialEq)]
pub struct Preview {
    pub again: SchedulingResult,
    pub hard: SchedulingResult,
    pub good: SchedulingResult,
    pub easy: SchedulingResult,
}

impl Preview {
    pub fn get(&self, rating: Rating) -> &SchedulingResult {
        match rating {
            Rating::Again => &self.again,
            Rating::Hard => &self.hard,
            Rating::Good => &self.good,
            Rating::Easy => &self.easy,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Rating, &SchedulingResult)> {
        Rating::ALL.into_iter().map(move |g| (g, self.get(g)))
    }
}

/// Fractional days from `from` to `to`, floored at zero.
fn elapsed_days(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let delta = to.signed_duration_since(from);
    let secs = delta.num_milliseconds() as f64 / 1000.0;
    (secs / SECONDS_PER_DAY).max(0.0)
}

pub struct Scheduler {
    params: ParameterStore,
    fuzz: Box<dyn FuzzSource>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self {
            params: ParameterStore::default(),
            fuzz: Box::new(SeededFuzz),
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parameters(params: FsrsParameters) -> Result<Self> {
        Ok(Self {
            params: ParameterStore::new(params)?,
            fuzz: Box::new(SeededFuzz),
        })
    }

    pub fn with_fuzz(mut self, fuzz: impl FuzzSource + 'static) -> Self {
        self.fuzz = Box::new(fuzz);
        self
    }

    pub fn get_parameters(&self) -> FsrsParameters {
        self.params.get_parameters()
    }

    pub fn set_parameters(&self, update: ParameterUpdate) -> Result<()> {
        self.params.set_parameters(update)
    }

    /// State for an exercise that has never been reviewed.
    pub fn initialize_state(&self, rating: Rating, now: DateTime<Utc>) -> SchedulingState {
        initial_state(&self.params.snapshot(), rating, now)
    }

    /// Same as [`Scheduler::initialize_state`] for a raw 1–4 rating.
    pub fn initialize_state_raw(&self, rating: u8, now: DateTime<Utc>) -> Result<SchedulingState> {
        Ok(self.initialize_state(Rating::try_from(rating)?, now))
    }

    pub fn schedule(
        &self,
        prior: Option<&SchedulingState>,
        rating: Rating,
        now: DateTime<Utc>,
    ) -> Result<SchedulingResult> {
        self.schedule_with(&self.params.snapshot(), prior, rating, now)
    }

    /// [`Scheduler::schedule`] for a raw 1–4 rating.
    pub fn schedule_raw(
        &self,
        prior: Option<&SchedulingState>,
        rating: u8,
        now: DateTime<Utc>,
    ) -> Result<SchedulingResult> {
        self.schedule(prior, Rating::try_from(rating)?, now)
    }

    pub fn schedule_now(
        &self,
        prior: Option<&SchedulingState>,
        rating: Rating,
    ) -> Result<SchedulingResult> {
        self.schedule(prior, rating, Utc::now())
    }

    /// Outcome of rating `state` without committing it. The state is read only.
    pub fn simulate_schedule(
        &self,
        state: &SchedulingState,
        rating: Rating,
        now: DateTime<Utc>,
    ) -> Result<SchedulingResult> {
        self.schedule(Some(state), rating, now)
    }

    /// One simulated result per rating, all computed from the same parameter snapshot.
    pub fn preview(&self, prior: Option<&SchedulingState>, now: DateTime<Utc>) -> Result<Preview> {
        let params = self.params.snapshot();
        let run = |rating| self.schedule_with(&params, prior, rating, now);
        Ok(Preview {
            again: run(Rating::Again)?,
            hard: run(Rating::Hard)?,
            good: run(Rating::Good)?,
            easy: run(Rating::Easy)?,
        })
    }

    /// A missing prior state is initialized from `rating`, which is then applied to it.
    fn schedule_with(
        &self,
        params: &Arc<FsrsParameters>,
        prior: Option<&SchedulingState>,
        rating: Rating,
        now: DateTime<Utc>,
    ) -> Result<SchedulingResult> {
        match prior {
            Some(state) => self.apply(params, state, rating, now),
            None => {
                let fresh = initial_state(params, rating, now);
                self.apply(params, &fresh, rating, now)
            }
        }
    }

    fn apply(
        &self,
        params: &Arc<FsrsParameters>,
        prior: &SchedulingState,
        rating: Rating,
        now: DateTime<Utc>,
    ) -> Result<SchedulingResult> {
        prior.validate()?;
        let w = &params.w;

        let elapsed = elapsed_days(prior.last_review, now);
        let r = ensure_finite(
            "retrievability",
            fsrs::retrievability(elapsed, prior.stability),
        )?;

        let reps = increment("reps", prior.reps)?;
        let (stability, lapses, phase) = match rating {
            Rating::Again => (
                fsrs::next_forget_stability(w, prior.difficulty, prior.stability, r),
                increment("lapses", prior.lapses)?,
                LearningPhase::Relearning,
            ),
            Rating::Hard | Rating::Good | Rating::Easy => (
                fsrs::next_recall_stability(w, prior.difficulty, prior.stability, r, rating),
                prior.lapses,
                LearningPhase::Review,
            ),
        };
        let stability = ensure_finite("stability", stability)?;
        let difficulty = ensure_finite(
            "difficulty",
            fsrs::next_difficulty(w, prior.difficulty, rating),
        )?;

        let fuzz_factor = if params.enable_fuzz {
            let seed = interval::fuzz_seed(now.timestamp_millis(), prior.reps, rating);
            self.fuzz.factor(seed)
        } else {
            1.0
        };
        let interval = interval::next_interval(stability, params, fuzz_factor);
        let next_due = now
            .checked_add_signed(Duration::days(i64::from(interval)))
            .ok_or_else(|| {
                SchedulerError::InvalidState(format!(
                    "due date {interval} days after {now} is out of range"
                ))
            })?;

        debug!(
            rating = %rating,
            elapsed_days = elapsed,
            retrievability = r,
            stability,
            difficulty,
            interval,
            "scheduled review"
        );

        let state = SchedulingState {
            due: next_due,
            stability,
            difficulty,
            elapsed_days: elapsed,
            scheduled_days: interval,
            reps,
            lapses,
            state: phase,
            last_review: now,
        };
        Ok(SchedulingResult {
            state,
            next_due,
            interval,
        })
    }
}

fn increment(counter: &'static str, value: u32) -> Result<u32> {
    value
        .checked_add(1)
        .ok_or_else(|| SchedulerError::InvalidState(format!("{counter} counter is saturated")))
}

fn initial_state(params: &FsrsParameters, rating: Rating, now: DateTime<Utc>) -> SchedulingState {
    SchedulingState {
        due: now,
        stability: fsrs::init_stability(&params.w, rating),
        difficulty: fsrs::init_difficulty(&params.w, rating),
        elapsed_days: 0.0,
        scheduled_days: 0,
        reps: 0,
        lapses: 0,
        state: LearningPhase::New,
        last_review: now,
    }
}
