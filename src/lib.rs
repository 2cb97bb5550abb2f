// FSRS review scheduling for algorithm exercises.
// The Scheduler is a pure function of a prior SchedulingState, a Rating, the
// active FsrsParameters and the review time. `item` and `review` hold the
// CSV-backed store used by the `cadence` binary.

pub mod error;
pub mod fsrs;
pub mod interval;
pub mod item;
pub mod params;
pub mod review;
pub mod scheduler;

pub use error::{Result, SchedulerError};
pub use fsrs::Rating;
pub use interval::{FixedFuzz, FuzzSource, SeededFuzz, ThreadFuzz};
pub use params::{FsrsParameters, ParameterStore, ParameterUpdate, load_parameters};
pub use scheduler::{LearningPhase, Preview, Scheduler, SchedulingResult, SchedulingState};
