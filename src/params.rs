// Scheduling parameters and the store that serves them.
// ParameterStore keeps one immutable FsrsParameters snapshot behind an Arc.
// Updates are validated into a new snapshot and swapped in whole, so readers
// never observe a partially applied weight vector.

use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, SchedulerError};
use crate::fsrs::{WEIGHT_COUNT, Weights};

/// FSRS-5 default weights.
///
/// | index  | role                                            |
/// |--------|-------------------------------------------------|
/// | 0..=3  | initial stability for Again, Hard, Good, Easy   |
/// | 4, 5   | initial difficulty offset and rating slope      |
/// | 6      | difficulty step per rating                      |
/// | 7      | mean-reversion weight                           |
/// | 8..=10 | recall stability growth                         |
/// | 11..=14| post-lapse stability                            |
/// | 15, 16 | hard penalty, easy bonus                        |
/// | 17, 18 | short-term terms, unused by this scheduler      |
pub const DEFAULT_WEIGHTS: Weights = [
    0.40255, 1.18385, 3.173, 15.69105, 7.1949, 0.5345, 1.4604, 0.0046, 1.54575, 0.1192, 1.01925,
    1.9395, 0.11, 0.29605, 2.2698, 0.2315, 2.9898, 0.51655, 0.6621,
];

pub const DEFAULT_RETENTION: f64 = 0.9;

/// Roughly one hundred years.
pub const DEFAULT_MAXIMUM_INTERVAL: u32 = 36500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FsrsParameters {
    pub w: Weights,
    pub request_retention: f64,
    pub maximum_interval: u32,
    pub enable_fuzz: bool,
}

impl Default for FsrsParameters {
    fn default() -> Self {
        Self {
            w: DEFAULT_WEIGHTS,
            request_retention: DEFAULT_RETENTION,
            maximum_interval: DEFAULT_MAXIMUM_INTERVAL,
            enable_fuzz: true,
        }
    }
}

impl FsrsParameters {
    pub fn validate(&self) -> Result<()> {
        if let Some(i) = self.w.iter().position(|w| !w.is_finite()) {
            return Err(SchedulerError::InvalidConfiguration(format!(
                "weight w{i} is not finite"
            )));
        }
        if !(self.request_retention > 0.0 && self.request_retention < 1.0) {
            return Err(SchedulerError::InvalidConfiguration(format!(
                "request_retention must be in (0, 1), got {}",
                self.request_retention
            )));
        }
        if self.maximum_interval < 1 {
            return Err(SchedulerError::InvalidConfiguration(
                "maximum_interval must be at least 1 day".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns a new parameter set with `update` merged over `self`.
    pub fn merged(&self, update: &ParameterUpdate) -> Result<FsrsParameters> {
        let mut next = self.clone();
        if let Some(w) = &update.w {
            next.w = w.as_slice().try_into().map_err(|_| {
                SchedulerError::InvalidConfiguration(format!(
                    "weights array must contain exactly {WEIGHT_COUNT} values, got {}",
                    w.len()
                ))
            })?;
        }
        if let Some(r) = update.request_retention {
            next.request_retention = r;
        }
        if let Some(m) = update.maximum_interval {
            next.maximum_interval = m;
        }
        if let Some(f) = update.enable_fuzz {
            next.enable_fuzz = f;
        }
        next.validate()?;
        Ok(next)
    }
}

/// Partial parameter update. Absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParameterUpdate {
    pub w: Option<Vec<f64>>,
    pub request_retention: Option<f64>,
    pub maximum_interval: Option<u32>,
    pub enable_fuzz: Option<bool>,
}

/// Reads a JSON [`ParameterUpdate`] from `path` and merges it over the defaults.
pub fn load_parameters(path: &Path) -> Result<FsrsParameters> {
    let text = std::fs::read_to_string(path)?;
    let update: ParameterUpdate = serde_json::from_str(&text)?;
    let params = FsrsParameters::default().merged(&update)?;
    info!(path = %path.display(), "loaded scheduling parameters");
    Ok(params)
}

#[derive(Debug)]
pub struct ParameterStore {
    current: RwLock<Arc<FsrsParameters>>,
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self {
            current: RwLock::new(Arc::new(FsrsParameters::default())),
        }
    }
}

impl ParameterStore {
    pub fn new(params: FsrsParameters) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            current: RwLock::new(Arc::new(params)),
        })
    }

    /// The active snapshot. Stays valid and unchanged after later updates.
    pub fn snapshot(&self) -> Arc<FsrsParameters> {
        // The guarded value is a single Arc, so a poisoned lock still holds a complete snapshot.
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get_parameters(&self) -> FsrsParameters {
        self.snapshot().as_ref().clone()
    }

    pub fn set_parameters(&self, update: ParameterUpdate) -> Result<()> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        match guard.merged(&update) {
            Ok(next) => {
                *guard = Arc::new(next);
                info!(
                    retention = guard.request_retention,
                    maximum_interval = guard.maximum_interval,
                    enable_fuzz = guard.enable_fuzz,
                    "scheduling parameters updated"
                );
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "rejected parameter update");
                Err(e)
            }
        }
    }

    pub fn replace(&self, params: FsrsParameters) -> Result<()> {
        params.validate()?;
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(params);
        info!("scheduling parameters replaced");
        Ok(())
    }
}
