use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::scheduler::{LearningPhase, SchedulingState};

const HEADER: [&str; 13] = [
    "collection",
    "prompt",
    "solution",
    "id",
    "due",
    "stability",
    "difficulty",
    "elapsed_days",
    "scheduled_days",
    "reps",
    "lapses",
    "phase",
    "last_review",
];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open {}: {source}", path.display())]
    Open { path: PathBuf, source: csv::Error },

    #[error("CSV error in {}: {source}", path.display())]
    Csv { path: PathBuf, source: csv::Error },

    #[error("{} row {row}: bad {column} value {value:?}", path.display())]
    Field {
        path: PathBuf,
        row: usize,
        column: &'static str,
        value: String,
    },

    #[error("write error in {}: {source}", path.display())]
    Write { path: PathBuf, source: std::io::Error },
}

/// One algorithm exercise and its persisted schedule. `state` is `None` until
/// the first review.
#[derive(Debug, Clone, PartialEq)]
pub struct Exercise {
    pub collection: String,
    pub prompt: String,
    pub solution: String,
    pub id: String,
    pub state: Option<SchedulingState>,
}

pub fn expand_newlines(s: &str) -> String {
    s.replace("\\n", "\n")
}

fn get_field(record: &csv::StringRecord, index: usize) -> String {
    record.get(index).unwrap_or("").to_string()
}

struct RowParser<'a> {
    path: &'a Path,
    row: usize,
    record: &'a csv::StringRecord,
}

impl RowParser<'_> {
    fn raw(&self, index: usize) -> &str {
        self.record.get(index).unwrap_or("").trim()
    }

    fn bad(&self, index: usize) -> StoreError {
        StoreError::Field {
            path: self.path.to_path_buf(),
            row: self.row,
            column: HEADER[index],
            value: self.raw(index).to_string(),
        }
    }

    fn parse<T: std::str::FromStr>(&self, index: usize) -> Result<T, StoreError> {
        self.raw(index).parse().map_err(|_| self.bad(index))
    }

    fn date(&self, index: usize) -> Result<DateTime<Utc>, StoreError> {
        DateTime::parse_from_rfc3339(self.raw(index))
            .map(|d| d.with_timezone(&Utc))
            .map_err(|_| self.bad(index))
    }

    fn phase(&self, index: usize) -> Result<LearningPhase, StoreError> {
        self.parse::<u8>(index)
            .ok()
            .and_then(LearningPhase::from_u8)
            .ok_or_else(|| self.bad(index))
    }

    /// An empty stability column marks an exercise that has never been reviewed.
    fn state(&self) -> Result<Option<SchedulingState>, StoreError> {
        if self.raw(5).is_empty() {
            return Ok(None);
        }
        Ok(Some(SchedulingState {
            due: self.date(4)?,
            stability: self.parse(5)?,
            difficulty: self.parse(6)?,
            elapsed_days: self.parse(7)?,
            scheduled_days: self.parse(8)?,
            reps: self.parse(9)?,
            lapses: self.parse(10)?,
            state: self.phase(11)?,
            last_review: self.date(12)?,
        }))
    }
}

pub fn load_csv(path: &Path) -> Result<Vec<Exercise>, StoreError> {
    let default_collection = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("default")
        .to_string();

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;

    let mut exercises = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let record = result.map_err(|source| StoreError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let row = RowParser {
            path,
            row: i + 2,
            record: &record,
        };

        let collection_raw = get_field(&record, 0);
        let collection = if collection_raw.trim().is_empty() {
            default_collection.clone()
        } else {
            collection_raw
        };

        let id_raw = get_field(&record, 3);
        let id = if id_raw.trim().is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            id_raw
        };

        exercises.push(Exercise {
            collection,
            prompt: get_field(&record, 1),
            solution: get_field(&record, 2),
            id,
            state: row.state()?,
        });
    }
    Ok(exercises)
}

fn state_fields(state: Option<&SchedulingState>) -> [String; 9] {
    match state {
        None => Default::default(),
        Some(s) => [
            s.due.to_rfc3339(),
            s.stability.to_string(),
            s.difficulty.to_string(),
            s.elapsed_days.to_string(),
            s.scheduled_days.to_string(),
            s.reps.to_string(),
            s.lapses.to_string(),
            u8::from(s.state).to_string(),
            s.last_review.to_rfc3339(),
        ],
    }
}

pub fn save_csv(path: &Path, exercises: &[Exercise]) -> Result<(), StoreError> {
    let csv_err = |source: csv::Error| StoreError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = csv::Writer::from_path(path).map_err(|source| StoreError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    writer.write_record(HEADER).map_err(csv_err)?;

    for exercise in exercises {
        let [due, stability, difficulty, elapsed, scheduled, reps, lapses, phase, last_review] =
            state_fields(exercise.state.as_ref());
        writer
            .write_record([
                &exercise.collection,
                &exercise.prompt,
                &exercise.solution,
                &exercise.id,
                &due,
                &stability,
                &difficulty,
                &elapsed,
                &scheduled,
                &reps,
                &lapses,
                &phase,
                &last_review,
            ])
            .map_err(csv_err)?;
    }

    writer.flush().map_err(|source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

pub fn discover_files(paths: &[String]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for p in paths {
        let path = PathBuf::from(p);
        if path.is_dir() {
            collect_csv_recursive(&path, &mut files);
        } else if path.extension().and_then(|e| e.to_str()) == Some("csv") {
            files.push(path);
        }
    }
    files
}

fn collect_csv_recursive(dir: &Path, files: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_csv_recursive(&path, files);
        } else if path.extension().and_then(|e| e.to_str()) == Some("csv") {
            files.push(path);
        }
    }
}
