use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::fsrs::Rating;
use crate::item::{self, Exercise};
use crate::scheduler::{Preview, Scheduler, SchedulingResult};

pub struct ReviewItem {
    pub exercise_index: usize,
    pub prompt_display: String,
    pub solution_display: String,
    pub collection: String,
}

pub struct CollectionSummary {
    pub name: String,
    pub total: usize,
    pub due: usize,
}

pub fn render_prompt(text: &str) -> String {
    item::expand_newlines(text)
}

pub fn render_solution(prompt: &str, solution: &str) -> String {
    let prompt = item::expand_newlines(prompt);
    let solution = item::expand_newlines(solution);

    if solution.trim().is_empty() {
        prompt
    } else {
        format!("{prompt}\n---\n{solution}")
    }
}

pub fn build_review_items(exercises: &[Exercise], indices: &[usize]) -> Vec<ReviewItem> {
    indices
        .iter()
        .map(|&i| {
            let exercise = &exercises[i];
            ReviewItem {
                exercise_index: i,
                prompt_display: render_prompt(&exercise.prompt),
                solution_display: render_solution(&exercise.prompt, &exercise.solution),
                collection: exercise.collection.clone(),
            }
        })
        .collect()
}

fn is_due(exercise: &Exercise, now: DateTime<Utc>) -> bool {
    match &exercise.state {
        None => true, // never reviewed
        Some(state) => state.is_due(now),
    }
}

pub fn filter_due(exercises: &[Exercise], now: DateTime<Utc>) -> Vec<usize> {
    exercises
        .iter()
        .enumerate()
        .filter(|(_, exercise)| is_due(exercise, now))
        .map(|(i, _)| i)
        .collect()
}

pub fn collection_summaries(exercises: &[Exercise], now: DateTime<Utc>) -> Vec<CollectionSummary> {
    let mut collections: std::collections::BTreeMap<String, (usize, usize)> =
        std::collections::BTreeMap::new();
    for exercise in exercises {
        let entry = collections
            .entry(exercise.collection.clone())
            .or_insert((0, 0));
        entry.0 += 1;
        if is_due(exercise, now) {
            entry.1 += 1;
        }
    }
    collections
        .into_iter()
        .map(|(name, (total, due))| CollectionSummary { name, total, due })
        .collect()
}

/// Schedules `exercise` and replaces its state with the result.
pub fn apply_rating(
    scheduler: &Scheduler,
    exercise: &mut Exercise,
    rating: Rating,
    now: DateTime<Utc>,
) -> Result<SchedulingResult> {
    let result = scheduler.schedule(exercise.state.as_ref(), rating, now)?;
    exercise.state = Some(result.state.clone());
    Ok(result)
}

pub fn preview(scheduler: &Scheduler, exercise: &Exercise, now: DateTime<Utc>) -> Result<Preview> {
    scheduler.preview(exercise.state.as_ref(), now)
}

fn format_days(days: u32) -> String {
    match days {
        1 => "1 day".to_string(),
        d if d < 60 => format!("{d} days"),
        d if d < 730 => format!("{:.1} months", f64::from(d) / 30.0),
        d => format!("{:.1} years", f64::from(d) / 365.0),
    }
}

/// One-line summary of the interval each rating would produce.
pub fn preview_line(preview: &Preview) -> String {
    preview
        .iter()
        .map(|(rating, result)| {
            format!("{}={} ({})", rating.value(), rating, format_days(result.interval))
        })
        .collect::<Vec<_>>()
        .join("  ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::FsrsParameters;
    use crate::scheduler::{LearningPhase, SchedulingState};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap()
    }

    fn scheduler() -> Scheduler {
        Scheduler::with_parameters(FsrsParameters {
            enable_fuzz: false,
            ..Default::default()
        })
        .unwrap()
    }

    fn exercise(collection: &str, id: &str, state: Option<SchedulingState>) -> Exercise {
        Exercise {
            collection: collection.into(),
            prompt: "q".into(),
            solution: "a".into(),
            id: id.into(),
            state,
        }
    }

    fn reviewed(due: DateTime<Utc>) -> SchedulingState {
        SchedulingState {
            due,
            stability: 3.0,
            difficulty: 1.0,
            elapsed_days: 0.0,
            scheduled_days: 3,
            reps: 1,
            lapses: 0,
            state: LearningPhase::Review,
            last_review: due - Duration::days(3),
        }
    }

    #[test]
    fn render_prompt_expands_newlines() {
        assert_eq!(render_prompt("line1\\nline2"), "line1\nline2");
    }

    #[test]
    fn render_solution_with_body() {
        let result = render_solution("Two sum", "hash map");
        assert_eq!(result, "Two sum\n---\nhash map");
    }

    #[test]
    fn render_solution_empty() {
        assert_eq!(render_solution("Two sum", "  "), "Two sum");
    }

    #[test]
    fn filter_due_new_exercises() {
        let exercises = vec![exercise("test", "1", None)];
        assert_eq!(filter_due(&exercises, now()), vec![0]);
    }

    #[test]
    fn filter_due_past_due() {
        let exercises = vec![exercise("test", "1", Some(reviewed(now() - Duration::days(5))))];
        assert_eq!(filter_due(&exercises, now()), vec![0]);
    }

    #[test]
    fn filter_due_not_yet() {
        let exercises = vec![exercise("test", "1", Some(reviewed(now() + Duration::hours(1))))];
        assert!(filter_due(&exercises, now()).is_empty());
    }

    #[test]
    fn apply_rating_new_exercise() {
        let mut ex = exercise("test", "1", None);
        let result = apply_rating(&scheduler(), &mut ex, Rating::Good, now()).unwrap();
        let state = ex.state.unwrap();
        assert_eq!(state, result.state);
        assert_eq!(state.last_review, now());
        assert!(state.due > now());
        assert_eq!(state.reps, 1);
    }

    #[test]
    fn apply_rating_existing_exercise() {
        let mut ex = exercise("test", "1", Some(reviewed(now())));
        let old_stability = ex.state.as_ref().unwrap().stability;
        apply_rating(&scheduler(), &mut ex, Rating::Good, now()).unwrap();
        let state = ex.state.unwrap();
        assert!(state.stability > old_stability);
        assert!(state.due > now());
        assert_eq!(state.reps, 2);
    }

    #[test]
    fn apply_rating_rejects_corrupt_state_and_keeps_it() {
        let mut bad = reviewed(now());
        bad.difficulty = 12.0;
        let mut ex = exercise("test", "1", Some(bad.clone()));
        assert!(apply_rating(&scheduler(), &mut ex, Rating::Good, now()).is_err());
        assert_eq!(ex.state, Some(bad));
    }

    #[test]
    fn preview_line_lists_all_ratings() {
        let ex = exercise("test", "1", None);
        let line = preview_line(&preview(&scheduler(), &ex, now()).unwrap());
        assert!(line.starts_with("1=again (1 day)"));
        assert!(line.contains("3=good (3 days)"));
        assert!(line.contains("4=easy (16 days)"));
    }

    #[test]
    fn format_days_units() {
        assert_eq!(format_days(1), "1 day");
        assert_eq!(format_days(45), "45 days");
        assert_eq!(format_days(90), "3.0 months");
        assert_eq!(format_days(3650), "10.0 years");
    }

    #[test]
    fn collection_summaries_grouping() {
        let exercises = vec![
            exercise("graphs", "1", None),
            exercise("graphs", "2", Some(reviewed(now() + Duration::days(30)))),
            exercise("strings", "3", None),
        ];
        let summaries = collection_summaries(&exercises, now());
        assert_eq!(summaries.len(), 2);
        let graphs = summaries.iter().find(|s| s.name == "graphs").unwrap();
        assert_eq!(graphs.total, 2);
        assert_eq!(graphs.due, 1);
        let strings = summaries.iter().find(|s| s.name == "strings").unwrap();
        assert_eq!(strings.total, 1);
        assert_eq!(strings.due, 1);
    }
}
