use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::db;
use crate::models::{
    Milestone, MilestoneAward, MoodTag, StreakState, StreakSummary, StudentRecord,
    SubmissionOutcome,
};

/// Flat points credited for every accepted check-in, before milestone rewards.
pub const SUBMISSION_POINTS: i32 = 10;

/// Apply one accepted check-in day to the prior streak state.
///
/// Pure transition, keyed on how `day` compares to the stored last
/// submission day:
/// - no prior state: first-ever check-in, streak starts at 1
/// - same day: no-op (the one-per-day guard upstream should prevent this,
///   kept as a defensive branch)
/// - exactly one day later: streak continues
/// - anything else (gap, or a day in the past): streak resets to 1
pub fn advance(prior: Option<&StreakState>, student_id: Uuid, day: NaiveDate) -> StreakState {
    let Some(prior) = prior else {
        return StreakState {
            student_id,
            current_streak: 1,
            longest_streak: 1,
            last_submission_day: Some(day),
            total_submissions: 1,
        };
    };

    let current_streak = match prior.last_submission_day {
        Some(last) if last == day => return prior.clone(),
        Some(last) if last.succ_opt() == Some(day) => prior.current_streak + 1,
        _ => 1,
    };

    StreakState {
        student_id: prior.student_id,
        current_streak,
        longest_streak: prior.longest_streak.max(current_streak),
        last_submission_day: Some(day),
        total_submissions: prior.total_submissions + 1,
    }
}

/// Pick the milestone this streak just earned, if any.
///
/// The catalog holds at most one milestone per day count; an inactive entry
/// or one already achieved never fires again, so a streak that resets and
/// climbs back to the same threshold stays unrewarded.
pub fn milestone_due<'a>(
    state: &StreakState,
    catalog: &'a [Milestone],
    achieved: &HashSet<Uuid>,
) -> Option<&'a Milestone> {
    catalog
        .iter()
        .find(|m| m.is_active && m.day_count == state.current_streak && !achieved.contains(&m.id))
}

/// Record one accepted check-in: store the emotion record, advance the
/// streak and award at most one newly-crossed milestone, all inside a single
/// per-student transaction so concurrent duplicates cannot lose updates or
/// double-award.
pub async fn record_submission(
    pool: &PgPool,
    student: &StudentRecord,
    mood: MoodTag,
    message: &str,
    now: DateTime<Utc>,
) -> anyhow::Result<SubmissionOutcome> {
    let day = now.date_naive();
    let mut tx = pool.begin().await?;

    if db::has_submission_on_day(&mut tx, student.id, day).await? {
        anyhow::bail!(
            "{} already checked in on {day}; one check-in per day",
            student.code
        );
    }

    db::insert_emotion(&mut tx, student.id, mood, message, now).await?;

    let prior = db::load_streak_for_update(&mut tx, student.id).await?;
    let state = advance(prior.as_ref(), student.id, day);
    db::upsert_streak(&mut tx, &state).await?;

    let catalog = db::fetch_milestones(&mut tx, true).await?;
    let achieved = db::achieved_milestone_ids(&mut tx, student.id).await?;
    let mut awarded = None;
    let mut points = SUBMISSION_POINTS;
    if let Some(milestone) = milestone_due(&state, &catalog, &achieved) {
        // The unique (student, milestone) constraint backs the membership
        // check; a race collapses to a no-op insert instead of a second award.
        if db::award_milestone(&mut tx, student.id, milestone.id, now).await? {
            points += milestone.reward_points;
            info!(
                student = %student.code,
                milestone = %milestone.name,
                day_count = milestone.day_count,
                "milestone awarded"
            );
            awarded = Some(MilestoneAward::from(milestone));
        }
    }

    db::add_points(&mut tx, student.id, points).await?;
    tx.commit().await?;

    Ok(SubmissionOutcome {
        streak: StreakSummary {
            current_streak: state.current_streak,
            longest_streak: state.longest_streak,
            total_submissions: state.total_submissions,
        },
        points_awarded: points,
        milestone_achieved: awarded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 4, d).unwrap()
    }

    fn milestone(day_count: i32, active: bool) -> Milestone {
        Milestone {
            id: Uuid::new_v4(),
            name: format!("{day_count}-day streak"),
            description: String::new(),
            icon: "🏆".to_string(),
            day_count,
            reward_points: 50,
            is_active: active,
            display_order: day_count,
        }
    }

    #[test]
    fn first_submission_starts_streak_at_one() {
        let state = advance(None, Uuid::nil(), day(1));
        assert_eq!(state.current_streak, 1);
        assert_eq!(state.longest_streak, 1);
        assert_eq!(state.last_submission_day, Some(day(1)));
        assert_eq!(state.total_submissions, 1);
    }

    #[test]
    fn consecutive_days_grow_the_streak() {
        let mut state = advance(None, Uuid::nil(), day(1));
        state = advance(Some(&state), Uuid::nil(), day(2));
        state = advance(Some(&state), Uuid::nil(), day(3));
        assert_eq!(state.current_streak, 3);
        assert!(state.longest_streak >= 3);
        assert_eq!(state.total_submissions, 3);
    }

    #[test]
    fn gap_resets_current_but_keeps_longest() {
        let mut state = advance(None, Uuid::nil(), day(1));
        state = advance(Some(&state), Uuid::nil(), day(2));
        state = advance(Some(&state), Uuid::nil(), day(3));
        let before_reset = state.longest_streak;

        state = advance(Some(&state), Uuid::nil(), day(8));
        assert_eq!(state.current_streak, 1);
        assert_eq!(state.longest_streak, before_reset);
        assert_eq!(state.last_submission_day, Some(day(8)));
        assert_eq!(state.total_submissions, 4);
    }

    #[test]
    fn same_day_is_a_no_op() {
        let first = advance(None, Uuid::nil(), day(5));
        let second = advance(Some(&first), Uuid::nil(), day(5));
        assert_eq!(second, first);
    }

    #[test]
    fn past_day_resets_the_streak() {
        let mut state = advance(None, Uuid::nil(), day(9));
        state = advance(Some(&state), Uuid::nil(), day(10));
        state = advance(Some(&state), Uuid::nil(), day(4));
        assert_eq!(state.current_streak, 1);
        assert_eq!(state.last_submission_day, Some(day(4)));
    }

    #[test]
    fn longest_never_drops_below_current() {
        let mut state = advance(None, Uuid::nil(), day(1));
        for d in 2..=20 {
            state = advance(Some(&state), Uuid::nil(), day(d));
            assert!(state.longest_streak >= state.current_streak);
        }
    }

    #[test]
    fn milestone_fires_once_per_threshold() {
        let catalog = vec![milestone(3, true), milestone(7, true)];
        let mut achieved = HashSet::new();

        let mut state = advance(None, Uuid::nil(), day(1));
        state = advance(Some(&state), Uuid::nil(), day(2));
        state = advance(Some(&state), Uuid::nil(), day(3));
        let due = milestone_due(&state, &catalog, &achieved);
        assert_eq!(due.map(|m| m.day_count), Some(3));
        achieved.insert(due.map(|m| m.id).unwrap());

        // Reset and climb back to three days; the milestone stays awarded.
        state = advance(Some(&state), Uuid::nil(), day(10));
        state = advance(Some(&state), Uuid::nil(), day(11));
        state = advance(Some(&state), Uuid::nil(), day(12));
        assert_eq!(state.current_streak, 3);
        assert!(milestone_due(&state, &catalog, &achieved).is_none());
    }

    #[test]
    fn inactive_milestone_never_fires() {
        let catalog = vec![milestone(2, false)];
        let achieved = HashSet::new();
        let mut state = advance(None, Uuid::nil(), day(1));
        state = advance(Some(&state), Uuid::nil(), day(2));
        assert!(milestone_due(&state, &catalog, &achieved).is_none());
    }

    #[test]
    fn no_milestone_between_thresholds() {
        let catalog = vec![milestone(3, true)];
        let achieved = HashSet::new();
        let mut state = advance(None, Uuid::nil(), day(1));
        state = advance(Some(&state), Uuid::nil(), day(2));
        assert!(milestone_due(&state, &catalog, &achieved).is_none());
    }
}
