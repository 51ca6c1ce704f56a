use std::collections::BTreeMap;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::config::RiskConfig;
use crate::models::{EmotionRecord, RiskAssessment, RiskLevel};

/// Classify one student's submission history inside an analysis window.
///
/// Pure function: no clock, no store. Empty history classifies as low risk
/// with zeroed counters rather than erroring.
pub fn classify(
    student_id: Uuid,
    name: &str,
    history: &[EmotionRecord],
    config: &RiskConfig,
) -> RiskAssessment {
    let total = history.len();
    let negative_count = history
        .iter()
        .filter(|record| config.is_negative(record.mood))
        .count();

    // Decisions and the medium score use the exact ratio; only the reported
    // figure is rounded.
    let raw_ratio = if total == 0 {
        0.0
    } else {
        negative_count as f64 * 100.0 / total as f64
    };

    let dangerous_messages: Vec<String> = history
        .iter()
        .filter(|record| config.matches_danger_keyword(&record.message))
        .map(|record| record.message.clone())
        .collect();
    let has_dangerous_keywords = !dangerous_messages.is_empty();

    let consecutive_negative_days = consecutive_negative_days(history, config);

    // Ordered decision, first match wins. The high score is deliberately
    // left uncapped and can exceed 100 on long negative runs.
    let (risk_level, risk_score) = if has_dangerous_keywords {
        (RiskLevel::Critical, 100.0)
    } else if consecutive_negative_days >= 3 || raw_ratio >= 60.0 {
        (
            RiskLevel::High,
            70.0 + 5.0 * consecutive_negative_days as f64,
        )
    } else if raw_ratio >= 40.0 || consecutive_negative_days >= 2 {
        (RiskLevel::Medium, 40.0 + 0.5 * raw_ratio)
    } else {
        (RiskLevel::Low, 0.0)
    };

    RiskAssessment {
        student_id,
        name: name.to_string(),
        total_in_window: total,
        negative_count,
        negative_ratio: round1(raw_ratio),
        consecutive_negative_days,
        has_dangerous_keywords,
        dangerous_messages,
        risk_level,
        risk_score,
    }
}

/// Length of the negative-day run ending at the most recent submission day.
///
/// A day counts as negative when ANY submission that day carries a negative
/// mood. Days are walked most-recent-first and the count stops at the first
/// day without a negative mood, so an older negative stretch behind a good
/// day does not inflate the signal.
fn consecutive_negative_days(history: &[EmotionRecord], config: &RiskConfig) -> i32 {
    let mut day_flags: BTreeMap<NaiveDate, bool> = BTreeMap::new();
    for record in history {
        let negative = day_flags.entry(record.day()).or_insert(false);
        *negative = *negative || config.is_negative(record.mood);
    }

    let mut run = 0;
    for negative in day_flags.values().rev() {
        if *negative {
            run += 1;
        } else {
            break;
        }
    }
    run
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
