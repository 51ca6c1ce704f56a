use std::collections::HashSet;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use uuid::Uuid;

use crate::config::RiskConfig;
use crate::models::{
    ClassAnalysis, EmotionRecord, MoodTally, RiskLevel, SampledMessage, StudentRecord,
};
use crate::risk;

/// At most this many sampled messages go to the narrative generator.
const MESSAGE_SAMPLE_CAP: usize = 20;
/// Per-group cap: concerning students first, then the rest.
const MESSAGE_GROUP_CAP: usize = 10;

/// Start of an analysis window: midnight today for a one-day window,
/// otherwise midnight N days back.
pub fn window_start(window_days: i64, now: DateTime<Utc>) -> DateTime<Utc> {
    let days = window_days.max(1);
    let day = if days == 1 {
        now.date_naive()
    } else {
        now.date_naive() - Duration::days(days)
    };
    day.and_time(NaiveTime::MIN).and_utc()
}

/// Run the risk classifier over every student of a class and merge the
/// results into the teacher-facing analysis.
///
/// `records` must already be limited to the window and ordered by submission
/// time; `students` carries the class roster in its stable listing order,
/// which also breaks risk-score ties.
pub fn analyze_class(
    class_name: &str,
    window_days: i64,
    students: &[StudentRecord],
    records: &[EmotionRecord],
    config: &RiskConfig,
) -> ClassAnalysis {
    let per_student: Vec<_> = students
        .iter()
        .map(|student| {
            let history: Vec<EmotionRecord> = records
                .iter()
                .filter(|record| record.student_id == student.id)
                .cloned()
                .collect();
            risk::classify(student.id, &student.name, &history, config)
        })
        .collect();

    let mut concerning: Vec<_> = per_student
        .iter()
        .filter(|assessment| assessment.risk_level != RiskLevel::Low)
        .cloned()
        .collect();
    // Stable sort keeps roster order between equal scores.
    concerning.sort_by(|a, b| {
        b.risk_score
            .partial_cmp(&a.risk_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut emotion_counts = MoodTally::default();
    for record in records {
        emotion_counts.bump(record.mood);
    }

    let concerning_ids: HashSet<Uuid> = concerning.iter().map(|a| a.student_id).collect();
    let message_sample = sample_messages(records, &concerning_ids);

    ClassAnalysis {
        class_name: class_name.to_string(),
        window_days,
        total_submissions: records.len(),
        emotion_counts,
        per_student,
        concerning,
        message_sample,
    }
}

/// Up to ten non-empty messages from concerning students, newest first,
/// then up to ten from everyone else, capped at twenty total.
fn sample_messages(
    records: &[EmotionRecord],
    concerning_ids: &HashSet<Uuid>,
) -> Vec<SampledMessage> {
    let pick = |from_concerning: bool| {
        // `records` arrive oldest first; the sample wants the most recent.
        records
            .iter()
            .rev()
            .filter(move |record| {
                concerning_ids.contains(&record.student_id) == from_concerning
                    && !record.message.trim().is_empty()
            })
            .take(MESSAGE_GROUP_CAP)
            .map(|record| SampledMessage {
                student_name: record.student_name.clone(),
                mood: record.mood,
                message: record.message.clone(),
            })
    };

    pick(true)
        .chain(pick(false))
        .take(MESSAGE_SAMPLE_CAP)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MoodTag;
    use chrono::TimeZone;

    fn student(name: &str, n: u128) -> StudentRecord {
        StudentRecord {
            id: Uuid::from_u128(n),
            code: format!("HS{n:03}"),
            name: name.to_string(),
            class_name: "6A1".to_string(),
            points: 0,
        }
    }

    fn record(student: &StudentRecord, mood: MoodTag, day: u32, message: &str) -> EmotionRecord {
        EmotionRecord {
            student_id: student.id,
            student_name: student.name.clone(),
            mood,
            message: message.to_string(),
            submitted_at: Utc.with_ymd_and_hms(2026, 5, day, 9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn window_start_of_one_day_is_today_midnight() {
        let now = Utc.with_ymd_and_hms(2026, 5, 20, 15, 30, 0).unwrap();
        let start = window_start(1, now);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 5, 20, 0, 0, 0).unwrap());
    }

    #[test]
    fn window_start_counts_back_whole_days() {
        let now = Utc.with_ymd_and_hms(2026, 5, 20, 15, 30, 0).unwrap();
        let start = window_start(7, now);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 5, 13, 0, 0, 0).unwrap());
    }

    #[test]
    fn concerning_list_excludes_low_risk_and_sorts_by_score() {
        let calm = student("Bao", 1);
        let worse = student("Chi", 2);
        let worst = student("Duc", 3);
        let mut records = Vec::new();
        records.push(record(&calm, MoodTag::Happy, 1, ""));
        // Chi: two recent negative days, medium.
        records.push(record(&worse, MoodTag::Sad, 4, ""));
        records.push(record(&worse, MoodTag::Sad, 5, ""));
        records.push(record(&worse, MoodTag::Happy, 1, ""));
        records.push(record(&worse, MoodTag::Happy, 2, ""));
        records.push(record(&worse, MoodTag::Happy, 3, ""));
        // Duc: three recent negative days, high.
        records.push(record(&worst, MoodTag::Angry, 3, ""));
        records.push(record(&worst, MoodTag::Angry, 4, ""));
        records.push(record(&worst, MoodTag::Angry, 5, ""));

        let analysis = analyze_class(
            "6A1",
            7,
            &[calm, worse, worst],
            &records,
            &RiskConfig::default(),
        );

        assert_eq!(analysis.per_student.len(), 3);
        assert_eq!(analysis.concerning.len(), 2);
        assert_eq!(analysis.concerning[0].name, "Duc");
        assert_eq!(analysis.concerning[0].risk_level, RiskLevel::High);
        assert_eq!(analysis.concerning[1].name, "Chi");
    }

    #[test]
    fn equal_scores_keep_roster_order() {
        let first = student("An", 1);
        let second = student("Binh", 2);
        let mut records = Vec::new();
        for s in [&first, &second] {
            for d in 3..=5 {
                records.push(record(s, MoodTag::Tired, d, ""));
            }
        }

        let analysis = analyze_class(
            "6A1",
            7,
            &[first, second],
            &records,
            &RiskConfig::default(),
        );
        assert_eq!(analysis.concerning.len(), 2);
        assert_eq!(analysis.concerning[0].risk_score, analysis.concerning[1].risk_score);
        assert_eq!(analysis.concerning[0].name, "An");
        assert_eq!(analysis.concerning[1].name, "Binh");
    }

    #[test]
    fn tally_counts_every_submission_in_window() {
        let a = student("An", 1);
        let records = vec![
            record(&a, MoodTag::Happy, 1, ""),
            record(&a, MoodTag::Happy, 2, ""),
            record(&a, MoodTag::Sad, 3, ""),
            record(&a, MoodTag::Tired, 4, ""),
        ];
        let analysis = analyze_class("6A1", 7, &[a], &records, &RiskConfig::default());
        assert_eq!(analysis.total_submissions, 4);
        assert_eq!(analysis.emotion_counts.happy, 2);
        assert_eq!(analysis.emotion_counts.sad, 1);
        assert_eq!(analysis.emotion_counts.tired, 1);
        assert_eq!(analysis.emotion_counts.angry, 0);
    }

    #[test]
    fn message_sample_prioritizes_concerning_students() {
        let concerning = student("Chi", 1);
        let calm = student("Bao", 2);
        let mut records = Vec::new();
        for d in 1..=5 {
            records.push(record(&concerning, MoodTag::Sad, d, &format!("buồn {d}")));
        }
        records.push(record(&calm, MoodTag::Happy, 1, "vui quá"));
        records.push(record(&calm, MoodTag::Happy, 2, "   "));

        let analysis = analyze_class(
            "6A1",
            7,
            &[concerning, calm],
            &records,
            &RiskConfig::default(),
        );

        assert_eq!(analysis.message_sample.len(), 6);
        assert!(analysis.message_sample[..5]
            .iter()
            .all(|m| m.student_name == "Chi"));
        assert_eq!(analysis.message_sample[5].message, "vui quá");
    }

    #[test]
    fn message_sample_caps_each_group_at_ten() {
        let concerning = student("Chi", 1);
        let calm = student("Bao", 2);
        let mut records = Vec::new();
        for d in 1..=14 {
            records.push(record(&concerning, MoodTag::Sad, d, "note"));
        }
        for d in 1..=14 {
            records.push(record(&calm, MoodTag::Happy, d, "note"));
        }

        let analysis = analyze_class(
            "6A1",
            14,
            &[concerning, calm],
            &records,
            &RiskConfig::default(),
        );
        assert_eq!(analysis.message_sample.len(), 20);
        assert_eq!(
            analysis
                .message_sample
                .iter()
                .filter(|m| m.student_name == "Chi")
                .count(),
            10
        );
    }

    #[test]
    fn message_sample_holds_the_most_recent_messages() {
        let talkative = student("An", 1);
        let mut records = Vec::new();
        for d in 1..=14 {
            records.push(record(&talkative, MoodTag::Happy, d, &format!("day {d}")));
        }

        let analysis = analyze_class(
            "6A1",
            14,
            &[talkative],
            &records,
            &RiskConfig::default(),
        );

        assert_eq!(analysis.message_sample.len(), 10);
        assert_eq!(analysis.message_sample[0].message, "day 14");
        assert_eq!(analysis.message_sample[9].message, "day 5");
        assert!(analysis
            .message_sample
            .iter()
            .all(|m| m.message != "day 1" && m.message != "day 4"));
    }

    #[test]
    fn empty_class_produces_empty_analysis() {
        let analysis = analyze_class("6A1", 7, &[], &[], &RiskConfig::default());
        assert_eq!(analysis.total_submissions, 0);
        assert!(analysis.per_student.is_empty());
        assert!(analysis.concerning.is_empty());
        assert!(analysis.message_sample.is_empty());
        assert_eq!(analysis.emotion_counts.total(), 0);
    }
}
