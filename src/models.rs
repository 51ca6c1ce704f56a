use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The five fixed mood categories a student can pick when checking in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoodTag {
    Happy,
    Neutral,
    Sad,
    Angry,
    Tired,
}

impl MoodTag {
    pub const ALL: [MoodTag; 5] = [
        MoodTag::Happy,
        MoodTag::Neutral,
        MoodTag::Sad,
        MoodTag::Angry,
        MoodTag::Tired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MoodTag::Happy => "happy",
            MoodTag::Neutral => "neutral",
            MoodTag::Sad => "sad",
            MoodTag::Angry => "angry",
            MoodTag::Tired => "tired",
        }
    }
}

impl std::str::FromStr for MoodTag {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "happy" => Ok(MoodTag::Happy),
            "neutral" => Ok(MoodTag::Neutral),
            "sad" => Ok(MoodTag::Sad),
            "angry" => Ok(MoodTag::Angry),
            "tired" => Ok(MoodTag::Tired),
            other => Err(format!(
                "unknown mood '{other}' (expected happy, neutral, sad, angry or tired)"
            )),
        }
    }
}

impl std::fmt::Display for MoodTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct StudentRecord {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub class_name: String,
    pub points: i32,
}

/// One emotion check-in, joined with the owning student. Append-only.
#[derive(Debug, Clone)]
pub struct EmotionRecord {
    pub student_id: Uuid,
    pub student_name: String,
    pub mood: MoodTag,
    pub message: String,
    pub submitted_at: DateTime<Utc>,
}

impl EmotionRecord {
    /// Calendar day the record belongs to, time of day stripped.
    pub fn day(&self) -> NaiveDate {
        self.submitted_at.date_naive()
    }
}

/// Per-student streak counters, created lazily on the first check-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakState {
    pub student_id: Uuid,
    pub current_streak: i32,
    pub longest_streak: i32,
    pub last_submission_day: Option<NaiveDate>,
    pub total_submissions: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct AchievedMilestone {
    pub milestone_id: Uuid,
    pub name: String,
    pub icon: String,
    pub day_count: i32,
    pub achieved_at: DateTime<Utc>,
}

/// Admin-curated streak reward. Read-only to the engines.
#[derive(Debug, Clone, Serialize)]
pub struct Milestone {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub day_count: i32,
    pub reward_points: i32,
    pub is_active: bool,
    pub display_order: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

/// Derived per-student risk view. Recomputed on every analysis, never stored.
#[derive(Debug, Clone, Serialize)]
pub struct RiskAssessment {
    pub student_id: Uuid,
    pub name: String,
    pub total_in_window: usize,
    pub negative_count: usize,
    pub negative_ratio: f64,
    pub consecutive_negative_days: i32,
    pub has_dangerous_keywords: bool,
    pub dangerous_messages: Vec<String>,
    pub risk_level: RiskLevel,
    pub risk_score: f64,
}

/// Mood tally across every submission in a window.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MoodTally {
    pub happy: usize,
    pub neutral: usize,
    pub sad: usize,
    pub angry: usize,
    pub tired: usize,
}

impl MoodTally {
    pub fn bump(&mut self, mood: MoodTag) {
        match mood {
            MoodTag::Happy => self.happy += 1,
            MoodTag::Neutral => self.neutral += 1,
            MoodTag::Sad => self.sad += 1,
            MoodTag::Angry => self.angry += 1,
            MoodTag::Tired => self.tired += 1,
        }
    }

    pub fn count(&self, mood: MoodTag) -> usize {
        match mood {
            MoodTag::Happy => self.happy,
            MoodTag::Neutral => self.neutral,
            MoodTag::Sad => self.sad,
            MoodTag::Angry => self.angry,
            MoodTag::Tired => self.tired,
        }
    }

    pub fn total(&self) -> usize {
        self.happy + self.neutral + self.sad + self.angry + self.tired
    }

    /// Share of one mood as a percentage, rounded to one decimal place.
    pub fn share(&self, mood: MoodTag) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        (self.count(mood) as f64 * 1000.0 / total as f64).round() / 10.0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SampledMessage {
    pub student_name: String,
    pub mood: MoodTag,
    pub message: String,
}

/// Everything the class analysis hands to the teacher view and the
/// narrative generator.
#[derive(Debug, Clone, Serialize)]
pub struct ClassAnalysis {
    pub class_name: String,
    pub window_days: i64,
    pub total_submissions: usize,
    pub emotion_counts: MoodTally,
    pub per_student: Vec<RiskAssessment>,
    pub concerning: Vec<RiskAssessment>,
    pub message_sample: Vec<SampledMessage>,
}

/// Streak counters as exposed in the submit response.
#[derive(Debug, Clone, Serialize)]
pub struct StreakSummary {
    pub current_streak: i32,
    pub longest_streak: i32,
    pub total_submissions: i32,
}

/// Milestone fields exposed to the student on award; catalog bookkeeping
/// (id, active flag, ordering) stays internal.
#[derive(Debug, Clone, Serialize)]
pub struct MilestoneAward {
    pub name: String,
    pub description: String,
    pub day_count: i32,
    pub icon: String,
    pub reward_points: i32,
}

impl From<&Milestone> for MilestoneAward {
    fn from(milestone: &Milestone) -> Self {
        Self {
            name: milestone.name.clone(),
            description: milestone.description.clone(),
            day_count: milestone.day_count,
            icon: milestone.icon.clone(),
            reward_points: milestone.reward_points,
        }
    }
}

/// Outcome of one accepted check-in, merged into the submit response.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionOutcome {
    pub streak: StreakSummary,
    pub points_awarded: i32,
    pub milestone_achieved: Option<MilestoneAward>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mood_tags_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&MoodTag::Happy).unwrap(), "\"happy\"");
        assert_eq!(serde_json::to_string(&MoodTag::Tired).unwrap(), "\"tired\"");
        let parsed: MoodTag = serde_json::from_str("\"angry\"").unwrap();
        assert_eq!(parsed, MoodTag::Angry);
    }

    #[test]
    fn mood_tag_parsing_accepts_any_case_and_rejects_unknowns() {
        assert_eq!("Sad".parse::<MoodTag>().unwrap(), MoodTag::Sad);
        assert!("excited".parse::<MoodTag>().is_err());
    }

    #[test]
    fn submit_envelope_nests_streak_and_trims_the_award() {
        let outcome = SubmissionOutcome {
            streak: StreakSummary {
                current_streak: 7,
                longest_streak: 9,
                total_submissions: 21,
            },
            points_awarded: 60,
            milestone_achieved: Some(MilestoneAward::from(&Milestone {
                id: Uuid::new_v4(),
                name: "Tuần đều đặn".to_string(),
                description: "A full week of check-ins".to_string(),
                icon: "🔥".to_string(),
                day_count: 7,
                reward_points: 50,
                is_active: true,
                display_order: 2,
            })),
        };

        let encoded = serde_json::to_value(&outcome).unwrap();
        assert_eq!(encoded["streak"]["current_streak"], 7);
        assert_eq!(encoded["streak"]["total_submissions"], 21);

        let award = &encoded["milestone_achieved"];
        assert_eq!(award["name"], "Tuần đều đặn");
        assert_eq!(award["day_count"], 7);
        assert_eq!(award["reward_points"], 50);
        // Catalog bookkeeping stays out of the student-facing envelope.
        assert!(award.get("id").is_none());
        assert!(award.get("is_active").is_none());
        assert!(award.get("display_order").is_none());
    }

    #[test]
    fn streak_state_round_trips_through_serde() {
        let state = StreakState {
            student_id: Uuid::new_v4(),
            current_streak: 4,
            longest_streak: 9,
            last_submission_day: NaiveDate::from_ymd_opt(2026, 4, 12),
            total_submissions: 37,
        };
        let encoded = serde_json::to_string(&state).unwrap();
        let decoded: StreakState = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, state);
    }
}
