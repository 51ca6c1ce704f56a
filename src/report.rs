use std::fmt::Write;

use crate::models::{ClassAnalysis, MoodTag};

pub fn build_report(analysis: &ClassAnalysis, narrative: Option<&str>) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Class Wellbeing Report");
    let _ = writeln!(
        output,
        "Class {} over the last {} day(s), {} check-ins.",
        analysis.class_name, analysis.window_days, analysis.total_submissions
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Mood Mix");

    if analysis.total_submissions == 0 {
        let _ = writeln!(output, "No check-ins recorded for this window.");
    } else {
        for mood in MoodTag::ALL {
            let _ = writeln!(
                output,
                "- {}: {} check-ins ({:.1}%)",
                mood,
                analysis.emotion_counts.count(mood),
                analysis.emotion_counts.share(mood)
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Students Needing Attention");

    if analysis.concerning.is_empty() {
        let _ = writeln!(output, "No students above the low risk level in this window.");
    } else {
        for assessment in &analysis.concerning {
            let _ = writeln!(
                output,
                "- {} [{}] score {:.0}: {:.1}% negative moods, {} consecutive negative day(s){}",
                assessment.name,
                assessment.risk_level.as_str(),
                assessment.risk_score,
                assessment.negative_ratio,
                assessment.consecutive_negative_days,
                if assessment.has_dangerous_keywords {
                    ", messages contain danger keywords"
                } else {
                    ""
                }
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Messages");

    if analysis.message_sample.is_empty() {
        let _ = writeln!(output, "No messages shared in this window.");
    } else {
        for sample in analysis.message_sample.iter().take(10) {
            let _ = writeln!(
                output,
                "- {} ({}): {}",
                sample.student_name, sample.mood, sample.message
            );
        }
    }

    if let Some(text) = narrative {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Counselor Notes");
        let _ = writeln!(output, "{text}");
    }

    output
}
