use std::fmt::Write as _;
use std::time::Duration;

use anyhow::Context;
use serde_json::json;
use tracing::warn;

use crate::models::{ClassAnalysis, MoodTag, RiskLevel};

/// Shown whenever the external generator is missing or fails; the structured
/// statistics are still complete in that case.
pub const NARRATIVE_UNAVAILABLE: &str =
    "Narrative analysis is unavailable right now; the statistics above are complete.";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// External text-generation collaborator, constructed once at startup and
/// handed to whoever needs it. `Disabled` stands in when no API key is
/// configured, so callers never branch on environment state themselves.
pub enum Narrator {
    Disabled,
    Http(HttpNarrator),
}

impl Narrator {
    pub fn from_env() -> anyhow::Result<Self> {
        match std::env::var("OPENAI_API_KEY") {
            Ok(key) if !key.trim().is_empty() => Ok(Narrator::Http(HttpNarrator::new(key)?)),
            _ => Ok(Narrator::Disabled),
        }
    }

    /// Turn the aggregation output into teacher-facing prose. Never fails:
    /// generator errors and timeouts degrade to a fallback notice.
    pub async fn narrate(&self, analysis: &ClassAnalysis) -> String {
        match self {
            Narrator::Disabled => NARRATIVE_UNAVAILABLE.to_string(),
            Narrator::Http(client) => match client.generate(analysis).await {
                Ok(text) => text,
                Err(error) => {
                    warn!(%error, "narrative generation failed, returning fallback");
                    NARRATIVE_UNAVAILABLE.to_string()
                }
            },
        }
    }
}

pub struct HttpNarrator {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl HttpNarrator {
    pub fn new(api_key: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build narrative http client")?;
        Ok(Self {
            client,
            endpoint: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            api_key,
            model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
        })
    }

    async fn generate(&self, analysis: &ClassAnalysis) -> anyhow::Result<String> {
        let body = json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": "You are an experienced school counselor analyzing \
                                classroom emotional-wellbeing check-ins. Answer with a \
                                short summary, notable patterns, and concrete suggestions \
                                for the teacher."
                },
                { "role": "user", "content": build_context(analysis) }
            ],
            "temperature": 0.8,
            "max_tokens": 1200
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("narrative request failed")?
            .error_for_status()
            .context("narrative service returned an error status")?;

        let payload: serde_json::Value = response
            .json()
            .await
            .context("narrative response was not valid json")?;
        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .context("narrative response missing message content")
    }
}

/// Structured context handed to the generator. Correctness of the analysis
/// never depends on what comes back.
pub fn build_context(analysis: &ClassAnalysis) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Class {} over the last {} day(s): {} check-ins.",
        analysis.class_name, analysis.window_days, analysis.total_submissions
    );

    let _ = writeln!(out, "Mood distribution:");
    for mood in MoodTag::ALL {
        let _ = writeln!(
            out,
            "- {}: {} ({:.1}%)",
            mood,
            analysis.emotion_counts.count(mood),
            analysis.emotion_counts.share(mood)
        );
    }

    if analysis.concerning.is_empty() {
        let _ = writeln!(out, "No students currently need special attention.");
    } else {
        let _ = writeln!(out, "Students needing attention:");
        for assessment in &analysis.concerning {
            let _ = writeln!(
                out,
                "- {} [{}] score {:.0}: {:.1}% negative, {} consecutive negative day(s){}",
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
            if assessment.risk_level == RiskLevel::Critical {
                if let Some(message) = assessment.dangerous_messages.first() {
                    let _ = writeln!(out, "  flagged message: \"{message}\"");
                }
            }
        }
    }

    if !analysis.message_sample.is_empty() {
        let _ = writeln!(out, "Sample of student messages:");
        for sample in &analysis.message_sample {
            let _ = writeln!(
                out,
                "- {} ({}): \"{}\"",
                sample.student_name, sample.mood, sample.message
            );
        }
    }

    out
}
