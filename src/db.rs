use std::collections::HashSet;
use std::str::FromStr;

use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::models::{
    AchievedMilestone, EmotionRecord, Milestone, MoodTag, StreakState, StudentRecord,
};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS students (
            id UUID PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            class_name TEXT NOT NULL,
            points INTEGER NOT NULL DEFAULT 0
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS emotions (
            id UUID PRIMARY KEY,
            student_id UUID NOT NULL REFERENCES students(id),
            mood TEXT NOT NULL,
            message TEXT NOT NULL DEFAULT '',
            submitted_at TIMESTAMPTZ NOT NULL
        )
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS emotions_student_time
        ON emotions (student_id, submitted_at DESC)
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS streaks (
            student_id UUID PRIMARY KEY REFERENCES students(id),
            current_streak INTEGER NOT NULL DEFAULT 0,
            longest_streak INTEGER NOT NULL DEFAULT 0,
            last_submission_day DATE,
            total_submissions INTEGER NOT NULL DEFAULT 0
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS milestones (
            id UUID PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            icon TEXT NOT NULL DEFAULT '🏆',
            day_count INTEGER NOT NULL UNIQUE CHECK (day_count >= 1),
            reward_points INTEGER NOT NULL DEFAULT 0 CHECK (reward_points >= 0),
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            display_order INTEGER NOT NULL DEFAULT 0
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS streak_milestones (
            student_id UUID NOT NULL REFERENCES students(id),
            milestone_id UUID NOT NULL REFERENCES milestones(id),
            achieved_at TIMESTAMPTZ NOT NULL,
            PRIMARY KEY (student_id, milestone_id)
        )
        "#,
    ];

    for statement in statements {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let students = vec![
        (
            Uuid::parse_str("6f1b41f2-8c5e-4f54-9f0f-b21a3cbb90d1")?,
            "HS001",
            "An Nguyen",
            "6A1",
        ),
        (
            Uuid::parse_str("2a9c7b33-64f1-4f0a-8f67-5d8b0f7f20aa")?,
            "HS002",
            "Binh Tran",
            "6A1",
        ),
        (
            Uuid::parse_str("c3d8a5b1-07f2-4f5b-a8c9-8f4a1b6d2e90")?,
            "HS003",
            "Chi Pham",
            "6A1",
        ),
        (
            Uuid::parse_str("9e4f6c2d-1a3b-4c5d-8e7f-0a1b2c3d4e5f")?,
            "HS010",
            "Dung Le",
            "6A2",
        ),
    ];

    for (id, code, name, class_name) in students {
        sqlx::query(
            r#"
            INSERT INTO students (id, code, name, class_name)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (code) DO UPDATE
            SET name = EXCLUDED.name, class_name = EXCLUDED.class_name
            "#,
        )
        .bind(id)
        .bind(code)
        .bind(name)
        .bind(class_name)
        .execute(pool)
        .await?;
    }

    let milestones = vec![
        ("Khởi đầu", "Check in 3 days in a row", "🌱", 3, 20, 1),
        ("Tuần đều đặn", "A full week of check-ins", "🔥", 7, 50, 2),
        ("Hai tuần bền bỉ", "Two weeks without a break", "💪", 14, 120, 3),
        ("Một tháng kiên trì", "Thirty consecutive days", "🏆", 30, 300, 4),
    ];

    for (name, description, icon, day_count, reward_points, display_order) in milestones {
        sqlx::query(
            r#"
            INSERT INTO milestones
            (id, name, description, icon, day_count, reward_points, is_active, display_order)
            VALUES ($1, $2, $3, $4, $5, $6, TRUE, $7)
            ON CONFLICT (day_count) DO UPDATE
            SET name = EXCLUDED.name,
                description = EXCLUDED.description,
                icon = EXCLUDED.icon,
                reward_points = EXCLUDED.reward_points,
                display_order = EXCLUDED.display_order
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(description)
        .bind(icon)
        .bind(day_count)
        .bind(reward_points)
        .bind(display_order)
        .execute(pool)
        .await?;
    }

    let emotions = vec![
        ("HS001", "happy", "hôm nay học vui", 3),
        ("HS001", "neutral", "", 2),
        ("HS002", "sad", "bài kiểm tra khó quá", 2),
        ("HS002", "tired", "mệt vì học thêm", 1),
        ("HS003", "sad", "", 1),
    ];

    for (code, mood, message, days_ago) in emotions {
        let student_id: Uuid = sqlx::query("SELECT id FROM students WHERE code = $1")
            .bind(code)
            .fetch_one(pool)
            .await?
            .get("id");

        sqlx::query(
            r#"
            INSERT INTO emotions (id, student_id, mood, message, submitted_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(mood)
        .bind(message)
        .bind(Utc::now() - Duration::days(days_ago))
        .execute(pool)
        .await?;
    }

    Ok(())
}

pub async fn fetch_student_by_code(
    pool: &PgPool,
    code: &str,
) -> anyhow::Result<Option<StudentRecord>> {
    let row = sqlx::query(
        "SELECT id, code, name, class_name, points FROM students WHERE code = $1",
    )
    .bind(code)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| StudentRecord {
        id: row.get("id"),
        code: row.get("code"),
        name: row.get("name"),
        class_name: row.get("class_name"),
        points: row.get("points"),
    }))
}

/// Class roster in stable listing order; this order also breaks risk-score
/// ties downstream.
pub async fn fetch_class_students(
    pool: &PgPool,
    class_name: &str,
) -> anyhow::Result<Vec<StudentRecord>> {
    let rows = sqlx::query(
        "SELECT id, code, name, class_name, points FROM students \
         WHERE class_name = $1 ORDER BY code",
    )
    .bind(class_name)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| StudentRecord {
            id: row.get("id"),
            code: row.get("code"),
            name: row.get("name"),
            class_name: row.get("class_name"),
            points: row.get("points"),
        })
        .collect())
}

/// Every check-in of a class inside the window, oldest first.
pub async fn fetch_window_records(
    pool: &PgPool,
    class_name: &str,
    since: DateTime<Utc>,
) -> anyhow::Result<Vec<EmotionRecord>> {
    let rows = sqlx::query(
        "SELECT e.student_id, s.name AS student_name, e.mood, e.message, e.submitted_at \
         FROM emotions e \
         JOIN students s ON s.id = e.student_id \
         WHERE s.class_name = $1 AND e.submitted_at >= $2 \
         ORDER BY e.submitted_at",
    )
    .bind(class_name)
    .bind(since)
    .fetch_all(pool)
    .await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let mood: String = row.get("mood");
        records.push(EmotionRecord {
            student_id: row.get("student_id"),
            student_name: row.get("student_name"),
            mood: MoodTag::from_str(&mood)
                .map_err(|e| anyhow::anyhow!("stored mood rejected: {e}"))?,
            message: row.get("message"),
            submitted_at: row.get("submitted_at"),
        });
    }
    Ok(records)
}

pub async fn fetch_streak(
    pool: &PgPool,
    student_id: Uuid,
) -> anyhow::Result<Option<StreakState>> {
    let row = sqlx::query(
        "SELECT student_id, current_streak, longest_streak, last_submission_day, \
         total_submissions FROM streaks WHERE student_id = $1",
    )
    .bind(student_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(streak_from_row))
}

pub async fn fetch_achievements(
    pool: &PgPool,
    student_id: Uuid,
) -> anyhow::Result<Vec<AchievedMilestone>> {
    let rows = sqlx::query(
        "SELECT sm.milestone_id, m.name, m.icon, m.day_count, sm.achieved_at \
         FROM streak_milestones sm \
         JOIN milestones m ON m.id = sm.milestone_id \
         WHERE sm.student_id = $1 \
         ORDER BY sm.achieved_at",
    )
    .bind(student_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| AchievedMilestone {
            milestone_id: row.get("milestone_id"),
            name: row.get("name"),
            icon: row.get("icon"),
            day_count: row.get("day_count"),
            achieved_at: row.get("achieved_at"),
        })
        .collect())
}

pub async fn has_submission_on_day(
    tx: &mut Transaction<'_, Postgres>,
    student_id: Uuid,
    day: NaiveDate,
) -> anyhow::Result<bool> {
    let start = day.and_time(NaiveTime::MIN).and_utc();
    let end = start + Duration::days(1);
    let row = sqlx::query(
        "SELECT 1 AS present FROM emotions \
         WHERE student_id = $1 AND submitted_at >= $2 AND submitted_at < $3 \
         LIMIT 1",
    )
    .bind(student_id)
    .bind(start)
    .bind(end)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(row.is_some())
}

pub async fn insert_emotion(
    tx: &mut Transaction<'_, Postgres>,
    student_id: Uuid,
    mood: MoodTag,
    message: &str,
    submitted_at: DateTime<Utc>,
) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO emotions (id, student_id, mood, message, submitted_at) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(Uuid::new_v4())
    .bind(student_id)
    .bind(mood.as_str())
    .bind(message)
    .bind(submitted_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Row-locked read so the read-modify-write of the streak counters cannot
/// interleave with a concurrent submission for the same student.
pub async fn load_streak_for_update(
    tx: &mut Transaction<'_, Postgres>,
    student_id: Uuid,
) -> anyhow::Result<Option<StreakState>> {
    let row = sqlx::query(
        "SELECT student_id, current_streak, longest_streak, last_submission_day, \
         total_submissions FROM streaks WHERE student_id = $1 FOR UPDATE",
    )
    .bind(student_id)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(row.map(streak_from_row))
}

pub async fn upsert_streak(
    tx: &mut Transaction<'_, Postgres>,
    state: &StreakState,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO streaks
        (student_id, current_streak, longest_streak, last_submission_day, total_submissions)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (student_id) DO UPDATE
        SET current_streak = EXCLUDED.current_streak,
            longest_streak = EXCLUDED.longest_streak,
            last_submission_day = EXCLUDED.last_submission_day,
            total_submissions = EXCLUDED.total_submissions
        "#,
    )
    .bind(state.student_id)
    .bind(state.current_streak)
    .bind(state.longest_streak)
    .bind(state.last_submission_day)
    .bind(state.total_submissions)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn fetch_milestones(
    tx: &mut Transaction<'_, Postgres>,
    active_only: bool,
) -> anyhow::Result<Vec<Milestone>> {
    let mut query = String::from(
        "SELECT id, name, description, icon, day_count, reward_points, is_active, \
         display_order FROM milestones",
    );
    if active_only {
        query.push_str(" WHERE is_active");
    }
    query.push_str(" ORDER BY display_order, day_count");

    let rows = sqlx::query(&query).fetch_all(&mut **tx).await?;
    Ok(rows
        .into_iter()
        .map(|row| Milestone {
            id: row.get("id"),
            name: row.get("name"),
            description: row.get("description"),
            icon: row.get("icon"),
            day_count: row.get("day_count"),
            reward_points: row.get("reward_points"),
            is_active: row.get("is_active"),
            display_order: row.get("display_order"),
        })
        .collect())
}

pub async fn achieved_milestone_ids(
    tx: &mut Transaction<'_, Postgres>,
    student_id: Uuid,
) -> anyhow::Result<HashSet<Uuid>> {
    let rows = sqlx::query("SELECT milestone_id FROM streak_milestones WHERE student_id = $1")
        .bind(student_id)
        .fetch_all(&mut **tx)
        .await?;
    Ok(rows.into_iter().map(|row| row.get("milestone_id")).collect())
}

/// Returns whether the row was actually inserted; the primary key makes a
/// second award collapse into a no-op.
pub async fn award_milestone(
    tx: &mut Transaction<'_, Postgres>,
    student_id: Uuid,
    milestone_id: Uuid,
    achieved_at: DateTime<Utc>,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        "INSERT INTO streak_milestones (student_id, milestone_id, achieved_at) \
         VALUES ($1, $2, $3) \
         ON CONFLICT (student_id, milestone_id) DO NOTHING",
    )
    .bind(student_id)
    .bind(milestone_id)
    .bind(achieved_at)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn add_points(
    tx: &mut Transaction<'_, Postgres>,
    student_id: Uuid,
    points: i32,
) -> anyhow::Result<()> {
    sqlx::query("UPDATE students SET points = points + $2 WHERE id = $1")
        .bind(student_id)
        .bind(points)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        student_code: String,
        name: String,
        class_name: String,
        mood: String,
        message: Option<String>,
        submitted_at: DateTime<Utc>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let mood = MoodTag::from_str(&row.mood)
            .map_err(|e| anyhow::anyhow!("row for {}: {e}", row.student_code))?;

        let student_id: Uuid = sqlx::query(
            r#"
            INSERT INTO students (id, code, name, class_name)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (code) DO UPDATE
            SET name = EXCLUDED.name, class_name = EXCLUDED.class_name
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&row.student_code)
        .bind(&row.name)
        .bind(&row.class_name)
        .fetch_one(pool)
        .await?
        .get("id");

        sqlx::query(
            "INSERT INTO emotions (id, student_id, mood, message, submitted_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(mood.as_str())
        .bind(row.message.unwrap_or_default())
        .bind(row.submitted_at)
        .execute(pool)
        .await?;

        inserted += 1;
    }

    info!(count = inserted, "imported emotion records");
    Ok(inserted)
}

fn streak_from_row(row: sqlx::postgres::PgRow) -> StreakState {
    StreakState {
        student_id: row.get("student_id"),
        current_streak: row.get("current_streak"),
        longest_streak: row.get("longest_streak"),
        last_submission_day: row.get("last_submission_day"),
        total_submissions: row.get("total_submissions"),
    }
}
