// src/matching.rs

use std::collections::HashMap;

use sqlx::SqlitePool;

use crate::{error::AppError, models::match_result::MatchResult};

/// Per-participant answer set: question id -> selected option id.
pub type AnswerMap = HashMap<i64, i64>;

/// Helper struct for batch-loading responses.
#[derive(sqlx::FromRow)]
struct ResponseRow {
    user_id: i64,
    question_id: i64,
    selected_option_id: i64,
}

/// Counts agreement for one pair of answer sets.
///
/// Returns (common, total). `common` is the number of questions where both
/// picked the identical option; `total` is the number of questions both
/// answered at all, regardless of option. A question answered by only one
/// side contributes to neither count.
fn score_pair(a: &AnswerMap, b: &AnswerMap) -> (i64, i64) {
    let mut common = 0;
    let mut total = 0;

    for (question_id, option_a) in a {
        if let Some(option_b) = b.get(question_id) {
            total += 1;
            if option_a == option_b {
                common += 1;
            }
        }
    }

    (common, total)
}

/// Scores every unordered pair from the ordered eligible list.
///
/// The list must be sorted ascending by id; pairs are then emitted with the
/// lower id first, so each unordered pair maps to exactly one row and
/// repeated runs over the same input produce identical output.
pub fn score_pairs(eligible: &[i64], responses: &HashMap<i64, AnswerMap>) -> Vec<MatchResult> {
    let empty = AnswerMap::new();
    let mut results = Vec::with_capacity(eligible.len() * eligible.len().saturating_sub(1) / 2);

    for (i, &user_1) in eligible.iter().enumerate() {
        let answers_1 = responses.get(&user_1).unwrap_or(&empty);

        for &user_2 in &eligible[i + 1..] {
            let answers_2 = responses.get(&user_2).unwrap_or(&empty);
            let (common, total) = score_pair(answers_1, answers_2);

            // A pair with no question in common is a defined 0, not an error.
            let match_percentage = if total > 0 {
                (common as f64 / total as f64) * 100.0
            } else {
                0.0
            };

            results.push(MatchResult {
                user_id_1: user_1,
                user_id_2: user_2,
                common_answers: common,
                total_possible: total,
                match_percentage,
            });
        }
    }

    results
}

/// Regenerates the full match result set.
///
/// Loads the ordered list of completed participants and batch-loads all of
/// their responses once, scores every pair in memory, then replaces the
/// match_results table inside a single transaction: readers see either the
/// previous result set or the new one, never a mix. On any failure the
/// transaction rolls back and the previous results stay intact.
///
/// A participant submitting responses while a run is in flight may or may
/// not be included in that run's snapshot; the next run picks them up.
///
/// Returns the number of pair rows written.
pub async fn generate(pool: &SqlitePool) -> Result<usize, AppError> {
    let eligible: Vec<i64> =
        sqlx::query_scalar("SELECT id FROM users WHERE has_completed_survey = TRUE ORDER BY id")
            .fetch_all(pool)
            .await?;

    let rows: Vec<ResponseRow> = sqlx::query_as(
        r#"
        SELECT sr.user_id, sr.question_id, sr.selected_option_id
        FROM survey_responses sr
        JOIN users u ON u.id = sr.user_id
        WHERE u.has_completed_survey = TRUE
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut responses: HashMap<i64, AnswerMap> = HashMap::new();
    for row in rows {
        responses
            .entry(row.user_id)
            .or_default()
            .insert(row.question_id, row.selected_option_id);
    }

    let results = score_pairs(&eligible, &responses);

    // Clear and repopulate under one transaction; dropping the transaction
    // on an early error rolls everything back.
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM match_results")
        .execute(&mut *tx)
        .await?;

    for result in &results {
        sqlx::query(
            r#"
            INSERT INTO match_results
                (user_id_1, user_id_2, common_answers, total_possible, match_percentage)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(result.user_id_1)
        .bind(result.user_id_2)
        .bind(result.common_answers)
        .bind(result.total_possible)
        .bind(result.match_percentage)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    tracing::info!(
        "Generated {} match result(s) for {} participant(s)",
        results.len(),
        eligible.len()
    );

    Ok(results.len())
}
