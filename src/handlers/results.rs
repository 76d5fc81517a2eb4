// src/handlers/results.rs

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::{
    error::AppError,
    models::{
        match_result::{ComparisonRow, MatchEntry},
        response::UserResponseRow,
    },
};

/// Reports whether a generated result set exists.
///
/// The match table has two observable states: empty (no run yet, or reset)
/// and populated as of the last successful generation.
pub async fn results_status(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM match_results")
        .fetch_one(&pool)
        .await?;

    Ok(Json(serde_json::json!({ "available": count > 0 })))
}

/// Top matches for one participant: the five most similar and the five most
/// different, by stored match percentage.
pub async fn user_match_results(
    State(pool): State<SqlitePool>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let most_similar = fetch_matches(&pool, user_id, true).await?;
    let most_different = fetch_matches(&pool, user_id, false).await?;

    Ok(Json(serde_json::json!({
        "most_similar": most_similar,
        "most_different": most_different,
    })))
}

/// Fetches the 5 best or worst matches involving `user_id`.
///
/// A pair row stores the participant in either column, so both sides are
/// folded together before joining the counterpart's name.
async fn fetch_matches(
    pool: &SqlitePool,
    user_id: i64,
    descending: bool,
) -> Result<Vec<MatchEntry>, AppError> {
    let mut builder = QueryBuilder::<Sqlite>::new(
        r#"
        SELECT um.other_user_id, u.name, um.match_percentage
        FROM (
            SELECT user_id_2 AS other_user_id, match_percentage
            FROM match_results
            WHERE user_id_1 = "#,
    );
    builder.push_bind(user_id);
    builder.push(
        r#"
            UNION ALL
            SELECT user_id_1 AS other_user_id, match_percentage
            FROM match_results
            WHERE user_id_2 = "#,
    );
    builder.push_bind(user_id);
    builder.push(
        r#"
        ) um
        JOIN users u ON u.id = um.other_user_id
        ORDER BY um.match_percentage "#,
    );
    builder.push(if descending { "DESC" } else { "ASC" });
    builder.push(", um.other_user_id ASC LIMIT 5");

    let entries = builder
        .build_query_as::<MatchEntry>()
        .fetch_all(pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch match results: {:?}", e);
            AppError::from(e)
        })?;

    Ok(entries)
}

/// Question-by-question comparison between two participants.
///
/// Only questions both sides answered are returned, mirroring the
/// comparable universe used for the stored totals; a question answered by
/// one side only is omitted rather than shown as a mismatch. Computed at
/// read time from the responses, not from the match table.
pub async fn match_comparison(
    State(pool): State<SqlitePool>,
    Path((user1_id, user2_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let user1_rows = fetch_responses(&pool, user1_id).await?;
    let user2_rows = fetch_responses(&pool, user2_id).await?;

    let user2_by_question: HashMap<i64, (i64, String)> = user2_rows
        .into_iter()
        .map(|r| (r.question_id, (r.selected_option_id, r.option_text)))
        .collect();

    let comparisons: Vec<ComparisonRow> = user1_rows
        .into_iter()
        .filter_map(|r1| {
            let (option_id_2, option_text_2) = user2_by_question.get(&r1.question_id)?;
            Some(ComparisonRow {
                question_id: r1.question_id,
                is_same: r1.selected_option_id == *option_id_2,
                question_text: r1.question_text,
                user1_option_text: r1.option_text,
                user2_option_text: option_text_2.clone(),
            })
        })
        .collect();

    Ok(Json(comparisons))
}

async fn fetch_responses(
    pool: &SqlitePool,
    user_id: i64,
) -> Result<Vec<UserResponseRow>, AppError> {
    let rows = sqlx::query_as::<_, UserResponseRow>(
        r#"
        SELECT
            sr.question_id,
            sr.selected_option_id,
            q.text AS question_text,
            qo.text AS option_text
        FROM survey_responses sr
        JOIN questions q ON q.id = sr.question_id
        JOIN question_options qo ON qo.id = sr.selected_option_id
        WHERE sr.user_id = ?
        ORDER BY q.order_position ASC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch comparison responses: {:?}", e);
        AppError::from(e)
    })?;

    Ok(rows)
}
