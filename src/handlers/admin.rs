// src/handlers/admin.rs

use std::collections::HashSet;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    error::AppError,
    matching,
    models::{
        match_result::LeaderboardRow,
        question::{CreateQuestionRequest, OptionInput, validate_options},
        user::{CreateUserRequest, UpdateUserRequest},
    },
};

/// Creates a new participant.
pub async fn create_user(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let name = payload.name.trim().to_string();

    let id = sqlx::query_scalar::<_, i64>("INSERT INTO users (name) VALUES (?) RETURNING id")
        .bind(&name)
        .fetch_one(&pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AppError::Conflict(format!("User with name '{}' already exists", name))
            }
            other => {
                tracing::error!("Failed to create user: {:?}", other);
                AppError::from(other)
            }
        })?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))))
}

/// DTO for adding participants in bulk, one name per line.
#[derive(Debug, Deserialize)]
pub struct BulkUsersRequest {
    pub names: String,
}

/// Per-entry outcome of a bulk insert.
#[derive(Debug, Serialize)]
struct FailedEntry {
    name: String,
    reason: String,
}

/// Creates participants in bulk from newline-separated names.
///
/// Each name is inserted independently so one duplicate does not sink the
/// rest; the response reports which names were added and which failed.
pub async fn bulk_create_users(
    State(pool): State<SqlitePool>,
    Json(payload): Json<BulkUsersRequest>,
) -> Result<impl IntoResponse, AppError> {
    let names: Vec<String> = payload
        .names
        .lines()
        .map(str::trim)
        .filter(|name| name.len() >= 2 && name.len() <= 100)
        .map(String::from)
        .collect();

    if names.is_empty() {
        return Err(AppError::BadRequest("No valid names provided".to_string()));
    }

    let mut added: Vec<String> = Vec::new();
    let mut failed: Vec<FailedEntry> = Vec::new();

    for name in names {
        let result = sqlx::query("INSERT INTO users (name) VALUES (?)")
            .bind(&name)
            .execute(&pool)
            .await;

        match result {
            Ok(_) => added.push(name),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                failed.push(FailedEntry {
                    name,
                    reason: "already exists".to_string(),
                });
            }
            Err(e) => {
                tracing::error!("Failed to insert user '{}': {:?}", name, e);
                failed.push(FailedEntry {
                    name,
                    reason: "database error".to_string(),
                });
            }
        }
    }

    if added.is_empty() {
        return Err(AppError::Conflict("Failed to add any users".to_string()));
    }

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "count": added.len(),
            "added": added,
            "failed": failed,
        })),
    ))
}

/// Renames a participant.
pub async fn update_user(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let name = payload.name.trim().to_string();

    let result = sqlx::query("UPDATE users SET name = ? WHERE id = ?")
        .bind(&name)
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AppError::Conflict(format!("User with name '{}' already exists", name))
            }
            other => {
                tracing::error!("Failed to update user: {:?}", other);
                AppError::from(other)
            }
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    Ok(StatusCode::OK)
}

/// Deletes a participant.
///
/// Responses and match rows referencing them go with the row (cascade);
/// remaining match rows are only refreshed by the next generation run.
pub async fn delete_user(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete user: {:?}", e);
            AppError::from(e)
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Creates a new question with its options.
pub async fn create_question(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let mut tx = pool.begin().await?;

    let question_id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO questions (text, order_position) VALUES (?, ?) RETURNING id",
    )
    .bind(payload.text.trim())
    .bind(payload.order_position)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create question: {:?}", e);
        AppError::from(e)
    })?;

    let mut position = 1;
    for option in &payload.options {
        let text = option.text.trim();
        if text.is_empty() {
            continue;
        }
        sqlx::query(
            "INSERT INTO question_options (question_id, text, order_position) VALUES (?, ?, ?)",
        )
        .bind(question_id)
        .bind(text)
        .bind(position)
        .execute(&mut *tx)
        .await?;
        position += 1;
    }

    tx.commit().await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "id": question_id })),
    ))
}

/// DTO for updating a question and reconciling its options.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuestionRequest {
    #[validate(length(min = 1, max = 1000))]
    pub text: String,
    pub order_position: i64,
    #[validate(custom(function = validate_options))]
    pub options: Vec<OptionInput>,
}

/// Updates a question and reconciles its options against the submitted set.
///
/// Options carrying a known id are updated in place, new ones are inserted,
/// and options missing from the payload are deleted. Keying on option id
/// keeps stored responses pointing at surviving options instead of churning
/// every identifier on each edit.
pub async fn update_question(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let mut tx = pool.begin().await?;

    let updated = sqlx::query(
        "UPDATE questions SET text = ?, order_position = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(payload.text.trim())
    .bind(payload.order_position)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    let existing: Vec<i64> =
        sqlx::query_scalar("SELECT id FROM question_options WHERE question_id = ?")
            .bind(id)
            .fetch_all(&mut *tx)
            .await?;

    let mut kept: HashSet<i64> = HashSet::new();
    let mut position = 1;
    for option in &payload.options {
        let text = option.text.trim();
        if text.is_empty() {
            continue;
        }
        match option.id {
            Some(option_id) if existing.contains(&option_id) => {
                sqlx::query(
                    "UPDATE question_options SET text = ?, order_position = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
                )
                .bind(text)
                .bind(position)
                .bind(option_id)
                .execute(&mut *tx)
                .await?;
                kept.insert(option_id);
            }
            _ => {
                sqlx::query(
                    "INSERT INTO question_options (question_id, text, order_position) VALUES (?, ?, ?)",
                )
                .bind(id)
                .bind(text)
                .bind(position)
                .execute(&mut *tx)
                .await?;
            }
        }
        position += 1;
    }

    for option_id in existing {
        if !kept.contains(&option_id) {
            sqlx::query("DELETE FROM question_options WHERE id = ?")
                .bind(option_id)
                .execute(&mut *tx)
                .await?;
        }
    }

    tx.commit().await?;

    Ok(StatusCode::OK)
}

/// Deletes a question. Its options and any responses to it cascade away.
pub async fn delete_question(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM questions WHERE id = ?")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete question: {:?}", e);
            AppError::from(e)
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// DTO for swapping the display positions of two questions.
#[derive(Debug, Deserialize)]
pub struct SwapPositionsRequest {
    pub question_id_1: i64,
    pub position_1: i64,
    pub question_id_2: i64,
    pub position_2: i64,
}

/// Swaps the display positions of two questions.
pub async fn swap_question_positions(
    State(pool): State<SqlitePool>,
    Json(payload): Json<SwapPositionsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = pool.begin().await?;

    for (question_id, position) in [
        (payload.question_id_1, payload.position_2),
        (payload.question_id_2, payload.position_1),
    ] {
        let result = sqlx::query(
            "UPDATE questions SET order_position = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(position)
        .bind(question_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Question not found".to_string()));
        }
    }

    tx.commit().await?;

    Ok(StatusCode::OK)
}

/// DTO for bulk question creation from plain text.
#[derive(Debug, Deserialize)]
pub struct BulkQuestionsRequest {
    pub raw_text: String,
}

/// One parsed entry from a bulk question block.
#[derive(Debug, PartialEq)]
struct BulkQuestionEntry {
    text: String,
    options: Vec<String>,
}

/// Parses a plain-text question block.
///
/// Expected format: a question on its own line, followed by its options on
/// lines starting with '-'. Blank lines are ignored; a question without any
/// options is dropped.
fn parse_bulk_questions(raw: &str) -> Vec<BulkQuestionEntry> {
    let mut questions = Vec::new();
    let mut current: Option<BulkQuestionEntry> = None;

    for line in raw.lines().map(str::trim).filter(|line| !line.is_empty()) {
        if let Some(option_text) = line.strip_prefix('-') {
            let option_text = option_text.trim();
            if !option_text.is_empty() {
                if let Some(question) = current.as_mut() {
                    question.options.push(option_text.to_string());
                }
            }
        } else {
            if let Some(question) = current.take() {
                if !question.options.is_empty() {
                    questions.push(question);
                }
            }
            current = Some(BulkQuestionEntry {
                text: line.to_string(),
                options: Vec::new(),
            });
        }
    }

    if let Some(question) = current {
        if !question.options.is_empty() {
            questions.push(question);
        }
    }

    questions
}

/// Creates multiple questions from a plain-text block.
///
/// Entries are inserted one at a time, each in its own transaction, so a
/// bad entry fails alone; entries with fewer than two options are rejected
/// without touching the database.
pub async fn bulk_create_questions(
    State(pool): State<SqlitePool>,
    Json(payload): Json<BulkQuestionsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let parsed = parse_bulk_questions(&payload.raw_text);

    if parsed.is_empty() {
        return Err(AppError::BadRequest(
            "No valid questions found in input".to_string(),
        ));
    }

    let max_position: Option<i64> = sqlx::query_scalar("SELECT MAX(order_position) FROM questions")
        .fetch_one(&pool)
        .await?;
    let mut position = max_position.unwrap_or(0) + 1;

    let mut added = 0;
    let mut failed: Vec<FailedEntry> = Vec::new();

    for entry in parsed {
        if entry.options.len() < 2 {
            failed.push(FailedEntry {
                name: entry.text,
                reason: "Question must have at least 2 options".to_string(),
            });
            continue;
        }

        match insert_bulk_question(&pool, &entry, position).await {
            Ok(_) => {
                added += 1;
                position += 1;
            }
            Err(e) => {
                tracing::error!("Failed to create question '{}': {:?}", entry.text, e);
                failed.push(FailedEntry {
                    name: entry.text,
                    reason: "database error".to_string(),
                });
            }
        }
    }

    Ok(Json(serde_json::json!({
        "questions_added": added,
        "failed": failed,
    })))
}

async fn insert_bulk_question(
    pool: &SqlitePool,
    entry: &BulkQuestionEntry,
    position: i64,
) -> Result<i64, AppError> {
    let mut tx = pool.begin().await?;

    let question_id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO questions (text, order_position) VALUES (?, ?) RETURNING id",
    )
    .bind(&entry.text)
    .bind(position)
    .fetch_one(&mut *tx)
    .await?;

    for (index, option_text) in entry.options.iter().enumerate() {
        sqlx::query(
            "INSERT INTO question_options (question_id, text, order_position) VALUES (?, ?, ?)",
        )
        .bind(question_id)
        .bind(option_text)
        .bind(index as i64 + 1)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok(question_id)
}

/// Full leaderboard: every stored pair with both names, most similar first.
pub async fn list_all_results(
    State(pool): State<SqlitePool>,
) -> Result<impl IntoResponse, AppError> {
    let rows = sqlx::query_as::<_, LeaderboardRow>(
        r#"
        SELECT
            m.user_id_1,
            m.user_id_2,
            u1.name AS user1_name,
            u2.name AS user2_name,
            m.common_answers,
            m.total_possible,
            m.match_percentage
        FROM match_results m
        JOIN users u1 ON u1.id = m.user_id_1
        JOIN users u2 ON u2.id = m.user_id_2
        ORDER BY m.match_percentage DESC, m.user_id_1 ASC, m.user_id_2 ASC
        "#,
    )
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list match results: {:?}", e);
        AppError::from(e)
    })?;

    Ok(Json(rows))
}

/// Recomputes the full pairwise match table.
///
/// Takes no parameters and always recomputes from scratch; triggering it
/// again with unchanged responses rewrites the same rows.
pub async fn generate_results(
    State(pool): State<SqlitePool>,
) -> Result<impl IntoResponse, AppError> {
    let pairs = matching::generate(&pool).await.map_err(|e| {
        tracing::error!("Failed to generate match results: {}", e);
        e
    })?;

    Ok(Json(serde_json::json!({
        "message": "Match results generated successfully",
        "pairs": pairs,
    })))
}

/// Clears all responses, match results and completion flags in one
/// transaction. Questions are preserved.
pub async fn reset_survey(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM survey_responses")
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM match_results")
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE users SET has_completed_survey = FALSE")
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(Json(serde_json::json!({
        "message": "Survey data reset successfully"
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bulk_questions() {
        let raw = "Favorite season?\n- Spring\n- Autumn\n\nCoffee or tea?\n- Coffee\n- Tea\n- Neither\n";

        let parsed = parse_bulk_questions(raw);

        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].text, "Favorite season?");
        assert_eq!(parsed[0].options, vec!["Spring", "Autumn"]);
        assert_eq!(parsed[1].options.len(), 3);
    }

    #[test]
    fn test_parse_bulk_questions_drops_optionless_entries() {
        let raw = "Orphan question\nReal question\n- Yes\n- No";

        let parsed = parse_bulk_questions(raw);

        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].text, "Real question");
    }

    #[test]
    fn test_parse_bulk_questions_ignores_noise() {
        let raw = "  \nQuestion?\n-   \n- Only option\n";

        let parsed = parse_bulk_questions(raw);

        // The blank '-' line is skipped; a single option still parses, the
        // two-option minimum is enforced by the handler.
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].options, vec!["Only option"]);
    }

    #[test]
    fn test_parse_bulk_questions_empty_input() {
        assert!(parse_bulk_questions("").is_empty());
        assert!(parse_bulk_questions("- stray option").is_empty());
    }
}
