// src/handlers/survey.rs

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        question::{Question, QuestionOption, QuestionWithOptions},
        response::{SubmitResponsesRequest, UserResponseRow},
        user::User,
    },
};

/// Lists every participant, ordered by name.
/// Used by the identity picker on the survey side.
pub async fn list_users(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    let users = sqlx::query_as::<_, User>(
        "SELECT id, name, has_completed_survey, created_at FROM users ORDER BY name ASC",
    )
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list users: {:?}", e);
        AppError::from(e)
    })?;

    Ok(Json(users))
}

/// Returns the survey: questions ordered by position, each carrying its
/// options ordered by position.
pub async fn list_questions(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    let questions = sqlx::query_as::<_, Question>(
        r#"
        SELECT id, text, order_position, created_at, updated_at
        FROM questions
        ORDER BY order_position ASC
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let options = sqlx::query_as::<_, QuestionOption>(
        r#"
        SELECT id, question_id, text, order_position
        FROM question_options
        ORDER BY question_id ASC, order_position ASC
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let mut options_by_question: HashMap<i64, Vec<QuestionOption>> = HashMap::new();
    for option in options {
        options_by_question
            .entry(option.question_id)
            .or_default()
            .push(option);
    }

    let survey: Vec<QuestionWithOptions> = questions
        .into_iter()
        .map(|q| QuestionWithOptions {
            options: options_by_question.remove(&q.id).unwrap_or_default(),
            id: q.id,
            text: q.text,
            order_position: q.order_position,
        })
        .collect();

    Ok(Json(survey))
}

/// Saves a participant's answers.
///
/// Re-taking the survey replaces everything: prior responses are cleared,
/// the new set is inserted and the completion flag is set, all inside one
/// transaction.
pub async fn submit_responses(
    State(pool): State<SqlitePool>,
    Json(payload): Json<SubmitResponsesRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let user_exists = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE id = ?")
        .bind(payload.user_id)
        .fetch_optional(&pool)
        .await?;

    if user_exists.is_none() {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM survey_responses WHERE user_id = ?")
        .bind(payload.user_id)
        .execute(&mut *tx)
        .await?;

    for response in &payload.responses {
        sqlx::query(
            r#"
            INSERT INTO survey_responses (user_id, question_id, selected_option_id)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(payload.user_id)
        .bind(response.question_id)
        .bind(response.selected_option_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => AppError::BadRequest(
                "Duplicate answer for the same question in one submission".to_string(),
            ),
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                AppError::BadRequest("Unknown question or option".to_string())
            }
            other => {
                tracing::error!("Failed to save response: {:?}", other);
                AppError::from(other)
            }
        })?;
    }

    sqlx::query("UPDATE users SET has_completed_survey = TRUE WHERE id = ?")
        .bind(payload.user_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(Json(serde_json::json!({
        "message": "Responses saved successfully"
    })))
}

/// Returns a participant's saved answers with display text, in survey order.
pub async fn get_user_responses(
    State(pool): State<SqlitePool>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let responses = sqlx::query_as::<_, UserResponseRow>(
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
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch user responses: {:?}", e);
        AppError::from(e)
    })?;

    Ok(Json(responses))
}
