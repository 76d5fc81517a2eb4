// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,

    /// The text content of the question.
    pub text: String,

    /// Display order of the question within the survey.
    pub order_position: i64,

    pub created_at: Option<chrono::NaiveDateTime>,
    pub updated_at: Option<chrono::NaiveDateTime>,
}

/// Represents the 'question_options' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QuestionOption {
    pub id: i64,
    pub question_id: i64,
    pub text: String,
    pub order_position: i64,
}

/// A question together with its ordered options, as served to the survey UI.
#[derive(Debug, Serialize)]
pub struct QuestionWithOptions {
    pub id: i64,
    pub text: String,
    pub order_position: i64,
    pub options: Vec<QuestionOption>,
}

/// One option in a create/update payload. `id` is set for options that
/// already exist in the database and should be updated in place.
#[derive(Debug, Deserialize, Serialize)]
pub struct OptionInput {
    pub id: Option<i64>,
    pub text: String,
}

/// DTO for creating a new question.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, max = 1000))]
    pub text: String,
    pub order_position: i64,
    #[validate(custom(function = validate_options))]
    pub options: Vec<OptionInput>,
}

/// A question is only usable for matching with at least two choices.
pub(crate) fn validate_options(options: &[OptionInput]) -> Result<(), validator::ValidationError> {
    let non_empty = options
        .iter()
        .filter(|opt| !opt.text.trim().is_empty())
        .count();
    if non_empty < 2 {
        return Err(validator::ValidationError::new(
            "question_needs_at_least_two_options",
        ));
    }
    for opt in options {
        if opt.text.len() > 500 {
            return Err(validator::ValidationError::new("option_too_long"));
        }
    }
    Ok(())
}
