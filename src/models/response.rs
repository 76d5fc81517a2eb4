// src/models/response.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// One answer within a survey submission.
#[derive(Debug, Deserialize, Serialize)]
pub struct ResponseInput {
    pub question_id: i64,
    pub selected_option_id: i64,
}

/// DTO for submitting a participant's answer set.
///
/// Saving replaces any previously stored responses for the participant and
/// marks them as having completed the survey.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitResponsesRequest {
    pub user_id: i64,
    #[validate(length(min = 1, message = "At least one response is required."))]
    pub responses: Vec<ResponseInput>,
}

/// A saved response joined with its question and option display text.
#[derive(Debug, Serialize, FromRow)]
pub struct UserResponseRow {
    pub question_id: i64,
    pub selected_option_id: i64,
    pub question_text: String,
    pub option_text: String,
}
