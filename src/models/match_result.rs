// src/models/match_result.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents the 'match_results' table in the database.
///
/// One row per unordered pair of completed participants, lower id stored
/// first. The table is fully replaced on every generation run.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct MatchResult {
    pub user_id_1: i64,
    pub user_id_2: i64,

    /// Number of questions where both picked the identical option.
    pub common_answers: i64,

    /// Number of questions both participants answered at all.
    pub total_possible: i64,

    /// 100 * common_answers / total_possible, or 0 when total_possible is 0.
    pub match_percentage: f64,
}

/// One leaderboard entry relative to a single participant.
#[derive(Debug, Serialize, FromRow)]
pub struct MatchEntry {
    pub other_user_id: i64,
    pub name: String,
    pub match_percentage: f64,
}

/// Aggregated row for the admin results table, joined with both names.
#[derive(Debug, Serialize, FromRow)]
pub struct LeaderboardRow {
    pub user_id_1: i64,
    pub user_id_2: i64,
    pub user1_name: String,
    pub user2_name: String,
    pub common_answers: i64,
    pub total_possible: i64,
    pub match_percentage: f64,
}

/// Question-by-question comparison between two participants.
/// Questions answered by only one side are omitted upstream.
#[derive(Debug, Serialize)]
pub struct ComparisonRow {
    pub question_id: i64,
    pub question_text: String,
    pub user1_option_text: String,
    pub user2_option_text: String,
    pub is_same: bool,
}
