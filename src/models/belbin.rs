use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BelbinRole {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_by_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BelbinQuestion {
    pub id: i64,
    pub test_id: i64,
    pub text: String,
    pub block_number: i32,
    pub order: i32,
}

/// One option inside a Belbin question. Each option evidences a role; the
/// optional default score is used when the client submits bare answer ids.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BelbinAnswer {
    pub id: i64,
    pub question_id: i64,
    pub text: String,
    pub role_id: Option<i64>,
    pub score: Option<i32>,
}

/// Per-role total for one completed attempt.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BelbinTestResult {
    pub id: i64,
    pub test_result_id: i64,
    pub role_id: i64,
    pub total_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BelbinPositionRequirement {
    pub id: i64,
    pub position_id: i64,
    pub role_id: i64,
    pub min_score: i32,
    pub is_key: bool,
}
