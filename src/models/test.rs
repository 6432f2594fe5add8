use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Lifecycle status of the test definition itself, not of any one attempt.
/// Stored as a plain TEXT column, not a Postgres enum type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum TestStatus {
    Draft,
    Active,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Test {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub status: TestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub time_limit_minutes: Option<i32>,
    pub test_settings_id: Option<i64>,
    pub created_by: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TestSettings {
    pub id: i64,
    pub min_questions: i32,
    pub belbin_block: i32,
    pub belbin_questions_in_block: i32,
    pub has_time_limit: bool,
}

/// Derived, display-only state of one employee's attempt. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    NotStarted,
    InProgress,
    Completed,
    Expired,
}

/// One employee's attempt at one test. Created on start, scored on completion.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TestResult {
    pub id: i64,
    pub test_id: i64,
    pub employee_id: i64,
    pub is_completed: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub score: Option<i32>,
    pub max_score: Option<i32>,
    pub percent: Option<f64>,
}
