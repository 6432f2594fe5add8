use crate::models::question::QuestionType;
use crate::models::test::TestStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

fn default_points() -> i32 {
    1
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerPayload {
    pub id: Option<i64>,
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionPayload {
    pub id: Option<i64>,
    pub text: String,
    pub question_type: QuestionType,
    #[serde(default)]
    pub order: i32,
    #[serde(default = "default_points")]
    pub points: i32,
    #[serde(default)]
    pub answers: Vec<AnswerPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BelbinAnswerPayload {
    pub id: Option<i64>,
    pub text: String,
    pub role_id: Option<i64>,
    pub score: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BelbinQuestionPayload {
    pub id: Option<i64>,
    pub text: String,
    #[serde(default)]
    pub block_number: i32,
    #[serde(default)]
    pub order: i32,
    #[serde(default)]
    pub answers: Vec<BelbinAnswerPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSettingsPayload {
    pub min_questions: i32,
    pub belbin_block: i32,
    pub belbin_questions_in_block: i32,
    pub has_time_limit: bool,
}

/// Full test definition, used both for creation and for edits submitted to
/// the reconciler. Questions carry ids when they refer to stored rows.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TestPayload {
    #[validate(length(min = 1))]
    pub title: String,
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub end_date: Option<DateTime<Utc>>,
    pub time_limit_minutes: Option<i32>,
    #[serde(default)]
    pub questions: Vec<QuestionPayload>,
    #[serde(default)]
    pub belbin_questions: Vec<BelbinQuestionPayload>,
    pub test_settings: Option<TestSettingsPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestStatusUpdate {
    pub status: TestStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentItem {
    pub test_id: i64,
    pub employee_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestAssignmentRequest {
    pub assignments: Vec<AssignmentItem>,
}

/// One answer submission for one question of an in-progress attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitAnswerRequest {
    pub test_id: i64,
    pub question_id: i64,
    pub question_type: QuestionType,
    #[serde(default)]
    pub answer_ids: Vec<i64>,
    pub text_response: Option<String>,
}

// Owner-facing detail view: full definition including correctness flags.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionDetail {
    pub id: i64,
    pub test_id: i64,
    pub text: String,
    pub question_type: QuestionType,
    pub order: i32,
    pub points: i32,
    pub answers: Vec<crate::models::question::Answer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BelbinQuestionDetail {
    pub id: i64,
    pub test_id: i64,
    pub text: String,
    pub block_number: i32,
    pub order: i32,
    pub answers: Vec<crate::models::belbin::BelbinAnswer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestDetail {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub status: TestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub time_limit_minutes: Option<i32>,
    pub test_settings: Option<crate::models::test::TestSettings>,
    pub questions: Vec<QuestionDetail>,
    pub belbin_questions: Vec<BelbinQuestionDetail>,
}

// Employee-facing "safe" views: correctness flags stripped, the employee's
// own selections marked.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafeAnswer {
    pub id: Option<i64>,
    pub question_id: i64,
    pub text: String,
    pub is_user_answer: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafeQuestion {
    pub id: i64,
    pub test_id: i64,
    pub text: String,
    pub question_type: QuestionType,
    pub order: i32,
    pub answers: Vec<SafeAnswer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafeBelbinAnswer {
    pub id: i64,
    pub question_id: i64,
    pub text: String,
    pub user_score: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafeBelbinQuestion {
    pub id: i64,
    pub test_id: i64,
    pub text: String,
    pub block_number: i32,
    pub order: i32,
    pub answers: Vec<SafeBelbinAnswer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafeTest {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub time_limit_minutes: Option<i32>,
    pub status: crate::models::test::AttemptStatus,
    pub questions: Vec<SafeQuestion>,
    pub belbin_questions: Vec<SafeBelbinQuestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BelbinRoleTotal {
    pub role_id: i64,
    pub role_name: Option<String>,
    pub total_score: f64,
}

/// Owner-facing view of one employee's completed attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResultView {
    pub id: i64,
    pub test_id: i64,
    pub employee_id: i64,
    pub employee_name: Option<String>,
    pub is_completed: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub score: Option<i32>,
    pub max_score: Option<i32>,
    pub percent: Option<f64>,
    pub time_limit_minutes: Option<i32>,
    pub belbin_results: Vec<BelbinRoleTotal>,
}
