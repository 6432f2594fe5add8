use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Employee {
    pub id: i64,
    pub last_name: Option<String>,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub position_id: Option<i64>,
    pub hire_date: Option<NaiveDate>,
    pub is_admin: bool,
    pub created_by_id: Option<i64>,
    /// Stable identifier assigned by the external identity provider.
    pub clerk_id: Option<String>,
}

/// The stored answer of one employee to one regular question. Selections for
/// choice questions live in `UserAnswerItem` rows; text questions use
/// `text_response`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserAnswer {
    pub id: i64,
    pub test_id: i64,
    pub employee_id: i64,
    pub question_id: i64,
    pub text_response: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserAnswerItem {
    pub id: i64,
    pub user_answer_id: i64,
    pub answer_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserBelbinAnswer {
    pub id: i64,
    pub test_id: i64,
    pub employee_id: i64,
    pub question_id: i64,
    pub answer_id: i64,
    pub score: Option<i32>,
}
