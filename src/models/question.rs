use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Stored as a plain TEXT column, not a Postgres enum type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum QuestionType {
    SingleChoice,
    MultipleChoice,
    TextAnswer,
    Belbin,
}

impl QuestionType {
    pub fn is_standard(self) -> bool {
        !matches!(self, QuestionType::Belbin)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QuestionType::SingleChoice => "single_choice",
            QuestionType::MultipleChoice => "multiple_choice",
            QuestionType::TextAnswer => "text_answer",
            QuestionType::Belbin => "belbin",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Question {
    pub id: i64,
    pub test_id: i64,
    pub text: String,
    pub question_type: QuestionType,
    pub order: i32,
    pub points: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Answer {
    pub id: i64,
    pub question_id: i64,
    pub text: String,
    pub is_correct: bool,
}
