use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Position {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub access_level: String,
    pub salary: Option<i32>,
    pub has_system_access: bool,
    pub created_by_id: i64,
}
