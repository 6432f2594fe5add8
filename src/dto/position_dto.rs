use serde::{Deserialize, Serialize};
use validator::Validate;

fn default_access_level() -> String {
    "basic".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PositionCreate {
    #[validate(length(min = 1))]
    pub title: String,
    pub description: Option<String>,
    #[serde(default = "default_access_level")]
    pub access_level: String,
    pub salary: Option<i32>,
    #[serde(default)]
    pub has_system_access: bool,
}
