use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BelbinRoleCreate {
    #[validate(length(min = 1))]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequirementPayload {
    pub id: Option<i64>,
    pub role_id: i64,
    pub min_score: i32,
    #[serde(default)]
    pub is_key: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BelbinRequirementsRequest {
    pub position_id: i64,
    pub requirements: Vec<RequirementPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequirementView {
    pub id: i64,
    pub position_id: i64,
    pub role_id: i64,
    pub min_score: i32,
    pub is_key: bool,
    pub role_name: String,
    pub role_description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionRequirements {
    pub position_id: i64,
    pub position_title: String,
    pub requirements: Vec<RequirementView>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitVerdict {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleFit {
    pub role_id: i64,
    pub role_name: Option<String>,
    pub total_score: f64,
    pub normalized_score: f64,
    pub min_score: i32,
    pub is_key: bool,
    pub meets_requirement: bool,
}

/// Fit of one employee's Belbin profile against their position's
/// requirements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitEvaluation {
    pub test_id: i64,
    pub employee_id: i64,
    pub overall: FitVerdict,
    pub roles: Vec<RoleFit>,
}
