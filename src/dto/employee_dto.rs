use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Allow-listed fields an admin may set when creating an employee. Anything
/// not named here (ids, clerk_id, ownership) is never copied from a payload.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EmployeeCreate {
    pub last_name: Option<String>,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub phone: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub position_id: Option<i64>,
    pub hire_date: Option<NaiveDate>,
    #[serde(default)]
    pub is_admin: bool,
}

/// Partial update; only present fields are written. `is_admin` is deliberately
/// absent — it cannot be changed through the update surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmployeeUpdate {
    pub last_name: Option<String>,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub position_id: Option<i64>,
    pub hire_date: Option<NaiveDate>,
}

/// Payload delivered by the identity provider's user-created webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmployeeMinimal {
    pub clerk_id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    Link,
    EmailPassword,
    UsernamePassword,
}

/// One item of a batch provisioning request: give an existing local employee
/// an account in the external directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchAccountItem {
    pub employee_id: i64,
    pub account_type: AccountKind,
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchAccountRequest {
    pub employees: Vec<BatchAccountItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionedAccount {
    pub employee_id: i64,
    pub clerk_id: String,
    pub full_name: String,
    pub email: Option<String>,
    pub username: Option<String>,
    pub position_title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemError {
    pub index: usize,
    pub error: String,
}

/// Batch outcome: successes and per-item failures, never an all-or-nothing
/// abort.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionReport {
    pub results: Vec<ProvisionedAccount>,
    pub errors: Vec<ItemError>,
}
