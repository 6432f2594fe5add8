pub mod account_service;
pub mod belbin_service;
pub mod employee_service;
pub mod lifecycle_service;
pub mod position_service;
pub mod reconcile_service;
pub mod scoring_service;
pub mod submission_service;
pub mod test_service;
