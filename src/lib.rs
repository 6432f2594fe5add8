pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use crate::services::{
    account_service::AccountService, belbin_service::BelbinService,
    employee_service::EmployeeService, lifecycle_service::LifecycleService,
    position_service::PositionService, reconcile_service::ReconcileService,
    scoring_service::ScoringService, submission_service::SubmissionService,
    test_service::TestService,
};
use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub test_service: TestService,
    pub reconcile_service: ReconcileService,
    pub lifecycle_service: LifecycleService,
    pub scoring_service: ScoringService,
    pub submission_service: SubmissionService,
    pub employee_service: EmployeeService,
    pub position_service: PositionService,
    pub belbin_service: BelbinService,
    pub account_service: AccountService,
}

impl AppState {
    pub fn new(pool: PgPool) -> Self {
        Self {
            test_service: TestService::new(pool.clone()),
            reconcile_service: ReconcileService::new(pool.clone()),
            lifecycle_service: LifecycleService::new(pool.clone()),
            scoring_service: ScoringService::new(pool.clone()),
            submission_service: SubmissionService::new(pool.clone()),
            employee_service: EmployeeService::new(pool.clone()),
            position_service: PositionService::new(pool.clone()),
            belbin_service: BelbinService::new(pool.clone()),
            account_service: AccountService::new(),
            pool,
        }
    }
}
