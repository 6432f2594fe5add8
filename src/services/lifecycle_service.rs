use crate::error::{Error, Result};
use crate::models::test::{AttemptStatus, Test, TestResult, TestStatus};
use crate::services::scoring_service::ScoringService;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

/// Display status of an attempt, distinct from the start/complete state
/// machine: a test past its hard end-date reads as expired regardless of
/// what the employee did.
pub fn derive_status(
    test: &Test,
    result: Option<&TestResult>,
    now: DateTime<Utc>,
) -> AttemptStatus {
    if test.end_date.is_some_and(|end| end < now) {
        return AttemptStatus::Expired;
    }
    match result {
        Some(r) if r.completed_at.is_some() => AttemptStatus::Completed,
        Some(_) => AttemptStatus::InProgress,
        None => AttemptStatus::NotStarted,
    }
}

/// Gate run before every start/submit. Fails when the test is globally
/// expired, paused, or — for time-limited tests — when the employee's
/// individual window has closed or was never opened.
pub fn check_availability(
    test: &Test,
    result: Option<&TestResult>,
    now: DateTime<Utc>,
) -> Result<()> {
    if test.end_date.is_some_and(|end| now > end) {
        return Err(Error::BadRequest("Test has expired".to_string()));
    }
    if test.status == TestStatus::Draft {
        return Err(Error::BadRequest("Test is paused".to_string()));
    }
    if let Some(limit) = test.time_limit_minutes {
        let result = result.ok_or_else(|| {
            Error::BadRequest("Test has not been started yet".to_string())
        })?;
        let deadline = result.started_at + Duration::minutes(limit as i64);
        if now > deadline {
            return Err(Error::BadRequest(
                "Time limit for this test has elapsed".to_string(),
            ));
        }
    }
    Ok(())
}

/// True when an in-flight attempt should be force-completed by the sweep.
pub fn is_overdue(
    time_limit_minutes: Option<i32>,
    end_date: Option<DateTime<Utc>>,
    started_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> bool {
    if let Some(limit) = time_limit_minutes {
        if now - started_at > Duration::minutes(limit as i64) {
            return true;
        }
    }
    end_date.is_some_and(|end| end < now)
}

/// Overtime is not credited: a time-limited attempt completes at the end of
/// its window even when the completion call arrives later.
pub fn completion_timestamp(
    started_at: DateTime<Utc>,
    time_limit_minutes: Option<i32>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    match time_limit_minutes {
        Some(limit) => started_at + Duration::minutes(limit as i64),
        None => now,
    }
}

#[derive(Clone)]
pub struct LifecycleService {
    pool: PgPool,
}

impl LifecycleService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_test(&self, test_id: i64) -> Result<Test> {
        let test = sqlx::query_as::<_, Test>(
            r#"SELECT id, title, description, is_active, status, created_at, updated_at,
                      end_date, time_limit_minutes, test_settings_id, created_by
               FROM tests WHERE id = $1"#,
        )
        .bind(test_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Test not found".to_string()))?;
        Ok(test)
    }

    pub async fn get_result(&self, test_id: i64, employee_id: i64) -> Result<Option<TestResult>> {
        let result = sqlx::query_as::<_, TestResult>(
            r#"SELECT id, test_id, employee_id, is_completed, started_at, completed_at,
                      score, max_score, percent
               FROM test_results WHERE test_id = $1 AND employee_id = $2"#,
        )
        .bind(test_id)
        .bind(employee_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(result)
    }

    /// Starts an attempt, or reports the current status when one already
    /// exists. Never creates a duplicate row.
    pub async fn start_test(&self, test_id: i64, employee_id: i64) -> Result<AttemptStatus> {
        let test = self.get_test(test_id).await?;
        let now = Utc::now();

        if test.end_date.is_some_and(|end| now > end) {
            return Err(Error::BadRequest("Test has expired".to_string()));
        }
        if test.status == TestStatus::Draft {
            return Err(Error::BadRequest("Test is paused".to_string()));
        }

        let existing = self.get_result(test_id, employee_id).await?;
        match existing {
            Some(result) => Ok(derive_status(&test, Some(&result), now)),
            None => {
                sqlx::query(
                    r#"INSERT INTO test_results (test_id, employee_id, is_completed, started_at)
                       VALUES ($1, $2, FALSE, $3)"#,
                )
                .bind(test_id)
                .bind(employee_id)
                .bind(now)
                .execute(&self.pool)
                .await?;
                tracing::info!(test_id, employee_id, "attempt started");
                Ok(AttemptStatus::InProgress)
            }
        }
    }

    /// Completes the attempt and scores it. A no-op when already completed;
    /// completion is the sole trigger for scoring.
    pub async fn complete_test(&self, test_id: i64, employee_id: i64) -> Result<AttemptStatus> {
        let result = self
            .get_result(test_id, employee_id)
            .await?
            .ok_or_else(|| Error::NotFound("Test result not found".to_string()))?;

        if result.is_completed {
            return Ok(AttemptStatus::Completed);
        }

        let test = self.get_test(test_id).await?;
        let now = Utc::now();
        let completed_at = completion_timestamp(result.started_at, test.time_limit_minutes, now);

        sqlx::query(
            r#"UPDATE test_results SET is_completed = TRUE, completed_at = $1 WHERE id = $2"#,
        )
        .bind(completed_at)
        .bind(result.id)
        .execute(&self.pool)
        .await?;

        ScoringService::new(self.pool.clone())
            .score_attempt(test_id, employee_id)
            .await?;

        tracing::info!(test_id, employee_id, "attempt completed and scored");
        Ok(AttemptStatus::Completed)
    }

    /// Lazy expiry sweep over one employee's in-flight attempts; invoked from
    /// list/read paths instead of a background scheduler.
    pub async fn auto_complete_expired_for_employee(&self, employee_id: i64) -> Result<()> {
        let rows = sqlx::query_as::<_, (i64, DateTime<Utc>, Option<i32>, Option<DateTime<Utc>>)>(
            r#"SELECT tr.test_id, tr.started_at, t.time_limit_minutes, t.end_date
               FROM test_results tr
               JOIN tests t ON t.id = tr.test_id
               WHERE tr.employee_id = $1 AND tr.is_completed = FALSE"#,
        )
        .bind(employee_id)
        .fetch_all(&self.pool)
        .await?;

        let now = Utc::now();
        for (test_id, started_at, limit, end_date) in rows {
            if is_overdue(limit, end_date, started_at, now) {
                self.complete_test(test_id, employee_id).await?;
            }
        }
        Ok(())
    }

    /// Same sweep, scoped to every in-flight attempt of one test.
    pub async fn auto_complete_expired_for_test(&self, test_id: i64) -> Result<()> {
        let rows = sqlx::query_as::<_, (i64, DateTime<Utc>, Option<i32>, Option<DateTime<Utc>>)>(
            r#"SELECT tr.employee_id, tr.started_at, t.time_limit_minutes, t.end_date
               FROM test_results tr
               JOIN tests t ON t.id = tr.test_id
               WHERE tr.test_id = $1 AND tr.is_completed = FALSE"#,
        )
        .bind(test_id)
        .fetch_all(&self.pool)
        .await?;

        let now = Utc::now();
        for (employee_id, started_at, limit, end_date) in rows {
            if is_overdue(limit, end_date, started_at, now) {
                self.complete_test(test_id, employee_id).await?;
            }
        }
        Ok(())
    }

    /// Wipes one employee's answers and results for a test so it can be
    /// retaken from scratch.
    pub async fn reset_test(&self, test_id: i64, employee_id: i64) -> Result<()> {
        let assigned = sqlx::query_scalar::<_, i64>(
            r#"SELECT COUNT(*) FROM test_assignments WHERE test_id = $1 AND employee_id = $2"#,
        )
        .bind(test_id)
        .bind(employee_id)
        .fetch_one(&self.pool)
        .await?;
        if assigned == 0 {
            return Err(Error::BadRequest(
                "Test is not assigned to this employee".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"DELETE FROM belbin_test_results
               WHERE test_result_id IN (
                   SELECT id FROM test_results WHERE test_id = $1 AND employee_id = $2
               )"#,
        )
        .bind(test_id)
        .bind(employee_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"DELETE FROM user_answer_items
               WHERE user_answer_id IN (
                   SELECT id FROM user_answers WHERE test_id = $1 AND employee_id = $2
               )"#,
        )
        .bind(test_id)
        .bind(employee_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM user_answers WHERE test_id = $1 AND employee_id = $2")
            .bind(test_id)
            .bind(employee_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM user_belbin_answers WHERE test_id = $1 AND employee_id = $2")
            .bind(test_id)
            .bind(employee_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM test_results WHERE test_id = $1 AND employee_id = $2")
            .bind(test_id)
            .bind(employee_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(test_id, employee_id, "attempt reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_row(
        status: TestStatus,
        end_date: Option<DateTime<Utc>>,
        time_limit_minutes: Option<i32>,
    ) -> Test {
        let created = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        Test {
            id: 1,
            title: "t".to_string(),
            description: None,
            is_active: true,
            status,
            created_at: created,
            updated_at: created,
            end_date,
            time_limit_minutes,
            test_settings_id: None,
            created_by: 1,
        }
    }

    fn result_row(started_at: DateTime<Utc>, completed_at: Option<DateTime<Utc>>) -> TestResult {
        TestResult {
            id: 1,
            test_id: 1,
            employee_id: 1,
            is_completed: completed_at.is_some(),
            started_at,
            completed_at,
            score: None,
            max_score: None,
            percent: None,
        }
    }

    #[test]
    fn status_prefers_expiry_over_completion() {
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
        let past = now - Duration::days(1);
        let test = test_row(TestStatus::Active, Some(past), None);
        let result = result_row(past - Duration::hours(2), Some(past - Duration::hours(1)));
        assert_eq!(derive_status(&test, Some(&result), now), AttemptStatus::Expired);
    }

    #[test]
    fn status_walks_the_attempt_states() {
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
        let test = test_row(TestStatus::Active, None, None);
        assert_eq!(derive_status(&test, None, now), AttemptStatus::NotStarted);

        let started = result_row(now - Duration::minutes(5), None);
        assert_eq!(
            derive_status(&test, Some(&started), now),
            AttemptStatus::InProgress
        );

        let done = result_row(now - Duration::minutes(5), Some(now));
        assert_eq!(derive_status(&test, Some(&done), now), AttemptStatus::Completed);
    }

    #[test]
    fn availability_rejects_expired_and_paused() {
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
        let expired = test_row(TestStatus::Active, Some(now - Duration::hours(1)), None);
        assert!(check_availability(&expired, None, now).is_err());

        let draft = test_row(TestStatus::Draft, None, None);
        assert!(check_availability(&draft, None, now).is_err());
    }

    #[test]
    fn availability_enforces_the_individual_window() {
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
        let test = test_row(TestStatus::Active, None, Some(30));

        // no attempt row yet
        assert!(check_availability(&test, None, now).is_err());

        let fresh = result_row(now - Duration::minutes(10), None);
        assert!(check_availability(&test, Some(&fresh), now).is_ok());

        let stale = result_row(now - Duration::minutes(31), None);
        assert!(check_availability(&test, Some(&stale), now).is_err());
    }

    #[test]
    fn untimed_test_needs_no_attempt_row_to_submit() {
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
        let test = test_row(TestStatus::Active, None, None);
        assert!(check_availability(&test, None, now).is_ok());
    }

    #[test]
    fn overdue_checks_both_clocks() {
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
        let started = now - Duration::minutes(45);

        assert!(is_overdue(Some(30), None, started, now));
        assert!(!is_overdue(Some(60), None, started, now));
        assert!(is_overdue(None, Some(now - Duration::minutes(1)), started, now));
        assert!(!is_overdue(None, None, started, now));
    }

    #[test]
    fn completion_clamps_to_the_window_end() {
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
        let started = now - Duration::minutes(90);

        let clamped = completion_timestamp(started, Some(30), now);
        assert_eq!(clamped, started + Duration::minutes(30));

        let open_ended = completion_timestamp(started, None, now);
        assert_eq!(open_ended, now);
    }
}
