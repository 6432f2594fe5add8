use crate::dto::test_dto::{
    BelbinQuestionDetail, BelbinRoleTotal, QuestionDetail, SafeAnswer, SafeBelbinAnswer,
    SafeBelbinQuestion, SafeQuestion, SafeTest, TestAssignmentRequest, TestDetail, TestPayload,
    TestResultView,
};
use crate::error::{Error, Result};
use crate::models::question::QuestionType;
use crate::models::test::{Test, TestSettings, TestStatus};
use crate::services::lifecycle_service::{self, LifecycleService};
use crate::services::reconcile_service::ReconcileService;
use chrono::Utc;
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};

#[derive(Clone)]
pub struct TestService {
    pool: PgPool,
}

impl TestService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn owned_test(&self, test_id: i64, owner_id: i64) -> Result<Test> {
        let test = sqlx::query_as::<_, Test>(
            r#"SELECT id, title, description, is_active, status, created_at, updated_at,
                      end_date, time_limit_minutes, test_settings_id, created_by
               FROM tests WHERE id = $1 AND created_by = $2"#,
        )
        .bind(test_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Test not found".to_string()))?;
        Ok(test)
    }

    pub async fn create_test(&self, owner_id: i64, payload: TestPayload) -> Result<TestDetail> {
        let mut tx = self.pool.begin().await?;

        let mut time_limit = payload.time_limit_minutes;
        let settings_id = match &payload.test_settings {
            Some(settings) => {
                if !settings.has_time_limit {
                    time_limit = None;
                }
                let id = sqlx::query_scalar::<_, i64>(
                    r#"INSERT INTO test_settings
                           (min_questions, belbin_block, belbin_questions_in_block, has_time_limit)
                       VALUES ($1, $2, $3, $4)
                       RETURNING id"#,
                )
                .bind(settings.min_questions)
                .bind(settings.belbin_block)
                .bind(settings.belbin_questions_in_block)
                .bind(settings.has_time_limit)
                .fetch_one(&mut *tx)
                .await?;
                Some(id)
            }
            None => None,
        };

        let status = if payload.is_active {
            TestStatus::Active
        } else {
            TestStatus::Draft
        };
        let now = Utc::now();

        let test_id = sqlx::query_scalar::<_, i64>(
            r#"INSERT INTO tests
                   (title, description, is_active, status, created_at, updated_at,
                    end_date, time_limit_minutes, test_settings_id, created_by)
               VALUES ($1, $2, $3, $4, $5, $5, $6, $7, $8, $9)
               RETURNING id"#,
        )
        .bind(&payload.title)
        .bind(&payload.description)
        .bind(payload.is_active)
        .bind(status)
        .bind(now)
        .bind(payload.end_date)
        .bind(time_limit)
        .bind(settings_id)
        .bind(owner_id)
        .fetch_one(&mut *tx)
        .await?;

        for question in &payload.questions {
            let question_id = sqlx::query_scalar::<_, i64>(
                r#"INSERT INTO questions (test_id, text, question_type, "order", points)
                   VALUES ($1, $2, $3, $4, $5)
                   RETURNING id"#,
            )
            .bind(test_id)
            .bind(&question.text)
            .bind(question.question_type)
            .bind(question.order)
            .bind(question.points)
            .fetch_one(&mut *tx)
            .await?;

            for answer in &question.answers {
                sqlx::query(
                    "INSERT INTO answers (question_id, text, is_correct) VALUES ($1, $2, $3)",
                )
                .bind(question_id)
                .bind(&answer.text)
                .bind(answer.is_correct)
                .execute(&mut *tx)
                .await?;
            }
        }

        for question in &payload.belbin_questions {
            let question_id = sqlx::query_scalar::<_, i64>(
                r#"INSERT INTO belbin_questions (test_id, text, block_number, "order")
                   VALUES ($1, $2, $3, $4)
                   RETURNING id"#,
            )
            .bind(test_id)
            .bind(&question.text)
            .bind(question.block_number)
            .bind(question.order)
            .fetch_one(&mut *tx)
            .await?;

            for answer in &question.answers {
                sqlx::query(
                    r#"INSERT INTO belbin_answers (question_id, text, role_id, score)
                       VALUES ($1, $2, $3, $4)"#,
                )
                .bind(question_id)
                .bind(&answer.text)
                .bind(answer.role_id)
                .bind(answer.score)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        tracing::info!(test_id, owner_id, "test created");
        self.get_test(test_id, owner_id).await
    }

    /// Lists the caller's tests, stamping `expired` on any past its end-date.
    pub async fn get_tests(&self, owner_id: i64) -> Result<Vec<Test>> {
        let tests = sqlx::query_as::<_, Test>(
            r#"SELECT id, title, description, is_active, status, created_at, updated_at,
                      end_date, time_limit_minutes, test_settings_id, created_by
               FROM tests WHERE created_by = $1 ORDER BY created_at DESC"#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        let now = Utc::now();
        let mut stamped = Vec::with_capacity(tests.len());
        for mut test in tests {
            if test.status != TestStatus::Expired && test.end_date.is_some_and(|end| end < now) {
                sqlx::query("UPDATE tests SET status = $1 WHERE id = $2")
                    .bind(TestStatus::Expired)
                    .bind(test.id)
                    .execute(&self.pool)
                    .await?;
                test.status = TestStatus::Expired;
            }
            stamped.push(test);
        }
        Ok(stamped)
    }

    pub async fn get_test(&self, test_id: i64, owner_id: i64) -> Result<TestDetail> {
        let test = self.owned_test(test_id, owner_id).await?;

        let settings = match test.test_settings_id {
            Some(id) => sqlx::query_as::<_, TestSettings>(
                r#"SELECT id, min_questions, belbin_block, belbin_questions_in_block, has_time_limit
                   FROM test_settings WHERE id = $1"#,
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?,
            None => None,
        };

        let loader = ReconcileService::new(self.pool.clone());
        let questions = loader
            .load_questions(test_id)
            .await?
            .into_iter()
            .map(|(q, answers)| QuestionDetail {
                id: q.id,
                test_id: q.test_id,
                text: q.text,
                question_type: q.question_type,
                order: q.order,
                points: q.points,
                answers,
            })
            .collect();
        let belbin_questions = loader
            .load_belbin_questions(test_id)
            .await?
            .into_iter()
            .map(|(q, answers)| BelbinQuestionDetail {
                id: q.id,
                test_id: q.test_id,
                text: q.text,
                block_number: q.block_number,
                order: q.order,
                answers,
            })
            .collect();

        Ok(TestDetail {
            id: test.id,
            title: test.title,
            description: test.description,
            is_active: test.is_active,
            status: test.status,
            created_at: test.created_at,
            updated_at: test.updated_at,
            end_date: test.end_date,
            time_limit_minutes: test.time_limit_minutes,
            test_settings: settings,
            questions,
            belbin_questions,
        })
    }

    pub async fn delete_test(&self, test_id: i64, owner_id: i64) -> Result<()> {
        let test = self.owned_test(test_id, owner_id).await?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM tests WHERE id = $1")
            .bind(test_id)
            .execute(&mut *tx)
            .await?;
        // Settings rows are referenced by the test, not owned by it in SQL,
        // so the cascade does not reach them.
        if let Some(settings_id) = test.test_settings_id {
            sqlx::query("DELETE FROM test_settings WHERE id = $1")
                .bind(settings_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        tracing::info!(test_id, owner_id, "test deleted");
        Ok(())
    }

    /// Pausing force-completes every in-flight attempt so nobody keeps
    /// answering a test the owner pulled; reactivating wipes all results for
    /// a clean slate.
    pub async fn change_test_status(
        &self,
        test_id: i64,
        owner_id: i64,
        new_status: TestStatus,
    ) -> Result<Test> {
        let test = self.owned_test(test_id, owner_id).await?;

        match new_status {
            TestStatus::Draft => {
                let in_flight = sqlx::query_scalar::<_, i64>(
                    r#"SELECT employee_id FROM test_results
                       WHERE test_id = $1 AND is_completed = FALSE"#,
                )
                .bind(test_id)
                .fetch_all(&self.pool)
                .await?;

                let lifecycle = LifecycleService::new(self.pool.clone());
                for employee_id in in_flight {
                    lifecycle.complete_test(test_id, employee_id).await?;
                }
            }
            TestStatus::Active => {
                let mut tx = self.pool.begin().await?;
                sqlx::query(
                    r#"DELETE FROM belbin_test_results
                       WHERE test_result_id IN (SELECT id FROM test_results WHERE test_id = $1)"#,
                )
                .bind(test_id)
                .execute(&mut *tx)
                .await?;
                sqlx::query("DELETE FROM test_results WHERE test_id = $1")
                    .bind(test_id)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;
            }
            TestStatus::Expired => {}
        }

        let updated = sqlx::query_as::<_, Test>(
            r#"UPDATE tests SET status = $1, updated_at = $2 WHERE id = $3
               RETURNING id, title, description, is_active, status, created_at, updated_at,
                         end_date, time_limit_minutes, test_settings_id, created_by"#,
        )
        .bind(new_status)
        .bind(Utc::now())
        .bind(test.id)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(test_id, owner_id, status = ?new_status, "test status changed");
        Ok(updated)
    }

    pub async fn assign_tests(&self, owner_id: i64, req: TestAssignmentRequest) -> Result<()> {
        for item in &req.assignments {
            self.owned_test(item.test_id, owner_id).await?;

            let exists = sqlx::query_scalar::<_, i64>(
                r#"SELECT COUNT(*) FROM test_assignments
                   WHERE test_id = $1 AND employee_id = $2"#,
            )
            .bind(item.test_id)
            .bind(item.employee_id)
            .fetch_one(&self.pool)
            .await?;
            if exists > 0 {
                return Err(Error::Conflict(format!(
                    "Test {} is already assigned to employee {}",
                    item.test_id, item.employee_id
                )));
            }

            sqlx::query(
                "INSERT INTO test_assignments (test_id, employee_id) VALUES ($1, $2)",
            )
            .bind(item.test_id)
            .bind(item.employee_id)
            .execute(&self.pool)
            .await?;
            tracing::info!(
                test_id = item.test_id,
                employee_id = item.employee_id,
                "test assigned"
            );
        }
        Ok(())
    }

    /// Removes assignments together with whatever the employee already
    /// answered, so a later re-assignment starts clean.
    pub async fn unassign_tests(&self, owner_id: i64, req: TestAssignmentRequest) -> Result<()> {
        for item in &req.assignments {
            self.owned_test(item.test_id, owner_id).await?;

            let mut tx = self.pool.begin().await?;

            let deleted = sqlx::query(
                "DELETE FROM test_assignments WHERE test_id = $1 AND employee_id = $2",
            )
            .bind(item.test_id)
            .bind(item.employee_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
            if deleted == 0 {
                return Err(Error::NotFound(format!(
                    "Test {} is not assigned to employee {}",
                    item.test_id, item.employee_id
                )));
            }

            sqlx::query(
                r#"DELETE FROM belbin_test_results
                   WHERE test_result_id IN (
                       SELECT id FROM test_results WHERE test_id = $1 AND employee_id = $2
                   )"#,
            )
            .bind(item.test_id)
            .bind(item.employee_id)
            .execute(&mut *tx)
            .await?;
            sqlx::query(
                r#"DELETE FROM user_answer_items
                   WHERE user_answer_id IN (
                       SELECT id FROM user_answers WHERE test_id = $1 AND employee_id = $2
                   )"#,
            )
            .bind(item.test_id)
            .bind(item.employee_id)
            .execute(&mut *tx)
            .await?;
            sqlx::query("DELETE FROM user_answers WHERE test_id = $1 AND employee_id = $2")
                .bind(item.test_id)
                .bind(item.employee_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM user_belbin_answers WHERE test_id = $1 AND employee_id = $2")
                .bind(item.test_id)
                .bind(item.employee_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM test_results WHERE test_id = $1 AND employee_id = $2")
                .bind(item.test_id)
                .bind(item.employee_id)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            tracing::info!(
                test_id = item.test_id,
                employee_id = item.employee_id,
                "test unassigned"
            );
        }
        Ok(())
    }

    /// Every non-draft test assigned to the employee, with safe question
    /// views and derived per-attempt status. Sweeps expired attempts first.
    pub async fn get_assigned_tests(&self, employee_id: i64) -> Result<Vec<SafeTest>> {
        LifecycleService::new(self.pool.clone())
            .auto_complete_expired_for_employee(employee_id)
            .await?;

        let test_ids = sqlx::query_scalar::<_, i64>(
            r#"SELECT t.id
               FROM tests t
               JOIN test_assignments ta ON ta.test_id = t.id
               WHERE ta.employee_id = $1 AND t.status <> 'draft'
               ORDER BY t.created_at DESC"#,
        )
        .bind(employee_id)
        .fetch_all(&self.pool)
        .await?;

        let mut views = Vec::with_capacity(test_ids.len());
        for test_id in test_ids {
            views.push(self.build_safe_view(test_id, employee_id).await?);
        }
        Ok(views)
    }

    pub async fn get_assigned_test(&self, test_id: i64, employee_id: i64) -> Result<SafeTest> {
        let assigned = sqlx::query_scalar::<_, i64>(
            r#"SELECT COUNT(*) FROM test_assignments WHERE test_id = $1 AND employee_id = $2"#,
        )
        .bind(test_id)
        .bind(employee_id)
        .fetch_one(&self.pool)
        .await?;
        if assigned == 0 {
            return Err(Error::NotFound("Test not found".to_string()));
        }

        LifecycleService::new(self.pool.clone())
            .auto_complete_expired_for_employee(employee_id)
            .await?;

        self.build_safe_view(test_id, employee_id).await
    }

    async fn build_safe_view(&self, test_id: i64, employee_id: i64) -> Result<SafeTest> {
        let lifecycle = LifecycleService::new(self.pool.clone());
        let test = lifecycle.get_test(test_id).await?;
        if test.status == TestStatus::Draft {
            return Err(Error::NotFound("Test not found".to_string()));
        }
        let result = lifecycle.get_result(test_id, employee_id).await?;
        let status = lifecycle_service::derive_status(&test, result.as_ref(), Utc::now());

        let loader = ReconcileService::new(self.pool.clone());
        let questions = loader.load_questions(test_id).await?;
        let belbin_questions = loader.load_belbin_questions(test_id).await?;

        let text_responses: HashMap<i64, Option<String>> =
            sqlx::query_as::<_, (i64, Option<String>)>(
                r#"SELECT question_id, text_response FROM user_answers
                   WHERE test_id = $1 AND employee_id = $2"#,
            )
            .bind(test_id)
            .bind(employee_id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .collect();

        let mut selections: HashMap<i64, HashSet<i64>> = HashMap::new();
        let item_rows = sqlx::query_as::<_, (i64, i64)>(
            r#"SELECT ua.question_id, uai.answer_id
               FROM user_answer_items uai
               JOIN user_answers ua ON ua.id = uai.user_answer_id
               WHERE ua.test_id = $1 AND ua.employee_id = $2"#,
        )
        .bind(test_id)
        .bind(employee_id)
        .fetch_all(&self.pool)
        .await?;
        for (question_id, answer_id) in item_rows {
            selections.entry(question_id).or_default().insert(answer_id);
        }

        let mut belbin_scores: HashMap<i64, i32> = HashMap::new();
        let belbin_rows = sqlx::query_as::<_, (i64, Option<i32>)>(
            r#"SELECT answer_id, score FROM user_belbin_answers
               WHERE test_id = $1 AND employee_id = $2"#,
        )
        .bind(test_id)
        .bind(employee_id)
        .fetch_all(&self.pool)
        .await?;
        for (answer_id, score) in belbin_rows {
            belbin_scores.insert(answer_id, score.unwrap_or(0));
        }

        let safe_questions = questions
            .into_iter()
            .map(|(question, answers)| {
                let selected = selections.get(&question.id);
                let is_text = question.question_type == QuestionType::TextAnswer;
                let mut safe_answers: Vec<SafeAnswer> = answers
                    .into_iter()
                    .map(|a| SafeAnswer {
                        id: Some(a.id),
                        question_id: a.question_id,
                        // The stored options of a text question are its
                        // expected answers; never reveal them.
                        text: if is_text { String::new() } else { a.text },
                        is_user_answer: selected.is_some_and(|s| s.contains(&a.id)),
                    })
                    .collect();
                if is_text {
                    if let Some(Some(text)) = text_responses.get(&question.id) {
                        safe_answers.push(SafeAnswer {
                            id: None,
                            question_id: question.id,
                            text: text.clone(),
                            is_user_answer: true,
                        });
                    }
                }
                SafeQuestion {
                    id: question.id,
                    test_id: question.test_id,
                    text: question.text,
                    question_type: question.question_type,
                    order: question.order,
                    answers: safe_answers,
                }
            })
            .collect();

        let safe_belbin = belbin_questions
            .into_iter()
            .map(|(question, answers)| SafeBelbinQuestion {
                id: question.id,
                test_id: question.test_id,
                text: question.text,
                block_number: question.block_number,
                order: question.order,
                answers: answers
                    .into_iter()
                    .map(|a| SafeBelbinAnswer {
                        id: a.id,
                        question_id: a.question_id,
                        text: a.text,
                        user_score: belbin_scores.get(&a.id).copied(),
                    })
                    .collect(),
            })
            .collect();

        Ok(SafeTest {
            id: test.id,
            title: test.title,
            description: test.description,
            is_active: test.is_active,
            created_at: test.created_at,
            updated_at: test.updated_at,
            end_date: test.end_date,
            time_limit_minutes: test.time_limit_minutes,
            status,
            questions: safe_questions,
            belbin_questions: safe_belbin,
        })
    }

    /// Completed attempts for one owned test, with employee names and Belbin
    /// role totals. Sweeps expired attempts first so overdue ones show up.
    pub async fn get_test_results(
        &self,
        test_id: i64,
        owner_id: i64,
    ) -> Result<Vec<TestResultView>> {
        let test = self.owned_test(test_id, owner_id).await?;

        LifecycleService::new(self.pool.clone())
            .auto_complete_expired_for_test(test_id)
            .await?;

        let rows = sqlx::query_as::<_, ResultRow>(
            r#"SELECT tr.id, tr.test_id, tr.employee_id, tr.is_completed, tr.started_at,
                      tr.completed_at, tr.score, tr.max_score, tr.percent,
                      e.last_name, e.first_name, e.middle_name
               FROM test_results tr
               JOIN employees e ON e.id = tr.employee_id
               WHERE tr.test_id = $1 AND tr.is_completed = TRUE
               ORDER BY tr.completed_at"#,
        )
        .bind(test_id)
        .fetch_all(&self.pool)
        .await?;

        let mut views = Vec::with_capacity(rows.len());
        for row in rows {
            let belbin_results = sqlx::query_as::<_, (i64, Option<String>, f64)>(
                r#"SELECT btr.role_id, br.name, btr.total_score
                   FROM belbin_test_results btr
                   LEFT JOIN belbin_roles br ON br.id = btr.role_id
                   WHERE btr.test_result_id = $1
                   ORDER BY btr.role_id"#,
            )
            .bind(row.id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|(role_id, role_name, total_score)| BelbinRoleTotal {
                role_id,
                role_name,
                total_score,
            })
            .collect();

            views.push(TestResultView {
                id: row.id,
                test_id: row.test_id,
                employee_id: row.employee_id,
                employee_name: row.full_name(),
                is_completed: row.is_completed,
                started_at: row.started_at,
                completed_at: row.completed_at,
                score: row.score,
                max_score: row.max_score,
                percent: row.percent,
                time_limit_minutes: test.time_limit_minutes,
                belbin_results,
            });
        }
        Ok(views)
    }
}

#[derive(sqlx::FromRow)]
struct ResultRow {
    id: i64,
    test_id: i64,
    employee_id: i64,
    is_completed: bool,
    started_at: chrono::DateTime<Utc>,
    completed_at: Option<chrono::DateTime<Utc>>,
    score: Option<i32>,
    max_score: Option<i32>,
    percent: Option<f64>,
    last_name: Option<String>,
    first_name: Option<String>,
    middle_name: Option<String>,
}

impl ResultRow {
    fn full_name(&self) -> Option<String> {
        let parts: Vec<&str> = [&self.last_name, &self.first_name, &self.middle_name]
            .into_iter()
            .flatten()
            .map(|s| s.as_str())
            .filter(|s| !s.is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}
