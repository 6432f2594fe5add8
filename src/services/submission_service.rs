use crate::dto::test_dto::SubmitAnswerRequest;
use crate::error::{Error, Result};
use crate::models::belbin::BelbinAnswer;
use crate::models::question::QuestionType;
use crate::models::test::Test;
use crate::services::lifecycle_service::{self, LifecycleService};
use chrono::Utc;
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};

/// Structured Belbin payload: a JSON array of `[answer_id, score]` pairs
/// carried in the text field.
pub fn parse_belbin_pairs(text: &str) -> Result<Vec<(i64, i32)>> {
    serde_json::from_str::<Vec<(i64, i32)>>(text)
        .map_err(|_| Error::BadRequest("Invalid text_response format".to_string()))
}

/// Single-choice questions take exactly one selection; anything more is
/// rejected before it reaches storage or the scoring engine.
pub fn check_selection_arity(question_type: QuestionType, selected: usize) -> Result<()> {
    if question_type == QuestionType::SingleChoice && selected > 1 {
        return Err(Error::BadRequest(
            "Single choice questions accept exactly one answer".to_string(),
        ));
    }
    Ok(())
}

#[derive(Clone)]
pub struct SubmissionService {
    pool: PgPool,
}

impl SubmissionService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Stores one answer for one question of an in-progress attempt,
    /// replacing whatever the employee previously submitted for it.
    pub async fn submit_answer(&self, employee_id: i64, req: SubmitAnswerRequest) -> Result<()> {
        let test = sqlx::query_as::<_, Test>(
            r#"SELECT id, title, description, is_active, status, created_at, updated_at,
                      end_date, time_limit_minutes, test_settings_id, created_by
               FROM tests WHERE id = $1 AND is_active = TRUE"#,
        )
        .bind(req.test_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::BadRequest("Test not available".to_string()))?;

        let result = LifecycleService::new(self.pool.clone())
            .get_result(req.test_id, employee_id)
            .await?;
        lifecycle_service::check_availability(&test, result.as_ref(), Utc::now())?;

        if req.question_type.is_standard() {
            self.save_standard_answer(employee_id, &req).await
        } else {
            self.save_belbin_answer(employee_id, &req).await
        }
    }

    async fn save_standard_answer(
        &self,
        employee_id: i64,
        req: &SubmitAnswerRequest,
    ) -> Result<()> {
        check_selection_arity(req.question_type, req.answer_ids.len())?;

        // The type tag must match the stored question; a Belbin answer id
        // cross-submitted against a regular question must not resolve.
        let question_id = sqlx::query_scalar::<_, i64>(
            r#"SELECT id FROM questions
               WHERE id = $1 AND test_id = $2 AND question_type = $3"#,
        )
        .bind(req.question_id)
        .bind(req.test_id)
        .bind(req.question_type)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| {
            Error::NotFound(format!(
                "Question of type '{}' not found in this test",
                req.question_type.as_str()
            ))
        })?;

        let valid_ids: HashSet<i64> = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM answers WHERE question_id = $1",
        )
        .bind(question_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .collect();

        for answer_id in &req.answer_ids {
            if !valid_ids.contains(answer_id) {
                return Err(Error::BadRequest(format!(
                    "Answer ID {} doesn't belong to this question",
                    answer_id
                )));
            }
        }

        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_scalar::<_, i64>(
            r#"SELECT id FROM user_answers
               WHERE test_id = $1 AND employee_id = $2 AND question_id = $3"#,
        )
        .bind(req.test_id)
        .bind(employee_id)
        .bind(question_id)
        .fetch_optional(&mut *tx)
        .await?;

        let user_answer_id = match existing {
            Some(id) => {
                sqlx::query("DELETE FROM user_answer_items WHERE user_answer_id = $1")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query("UPDATE user_answers SET text_response = $1 WHERE id = $2")
                    .bind(&req.text_response)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                id
            }
            None => {
                sqlx::query_scalar::<_, i64>(
                    r#"INSERT INTO user_answers (test_id, employee_id, question_id, text_response)
                       VALUES ($1, $2, $3, $4)
                       RETURNING id"#,
                )
                .bind(req.test_id)
                .bind(employee_id)
                .bind(question_id)
                .bind(&req.text_response)
                .fetch_one(&mut *tx)
                .await?
            }
        };

        for answer_id in &req.answer_ids {
            sqlx::query(
                "INSERT INTO user_answer_items (user_answer_id, answer_id) VALUES ($1, $2)",
            )
            .bind(user_answer_id)
            .bind(answer_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn save_belbin_answer(&self, employee_id: i64, req: &SubmitAnswerRequest) -> Result<()> {
        let question_id = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM belbin_questions WHERE id = $1 AND test_id = $2",
        )
        .bind(req.question_id)
        .bind(req.test_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Belbin question not found in this test".to_string()))?;

        let options: HashMap<i64, BelbinAnswer> = sqlx::query_as::<_, BelbinAnswer>(
            "SELECT id, question_id, text, role_id, score FROM belbin_answers WHERE question_id = $1",
        )
        .bind(question_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|a| (a.id, a))
        .collect();

        // (answer_id, submitted or option-default score)
        let entries: Vec<(i64, Option<i32>)> = if req.answer_ids.is_empty() {
            let text = req.text_response.as_deref().ok_or_else(|| {
                Error::BadRequest("Invalid text_response format".to_string())
            })?;
            parse_belbin_pairs(text)?
                .into_iter()
                .map(|(id, score)| (id, Some(score)))
                .collect()
        } else {
            req.answer_ids
                .iter()
                .map(|id| (*id, options.get(id).and_then(|a| a.score)))
                .collect()
        };

        for (answer_id, _) in &entries {
            if !options.contains_key(answer_id) {
                return Err(Error::BadRequest(format!(
                    "Invalid Belbin answer id {}",
                    answer_id
                )));
            }
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"DELETE FROM user_belbin_answers
               WHERE test_id = $1 AND employee_id = $2 AND question_id = $3"#,
        )
        .bind(req.test_id)
        .bind(employee_id)
        .bind(question_id)
        .execute(&mut *tx)
        .await?;

        for (answer_id, score) in &entries {
            sqlx::query(
                r#"INSERT INTO user_belbin_answers (test_id, employee_id, question_id, answer_id, score)
                   VALUES ($1, $2, $3, $4, $5)"#,
            )
            .bind(req.test_id)
            .bind(employee_id)
            .bind(question_id)
            .bind(answer_id)
            .bind(score)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn belbin_pairs_parse_from_json_arrays() {
        let pairs = parse_belbin_pairs("[[12, 4], [15, 6]]").unwrap();
        assert_eq!(pairs, vec![(12, 4), (15, 6)]);
    }

    #[test]
    fn belbin_pairs_reject_malformed_payloads() {
        assert!(parse_belbin_pairs("not json").is_err());
        assert!(parse_belbin_pairs(r#"{"12": 4}"#).is_err());
        assert!(parse_belbin_pairs("[[1]]").is_err());
    }

    #[test]
    fn belbin_pairs_accept_the_empty_list() {
        assert_eq!(parse_belbin_pairs("[]").unwrap(), Vec::new());
    }

    #[test]
    fn single_choice_submissions_are_limited_to_one_selection() {
        assert!(check_selection_arity(QuestionType::SingleChoice, 0).is_ok());
        assert!(check_selection_arity(QuestionType::SingleChoice, 1).is_ok());
        assert!(check_selection_arity(QuestionType::SingleChoice, 3).is_err());

        // multi-select stays unrestricted
        assert!(check_selection_arity(QuestionType::MultipleChoice, 3).is_ok());
        assert!(check_selection_arity(QuestionType::TextAnswer, 0).is_ok());
    }
}
