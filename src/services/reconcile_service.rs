use crate::dto::test_dto::{
    AnswerPayload, BelbinAnswerPayload, BelbinQuestionPayload, QuestionPayload, TestPayload,
};
use crate::error::{Error, Result};
use crate::models::belbin::{BelbinAnswer, BelbinQuestion};
use crate::models::question::{Answer, Question};
use crate::models::test::Test;
use chrono::Utc;
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};

/// True when the stored answer set and the incoming one differ semantically:
/// different cardinality, or any answer (matched by id where present, else by
/// text) differing in text or correctness.
pub fn answers_changed(old: &[Answer], new: &[AnswerPayload]) -> bool {
    if old.len() != new.len() {
        return true;
    }
    let old_by_id: HashMap<i64, &Answer> = old.iter().map(|a| (a.id, a)).collect();
    for incoming in new {
        match incoming.id {
            Some(id) => match old_by_id.get(&id) {
                Some(stored) => {
                    if stored.text != incoming.text || stored.is_correct != incoming.is_correct {
                        return true;
                    }
                }
                None => return true,
            },
            None => {
                let matched = old
                    .iter()
                    .any(|a| a.text == incoming.text && a.is_correct == incoming.is_correct);
                if !matched {
                    return true;
                }
            }
        }
    }
    false
}

/// Belbin variant: options carry no correctness flag, so only text matters.
pub fn belbin_answers_changed(old: &[BelbinAnswer], new: &[BelbinAnswerPayload]) -> bool {
    if old.len() != new.len() {
        return true;
    }
    let old_by_id: HashMap<i64, &BelbinAnswer> = old.iter().map(|a| (a.id, a)).collect();
    for incoming in new {
        match incoming.id {
            Some(id) => match old_by_id.get(&id) {
                Some(stored) => {
                    if stored.text != incoming.text {
                        return true;
                    }
                }
                None => return true,
            },
            None => {
                if !old.iter().any(|a| a.text == incoming.text) {
                    return true;
                }
            }
        }
    }
    false
}

#[derive(Debug, Default, Clone)]
pub struct QuestionDiff {
    /// Ids present on both sides whose content changed.
    pub changed: HashSet<i64>,
    /// Ids present in storage but absent from the incoming definition.
    pub removed: HashSet<i64>,
}

impl QuestionDiff {
    /// Every id whose collected answers must be purged.
    pub fn purge_ids(&self) -> HashSet<i64> {
        self.changed.union(&self.removed).copied().collect()
    }

    pub fn invalidates_results(&self) -> bool {
        !self.changed.is_empty() || !self.removed.is_empty()
    }
}

pub fn diff_questions(
    stored: &[(Question, Vec<Answer>)],
    incoming: &[QuestionPayload],
) -> QuestionDiff {
    let mut diff = QuestionDiff::default();
    let stored_by_id: HashMap<i64, &(Question, Vec<Answer>)> =
        stored.iter().map(|entry| (entry.0.id, entry)).collect();

    let mut incoming_ids = HashSet::new();
    for payload in incoming {
        let Some(id) = payload.id else { continue };
        incoming_ids.insert(id);
        if let Some((question, answers)) = stored_by_id.get(&id) {
            // A type change invalidates collected answers just like a text
            // change does.
            if question.text != payload.text
                || question.question_type != payload.question_type
                || answers_changed(answers, &payload.answers)
            {
                diff.changed.insert(id);
            }
        }
    }

    for (question, _) in stored {
        if !incoming_ids.contains(&question.id) {
            diff.removed.insert(question.id);
        }
    }
    diff
}

pub fn diff_belbin_questions(
    stored: &[(BelbinQuestion, Vec<BelbinAnswer>)],
    incoming: &[BelbinQuestionPayload],
) -> QuestionDiff {
    let mut diff = QuestionDiff::default();
    let stored_by_id: HashMap<i64, &(BelbinQuestion, Vec<BelbinAnswer>)> =
        stored.iter().map(|entry| (entry.0.id, entry)).collect();

    let mut incoming_ids = HashSet::new();
    for payload in incoming {
        let Some(id) = payload.id else { continue };
        incoming_ids.insert(id);
        if let Some((question, answers)) = stored_by_id.get(&id) {
            if question.text != payload.text || belbin_answers_changed(answers, &payload.answers) {
                diff.changed.insert(id);
            }
        }
    }

    for (question, _) in stored {
        if !incoming_ids.contains(&question.id) {
            diff.removed.insert(question.id);
        }
    }
    diff
}

#[derive(Clone)]
pub struct ReconcileService {
    pool: PgPool,
}

impl ReconcileService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Merges an edited definition into the stored test, purging exactly the
    /// answers invalidated by the edit. One transaction; any failure leaves
    /// the stored definition untouched.
    pub async fn apply_update(
        &self,
        test_id: i64,
        owner_id: i64,
        payload: TestPayload,
    ) -> Result<Test> {
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

        let stored_questions = self.load_questions(test_id).await?;
        let stored_belbin = self.load_belbin_questions(test_id).await?;

        let question_diff = diff_questions(&stored_questions, &payload.questions);
        let belbin_diff = diff_belbin_questions(&stored_belbin, &payload.belbin_questions);

        let mut tx = self.pool.begin().await?;

        self.purge_stale_answers(&mut tx, test_id, &question_diff, &belbin_diff)
            .await?;

        if question_diff.invalidates_results() || belbin_diff.invalidates_results() {
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
            tracing::info!(test_id, "test results wiped after definition change");
        }

        let settings_id = self
            .apply_settings(&mut tx, &test, payload.test_settings.as_ref())
            .await?;

        self.apply_questions(&mut tx, test_id, &stored_questions, &payload.questions)
            .await?;
        self.apply_belbin_questions(&mut tx, test_id, &stored_belbin, &payload.belbin_questions)
            .await?;

        // A still-open test whose deadline moved must be explicitly
        // reactivated by its owner.
        let now = Utc::now();
        let mut status = test.status;
        if let Some(new_end) = payload.end_date {
            if Some(new_end) != test.end_date && new_end > now {
                status = crate::models::test::TestStatus::Draft;
            }
        }

        let mut time_limit = payload.time_limit_minutes;
        if let Some(settings) = &payload.test_settings {
            if !settings.has_time_limit {
                time_limit = None;
            }
        }

        let updated = sqlx::query_as::<_, Test>(
            r#"UPDATE tests
               SET title = $1, description = $2, is_active = $3, end_date = $4,
                   time_limit_minutes = $5, status = $6, test_settings_id = $7, updated_at = $8
               WHERE id = $9
               RETURNING id, title, description, is_active, status, created_at, updated_at,
                         end_date, time_limit_minutes, test_settings_id, created_by"#,
        )
        .bind(&payload.title)
        .bind(&payload.description)
        .bind(payload.is_active)
        .bind(payload.end_date)
        .bind(time_limit)
        .bind(status)
        .bind(settings_id)
        .bind(now)
        .bind(test_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    pub async fn load_questions(&self, test_id: i64) -> Result<Vec<(Question, Vec<Answer>)>> {
        let questions = sqlx::query_as::<_, Question>(
            r#"SELECT id, test_id, text, question_type, "order", points
               FROM questions WHERE test_id = $1 ORDER BY "order", id"#,
        )
        .bind(test_id)
        .fetch_all(&self.pool)
        .await?;

        let answers = sqlx::query_as::<_, Answer>(
            r#"SELECT a.id, a.question_id, a.text, a.is_correct
               FROM answers a JOIN questions q ON q.id = a.question_id
               WHERE q.test_id = $1 ORDER BY a.id"#,
        )
        .bind(test_id)
        .fetch_all(&self.pool)
        .await?;

        let mut by_question: HashMap<i64, Vec<Answer>> = HashMap::new();
        for answer in answers {
            by_question.entry(answer.question_id).or_default().push(answer);
        }
        Ok(questions
            .into_iter()
            .map(|q| {
                let answers = by_question.remove(&q.id).unwrap_or_default();
                (q, answers)
            })
            .collect())
    }

    pub async fn load_belbin_questions(
        &self,
        test_id: i64,
    ) -> Result<Vec<(BelbinQuestion, Vec<BelbinAnswer>)>> {
        let questions = sqlx::query_as::<_, BelbinQuestion>(
            r#"SELECT id, test_id, text, block_number, "order"
               FROM belbin_questions WHERE test_id = $1 ORDER BY "order", id"#,
        )
        .bind(test_id)
        .fetch_all(&self.pool)
        .await?;

        let answers = sqlx::query_as::<_, BelbinAnswer>(
            r#"SELECT a.id, a.question_id, a.text, a.role_id, a.score
               FROM belbin_answers a JOIN belbin_questions q ON q.id = a.question_id
               WHERE q.test_id = $1 ORDER BY a.id"#,
        )
        .bind(test_id)
        .fetch_all(&self.pool)
        .await?;

        let mut by_question: HashMap<i64, Vec<BelbinAnswer>> = HashMap::new();
        for answer in answers {
            by_question.entry(answer.question_id).or_default().push(answer);
        }
        Ok(questions
            .into_iter()
            .map(|q| {
                let answers = by_question.remove(&q.id).unwrap_or_default();
                (q, answers)
            })
            .collect())
    }

    /// Deletes every employee's answers to changed or removed questions.
    async fn purge_stale_answers(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        test_id: i64,
        question_diff: &QuestionDiff,
        belbin_diff: &QuestionDiff,
    ) -> Result<()> {
        let purge: Vec<i64> = question_diff.purge_ids().into_iter().collect();
        if !purge.is_empty() {
            sqlx::query(
                r#"DELETE FROM user_answer_items
                   WHERE user_answer_id IN (
                       SELECT id FROM user_answers
                       WHERE test_id = $1 AND question_id = ANY($2)
                   )"#,
            )
            .bind(test_id)
            .bind(&purge)
            .execute(&mut **tx)
            .await?;

            sqlx::query("DELETE FROM user_answers WHERE test_id = $1 AND question_id = ANY($2)")
                .bind(test_id)
                .bind(&purge)
                .execute(&mut **tx)
                .await?;
        }

        let belbin_purge: Vec<i64> = belbin_diff.purge_ids().into_iter().collect();
        if !belbin_purge.is_empty() {
            sqlx::query(
                "DELETE FROM user_belbin_answers WHERE test_id = $1 AND question_id = ANY($2)",
            )
            .bind(test_id)
            .bind(&belbin_purge)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn apply_settings(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        test: &Test,
        settings: Option<&crate::dto::test_dto::TestSettingsPayload>,
    ) -> Result<Option<i64>> {
        let Some(settings) = settings else {
            return Ok(test.test_settings_id);
        };

        match test.test_settings_id {
            Some(id) => {
                sqlx::query(
                    r#"UPDATE test_settings
                       SET min_questions = $1, belbin_block = $2,
                           belbin_questions_in_block = $3, has_time_limit = $4
                       WHERE id = $5"#,
                )
                .bind(settings.min_questions)
                .bind(settings.belbin_block)
                .bind(settings.belbin_questions_in_block)
                .bind(settings.has_time_limit)
                .bind(id)
                .execute(&mut **tx)
                .await?;
                Ok(Some(id))
            }
            None => {
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
                .fetch_one(&mut **tx)
                .await?;
                Ok(Some(id))
            }
        }
    }

    async fn apply_questions(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        test_id: i64,
        stored: &[(Question, Vec<Answer>)],
        incoming: &[QuestionPayload],
    ) -> Result<()> {
        let stored_ids: HashSet<i64> = stored.iter().map(|(q, _)| q.id).collect();
        let mut kept_ids = HashSet::new();

        for payload in incoming {
            match payload.id.filter(|id| stored_ids.contains(id)) {
                Some(id) => {
                    kept_ids.insert(id);
                    sqlx::query(
                        r#"UPDATE questions
                           SET text = $1, question_type = $2, "order" = $3, points = $4
                           WHERE id = $5"#,
                    )
                    .bind(&payload.text)
                    .bind(payload.question_type)
                    .bind(payload.order)
                    .bind(payload.points)
                    .bind(id)
                    .execute(&mut **tx)
                    .await?;

                    let stored_answers = stored
                        .iter()
                        .find(|(q, _)| q.id == id)
                        .map(|(_, a)| a.as_slice())
                        .unwrap_or(&[]);
                    self.apply_answers(tx, id, stored_answers, &payload.answers)
                        .await?;
                }
                None => {
                    let question_id = sqlx::query_scalar::<_, i64>(
                        r#"INSERT INTO questions (test_id, text, question_type, "order", points)
                           VALUES ($1, $2, $3, $4, $5)
                           RETURNING id"#,
                    )
                    .bind(test_id)
                    .bind(&payload.text)
                    .bind(payload.question_type)
                    .bind(payload.order)
                    .bind(payload.points)
                    .fetch_one(&mut **tx)
                    .await?;

                    for answer in &payload.answers {
                        sqlx::query(
                            "INSERT INTO answers (question_id, text, is_correct) VALUES ($1, $2, $3)",
                        )
                        .bind(question_id)
                        .bind(&answer.text)
                        .bind(answer.is_correct)
                        .execute(&mut **tx)
                        .await?;
                    }
                }
            }
        }

        for id in stored_ids.difference(&kept_ids) {
            sqlx::query("DELETE FROM answers WHERE question_id = $1")
                .bind(id)
                .execute(&mut **tx)
                .await?;
            sqlx::query("DELETE FROM questions WHERE id = $1")
                .bind(id)
                .execute(&mut **tx)
                .await?;
        }
        Ok(())
    }

    /// Regular answers are reconciled in place: matched ids updated, new
    /// entries appended, stored entries missing from the payload dropped.
    async fn apply_answers(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        question_id: i64,
        stored: &[Answer],
        incoming: &[AnswerPayload],
    ) -> Result<()> {
        let stored_ids: HashSet<i64> = stored.iter().map(|a| a.id).collect();
        let mut kept_ids = HashSet::new();

        for answer in incoming {
            match answer.id.filter(|id| stored_ids.contains(id)) {
                Some(id) => {
                    kept_ids.insert(id);
                    sqlx::query("UPDATE answers SET text = $1, is_correct = $2 WHERE id = $3")
                        .bind(&answer.text)
                        .bind(answer.is_correct)
                        .bind(id)
                        .execute(&mut **tx)
                        .await?;
                }
                None => {
                    sqlx::query(
                        "INSERT INTO answers (question_id, text, is_correct) VALUES ($1, $2, $3)",
                    )
                    .bind(question_id)
                    .bind(&answer.text)
                    .bind(answer.is_correct)
                    .execute(&mut **tx)
                    .await?;
                }
            }
        }

        for id in stored_ids.difference(&kept_ids) {
            sqlx::query("DELETE FROM answers WHERE id = $1")
                .bind(id)
                .execute(&mut **tx)
                .await?;
        }
        Ok(())
    }

    /// Belbin answer collections are replaced wholesale rather than diffed.
    async fn apply_belbin_questions(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        test_id: i64,
        stored: &[(BelbinQuestion, Vec<BelbinAnswer>)],
        incoming: &[BelbinQuestionPayload],
    ) -> Result<()> {
        let stored_ids: HashSet<i64> = stored.iter().map(|(q, _)| q.id).collect();
        let mut kept_ids = HashSet::new();

        for payload in incoming {
            let question_id = match payload.id.filter(|id| stored_ids.contains(id)) {
                Some(id) => {
                    kept_ids.insert(id);
                    sqlx::query(
                        r#"UPDATE belbin_questions
                           SET text = $1, block_number = $2, "order" = $3
                           WHERE id = $4"#,
                    )
                    .bind(&payload.text)
                    .bind(payload.block_number)
                    .bind(payload.order)
                    .bind(id)
                    .execute(&mut **tx)
                    .await?;

                    sqlx::query("DELETE FROM belbin_answers WHERE question_id = $1")
                        .bind(id)
                        .execute(&mut **tx)
                        .await?;
                    id
                }
                None => {
                    sqlx::query_scalar::<_, i64>(
                        r#"INSERT INTO belbin_questions (test_id, text, block_number, "order")
                           VALUES ($1, $2, $3, $4)
                           RETURNING id"#,
                    )
                    .bind(test_id)
                    .bind(&payload.text)
                    .bind(payload.block_number)
                    .bind(payload.order)
                    .fetch_one(&mut **tx)
                    .await?
                }
            };

            for answer in &payload.answers {
                sqlx::query(
                    r#"INSERT INTO belbin_answers (question_id, text, role_id, score)
                       VALUES ($1, $2, $3, $4)"#,
                )
                .bind(question_id)
                .bind(&answer.text)
                .bind(answer.role_id)
                .bind(answer.score)
                .execute(&mut **tx)
                .await?;
            }
        }

        for id in stored_ids.difference(&kept_ids) {
            sqlx::query("DELETE FROM belbin_answers WHERE question_id = $1")
                .bind(id)
                .execute(&mut **tx)
                .await?;
            sqlx::query("DELETE FROM belbin_questions WHERE id = $1")
                .bind(id)
                .execute(&mut **tx)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::QuestionType;

    fn stored_answer(id: i64, text: &str, is_correct: bool) -> Answer {
        Answer {
            id,
            question_id: 1,
            text: text.to_string(),
            is_correct,
        }
    }

    fn incoming_answer(id: Option<i64>, text: &str, is_correct: bool) -> AnswerPayload {
        AnswerPayload {
            id,
            text: text.to_string(),
            is_correct,
        }
    }

    fn stored_question(id: i64, text: &str, answers: Vec<Answer>) -> (Question, Vec<Answer>) {
        (
            Question {
                id,
                test_id: 1,
                text: text.to_string(),
                question_type: QuestionType::SingleChoice,
                order: id as i32,
                points: 1,
            },
            answers,
        )
    }

    fn incoming_question(id: Option<i64>, text: &str, answers: Vec<AnswerPayload>) -> QuestionPayload {
        QuestionPayload {
            id,
            text: text.to_string(),
            question_type: QuestionType::SingleChoice,
            order: 0,
            points: 1,
            answers,
        }
    }

    #[test]
    fn identical_answer_sets_are_unchanged() {
        let old = vec![stored_answer(1, "a", true), stored_answer(2, "b", false)];
        let new = vec![
            incoming_answer(Some(1), "a", true),
            incoming_answer(Some(2), "b", false),
        ];
        assert!(!answers_changed(&old, &new));
    }

    #[test]
    fn cardinality_change_is_a_change() {
        let old = vec![stored_answer(1, "a", true)];
        let new = vec![
            incoming_answer(Some(1), "a", true),
            incoming_answer(None, "b", false),
        ];
        assert!(answers_changed(&old, &new));
    }

    #[test]
    fn flipping_correctness_is_a_change() {
        let old = vec![stored_answer(1, "a", true)];
        let new = vec![incoming_answer(Some(1), "a", false)];
        assert!(answers_changed(&old, &new));
    }

    #[test]
    fn idless_answers_match_by_text() {
        let old = vec![stored_answer(1, "a", true)];
        assert!(!answers_changed(&old, &[incoming_answer(None, "a", true)]));
        assert!(answers_changed(&old, &[incoming_answer(None, "z", true)]));
    }

    #[test]
    fn belbin_answers_ignore_correctness() {
        let old = vec![BelbinAnswer {
            id: 1,
            question_id: 1,
            text: "a".to_string(),
            role_id: Some(7),
            score: Some(3),
        }];
        let same = vec![BelbinAnswerPayload {
            id: Some(1),
            text: "a".to_string(),
            role_id: Some(9),
            score: None,
        }];
        assert!(!belbin_answers_changed(&old, &same));

        let renamed = vec![BelbinAnswerPayload {
            id: Some(1),
            text: "b".to_string(),
            role_id: Some(7),
            score: Some(3),
        }];
        assert!(belbin_answers_changed(&old, &renamed));
    }

    #[test]
    fn text_edit_marks_question_changed() {
        let stored = vec![stored_question(1, "old", vec![stored_answer(1, "a", true)])];
        let incoming = vec![incoming_question(
            Some(1),
            "new",
            vec![incoming_answer(Some(1), "a", true)],
        )];
        let diff = diff_questions(&stored, &incoming);
        assert!(diff.changed.contains(&1));
        assert!(diff.removed.is_empty());
        assert!(diff.invalidates_results());
    }

    #[test]
    fn untouched_question_produces_no_diff() {
        let stored = vec![stored_question(1, "q", vec![stored_answer(1, "a", true)])];
        let incoming = vec![incoming_question(
            Some(1),
            "q",
            vec![incoming_answer(Some(1), "a", true)],
        )];
        let diff = diff_questions(&stored, &incoming);
        assert!(!diff.invalidates_results());
    }

    #[test]
    fn missing_id_counts_as_removed() {
        let stored = vec![
            stored_question(1, "q1", vec![]),
            stored_question(2, "q2", vec![]),
        ];
        let incoming = vec![incoming_question(Some(1), "q1", vec![])];
        let diff = diff_questions(&stored, &incoming);
        assert_eq!(diff.removed, [2].into_iter().collect());
        assert!(diff.purge_ids().contains(&2));
    }

    #[test]
    fn brand_new_question_does_not_invalidate_results() {
        let stored = vec![stored_question(1, "q1", vec![])];
        let incoming = vec![
            incoming_question(Some(1), "q1", vec![]),
            incoming_question(None, "fresh", vec![]),
        ];
        let diff = diff_questions(&stored, &incoming);
        assert!(!diff.invalidates_results());
    }

    #[test]
    fn type_change_marks_question_changed() {
        let stored = vec![stored_question(1, "q", vec![])];
        let mut payload = incoming_question(Some(1), "q", vec![]);
        payload.question_type = QuestionType::MultipleChoice;
        let diff = diff_questions(&stored, &[payload]);
        assert!(diff.changed.contains(&1));
    }
}
