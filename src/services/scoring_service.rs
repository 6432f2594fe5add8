use crate::error::{Error, Result};
use crate::models::question::{Answer, Question, QuestionType};
use sqlx::PgPool;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Objective score for the standard question types of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScoreTally {
    pub score: i32,
    pub max_score: i32,
}

impl ScoreTally {
    /// `None` when nothing scorable contributed to the tally.
    pub fn percent(&self) -> Option<f64> {
        if self.max_score > 0 {
            Some(self.score as f64 / self.max_score as f64 * 100.0)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoleTotal {
    pub role_id: i64,
    pub total_score: f64,
}

/// What one employee submitted for the standard questions of one test.
#[derive(Debug, Default)]
pub struct SubmittedAnswers {
    /// question id -> selected answer ids
    pub selections: HashMap<i64, HashSet<i64>>,
    /// question id -> free-text response
    pub text_responses: HashMap<i64, String>,
}

/// Scores every standard question of the test. Belbin questions are excluded;
/// they are aggregated separately by [`tally_belbin`].
pub fn tally_standard(
    questions: &[Question],
    answers_by_question: &HashMap<i64, Vec<Answer>>,
    submitted: &SubmittedAnswers,
) -> ScoreTally {
    let mut tally = ScoreTally::default();
    let empty: Vec<Answer> = Vec::new();

    for question in questions {
        let points = question.points;
        let answers = answers_by_question.get(&question.id).unwrap_or(&empty);

        match question.question_type {
            QuestionType::SingleChoice => {
                tally.max_score += points;
                // Exactly one selection; shotgunning every option earns
                // nothing.
                if let Some(selected) = submitted.selections.get(&question.id) {
                    if selected.len() == 1 {
                        let correct = selected.iter().any(|id| {
                            answers.iter().any(|a| a.id == *id && a.is_correct)
                        });
                        if correct {
                            tally.score += points;
                        }
                    }
                }
            }
            QuestionType::MultipleChoice => {
                let correct_ids: HashSet<i64> = answers
                    .iter()
                    .filter(|a| a.is_correct)
                    .map(|a| a.id)
                    .collect();
                // A choice question with no correct answer is ill-defined and
                // contributes nothing either way.
                if correct_ids.is_empty() {
                    continue;
                }
                tally.max_score += points;
                if let Some(selected) = submitted.selections.get(&question.id) {
                    if *selected == correct_ids {
                        tally.score += points;
                    }
                }
            }
            QuestionType::TextAnswer => {
                tally.max_score += points;
                if let Some(text) = submitted.text_responses.get(&question.id) {
                    let user_text = text.trim().to_lowercase();
                    let matched = answers
                        .iter()
                        .filter(|a| a.is_correct)
                        .any(|a| a.text.trim().to_lowercase() == user_text);
                    if matched {
                        tally.score += points;
                    }
                }
            }
            QuestionType::Belbin => {}
        }
    }

    tally
}

/// Sums submitted Belbin scores per role. Answers whose option carries no
/// role are skipped. Returns totals in ascending role-id order.
pub fn tally_belbin(rows: &[(Option<i64>, i32)]) -> Vec<RoleTotal> {
    let mut totals: BTreeMap<i64, i64> = BTreeMap::new();
    for (role_id, score) in rows {
        if let Some(role_id) = role_id {
            *totals.entry(*role_id).or_insert(0) += *score as i64;
        }
    }
    totals
        .into_iter()
        .map(|(role_id, total)| RoleTotal {
            role_id,
            total_score: total as f64,
        })
        .collect()
}

#[derive(Clone)]
pub struct ScoringService {
    pool: PgPool,
}

impl ScoringService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Recomputes the attempt's score and Belbin role totals from scratch and
    /// overwrites the stored results. Idempotent given unchanged answers.
    pub async fn score_attempt(&self, test_id: i64, employee_id: i64) -> Result<ScoreTally> {
        let questions = sqlx::query_as::<_, Question>(
            r#"SELECT id, test_id, text, question_type, "order", points
               FROM questions WHERE test_id = $1 ORDER BY "order""#,
        )
        .bind(test_id)
        .fetch_all(&self.pool)
        .await?;

        let answers = sqlx::query_as::<_, Answer>(
            r#"SELECT a.id, a.question_id, a.text, a.is_correct
               FROM answers a
               JOIN questions q ON q.id = a.question_id
               WHERE q.test_id = $1"#,
        )
        .bind(test_id)
        .fetch_all(&self.pool)
        .await?;

        let mut answers_by_question: HashMap<i64, Vec<Answer>> = HashMap::new();
        for answer in answers {
            answers_by_question
                .entry(answer.question_id)
                .or_default()
                .push(answer);
        }

        let submitted = self.load_submitted(test_id, employee_id).await?;
        let tally = tally_standard(&questions, &answers_by_question, &submitted);

        let belbin_rows = sqlx::query_as::<_, (Option<i64>, i32)>(
            r#"SELECT ba.role_id, COALESCE(uba.score, 0)
               FROM user_belbin_answers uba
               JOIN belbin_answers ba ON ba.id = uba.answer_id
               WHERE uba.test_id = $1 AND uba.employee_id = $2"#,
        )
        .bind(test_id)
        .bind(employee_id)
        .fetch_all(&self.pool)
        .await?;
        let role_totals = tally_belbin(&belbin_rows);

        let mut tx = self.pool.begin().await?;

        let result_id = sqlx::query_scalar::<_, i64>(
            r#"UPDATE test_results
               SET score = $1, max_score = $2, percent = $3
               WHERE test_id = $4 AND employee_id = $5
               RETURNING id"#,
        )
        .bind(tally.score)
        .bind(tally.max_score)
        .bind(tally.percent())
        .bind(test_id)
        .bind(employee_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::NotFound("Test result not found".to_string()))?;

        // No Belbin answers submitted: leave any prior role totals untouched.
        if !belbin_rows.is_empty() {
            sqlx::query("DELETE FROM belbin_test_results WHERE test_result_id = $1")
                .bind(result_id)
                .execute(&mut *tx)
                .await?;

            for total in &role_totals {
                sqlx::query(
                    r#"INSERT INTO belbin_test_results (test_result_id, role_id, total_score)
                       VALUES ($1, $2, $3)"#,
                )
                .bind(result_id)
                .bind(total.role_id)
                .bind(total.total_score)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;

        tracing::info!(
            test_id,
            employee_id,
            score = tally.score,
            max_score = tally.max_score,
            "attempt scored"
        );
        Ok(tally)
    }

    async fn load_submitted(&self, test_id: i64, employee_id: i64) -> Result<SubmittedAnswers> {
        let text_rows = sqlx::query_as::<_, (i64, Option<String>)>(
            r#"SELECT question_id, text_response
               FROM user_answers
               WHERE test_id = $1 AND employee_id = $2"#,
        )
        .bind(test_id)
        .bind(employee_id)
        .fetch_all(&self.pool)
        .await?;

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

        let mut submitted = SubmittedAnswers::default();
        for (question_id, text) in text_rows {
            if let Some(text) = text {
                submitted.text_responses.insert(question_id, text);
            }
        }
        for (question_id, answer_id) in item_rows {
            submitted
                .selections
                .entry(question_id)
                .or_default()
                .insert(answer_id);
        }
        Ok(submitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(id: i64, question_type: QuestionType, points: i32) -> Question {
        Question {
            id,
            test_id: 1,
            text: format!("question {}", id),
            question_type,
            order: id as i32,
            points,
        }
    }

    fn answer(id: i64, question_id: i64, text: &str, is_correct: bool) -> Answer {
        Answer {
            id,
            question_id,
            text: text.to_string(),
            is_correct,
        }
    }

    fn selections(pairs: &[(i64, &[i64])]) -> SubmittedAnswers {
        let mut submitted = SubmittedAnswers::default();
        for (qid, ids) in pairs {
            submitted
                .selections
                .insert(*qid, ids.iter().copied().collect());
        }
        submitted
    }

    #[test]
    fn single_choice_awards_all_or_nothing() {
        let questions = vec![question(1, QuestionType::SingleChoice, 2)];
        let mut answers = HashMap::new();
        answers.insert(1, vec![answer(10, 1, "a", true), answer(11, 1, "b", false)]);

        let tally = tally_standard(&questions, &answers, &selections(&[(1, &[10])]));
        assert_eq!(tally, ScoreTally { score: 2, max_score: 2 });

        let tally = tally_standard(&questions, &answers, &selections(&[(1, &[11])]));
        assert_eq!(tally, ScoreTally { score: 0, max_score: 2 });
    }

    #[test]
    fn single_choice_rejects_shotgun_selections() {
        let questions = vec![question(1, QuestionType::SingleChoice, 2)];
        let mut answers = HashMap::new();
        answers.insert(
            1,
            vec![
                answer(10, 1, "a", true),
                answer(11, 1, "b", false),
                answer(12, 1, "c", false),
            ],
        );

        // selecting every option must not earn the points
        let tally = tally_standard(&questions, &answers, &selections(&[(1, &[10, 11, 12])]));
        assert_eq!(tally, ScoreTally { score: 0, max_score: 2 });

        // two selections, one of them correct, is still not a valid answer
        let tally = tally_standard(&questions, &answers, &selections(&[(1, &[10, 11])]));
        assert_eq!(tally, ScoreTally { score: 0, max_score: 2 });
    }

    #[test]
    fn single_choice_counts_toward_max_when_unanswered() {
        let questions = vec![question(1, QuestionType::SingleChoice, 3)];
        let mut answers = HashMap::new();
        answers.insert(1, vec![answer(10, 1, "a", true)]);

        let tally = tally_standard(&questions, &answers, &SubmittedAnswers::default());
        assert_eq!(tally, ScoreTally { score: 0, max_score: 3 });
    }

    #[test]
    fn multiple_choice_requires_exact_set() {
        let questions = vec![question(1, QuestionType::MultipleChoice, 3)];
        let mut answers = HashMap::new();
        answers.insert(
            1,
            vec![
                answer(10, 1, "a", true),
                answer(11, 1, "b", true),
                answer(12, 1, "c", false),
            ],
        );

        // exact match
        let tally = tally_standard(&questions, &answers, &selections(&[(1, &[10, 11])]));
        assert_eq!(tally.score, 3);
        // subset
        let tally = tally_standard(&questions, &answers, &selections(&[(1, &[10])]));
        assert_eq!(tally.score, 0);
        // superset
        let tally = tally_standard(&questions, &answers, &selections(&[(1, &[10, 11, 12])]));
        assert_eq!(tally.score, 0);
        assert_eq!(tally.max_score, 3);
    }

    #[test]
    fn multiple_choice_without_correct_answers_is_skipped() {
        let questions = vec![question(1, QuestionType::MultipleChoice, 5)];
        let mut answers = HashMap::new();
        answers.insert(1, vec![answer(10, 1, "a", false)]);

        let tally = tally_standard(&questions, &answers, &selections(&[(1, &[10])]));
        assert_eq!(tally, ScoreTally { score: 0, max_score: 0 });
        assert_eq!(tally.percent(), None);
    }

    #[test]
    fn text_answer_matches_case_insensitively() {
        let questions = vec![question(1, QuestionType::TextAnswer, 1)];
        let mut answers = HashMap::new();
        answers.insert(1, vec![answer(10, 1, "  Paris ", true)]);

        let mut submitted = SubmittedAnswers::default();
        submitted.text_responses.insert(1, "paris".to_string());
        let tally = tally_standard(&questions, &answers, &submitted);
        assert_eq!(tally.score, 1);

        submitted.text_responses.insert(1, "london".to_string());
        let tally = tally_standard(&questions, &answers, &submitted);
        assert_eq!(tally.score, 0);
        assert_eq!(tally.max_score, 1);
    }

    #[test]
    fn belbin_questions_do_not_enter_the_standard_tally() {
        let questions = vec![
            question(1, QuestionType::SingleChoice, 2),
            question(2, QuestionType::Belbin, 99),
        ];
        let mut answers = HashMap::new();
        answers.insert(1, vec![answer(10, 1, "a", true)]);

        let tally = tally_standard(&questions, &answers, &selections(&[(1, &[10])]));
        assert_eq!(tally, ScoreTally { score: 2, max_score: 2 });
    }

    #[test]
    fn mixed_test_scenario() {
        // single_choice worth 2 (correct A), multiple_choice worth 3
        // (correct {B, C}); submitting A and {B} alone scores 2 of 5.
        let questions = vec![
            question(1, QuestionType::SingleChoice, 2),
            question(2, QuestionType::MultipleChoice, 3),
        ];
        let mut answers = HashMap::new();
        answers.insert(1, vec![answer(10, 1, "A", true), answer(11, 1, "X", false)]);
        answers.insert(
            2,
            vec![
                answer(20, 2, "B", true),
                answer(21, 2, "C", true),
                answer(22, 2, "D", false),
            ],
        );

        let tally = tally_standard(&questions, &answers, &selections(&[(1, &[10]), (2, &[20])]));
        assert_eq!(tally, ScoreTally { score: 2, max_score: 5 });
        let percent = tally.percent().unwrap();
        assert!((percent - 40.0).abs() < 1e-9);
    }

    #[test]
    fn belbin_totals_group_by_role() {
        let rows = vec![(Some(1), 4), (Some(1), 6), (Some(2), 3)];
        let totals = tally_belbin(&rows);
        assert_eq!(
            totals,
            vec![
                RoleTotal { role_id: 1, total_score: 10.0 },
                RoleTotal { role_id: 2, total_score: 3.0 },
            ]
        );
    }

    #[test]
    fn belbin_totals_skip_roleless_answers() {
        let rows = vec![(None, 9), (Some(5), 2)];
        let totals = tally_belbin(&rows);
        assert_eq!(totals, vec![RoleTotal { role_id: 5, total_score: 2.0 }]);
    }

    #[test]
    fn belbin_totals_are_deterministic() {
        let rows = vec![(Some(3), 1), (Some(1), 1), (Some(2), 1)];
        let ids: Vec<i64> = tally_belbin(&rows).iter().map(|t| t.role_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
