use std::collections::HashMap;

use assessment_backend::dto::test_dto::{AnswerPayload, QuestionPayload};
use assessment_backend::models::question::{Answer, Question, QuestionType};
use assessment_backend::models::test::{AttemptStatus, Test, TestResult, TestStatus};
use assessment_backend::services::belbin_service::{evaluate_roles, overall_verdict};
use assessment_backend::services::lifecycle_service::{
    check_availability, completion_timestamp, derive_status,
};
use assessment_backend::services::reconcile_service::diff_questions;
use assessment_backend::services::scoring_service::{
    tally_belbin, tally_standard, SubmittedAnswers,
};
use assessment_backend::services::submission_service::parse_belbin_pairs;
use chrono::{Duration, TimeZone, Utc};

fn question(id: i64, question_type: QuestionType, points: i32) -> Question {
    Question {
        id,
        test_id: 1,
        text: format!("q{}", id),
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

fn test_row(status: TestStatus, time_limit_minutes: Option<i32>) -> Test {
    let created = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
    Test {
        id: 1,
        title: "onboarding quiz".to_string(),
        description: None,
        is_active: true,
        status,
        created_at: created,
        updated_at: created,
        end_date: None,
        time_limit_minutes,
        test_settings_id: None,
        created_by: 1,
    }
}

#[test]
fn grading_a_small_quiz_end_to_end() {
    // Three questions: a 1-point single choice, a 2-point multiple choice
    // and a 2-point text answer. The employee gets the first two right.
    let questions = vec![
        question(1, QuestionType::SingleChoice, 1),
        question(2, QuestionType::MultipleChoice, 2),
        question(3, QuestionType::TextAnswer, 2),
    ];
    let mut answers: HashMap<i64, Vec<Answer>> = HashMap::new();
    answers.insert(1, vec![answer(10, 1, "yes", true), answer(11, 1, "no", false)]);
    answers.insert(
        2,
        vec![
            answer(20, 2, "a", true),
            answer(21, 2, "b", true),
            answer(22, 2, "c", false),
        ],
    );
    answers.insert(3, vec![answer(30, 3, "Helsinki", true)]);

    let mut submitted = SubmittedAnswers::default();
    submitted.selections.insert(1, [10].into_iter().collect());
    submitted.selections.insert(2, [20, 21].into_iter().collect());
    submitted.text_responses.insert(3, "Oslo".to_string());

    let tally = tally_standard(&questions, &answers, &submitted);
    assert_eq!(tally.score, 3);
    assert_eq!(tally.max_score, 5);
    let percent = tally.percent().unwrap();
    assert!((percent - 60.0).abs() < 1e-9);
}

#[test]
fn unanswered_questions_still_count_toward_the_maximum() {
    let questions = vec![
        question(1, QuestionType::SingleChoice, 2),
        question(2, QuestionType::TextAnswer, 3),
    ];
    let mut answers: HashMap<i64, Vec<Answer>> = HashMap::new();
    answers.insert(1, vec![answer(10, 1, "x", true)]);
    answers.insert(2, vec![answer(20, 2, "y", true)]);

    let tally = tally_standard(&questions, &answers, &SubmittedAnswers::default());
    assert_eq!(tally.score, 0);
    assert_eq!(tally.max_score, 5);
}

#[test]
fn belbin_totals_and_verdict_flow_together() {
    // Scores submitted across two roles; role 2 dominates.
    let rows = vec![(Some(1), 10), (Some(2), 30), (Some(2), 40), (None, 50)];
    let totals = tally_belbin(&rows);
    assert_eq!(totals.len(), 2);
    assert_eq!(totals[0].total_score, 10.0);
    assert_eq!(totals[1].total_score, 70.0);

    // Role 2 (a full 70 points, normalizes to 100) is the only key role.
    let joined: Vec<(i64, Option<String>, f64)> = totals
        .iter()
        .map(|t| (t.role_id, None, t.total_score))
        .collect();
    let fits = evaluate_roles(&joined, &[(1, 90, false), (2, 60, true)]);
    assert!(!fits[0].meets_requirement);
    assert!(fits[1].meets_requirement);
    assert_eq!(
        overall_verdict(&fits),
        assessment_backend::dto::belbin_dto::FitVerdict::High
    );
}

#[test]
fn editing_only_the_title_keeps_collected_answers() {
    let stored = vec![(
        question(1, QuestionType::SingleChoice, 1),
        vec![answer(10, 1, "yes", true)],
    )];
    let incoming = vec![QuestionPayload {
        id: Some(1),
        text: "q1".to_string(),
        question_type: QuestionType::SingleChoice,
        order: 5,
        points: 1,
        answers: vec![AnswerPayload {
            id: Some(10),
            text: "yes".to_string(),
            is_correct: true,
        }],
    }];

    let diff = diff_questions(&stored, &incoming);
    assert!(!diff.invalidates_results());
    assert!(diff.purge_ids().is_empty());
}

#[test]
fn rewording_a_question_invalidates_its_answers() {
    let stored = vec![(
        question(1, QuestionType::SingleChoice, 1),
        vec![answer(10, 1, "yes", true)],
    )];
    let incoming = vec![QuestionPayload {
        id: Some(1),
        text: "a different question".to_string(),
        question_type: QuestionType::SingleChoice,
        order: 1,
        points: 1,
        answers: vec![AnswerPayload {
            id: Some(10),
            text: "yes".to_string(),
            is_correct: true,
        }],
    }];

    let diff = diff_questions(&stored, &incoming);
    assert!(diff.invalidates_results());
    assert!(diff.purge_ids().contains(&1));
}

#[test]
fn deleting_a_question_purges_it_but_adding_one_does_not() {
    let stored = vec![
        (question(1, QuestionType::SingleChoice, 1), vec![]),
        (question(2, QuestionType::SingleChoice, 1), vec![]),
    ];
    let incoming = vec![
        QuestionPayload {
            id: Some(1),
            text: "q1".to_string(),
            question_type: QuestionType::SingleChoice,
            order: 1,
            points: 1,
            answers: vec![],
        },
        QuestionPayload {
            id: None,
            text: "brand new".to_string(),
            question_type: QuestionType::TextAnswer,
            order: 3,
            points: 1,
            answers: vec![],
        },
    ];

    let diff = diff_questions(&stored, &incoming);
    assert_eq!(diff.removed.len(), 1);
    assert!(diff.removed.contains(&2));
    assert!(diff.changed.is_empty());
    assert!(diff.invalidates_results());
}

#[test]
fn attempt_status_and_availability_share_the_same_window() {
    let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
    let test = test_row(TestStatus::Active, Some(30));

    let in_window = TestResult {
        id: 1,
        test_id: 1,
        employee_id: 1,
        is_completed: false,
        started_at: now - Duration::minutes(20),
        completed_at: None,
        score: None,
        max_score: None,
        percent: None,
    };
    assert_eq!(derive_status(&test, Some(&in_window), now), AttemptStatus::InProgress);
    assert!(check_availability(&test, Some(&in_window), now).is_ok());

    let out_of_window = TestResult {
        started_at: now - Duration::minutes(40),
        ..in_window.clone()
    };
    assert!(check_availability(&test, Some(&out_of_window), now).is_err());
}

#[test]
fn overtime_completion_is_clamped_to_the_deadline() {
    let started = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
    let late_call = started + Duration::minutes(95);

    let stamped = completion_timestamp(started, Some(60), late_call);
    assert_eq!(stamped, started + Duration::minutes(60));
    assert!(stamped < late_call);
}

#[test]
fn paused_tests_reject_submissions() {
    let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
    let paused = test_row(TestStatus::Draft, None);
    assert!(check_availability(&paused, None, now).is_err());
}

#[test]
fn enum_columns_bind_as_plain_text() {
    use sqlx::{Postgres, Type, TypeInfo};

    // These enums live in TEXT columns; binding them must declare the
    // built-in text type, not a named type the database does not have.
    assert_eq!(<TestStatus as Type<Postgres>>::type_info().name(), "TEXT");
    assert_eq!(<QuestionType as Type<Postgres>>::type_info().name(), "TEXT");
}

#[test]
fn belbin_payload_pairs_round_trip_through_the_parser() {
    let pairs = parse_belbin_pairs("[[101, 3], [102, 7], [103, 0]]").unwrap();
    assert_eq!(pairs, vec![(101, 3), (102, 7), (103, 0)]);
    assert!(parse_belbin_pairs("{\"oops\": true}").is_err());
}
