// tests/attempt_tests.rs

mod common;

use chrono::{Duration, Utc};
use common::{spawn_app, unique_id};
use serde_json::{Value, json};

#[tokio::test]
async fn start_is_idempotent_while_in_progress() {
    let app = spawn_app().await;

    let q1 = app.seed_question("2 + 2").await;
    let q2 = app.seed_question("3 * 3").await;
    let student = unique_id();
    let token = app.student_token(student);
    let exam_id = app
        .published_exam(
            json!({ "shuffle_questions": true, "shuffle_options": true }),
            &[&q1, &q2],
            &[student],
        )
        .await;

    let first = app.start(exam_id, &token).await;
    assert_eq!(first.status().as_u16(), 201);
    let first: Value = first.json().await.unwrap();
    assert_eq!(first["resumed"], false);
    assert_eq!(first["attempt_number"], 1);

    let second = app.start(exam_id, &token).await;
    assert_eq!(second.status().as_u16(), 200);
    let second: Value = second.json().await.unwrap();

    assert_eq!(first["attempt_id"], second["attempt_id"]);
    assert_eq!(second["resumed"], true);
    // Same seed, same order
    assert_eq!(first["questions"], second["questions"]);

    let options = first["questions"][0]["options"].as_array().unwrap();
    assert_eq!(options.len(), 2);
    assert!(options[0].get("is_correct").is_none());
}

#[tokio::test]
async fn start_requires_assignment_and_publication() {
    let app = spawn_app().await;

    let q1 = app.seed_question("2 + 2").await;
    let assigned = unique_id();

    let draft: Value = app.create_exam(json!({})).await.json().await.unwrap();
    let draft_id = draft["id"].as_i64().unwrap();
    app.set_questions(draft_id, &[q1.id]).await;
    app.assign(draft_id, &[assigned]).await;

    let unpublished = app.start(draft_id, &app.student_token(assigned)).await;
    assert_eq!(unpublished.status().as_u16(), 422);

    let exam_id = app.published_exam(json!({}), &[&q1], &[assigned]).await;
    let stranger = app.start(exam_id, &app.student_token(unique_id())).await;
    assert_eq!(stranger.status().as_u16(), 403);

    let instructor = app.start(exam_id, &app.instructor_token).await;
    assert_eq!(instructor.status().as_u16(), 403);
}

#[tokio::test]
async fn start_outside_window_is_rejected() {
    let app = spawn_app().await;

    let q1 = app.seed_question("2 + 2").await;
    let student = unique_id();
    let start_at = Utc::now() + Duration::hours(1);
    let exam_id = app
        .published_exam(
            json!({ "start_at": start_at, "end_at": start_at + Duration::hours(2) }),
            &[&q1],
            &[student],
        )
        .await;

    let response = app.start(exam_id, &app.student_token(student)).await;
    assert_eq!(response.status().as_u16(), 422);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "state_error");
}

#[tokio::test]
async fn saved_answers_survive_resume_and_can_be_cleared() {
    let app = spawn_app().await;

    let q1 = app.seed_question("2 + 2").await;
    let q2 = app.seed_question("3 * 3").await;
    let student = unique_id();
    let token = app.student_token(student);
    let exam_id = app.published_exam(json!({}), &[&q1, &q2], &[student]).await;

    let started: Value = app.start(exam_id, &token).await.json().await.unwrap();
    let attempt_id = started["attempt_id"].as_i64().unwrap();

    let saved = app.save_answer(attempt_id, &token, q1.id, q1.correct_option).await;
    assert_eq!(saved.status().as_u16(), 200);
    app.save_answer(attempt_id, &token, q2.id, q2.wrong_option).await;

    let resumed: Value = app.start(exam_id, &token).await.json().await.unwrap();
    let answers = &resumed["saved_answers"];
    assert_eq!(answers[q1.id.to_string()].as_i64(), Some(q1.correct_option));
    assert_eq!(answers[q2.id.to_string()].as_i64(), Some(q2.wrong_option));

    let cleared = app.save_answer(attempt_id, &token, q2.id, 0).await;
    let cleared: Value = cleared.json().await.unwrap();
    assert_eq!(cleared["saved"], false);

    let resumed: Value = app.start(exam_id, &token).await.json().await.unwrap();
    assert!(resumed["saved_answers"].get(q2.id.to_string()).is_none());
}

#[tokio::test]
async fn options_must_belong_to_the_question() {
    let app = spawn_app().await;

    let q1 = app.seed_question("2 + 2").await;
    let q2 = app.seed_question("3 * 3").await;
    let student = unique_id();
    let token = app.student_token(student);
    let exam_id = app.published_exam(json!({}), &[&q1, &q2], &[student]).await;

    let started: Value = app.start(exam_id, &token).await.json().await.unwrap();
    let attempt_id = started["attempt_id"].as_i64().unwrap();

    let crossed = app.save_answer(attempt_id, &token, q1.id, q2.correct_option).await;
    assert_eq!(crossed.status().as_u16(), 400);

    let other_student = app
        .save_answer(attempt_id, &app.student_token(unique_id()), q1.id, q1.correct_option)
        .await;
    assert_eq!(other_student.status().as_u16(), 403);
}

#[tokio::test]
async fn submission_scores_and_freezes_the_attempt() {
    let app = spawn_app().await;

    let q1 = app.seed_question("2 + 2").await;
    let q2 = app.seed_question("3 * 3").await;
    let student = unique_id();
    let token = app.student_token(student);
    let exam_id = app
        .published_exam(json!({ "total_score": 20 }), &[&q1, &q2], &[student])
        .await;

    let started: Value = app.start(exam_id, &token).await.json().await.unwrap();
    let attempt_id = started["attempt_id"].as_i64().unwrap();

    app.save_answer(attempt_id, &token, q1.id, q1.correct_option).await;

    // Inline answers are recorded before scoring
    let body = json!({ "answers": { q2.id.to_string(): q2.wrong_option } });
    let response = app.submit(attempt_id, &token, body).await;
    assert_eq!(response.status().as_u16(), 200);

    let result: Value = response.json().await.unwrap();
    assert_eq!(result["total_score"].as_f64(), Some(10.0));
    assert_eq!(result["exam_total_score"].as_f64(), Some(20.0));
    assert_eq!(result["percentage"].as_f64(), Some(50.0));
    assert_eq!(result["grade"], "D");
    assert_eq!(result["report_card_updated"], false);

    let has_submitted: bool = sqlx::query_scalar(
        "SELECT has_submitted FROM assignments WHERE exam_id = $1 AND student_id = $2",
    )
    .bind(exam_id)
    .bind(student)
    .fetch_one(&app.pool)
    .await
    .unwrap();
    assert!(has_submitted);

    let late_save = app.save_answer(attempt_id, &token, q2.id, q2.correct_option).await;
    assert_eq!(late_save.status().as_u16(), 422);

    let resubmit = app.submit(attempt_id, &token, json!({})).await;
    assert_eq!(resubmit.status().as_u16(), 422);

    let restart = app.start(exam_id, &token).await;
    assert_eq!(restart.status().as_u16(), 422);
}

#[tokio::test]
async fn expired_attempt_rejects_saves_but_accepts_submit() {
    let app = spawn_app().await;

    let q1 = app.seed_question("2 + 2").await;
    let student = unique_id();
    let token = app.student_token(student);
    let exam_id = app.published_exam(json!({}), &[&q1], &[student]).await;

    let started: Value = app.start(exam_id, &token).await.json().await.unwrap();
    let attempt_id = started["attempt_id"].as_i64().unwrap();

    sqlx::query("UPDATE attempts SET started_at = started_at - INTERVAL '2 hours' WHERE id = $1")
        .bind(attempt_id)
        .execute(&app.pool)
        .await
        .unwrap();

    let save = app.save_answer(attempt_id, &token, q1.id, q1.correct_option).await;
    assert_eq!(save.status().as_u16(), 422);

    // Late inline answers are dropped; the submission still goes through
    let body = json!({ "answers": { q1.id.to_string(): q1.correct_option } });
    let submit = app.submit(attempt_id, &token, body).await;
    assert_eq!(submit.status().as_u16(), 200);

    let result: Value = submit.json().await.unwrap();
    assert_eq!(result["total_score"].as_f64(), Some(0.0));
    assert!(result["time_taken_seconds"].as_i64().unwrap() >= 7200);
}

#[tokio::test]
async fn results_are_gated_on_submission() {
    let app = spawn_app().await;

    let q1 = app.seed_question("2 + 2").await;
    let student = unique_id();
    let token = app.student_token(student);
    let exam_id = app.published_exam(json!({}), &[&q1], &[student]).await;
    let results_url = app.url(&format!("/api/exams/{}/results", exam_id));

    let early = app.client.get(&results_url).bearer_auth(&token).send().await.unwrap();
    assert_eq!(early.status().as_u16(), 422);

    let started: Value = app.start(exam_id, &token).await.json().await.unwrap();
    let attempt_id = started["attempt_id"].as_i64().unwrap();
    app.save_answer(attempt_id, &token, q1.id, q1.correct_option).await;
    app.submit(attempt_id, &token, json!({})).await;

    // Aggregate only: the exam does not show results immediately
    let own: Value = app
        .client
        .get(&results_url)
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(own["percentage"].as_f64(), Some(100.0));
    assert_eq!(own["grade"], "A");
    assert!(own.get("breakdown").is_none());

    let snooping = app
        .client
        .get(format!("{}?student_id={}", results_url, unique_id()))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(snooping.status().as_u16(), 403);

    let staff: Value = app
        .client
        .get(format!("{}?student_id={}", results_url, student))
        .bearer_auth(&app.instructor_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let breakdown = staff["breakdown"].as_array().unwrap();
    assert_eq!(breakdown.len(), 1);
    assert_eq!(breakdown[0]["selected_option_id"].as_i64(), Some(q1.correct_option));
    assert_eq!(breakdown[0]["correct_option_id"].as_i64(), Some(q1.correct_option));
    assert_eq!(breakdown[0]["is_correct"], true);
}

#[tokio::test]
async fn immediate_results_include_breakdown_for_students() {
    let app = spawn_app().await;

    let q1 = app.seed_question("2 + 2").await;
    let q2 = app.seed_question("3 * 3").await;
    let student = unique_id();
    let token = app.student_token(student);
    let exam_id = app
        .published_exam(json!({ "show_results_immediately": true }), &[&q1, &q2], &[student])
        .await;

    let started: Value = app.start(exam_id, &token).await.json().await.unwrap();
    let attempt_id = started["attempt_id"].as_i64().unwrap();
    app.save_answer(attempt_id, &token, q2.id, q2.wrong_option).await;
    app.submit(attempt_id, &token, json!({})).await;

    let results: Value = app
        .client
        .get(app.url(&format!("/api/exams/{}/results", exam_id)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let breakdown = results["breakdown"].as_array().unwrap();
    let ids: Vec<i64> = breakdown.iter().map(|b| b["question_id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![q1.id, q2.id]);

    // Unanswered question is listed with nothing selected
    assert!(breakdown[0]["selected_option_id"].is_null());
    assert_eq!(breakdown[0]["marks_awarded"].as_f64(), Some(0.0));
    assert_eq!(breakdown[1]["is_correct"], false);
    assert_eq!(breakdown[1]["question_marks"].as_f64(), Some(5.0));
}

#[tokio::test]
async fn concurrent_starts_share_one_attempt() {
    let app = spawn_app().await;

    let q1 = app.seed_question("2 + 2").await;
    let student = unique_id();
    let token = app.student_token(student);
    let exam_id = app.published_exam(json!({}), &[&q1], &[student]).await;

    let (first, second) = tokio::join!(app.start(exam_id, &token), app.start(exam_id, &token));
    let mut statuses = vec![first.status().as_u16(), second.status().as_u16()];
    statuses.sort();
    assert_eq!(statuses, vec![200, 201]);

    let first: Value = first.json().await.unwrap();
    let second: Value = second.json().await.unwrap();
    assert_eq!(first["attempt_id"], second["attempt_id"]);

    let attempts: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM attempts WHERE exam_id = $1 AND student_id = $2")
            .bind(exam_id)
            .bind(student)
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert_eq!(attempts, 1);
}

#[tokio::test]
async fn concurrent_submits_score_once() {
    let app = spawn_app().await;

    let q1 = app.seed_question("2 + 2").await;
    let student = unique_id();
    let token = app.student_token(student);
    let exam_id = app.published_exam(json!({}), &[&q1], &[student]).await;

    let started: Value = app.start(exam_id, &token).await.json().await.unwrap();
    let attempt_id = started["attempt_id"].as_i64().unwrap();
    app.save_answer(attempt_id, &token, q1.id, q1.correct_option).await;

    let (first, second) = tokio::join!(
        app.submit(attempt_id, &token, json!({})),
        app.submit(attempt_id, &token, json!({}))
    );
    let mut statuses = vec![first.status().as_u16(), second.status().as_u16()];
    statuses.sort();
    assert_eq!(statuses, vec![200, 422]);

    let has_submitted: bool = sqlx::query_scalar(
        "SELECT has_submitted FROM assignments WHERE exam_id = $1 AND student_id = $2",
    )
    .bind(exam_id)
    .bind(student)
    .fetch_one(&app.pool)
    .await
    .unwrap();
    assert!(has_submitted);

    let submitted: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM attempts WHERE exam_id = $1 AND student_id = $2 AND status = 'submitted'",
    )
    .bind(exam_id)
    .bind(student)
    .fetch_one(&app.pool)
    .await
    .unwrap();
    assert_eq!(submitted, 1);
}
