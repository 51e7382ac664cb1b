// tests/common/mod.rs

#![allow(dead_code)]

use cbt_engine::{
    config::Config,
    routes,
    state::AppState,
    utils::jwt::{ROLE_INSTRUCTOR, ROLE_STUDENT, sign_jwt},
};
use serde_json::Value;
use sqlx::{PgPool, postgres::PgPoolOptions};

pub const JWT_SECRET: &str = "test_secret_for_integration_tests";

pub struct TestApp {
    pub address: String,
    pub pool: PgPool,
    pub client: reqwest::Client,
    /// Fresh per test so rows from other tests never interfere.
    pub tenant_id: i64,
    pub instructor_token: String,
}

/// Random positive id, used for tenants and students.
pub fn unique_id() -> i64 {
    (uuid::Uuid::new_v4().as_u128() as i64 & 0x0000_7FFF_FFFF_FFFF) + 1
}

/// Spawns the app on a random port against `DATABASE_URL`.
/// Note: requires a running Postgres.
pub async fn spawn_app() -> TestApp {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let config = Config {
        database_url,
        jwt_secret: JWT_SECRET.to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        attempt_grace_seconds: 30,
    };

    let app = routes::create_router(AppState::new(pool.clone(), config));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let tenant_id = unique_id();
    let instructor_token = sign_jwt(unique_id(), ROLE_INSTRUCTOR, tenant_id, JWT_SECRET, 600).unwrap();

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        pool,
        client: reqwest::Client::new(),
        tenant_id,
        instructor_token,
    }
}

/// A seeded question bank entry.
pub struct SeededQuestion {
    pub id: i64,
    pub correct_option: i64,
    pub wrong_option: i64,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub fn student_token(&self, student_id: i64) -> String {
        sign_jwt(student_id, ROLE_STUDENT, self.tenant_id, JWT_SECRET, 600).unwrap()
    }

    /// Inserts a two-option question (first option correct) into this tenant's bank.
    pub async fn seed_question(&self, content: &str) -> SeededQuestion {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO questions (tenant_id, subject, content) VALUES ($1, 'Mathematics', $2) RETURNING id",
        )
        .bind(self.tenant_id)
        .bind(content)
        .fetch_one(&self.pool)
        .await
        .unwrap();

        let correct_option: i64 = sqlx::query_scalar(
            "INSERT INTO question_options (question_id, content, is_correct, position) VALUES ($1, 'right', TRUE, 1) RETURNING id",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .unwrap();

        let wrong_option: i64 = sqlx::query_scalar(
            "INSERT INTO question_options (question_id, content, is_correct, position) VALUES ($1, 'wrong', FALSE, 2) RETURNING id",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .unwrap();

        SeededQuestion {
            id,
            correct_option,
            wrong_option,
        }
    }

    /// Creates a draft exam as the instructor. `overrides` are merged into
    /// a valid default body.
    pub async fn create_exam(&self, overrides: Value) -> reqwest::Response {
        let mut body = serde_json::json!({
            "title": "First term CBT",
            "subject": "Mathematics",
            "class_name": "JSS1",
            "session": "2025/2026",
            "term": "First",
            "assessment_type": "exam",
            "duration_minutes": 30
        });
        if let (Some(body), Some(overrides)) = (body.as_object_mut(), overrides.as_object()) {
            for (key, value) in overrides {
                body.insert(key.clone(), value.clone());
            }
        }

        self.client
            .post(self.url("/api/exams"))
            .bearer_auth(&self.instructor_token)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn set_questions(&self, exam_id: i64, question_ids: &[i64]) -> reqwest::Response {
        self.client
            .put(self.url(&format!("/api/exams/{}/questions", exam_id)))
            .bearer_auth(&self.instructor_token)
            .json(&serde_json::json!({ "question_ids": question_ids }))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn assign(&self, exam_id: i64, student_ids: &[i64]) -> reqwest::Response {
        self.client
            .post(self.url(&format!("/api/exams/{}/assignments", exam_id)))
            .bearer_auth(&self.instructor_token)
            .json(&serde_json::json!({ "student_ids": student_ids }))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn publish(&self, exam_id: i64) -> reqwest::Response {
        self.client
            .post(self.url(&format!("/api/exams/{}/publish", exam_id)))
            .bearer_auth(&self.instructor_token)
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Draft exam with `questions.len()` questions, the given students
    /// assigned, published. Returns the exam id.
    pub async fn published_exam(
        &self,
        overrides: Value,
        questions: &[&SeededQuestion],
        student_ids: &[i64],
    ) -> i64 {
        let exam: Value = self.create_exam(overrides).await.json().await.unwrap();
        let exam_id = exam["id"].as_i64().unwrap();

        let ids: Vec<i64> = questions.iter().map(|q| q.id).collect();
        assert_eq!(self.set_questions(exam_id, &ids).await.status().as_u16(), 200);
        assert_eq!(self.assign(exam_id, student_ids).await.status().as_u16(), 200);
        assert_eq!(self.publish(exam_id).await.status().as_u16(), 200);

        exam_id
    }

    pub async fn start(&self, exam_id: i64, token: &str) -> reqwest::Response {
        self.client
            .post(self.url(&format!("/api/exams/{}/attempts", exam_id)))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn save_answer(
        &self,
        attempt_id: i64,
        token: &str,
        question_id: i64,
        option_id: i64,
    ) -> reqwest::Response {
        self.client
            .put(self.url(&format!("/api/attempts/{}/answers", attempt_id)))
            .bearer_auth(token)
            .json(&serde_json::json!({ "question_id": question_id, "option_id": option_id }))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn submit(&self, attempt_id: i64, token: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(&format!("/api/attempts/{}/submit", attempt_id)))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }
}
