// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{attempt, exam, grading},
    state::AppState,
    utils::jwt::{auth_middleware, instructor_middleware},
};

/// Assembles the main application router.
///
/// * Instructor routes: exam authoring, deferred grading, report card pushes.
/// * Student routes: starting, answering and submitting attempts.
/// * Every route requires a session; the instructor router adds a role check.
pub fn create_router(state: AppState) -> Router {
    let origins = [
        HeaderValue::from_static("http://localhost:3000"),
        HeaderValue::from_static("http://127.0.0.1:3000"),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let instructor_exam_routes = Router::new()
        .route("/", post(exam::create_exam))
        .route(
            "/{id}",
            put(exam::update_exam)
                .get(exam::get_exam)
                .delete(exam::delete_exam),
        )
        .route("/{id}/questions", put(exam::set_questions))
        .route("/{id}/assignments", post(exam::assign_students))
        .route("/{id}/publish", post(exam::publish_exam))
        .route_layer(middleware::from_fn(instructor_middleware));

    let student_exam_routes = Router::new()
        .route("/{id}/attempts", post(attempt::start_attempt))
        .route("/{id}/results", get(attempt::get_results));

    let instructor_attempt_routes = Router::new()
        .route("/{id}/grade", post(grading::grade_attempt))
        .route("/{id}/report-card", post(grading::push_to_report_card))
        .route_layer(middleware::from_fn(instructor_middleware));

    let student_attempt_routes = Router::new()
        .route("/{id}/answers", put(attempt::save_answer))
        .route("/{id}/submit", post(attempt::submit_attempt));

    let api_routes = Router::new()
        .nest(
            "/api/exams",
            instructor_exam_routes.merge(student_exam_routes),
        )
        .nest(
            "/api/attempts",
            instructor_attempt_routes.merge(student_attempt_routes),
        )
        // Auth runs before any role check. Unmatched paths fall through to 404.
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(api_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
