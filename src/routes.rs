// src/routes.rs

use axum::{
    Router,
    http::Method,
    routing::{get, post, put},
};
use sqlx::SqlitePool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::handlers::{admin, results, survey};

/// Assembles the main application router.
///
/// * Merges all sub-routers (survey, results, admin).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (Database Pool).
pub fn create_router(pool: SqlitePool) -> Router {
    let origins = [
        "http://localhost:3000".parse().unwrap(),
        "http://127.0.0.1:3000".parse().unwrap(),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    let survey_routes = Router::new()
        .route("/users", get(survey::list_users))
        .route("/questions", get(survey::list_questions))
        .route("/responses", post(survey::submit_responses))
        .route("/responses/{user_id}", get(survey::get_user_responses));

    let results_routes = Router::new()
        .route("/results/status", get(results::results_status))
        .route("/results/{user_id}", get(results::user_match_results))
        .route(
            "/results/compare/{user1_id}/{user2_id}",
            get(results::match_comparison),
        );

    let admin_routes = Router::new()
        .route("/admin/users", post(admin::create_user))
        .route("/admin/users/bulk", post(admin::bulk_create_users))
        .route(
            "/admin/users/{id}",
            put(admin::update_user).delete(admin::delete_user),
        )
        .route("/admin/questions", post(admin::create_question))
        .route("/admin/questions/bulk", post(admin::bulk_create_questions))
        .route(
            "/admin/questions/positions/swap",
            post(admin::swap_question_positions),
        )
        .route(
            "/admin/questions/{id}",
            put(admin::update_question).delete(admin::delete_question),
        )
        .route("/admin/results", get(admin::list_all_results))
        .route("/admin/results/generate", post(admin::generate_results))
        .route("/admin/reset", post(admin::reset_survey));

    Router::new()
        .nest("/api", survey_routes.merge(results_routes).merge(admin_routes))
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(pool)
}
