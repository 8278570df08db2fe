use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers::*;

/// Creates the API router with all library endpoints
///
/// Catalog:
/// - GET /api/books (?q=&by=title|author|isbn) - List or search books
/// - POST /api/books - Add a book (login)
/// - GET /api/books/:isbn - Get a book
/// - PUT /api/books/:isbn - Edit a book (login)
/// - DELETE /api/books/:isbn - Remove a book (login)
///
/// Members:
/// - GET /api/members, POST /api/members
/// - GET /api/members/:id, PUT and DELETE (login)
///
/// Lending:
/// - POST /api/issue, POST /api/return
/// - GET /api/loans (?member_id=), GET /api/loans/:id
/// - PUT /api/loans/:id - Edit due date / returned flag (login)
///
/// Session:
/// - POST /api/login, /api/register, /api/logout
/// - GET /api/me
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check endpoint
        .route("/health", get(health_check))
        .route("/api/books", get(list_books).post(add_book))
        .route(
            "/api/books/:isbn",
            get(get_book).put(update_book).delete(delete_book),
        )
        .route("/api/members", get(list_members).post(register_member))
        .route(
            "/api/members/:id",
            get(get_member).put(update_member).delete(delete_member),
        )
        .route("/api/issue", post(issue_book))
        .route("/api/return", post(return_book))
        .route("/api/loans", get(list_loans))
        .route("/api/loans/:id", get(get_loan).put(edit_loan))
        .route("/api/login", post(login))
        .route("/api/register", post(register))
        .route("/api/logout", post(logout))
        .route("/api/me", get(me))
        // Add tracing middleware
        .layer(TraceLayer::new_for_http())
        // Add application state
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
