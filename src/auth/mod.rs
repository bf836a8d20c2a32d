use axum::{
    routing::{get, post, put},
    Router,
};

use crate::state::AppState;

pub mod dto;
pub mod extractors;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod reset;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(handlers::register))
        .route("/login", post(handlers::login))
        .route("/logout", get(handlers::logout))
        .route("/me", get(handlers::me))
        .route("/profile", put(handlers::update_profile))
        .route("/password", put(handlers::update_password))
        .route("/public/:id", get(handlers::public_profile))
        .route("/password/forgot", post(handlers::forgot_password))
        .route("/password/reset/:token", put(handlers::reset_password))
}
