use axum::{routing::get, Router};

async fn status() -> &'static str {
    "ok"
}

pub fn routes() -> Router {
    Router::new().route("/status", get(status))
}
