pub mod invocations;
pub mod status;

use crate::state::AppState;
use axum::Router;

pub fn configure(state: AppState) -> Router {
    Router::new()
        .merge(invocations::routes(state))
        .merge(status::routes())
}
