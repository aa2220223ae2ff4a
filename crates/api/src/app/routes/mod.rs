use axum::Router;

pub mod records;
pub mod system;

pub fn router() -> Router {
    Router::new().merge(records::router())
}
