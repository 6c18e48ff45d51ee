use axum::{Json, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct Banner {
    pub name: &'static str,
    pub version: &'static str,
    pub commit: &'static str,
    pub docs: &'static str,
}

pub async fn root() -> impl IntoResponse {
    Json(Banner {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        commit: crate::GIT_COMMIT_HASH,
        docs: "/docs",
    })
}
