use axum::{Json, http::StatusCode, response::IntoResponse};
use sea_orm::DbErr;

use serde::Serialize;
pub use server::{run_with_listener, spawn_with_listener};

mod changes;
mod purchases;
mod server;
mod user;

pub mod types {
    pub mod purchase {
        pub use api_types::purchase::{PurchaseListResponse, PurchaseNew, PurchaseView};
    }

    pub mod changes {
        pub use api_types::changes::{ChangeKind, ChangePoll, ChangesResponse};
    }

    pub mod user {
        pub use api_types::user::WhoAmI;
    }
}

pub enum ServerError {
    Invalid(String),
    NotFound,
    Database(DbErr),
    Generic(String),
}

//TODO: share the error body with the client instead of redefining it there
#[derive(Serialize)]
struct Error {
    error: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        let (status, error) = match self {
            ServerError::Invalid(reason) => (StatusCode::UNPROCESSABLE_ENTITY, reason),
            ServerError::NotFound => (StatusCode::NOT_FOUND, "not found".to_string()),
            ServerError::Database(err) => {
                tracing::error!("database error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
            ServerError::Generic(err) => (StatusCode::BAD_REQUEST, err),
        };

        (status, Json(Error { error })).into_response()
    }
}

impl From<DbErr> for ServerError {
    fn from(value: DbErr) -> Self {
        Self::Database(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_422() {
        let res = ServerError::Invalid("name must not be empty".to_string()).into_response();
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn not_found_maps_to_404() {
        let res = ServerError::NotFound.into_response();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn database_maps_to_500() {
        let res = ServerError::from(DbErr::Custom("boom".to_string())).into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn generic_maps_to_400() {
        let res = ServerError::Generic("bad".to_string()).into_response();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
