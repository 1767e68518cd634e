//! The module contains the definition of a user and its identity endpoint.

use api_types::user::WhoAmI;
use axum::{Extension, Json};
use sea_orm::entity::prelude::*;
use uuid::Uuid;

use crate::ServerError;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub username: String,
    pub password: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Reports the identity bound to the presented credentials.
///
/// Clients scope every purchase they touch by this id.
pub async fn me(Extension(user): Extension<Model>) -> Result<Json<WhoAmI>, ServerError> {
    let id = Uuid::parse_str(&user.id).map_err(|err| ServerError::Generic(err.to_string()))?;

    Ok(Json(WhoAmI {
        id,
        username: user.username,
    }))
}
