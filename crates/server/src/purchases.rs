//! Purchases API endpoints

use api_types::changes::ChangeKind;
use api_types::purchase::{PurchaseListResponse, PurchaseNew, PurchaseView};
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use sea_orm::{ActiveValue, QueryOrder, entity::prelude::*};
use uuid::Uuid;

use crate::{ServerError, server::ServerState, user};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "purchases")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub price_minor: i64,
    pub date: Date,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

fn view(model: Model) -> Result<PurchaseView, ServerError> {
    let id = Uuid::parse_str(&model.id).map_err(|err| ServerError::Generic(err.to_string()))?;

    Ok(PurchaseView {
        id,
        name: model.name,
        price_minor: model.price_minor,
        date: model.date,
        created_at: model.created_at.fixed_offset(),
    })
}

/// Lists the caller's purchases, newest first.
pub async fn list(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
) -> Result<Json<PurchaseListResponse>, ServerError> {
    let rows = Entity::find()
        .filter(Column::UserId.eq(&user.id))
        .order_by_desc(Column::Date)
        .order_by_desc(Column::CreatedAt)
        .all(&state.db)
        .await?;

    let mut purchases = Vec::with_capacity(rows.len());
    for row in rows {
        purchases.push(view(row)?);
    }

    Ok(Json(PurchaseListResponse { purchases }))
}

/// Records a purchase for the caller.
pub async fn create(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    Json(payload): Json<PurchaseNew>,
) -> Result<(StatusCode, Json<PurchaseView>), ServerError> {
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(ServerError::Invalid("name must not be empty".to_string()));
    }
    if payload.price_minor <= 0 {
        return Err(ServerError::Invalid("price must be positive".to_string()));
    }

    let row = ActiveModel {
        id: ActiveValue::Set(Uuid::new_v4().to_string()),
        user_id: ActiveValue::Set(user.id.clone()),
        name: ActiveValue::Set(name),
        price_minor: ActiveValue::Set(payload.price_minor),
        date: ActiveValue::Set(payload.date),
        created_at: ActiveValue::Set(Utc::now()),
    }
    .insert(&state.db)
    .await?;

    state.changes.publish(ChangeKind::Insert);

    Ok((StatusCode::CREATED, Json(view(row)?)))
}

/// Deletes one of the caller's purchases.
///
/// Rows owned by other users are reported as missing, never as forbidden.
pub async fn remove(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServerError> {
    let row = Entity::find_by_id(id.to_string())
        .filter(Column::UserId.eq(&user.id))
        .one(&state.db)
        .await?;

    let Some(row) = row else {
        return Err(ServerError::NotFound);
    };

    row.delete(&state.db).await?;
    state.changes.publish(ChangeKind::Delete);

    Ok(StatusCode::NO_CONTENT)
}
