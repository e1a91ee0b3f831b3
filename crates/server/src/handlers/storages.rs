//! Storage backend endpoints. Admin only.

use crate::auth::Identity;
use crate::error::ApiResult;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use cistern_ledger::repos::{NewStorage, StorageRepo, StorageUpdate};
use cistern_ledger::StorageRow;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateStorageRequest {
    pub name: String,
    pub size: i64,
    #[serde(default = "default_replicas")]
    pub replicas: i32,
}

fn default_replicas() -> i32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct UpdateStorageRequest {
    pub name: Option<String>,
    pub size: Option<i64>,
    pub replicas: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct StorageResponse {
    pub id: Uuid,
    pub name: String,
    pub size: i64,
    pub used: i64,
    pub free: i64,
    pub replicas: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<StorageRow> for StorageResponse {
    fn from(row: StorageRow) -> Self {
        let free = row.free();
        Self {
            id: row.storage_id,
            name: row.name,
            size: row.size,
            used: row.used,
            free,
            replicas: row.replicas,
            created_at: row.created_at,
        }
    }
}

pub async fn create_storage(
    State(state): State<AppState>,
    identity: Identity,
    Json(request): Json<CreateStorageRequest>,
) -> ApiResult<(StatusCode, Json<StorageResponse>)> {
    identity.require_admin()?;
    let row = state
        .store
        .create_storage(&NewStorage {
            name: request.name,
            size: request.size,
            replicas: request.replicas,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(row.into())))
}

pub async fn list_storages(
    State(state): State<AppState>,
    identity: Identity,
) -> ApiResult<Json<Vec<StorageResponse>>> {
    identity.require_admin()?;
    let rows = state.store.all_storages().await?;
    Ok(Json(rows.into_iter().map(StorageResponse::from).collect()))
}

pub async fn update_storage(
    State(state): State<AppState>,
    identity: Identity,
    Path(name): Path<String>,
    Json(request): Json<UpdateStorageRequest>,
) -> ApiResult<Json<StorageResponse>> {
    identity.require_admin()?;
    let row = state
        .store
        .update_storage(
            &name,
            &StorageUpdate {
                name: request.name,
                size: request.size,
                replicas: request.replicas,
            },
        )
        .await?;
    Ok(Json(row.into()))
}

pub async fn delete_storage(
    State(state): State<AppState>,
    identity: Identity,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    identity.require_admin()?;
    state.store.delete_storage(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}
