//! Volume endpoints.
//!
//! User endpoints are scoped by the caller identity; admin endpoints see
//! every field. The response masks the storage assignment and the owner for
//! non-admin callers.

use crate::auth::Identity;
use crate::error::ApiResult;
use crate::service::volumes::ImportParams;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use cistern_ledger::VolumeRow;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateVolumeRequest {
    pub label: String,
    /// Nil selects the namespace quota instead of a tariff.
    #[serde(default)]
    pub tariff_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct AdminCreateVolumeRequest {
    pub label: String,
    pub capacity: i64,
    pub storage: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ImportVolumeRequest {
    pub name: String,
    pub capacity: i64,
    pub storage: String,
    pub owner: Option<Uuid>,
    pub access_mode: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResizeVolumeRequest {
    pub tariff_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct AdminResizeVolumeRequest {
    pub capacity: i64,
}

#[derive(Debug, Deserialize)]
pub struct RenameVolumeRequest {
    pub label: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// Comma-separated filter names.
    pub filters: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VolumeResponse {
    pub id: Uuid,
    pub namespace_id: String,
    pub label: String,
    pub capacity: i64,
    pub access_mode: String,
    pub provision_state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tariff_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<String>,
    pub deleted: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl VolumeResponse {
    fn from_row(row: VolumeRow, admin: bool) -> Self {
        Self {
            id: row.volume_id,
            namespace_id: row.namespace_id,
            label: row.label,
            capacity: row.capacity,
            access_mode: row.access_mode,
            provision_state: row.provision_state,
            tariff_id: row.tariff_id,
            owner: admin.then_some(row.owner_user_id),
            storage: admin.then_some(row.storage_name),
            deleted: row.deleted,
            created_at: row.created_at,
        }
    }

    fn from_rows(rows: Vec<VolumeRow>, admin: bool) -> Vec<Self> {
        rows.into_iter()
            .map(|row| Self::from_row(row, admin))
            .collect()
    }
}

pub async fn create_volume(
    State(state): State<AppState>,
    identity: Identity,
    Path(ns_id): Path<String>,
    Json(request): Json<CreateVolumeRequest>,
) -> ApiResult<(StatusCode, Json<VolumeResponse>)> {
    let row = state
        .service
        .create_volume(
            identity.user_id,
            identity.is_admin(),
            &ns_id,
            &request.label,
            request.tariff_id,
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(VolumeResponse::from_row(row, identity.is_admin())),
    ))
}

pub async fn admin_create_volume(
    State(state): State<AppState>,
    identity: Identity,
    Path(ns_id): Path<String>,
    Json(request): Json<AdminCreateVolumeRequest>,
) -> ApiResult<(StatusCode, Json<VolumeResponse>)> {
    identity.require_admin()?;
    let row = state
        .service
        .admin_create_volume(
            identity.user_id,
            &ns_id,
            &request.label,
            request.capacity,
            request.storage,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(VolumeResponse::from_row(row, true))))
}

pub async fn import_volume(
    State(state): State<AppState>,
    identity: Identity,
    Path(ns_id): Path<String>,
    Json(request): Json<ImportVolumeRequest>,
) -> ApiResult<(StatusCode, Json<VolumeResponse>)> {
    identity.require_admin()?;
    let row = state
        .service
        .import_volume(
            &ns_id,
            ImportParams {
                name: request.name,
                capacity: request.capacity,
                storage: request.storage,
                owner: request.owner,
                access_mode: request.access_mode,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(VolumeResponse::from_row(row, true))))
}

pub async fn get_volume(
    State(state): State<AppState>,
    identity: Identity,
    Path((ns_id, label)): Path<(String, String)>,
) -> ApiResult<Json<VolumeResponse>> {
    let row = state.service.get_volume(&ns_id, &label).await?;
    Ok(Json(VolumeResponse::from_row(row, identity.is_admin())))
}

pub async fn list_namespace_volumes(
    State(state): State<AppState>,
    identity: Identity,
    Path(ns_id): Path<String>,
) -> ApiResult<Json<Vec<VolumeResponse>>> {
    let rows = state.service.namespace_volumes(&ns_id).await?;
    Ok(Json(VolumeResponse::from_rows(rows, identity.is_admin())))
}

pub async fn list_user_volumes(
    State(state): State<AppState>,
    identity: Identity,
) -> ApiResult<Json<Vec<VolumeResponse>>> {
    let rows = state.service.user_volumes(identity.user_id).await?;
    Ok(Json(VolumeResponse::from_rows(rows, identity.is_admin())))
}

pub async fn list_all_volumes(
    State(state): State<AppState>,
    identity: Identity,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<VolumeResponse>>> {
    identity.require_admin()?;
    let rows = state
        .service
        .all_volumes(query.page, query.per_page, query.filters.as_deref())
        .await?;
    Ok(Json(VolumeResponse::from_rows(rows, true)))
}

pub async fn resize_volume(
    State(state): State<AppState>,
    identity: Identity,
    Path((ns_id, label)): Path<(String, String)>,
    Json(request): Json<ResizeVolumeRequest>,
) -> ApiResult<Json<VolumeResponse>> {
    let row = state
        .service
        .resize_volume(
            identity.user_id,
            identity.is_admin(),
            &ns_id,
            &label,
            request.tariff_id,
        )
        .await?;
    Ok(Json(VolumeResponse::from_row(row, identity.is_admin())))
}

pub async fn admin_resize_volume(
    State(state): State<AppState>,
    identity: Identity,
    Path((ns_id, label)): Path<(String, String)>,
    Json(request): Json<AdminResizeVolumeRequest>,
) -> ApiResult<Json<VolumeResponse>> {
    identity.require_admin()?;
    let row = state
        .service
        .admin_resize_volume(&ns_id, &label, request.capacity)
        .await?;
    Ok(Json(VolumeResponse::from_row(row, true)))
}

pub async fn rename_volume(
    State(state): State<AppState>,
    identity: Identity,
    Path((ns_id, label)): Path<(String, String)>,
    Json(request): Json<RenameVolumeRequest>,
) -> ApiResult<Json<VolumeResponse>> {
    let row = state
        .service
        .rename_volume(identity.user_id, &ns_id, &label, &request.label)
        .await?;
    Ok(Json(VolumeResponse::from_row(row, identity.is_admin())))
}

pub async fn delete_volume(
    State(state): State<AppState>,
    identity: Identity,
    Path((ns_id, label)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    state
        .service
        .delete_volume(identity.user_id, &ns_id, &label)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_namespace_volumes(
    State(state): State<AppState>,
    identity: Identity,
    Path(ns_id): Path<String>,
) -> ApiResult<StatusCode> {
    identity.require_admin()?;
    state
        .service
        .delete_all_namespace_volumes(identity.user_id, &ns_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_user_volumes(
    State(state): State<AppState>,
    identity: Identity,
) -> ApiResult<StatusCode> {
    state
        .service
        .delete_all_user_volumes(identity.user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
