//! Route table.

use crate::handlers::{self, storages, volumes};
use crate::state::AppState;
use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/health", get(handlers::health_check))
        // Volumes in a namespace.
        .route(
            "/v1/namespaces/{ns_id}/volumes",
            post(volumes::create_volume)
                .get(volumes::list_namespace_volumes)
                .delete(volumes::delete_namespace_volumes),
        )
        .route(
            "/v1/namespaces/{ns_id}/volumes/import",
            post(volumes::import_volume),
        )
        .route(
            "/v1/namespaces/{ns_id}/volumes/{label}",
            get(volumes::get_volume)
                .put(volumes::resize_volume)
                .delete(volumes::delete_volume),
        )
        .route(
            "/v1/namespaces/{ns_id}/volumes/{label}/name",
            put(volumes::rename_volume),
        )
        // Admin variants with explicit capacity.
        .route(
            "/v1/admin/namespaces/{ns_id}/volumes",
            post(volumes::admin_create_volume),
        )
        .route(
            "/v1/admin/namespaces/{ns_id}/volumes/{label}",
            put(volumes::admin_resize_volume),
        )
        .route("/v1/admin/volumes", get(volumes::list_all_volumes))
        // The caller's own volumes, across namespaces.
        .route(
            "/v1/volumes",
            get(volumes::list_user_volumes).delete(volumes::delete_user_volumes),
        )
        // Storage backends.
        .route(
            "/v1/storages",
            get(storages::list_storages).post(storages::create_storage),
        )
        .route(
            "/v1/storages/{name}",
            put(storages::update_storage).delete(storages::delete_storage),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
