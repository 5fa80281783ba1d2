use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use uuid::Uuid;

use crate::context::RequestContext;
use crate::handlers::common::{created, ApiResponse, ApiResult, CreatedResult};
use crate::services::allocations::{
    AllocateMaterials, AllocationView, AvailableStock, AvailableStockFilters, ItemAllocations,
};
use crate::AppState;

#[utoipa::path(
    get,
    path = "/api/v1/material-request/{id}/available-stock",
    params(
        ("id" = Uuid, Path, description = "Material request id"),
        AvailableStockFilters
    ),
    responses(
        (status = 200, description = "Allocatable warehouse stock", body = AvailableStock),
        (status = 404, description = "Material request not found", body = crate::errors::ErrorResponse)
    ),
    tag = "allocations"
)]
pub async fn list_available_stock(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Query(filters): Query<AvailableStockFilters>,
) -> ApiResult<AvailableStock> {
    let stock = state
        .services
        .allocations
        .list_available_stock(&ctx, id, filters)
        .await?;
    Ok(Json(ApiResponse::success(stock)))
}

#[utoipa::path(
    post,
    path = "/api/v1/material-request/{id}/allocate",
    params(("id" = Uuid, Path, description = "Material request id")),
    request_body = AllocateMaterials,
    responses(
        (status = 201, description = "Inventory allocated", body = [AllocationView]),
        (status = 400, description = "Not approved, quantity exceeded, or unit already allocated", body = crate::errors::ErrorResponse),
        (status = 404, description = "Item or unit not found", body = crate::errors::ErrorResponse)
    ),
    tag = "allocations"
)]
pub async fn allocate_materials(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<AllocateMaterials>,
) -> CreatedResult<Vec<AllocationView>> {
    let allocations = state.services.allocations.allocate(&ctx, id, payload).await?;
    let message = format!("{} inventory unit(s) allocated", allocations.len());
    Ok(created(ApiResponse::success(allocations).with_message(message)))
}

#[utoipa::path(
    get,
    path = "/api/v1/material-request/{id}/allocations",
    params(("id" = Uuid, Path, description = "Material request id")),
    responses(
        (status = 200, description = "Allocations grouped by request item", body = [ItemAllocations]),
        (status = 404, description = "Material request not found", body = crate::errors::ErrorResponse)
    ),
    tag = "allocations"
)]
pub async fn list_allocations(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<ItemAllocations>> {
    let grouped = state.services.allocations.list_allocations(&ctx, id).await?;
    Ok(Json(ApiResponse::success(grouped)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/material-request/{id}/allocations/{allocation_id}",
    params(
        ("id" = Uuid, Path, description = "Material request id"),
        ("allocation_id" = Uuid, Path, description = "Allocation id")
    ),
    responses(
        (status = 200, description = "Allocation cancelled", body = AllocationView),
        (status = 404, description = "No active allocation with these ids", body = crate::errors::ErrorResponse)
    ),
    tag = "allocations"
)]
pub async fn cancel_allocation(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((id, allocation_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<AllocationView> {
    let cancelled = state
        .services
        .allocations
        .cancel_allocation(&ctx, id, allocation_id)
        .await?;
    Ok(Json(
        ApiResponse::success(cancelled).with_message("Allocation cancelled successfully"),
    ))
}
