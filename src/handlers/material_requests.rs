use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use uuid::Uuid;

use crate::context::RequestContext;
use crate::handlers::common::{created, ApiResponse, ApiResult, CreatedResult, PaginationParams};
use crate::services::material_requests::{
    CreateMaterialRequest, MaterialRequestFilters, MaterialRequestView, ReviewMaterialRequest,
    UpdateMaterialRequest,
};
use crate::AppState;

#[utoipa::path(
    post,
    path = "/api/v1/material-request",
    request_body = CreateMaterialRequest,
    responses(
        (status = 201, description = "Material request created", body = MaterialRequestView),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 401, description = "Missing caller identity", body = crate::errors::ErrorResponse),
        (status = 404, description = "Material not found", body = crate::errors::ErrorResponse)
    ),
    tag = "material-requests"
)]
pub async fn create_material_request(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(payload): Json<CreateMaterialRequest>,
) -> CreatedResult<MaterialRequestView> {
    let request = state
        .services
        .material_requests
        .create(&ctx, payload)
        .await?;
    Ok(created(
        ApiResponse::success(request).with_message("Material request created successfully"),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/material-request",
    params(MaterialRequestFilters, PaginationParams),
    responses(
        (status = 200, description = "Page of material requests", body = [MaterialRequestView]),
        (status = 400, description = "Invalid filter", body = crate::errors::ErrorResponse),
        (status = 401, description = "Missing caller identity", body = crate::errors::ErrorResponse)
    ),
    tag = "material-requests"
)]
pub async fn list_material_requests(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(filters): Query<MaterialRequestFilters>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<Vec<MaterialRequestView>> {
    let page = state
        .services
        .material_requests
        .list(&ctx, filters, pagination.page, pagination.limit)
        .await?;
    Ok(Json(ApiResponse::paginated(page)))
}

#[utoipa::path(
    get,
    path = "/api/v1/material-request/{id}",
    params(("id" = Uuid, Path, description = "Material request id")),
    responses(
        (status = 200, description = "Material request", body = MaterialRequestView),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "material-requests"
)]
pub async fn get_material_request(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> ApiResult<MaterialRequestView> {
    let request = state.services.material_requests.get_by_id(&ctx, id).await?;
    Ok(Json(ApiResponse::success(request)))
}

#[utoipa::path(
    put,
    path = "/api/v1/material-request/{id}",
    params(("id" = Uuid, Path, description = "Material request id")),
    request_body = UpdateMaterialRequest,
    responses(
        (status = 200, description = "Material request updated", body = MaterialRequestView),
        (status = 400, description = "Invalid request or no longer editable", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "material-requests"
)]
pub async fn update_material_request(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateMaterialRequest>,
) -> ApiResult<MaterialRequestView> {
    let request = state
        .services
        .material_requests
        .update(&ctx, id, payload)
        .await?;
    Ok(Json(
        ApiResponse::success(request).with_message("Material request updated successfully"),
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/material-request/{id}/submit",
    params(("id" = Uuid, Path, description = "Material request id")),
    responses(
        (status = 200, description = "Draft submitted", body = MaterialRequestView),
        (status = 400, description = "Not a draft", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "material-requests"
)]
pub async fn submit_material_request(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> ApiResult<MaterialRequestView> {
    let request = state.services.material_requests.submit(&ctx, id).await?;
    Ok(Json(
        ApiResponse::success(request).with_message("Material request submitted"),
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/material-request/{id}/approve",
    params(("id" = Uuid, Path, description = "Material request id")),
    request_body = ReviewMaterialRequest,
    responses(
        (status = 200, description = "Material request reviewed", body = MaterialRequestView),
        (status = 400, description = "Invalid decision or status", body = crate::errors::ErrorResponse),
        (status = 404, description = "Request or item not found", body = crate::errors::ErrorResponse)
    ),
    tag = "material-requests"
)]
pub async fn review_material_request(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReviewMaterialRequest>,
) -> ApiResult<MaterialRequestView> {
    let request = state
        .services
        .material_requests
        .approve_or_reject(&ctx, id, payload)
        .await?;
    let message = format!("Material request {}", request.request.status.as_str().to_lowercase());
    Ok(Json(ApiResponse::success(request).with_message(message)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/material-request/{id}",
    params(("id" = Uuid, Path, description = "Material request id")),
    responses(
        (status = 200, description = "Material request deleted"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "material-requests"
)]
pub async fn delete_material_request(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    state.services.material_requests.soft_delete(&ctx, id).await?;
    Ok(Json(ApiResponse::message(
        "Material request deleted successfully",
    )))
}
