use axum::{
    extract::{Query, State},
    response::Json,
};

use crate::context::RequestContext;
use crate::entities::audit_log;
use crate::handlers::common::{ApiResponse, ApiResult, PaginationParams};
use crate::services::audit_logs::AuditLogFilters;
use crate::AppState;

#[utoipa::path(
    get,
    path = "/api/v1/audit-logs",
    params(AuditLogFilters, PaginationParams),
    responses(
        (status = 200, description = "Page of audit entries, newest first", body = [audit_log::Model]),
        (status = 401, description = "Missing caller identity", body = crate::errors::ErrorResponse)
    ),
    tag = "audit-logs"
)]
pub async fn list_audit_logs(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(filters): Query<AuditLogFilters>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<Vec<audit_log::Model>> {
    let page = state
        .services
        .audit_logs
        .list(&ctx, filters, pagination.page, pagination.limit)
        .await?;
    Ok(Json(ApiResponse::paginated(page)))
}
