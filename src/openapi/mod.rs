use axum::response::Json;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Material Allocation API",
        version = "0.1.0",
        description = r#"
# Material Allocation API

Warehouse back office for material requests and serialized stock allocation.

## Caller identity

Every `/api/v1` route requires an `x-user-id` header (UUID). `x-org-id` optionally
scopes reads and writes to one organization.

## Errors

```json
{
  "success": false,
  "error": "Bad Request",
  "message": "Material request 7f3c... is not an active approved request",
  "request_id": "req-abc123",
  "timestamp": "2026-01-01T00:00:00Z"
}
```

## Pagination

List endpoints accept `page` (default 1) and `limit` and answer with a
`pagination` object: `totalItems`, `totalPages`, `currentPage`, `itemsPerPage`.
        "#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "material-requests", description = "Material request lifecycle"),
        (name = "allocations", description = "Allocation of inventory units to request items"),
        (name = "audit-logs", description = "Audit trail"),
        (name = "notifications", description = "User notifications"),
        (name = "health", description = "Health check")
    ),
    paths(
        crate::handlers::material_requests::create_material_request,
        crate::handlers::material_requests::list_material_requests,
        crate::handlers::material_requests::get_material_request,
        crate::handlers::material_requests::update_material_request,
        crate::handlers::material_requests::submit_material_request,
        crate::handlers::material_requests::review_material_request,
        crate::handlers::material_requests::delete_material_request,
        crate::handlers::allocations::list_available_stock,
        crate::handlers::allocations::allocate_materials,
        crate::handlers::allocations::list_allocations,
        crate::handlers::allocations::cancel_allocation,
        crate::handlers::audit_logs::list_audit_logs,
        crate::handlers::notifications::list_notifications,
        crate::handlers::notifications::mark_notification_read,
        crate::handlers::health::health_check,
    ),
    components(
        schemas(
            crate::services::Pagination,
            crate::services::lookups::UserProfile,
            crate::services::material_requests::CreateMaterialRequest,
            crate::services::material_requests::UpdateMaterialRequest,
            crate::services::material_requests::ReviewMaterialRequest,
            crate::services::material_requests::RequestItemInput,
            crate::services::material_requests::ApprovedItemInput,
            crate::services::material_requests::MaterialRequestView,
            crate::services::material_requests::RequestItemView,
            crate::services::allocations::AllocateMaterials,
            crate::services::allocations::AllocationEntry,
            crate::services::allocations::AllocationView,
            crate::services::allocations::ItemAllocations,
            crate::services::allocations::AvailableStock,
            crate::services::allocations::StockGroup,
            crate::entities::material_request::RequestStatus,
            crate::entities::material_allocation::AllocationStatus,
            crate::entities::inventory_unit::InventoryStatus,
            crate::entities::inventory_unit::LocationType,
            crate::entities::audit_log::AuditAction,
            crate::entities::notification::NotificationKind,
            crate::handlers::health::HealthReport,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

/// Serves the generated document at `/api-docs/openapi.json`.
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDocV1::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_material_request_routes() {
        let json = serde_json::to_string(&ApiDocV1::openapi()).unwrap();
        assert!(json.contains("Material Allocation API"));
        assert!(json.contains("/api/v1/material-request/{id}/allocate"));
        assert!(json.contains("/api/v1/notifications/{id}/read"));
    }
}
