use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::context::RequestContext;
use crate::entities::notification;
use crate::handlers::common::{ApiResponse, ApiResult, PaginationParams};
use crate::AppState;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NotificationQuery {
    /// Only return unread notifications
    #[serde(default)]
    pub unread_only: bool,
}

#[utoipa::path(
    get,
    path = "/api/v1/notifications",
    params(NotificationQuery, PaginationParams),
    responses(
        (status = 200, description = "The caller's notifications, newest first", body = [notification::Model]),
        (status = 401, description = "Missing caller identity", body = crate::errors::ErrorResponse)
    ),
    tag = "notifications"
)]
pub async fn list_notifications(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<NotificationQuery>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<Vec<notification::Model>> {
    let page = state
        .services
        .notifications
        .list_for_user(&ctx, query.unread_only, pagination.page, pagination.limit)
        .await?;
    Ok(Json(ApiResponse::paginated(page)))
}

#[utoipa::path(
    put,
    path = "/api/v1/notifications/{id}/read",
    params(("id" = Uuid, Path, description = "Notification id")),
    responses(
        (status = 200, description = "Notification marked as read", body = notification::Model),
        (status = 404, description = "Not one of the caller's notifications", body = crate::errors::ErrorResponse)
    ),
    tag = "notifications"
)]
pub async fn mark_notification_read(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> ApiResult<notification::Model> {
    let updated = state.services.notifications.mark_read(&ctx, id).await?;
    Ok(Json(ApiResponse::success(updated)))
}
