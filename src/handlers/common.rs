use axum::{http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::errors::ServiceError;
use crate::services::{Page, Pagination};

/// Success envelope shared by every endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Present on list responses only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            pagination: None,
            request_id: current_request_id(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl ApiResponse<()> {
    /// Envelope without a payload, e.g. after a delete
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
            pagination: None,
            request_id: current_request_id(),
        }
    }
}

impl<T> ApiResponse<Vec<T>> {
    pub fn paginated(page: Page<T>) -> Self {
        Self {
            success: true,
            data: Some(page.items),
            message: None,
            pagination: Some(page.pagination),
            request_id: current_request_id(),
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ServiceError>;

/// Result type for endpoints answering `201 Created`
pub type CreatedResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ServiceError>;

pub fn created<T>(body: ApiResponse<T>) -> (StatusCode, Json<ApiResponse<T>>) {
    (StatusCode::CREATED, Json(body))
}

/// Pagination parameters for list operations
#[derive(Debug, Default, Deserialize, Serialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PaginationParams {
    /// Page number (1-indexed, default 1)
    pub page: Option<u64>,
    /// Page size (defaults and maximum come from configuration)
    pub limit: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::PageRequest;

    #[tokio::test]
    async fn success_envelope_carries_request_id() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-123"), async {
                ApiResponse::success("ok")
            })
            .await;
        assert!(response.success);
        assert_eq!(response.request_id.as_deref(), Some("meta-123"));
    }

    #[test]
    fn paginated_envelope_shape() {
        let page = Page::new(vec![1, 2], 2, PageRequest::normalize(None, Some(10), 20, 100));
        let value = serde_json::to_value(ApiResponse::paginated(page)).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["data"], serde_json::json!([1, 2]));
        assert_eq!(value["pagination"]["totalPages"], 1);
        assert_eq!(value["pagination"]["itemsPerPage"], 10);
        assert!(value.get("message").is_none());
    }

    #[test]
    fn message_envelope_has_no_data() {
        let value = serde_json::to_value(ApiResponse::message("Deleted")).unwrap();
        assert_eq!(value["message"], "Deleted");
        assert!(value.get("data").is_none());
    }
}
