use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ServiceError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const ORG_ID_HEADER: &str = "x-org-id";
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Who is calling and on behalf of which organization.
///
/// Every service operation takes this explicitly; handlers build it from request
/// headers. The identity is trusted as given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub caller_id: Uuid,
    pub org_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn new(caller_id: Uuid) -> Self {
        Self {
            caller_id,
            org_id: None,
            ip_address: None,
            user_agent: None,
        }
    }

    pub fn with_org(mut self, org_id: Uuid) -> Self {
        self.org_id = Some(org_id);
        self
    }

    pub fn from_headers(headers: &HeaderMap) -> Result<Self, ServiceError> {
        let caller_id = header_str(headers, USER_ID_HEADER)
            .ok_or_else(|| ServiceError::Unauthorized("Missing x-user-id header".to_string()))
            .and_then(|raw| {
                Uuid::parse_str(raw).map_err(|_| {
                    ServiceError::Unauthorized("x-user-id header is not a valid UUID".to_string())
                })
            })?;

        let org_id = header_str(headers, ORG_ID_HEADER)
            .map(|raw| {
                Uuid::parse_str(raw).map_err(|_| {
                    ServiceError::ValidationError("x-org-id header is not a valid UUID".to_string())
                })
            })
            .transpose()?;

        // first hop is the originating client
        let ip_address = header_str(headers, FORWARDED_FOR_HEADER)
            .and_then(|raw| raw.split(',').next())
            .map(|ip| ip.trim().to_string())
            .filter(|ip| !ip.is_empty());

        let user_agent = header_str(headers, header::USER_AGENT.as_str()).map(str::to_string);

        Ok(Self {
            caller_id,
            org_id,
            ip_address,
            user_agent,
        })
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers)
    }
}
