use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::ServiceError;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    #[sea_orm(string_value = "DRAFT")]
    Draft,
    #[sea_orm(string_value = "SUBMITTED")]
    Submitted,
    #[sea_orm(string_value = "APPROVED")]
    Approved,
    #[sea_orm(string_value = "REJECTED")]
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Submitted => "SUBMITTED",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }

    /// Whether the requester may still change the request.
    pub fn is_editable(&self) -> bool {
        matches!(self, Self::Draft | Self::Submitted)
    }

    pub fn is_review_decision(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }

    /// Legal lifecycle moves: `DRAFT -> SUBMITTED -> APPROVED | REJECTED`.
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Submitted)
                | (Self::Submitted, Self::Approved)
                | (Self::Submitted, Self::Rejected)
        )
    }

    pub fn transition_to(self, next: RequestStatus) -> Result<RequestStatus, ServiceError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(ServiceError::InvalidState(format!(
                "Cannot move material request from {} to {}",
                self.as_str(),
                next.as_str()
            )))
        }
    }

    /// Applies a review decision. With `allow_re_review` an already approved or
    /// rejected request may be reviewed again.
    pub fn review(self, decision: RequestStatus, allow_re_review: bool) -> Result<RequestStatus, ServiceError> {
        if !decision.is_review_decision() {
            return Err(ServiceError::ValidationError(
                "Status must be either APPROVED or REJECTED".to_string(),
            ));
        }
        if allow_re_review && self.is_review_decision() {
            return Ok(decision);
        }
        self.transition_to(decision)
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DRAFT" => Ok(Self::Draft),
            "SUBMITTED" => Ok(Self::Submitted),
            "APPROVED" => Ok(Self::Approved),
            "REJECTED" => Ok(Self::Rejected),
            other => Err(ServiceError::ValidationError(format!(
                "Unknown material request status: {}",
                other
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "material_requests")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// JSON array of purchase-request numbers
    #[sea_orm(column_type = "Json")]
    #[schema(value_type = Vec<String>)]
    pub pr_numbers: Json,
    pub status: RequestStatus,
    pub requested_by: Uuid,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub remarks: Option<String>,
    pub approval_remarks: Option<String>,
    pub ticket_id: Option<String>,
    pub org_id: Option<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::material_request_item::Entity")]
    Items,
    #[sea_orm(has_many = "super::material_allocation::Entity")]
    Allocations,
}

impl Related<super::material_request_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Items.def()
    }
}

impl Related<super::material_allocation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Allocations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(RequestStatus::Draft, RequestStatus::Submitted, true)]
    #[case(RequestStatus::Submitted, RequestStatus::Approved, true)]
    #[case(RequestStatus::Submitted, RequestStatus::Rejected, true)]
    #[case(RequestStatus::Draft, RequestStatus::Approved, false)]
    #[case(RequestStatus::Approved, RequestStatus::Rejected, false)]
    #[case(RequestStatus::Rejected, RequestStatus::Approved, false)]
    #[case(RequestStatus::Approved, RequestStatus::Submitted, false)]
    #[case(RequestStatus::Submitted, RequestStatus::Submitted, false)]
    fn lifecycle_transitions(
        #[case] from: RequestStatus,
        #[case] to: RequestStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
        assert_eq!(from.transition_to(to).is_ok(), allowed);
    }

    #[test]
    fn review_rejects_non_decision_status() {
        let err = RequestStatus::Submitted
            .review(RequestStatus::Draft, false)
            .unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[test]
    fn re_review_only_when_enabled() {
        assert!(RequestStatus::Approved
            .review(RequestStatus::Rejected, false)
            .is_err());
        assert_eq!(
            RequestStatus::Approved
                .review(RequestStatus::Rejected, true)
                .unwrap(),
            RequestStatus::Rejected
        );
        // re-review never reopens a draft
        assert!(RequestStatus::Draft
            .review(RequestStatus::Approved, true)
            .is_err());
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("approved".parse::<RequestStatus>().unwrap(), RequestStatus::Approved);
        assert!("PENDING".parse::<RequestStatus>().is_err());
    }

    #[test]
    fn status_serializes_in_upper_case() {
        assert_eq!(
            serde_json::to_string(&RequestStatus::Submitted).unwrap(),
            "\"SUBMITTED\""
        );
    }
}
