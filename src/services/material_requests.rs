//! Material request lifecycle: create, submit, edit, review and soft-delete.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::config::SubmissionPolicy;
use crate::context::RequestContext;
use crate::db;
use crate::entities::{
    material, material_allocation,
    material_allocation::AllocationStatus,
    material_request::{self, RequestStatus},
    material_request_item,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::lookups::{self, UserProfile};
use crate::services::{Page, ServiceSettings};

/// One requested material line.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct RequestItemInput {
    pub material_id: Uuid,
    pub quantity: i32,
    /// Defaults to the material's unit of measure
    #[validate(length(max = 20))]
    pub unit_of_measure: Option<String>,
    #[validate(length(max = 1000))]
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateMaterialRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "At least one PR number is required"))]
    pub pr_numbers: Vec<String>,
    #[serde(default)]
    #[validate(length(min = 1, message = "At least one item is required"))]
    pub items: Vec<RequestItemInput>,
    #[validate(length(max = 2000))]
    pub remarks: Option<String>,
    #[validate(length(max = 100))]
    pub ticket_id: Option<String>,
}

/// Partial update; `items`, when present, replaces every existing line.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateMaterialRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, message = "At least one PR number is required"))]
    pub pr_numbers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 2000))]
    pub remarks: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 100))]
    pub ticket_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, message = "At least one item is required"))]
    pub items: Option<Vec<RequestItemInput>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApprovedItemInput {
    pub item_id: Uuid,
    /// Absent or zero means "the requested quantity"
    pub quantity_approved: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReviewMaterialRequest {
    /// `APPROVED` or `REJECTED`
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub approved_items: Option<Vec<ApprovedItemInput>>,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MaterialRequestFilters {
    /// DRAFT, SUBMITTED, APPROVED or REJECTED
    pub status: Option<String>,
    pub requested_by: Option<Uuid>,
    /// Include soft-deleted requests
    #[serde(default)]
    pub show_inactive: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RequestItemView {
    #[serde(flatten)]
    pub item: material_request_item::Model,
    pub material: Option<material::Model>,
    /// Units currently allocated or transferred against this line
    pub allocated_quantity: u64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MaterialRequestView {
    #[serde(flatten)]
    pub request: material_request::Model,
    pub items: Vec<RequestItemView>,
    pub requester: Option<UserProfile>,
    pub approver: Option<UserProfile>,
}

fn validate_pr_numbers(pr_numbers: &[String]) -> Result<(), ServiceError> {
    if pr_numbers.is_empty() {
        return Err(ServiceError::ValidationError(
            "At least one PR number is required".to_string(),
        ));
    }
    if pr_numbers.iter().any(|pr| pr.trim().is_empty()) {
        return Err(ServiceError::ValidationError(
            "PR numbers must not be blank".to_string(),
        ));
    }
    Ok(())
}

fn validate_items(items: &[RequestItemInput]) -> Result<(), ServiceError> {
    if items.is_empty() {
        return Err(ServiceError::ValidationError(
            "At least one item is required".to_string(),
        ));
    }
    if let Some(item) = items.iter().find(|item| item.quantity < 1) {
        return Err(ServiceError::ValidationError(format!(
            "Quantity for material {} must be at least 1",
            item.material_id
        )));
    }
    Ok(())
}

fn pr_numbers_json(pr_numbers: &[String]) -> serde_json::Value {
    json!(pr_numbers.iter().map(|pr| pr.trim()).collect::<Vec<_>>())
}

#[derive(Clone)]
pub struct MaterialRequestService {
    db_pool: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    settings: ServiceSettings,
}

impl MaterialRequestService {
    pub fn new(
        db_pool: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            settings,
        }
    }

    /// Creates a request with its items. The initial status follows the
    /// configured submission policy.
    #[instrument(skip(self, ctx, input), fields(caller_id = %ctx.caller_id))]
    pub async fn create(
        &self,
        ctx: &RequestContext,
        input: CreateMaterialRequest,
    ) -> Result<MaterialRequestView, ServiceError> {
        validate_pr_numbers(&input.pr_numbers)?;
        validate_items(&input.items)?;
        input.validate()?;
        let changes = serde_json::to_value(&input)?;

        let txn = db::begin(&self.db_pool).await?;
        let result = self.insert_request(&txn, ctx, &input).await;
        let request = db::settle(txn, result).await?;

        info!(request_id = %request.id, status = %request.status, "Material request created");
        self.event_sender.publish(Event::RequestCreated {
            request_id: request.id,
            ctx: ctx.clone(),
            changes,
        });

        self.view(request).await
    }

    async fn insert_request(
        &self,
        txn: &DatabaseTransaction,
        ctx: &RequestContext,
        input: &CreateMaterialRequest,
    ) -> Result<material_request::Model, ServiceError> {
        let materials =
            lookups::resolve_materials(txn, ctx, input.items.iter().map(|i| i.material_id)).await?;

        let status = match self.settings.submission_policy {
            SubmissionPolicy::AutoSubmit => RequestStatus::Submitted,
            SubmissionPolicy::Draft => RequestStatus::Draft,
        };
        let now = Utc::now();
        let request = material_request::ActiveModel {
            id: Set(Uuid::new_v4()),
            pr_numbers: Set(pr_numbers_json(&input.pr_numbers)),
            status: Set(status),
            requested_by: Set(ctx.caller_id),
            approved_by: Set(None),
            approved_at: Set(None),
            remarks: Set(input.remarks.clone()),
            approval_remarks: Set(None),
            ticket_id: Set(input.ticket_id.clone()),
            org_id: Set(ctx.org_id),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(txn)
        .await?;

        insert_items(txn, request.id, &input.items, &materials).await?;
        Ok(request)
    }

    /// Moves a draft into review.
    #[instrument(skip(self, ctx), fields(caller_id = %ctx.caller_id))]
    pub async fn submit(
        &self,
        ctx: &RequestContext,
        id: Uuid,
    ) -> Result<MaterialRequestView, ServiceError> {
        let request = lookups::require_active_request(&*self.db_pool, ctx, id).await?;
        let next = request.status.transition_to(RequestStatus::Submitted)?;

        let mut active = request.into_active_model();
        active.status = Set(next);
        active.updated_at = Set(Utc::now());
        let request = active.update(&*self.db_pool).await?;

        info!(request_id = %id, "Material request submitted");
        self.event_sender.publish(Event::RequestSubmitted {
            request_id: id,
            ctx: ctx.clone(),
        });

        self.view(request).await
    }

    #[instrument(skip(self, ctx), fields(caller_id = %ctx.caller_id))]
    pub async fn list(
        &self,
        ctx: &RequestContext,
        filters: MaterialRequestFilters,
        page: Option<u64>,
        limit: Option<u64>,
    ) -> Result<Page<MaterialRequestView>, ServiceError> {
        let request = self.settings.page_request(page, limit);

        let mut query = lookups::scoped_requests(ctx);
        if let Some(status) = filters.status.as_deref().filter(|s| !s.trim().is_empty()) {
            let status: RequestStatus = status.parse()?;
            query = query.filter(material_request::Column::Status.eq(status));
        }
        if let Some(requested_by) = filters.requested_by {
            query = query.filter(material_request::Column::RequestedBy.eq(requested_by));
        }
        if !filters.show_inactive {
            query = query.filter(material_request::Column::IsActive.eq(true));
        }

        let paginator = query
            .order_by_desc(material_request::Column::CreatedAt)
            .order_by_desc(material_request::Column::Id)
            .paginate(&*self.db_pool, request.limit);
        let total = paginator.num_items().await?;
        let requests = paginator.fetch_page(request.index()).await?;

        let views = load_views(&*self.db_pool, requests).await?;
        Ok(Page::new(views, total, request))
    }

    #[instrument(skip(self, ctx), fields(caller_id = %ctx.caller_id))]
    pub async fn get_by_id(
        &self,
        ctx: &RequestContext,
        id: Uuid,
    ) -> Result<MaterialRequestView, ServiceError> {
        let request = lookups::require_active_request(&*self.db_pool, ctx, id).await?;
        self.view(request).await
    }

    /// Edits a request the caller still owns. Replacing items drops the old lines.
    #[instrument(skip(self, ctx, patch), fields(caller_id = %ctx.caller_id))]
    pub async fn update(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        patch: UpdateMaterialRequest,
    ) -> Result<MaterialRequestView, ServiceError> {
        if let Some(pr_numbers) = &patch.pr_numbers {
            validate_pr_numbers(pr_numbers)?;
        }
        if let Some(items) = &patch.items {
            validate_items(items)?;
        }
        patch.validate()?;
        let changes = serde_json::to_value(&patch)?;

        let txn = db::begin(&self.db_pool).await?;
        let result = self.apply_update(&txn, ctx, id, &patch).await;
        let request = db::settle(txn, result).await?;

        info!(request_id = %id, "Material request updated");
        self.event_sender.publish(Event::RequestUpdated {
            request_id: id,
            ctx: ctx.clone(),
            changes,
        });

        self.view(request).await
    }

    async fn apply_update(
        &self,
        txn: &DatabaseTransaction,
        ctx: &RequestContext,
        id: Uuid,
        patch: &UpdateMaterialRequest,
    ) -> Result<material_request::Model, ServiceError> {
        let request = lookups::require_active_request(txn, ctx, id).await?;
        if request.requested_by != ctx.caller_id || !request.status.is_editable() {
            return Err(ServiceError::InvalidState(
                "Material request can no longer be edited".to_string(),
            ));
        }

        if let Some(items) = &patch.items {
            let materials =
                lookups::resolve_materials(txn, ctx, items.iter().map(|i| i.material_id)).await?;
            material_request_item::Entity::delete_many()
                .filter(material_request_item::Column::MaterialRequestId.eq(id))
                .exec(txn)
                .await?;
            insert_items(txn, id, items, &materials).await?;
        }

        let mut active = request.into_active_model();
        if let Some(pr_numbers) = &patch.pr_numbers {
            active.pr_numbers = Set(pr_numbers_json(pr_numbers));
        }
        if let Some(remarks) = &patch.remarks {
            active.remarks = Set(Some(remarks.clone()));
        }
        if let Some(ticket_id) = &patch.ticket_id {
            active.ticket_id = Set(Some(ticket_id.clone()));
        }
        active.updated_at = Set(Utc::now());
        Ok(active.update(txn).await?)
    }

    /// Approves or rejects a submitted request, optionally fixing approved quantities.
    #[instrument(skip(self, ctx, review), fields(caller_id = %ctx.caller_id, decision = %review.status))]
    pub async fn approve_or_reject(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        review: ReviewMaterialRequest,
    ) -> Result<MaterialRequestView, ServiceError> {
        let decision: RequestStatus = review.status.parse()?;
        if !decision.is_review_decision() {
            return Err(ServiceError::ValidationError(
                "Status must be either APPROVED or REJECTED".to_string(),
            ));
        }

        let txn = db::begin(&self.db_pool).await?;
        let result = self.apply_review(&txn, ctx, id, decision, &review).await;
        let request = db::settle(txn, result).await?;

        info!(request_id = %id, status = %decision, "Material request reviewed");
        self.event_sender.publish(Event::RequestReviewed {
            request_id: id,
            requester_id: request.requested_by,
            decision,
            remarks: review.remarks.clone(),
            ctx: ctx.clone(),
        });

        self.view(request).await
    }

    async fn apply_review(
        &self,
        txn: &DatabaseTransaction,
        ctx: &RequestContext,
        id: Uuid,
        decision: RequestStatus,
        review: &ReviewMaterialRequest,
    ) -> Result<material_request::Model, ServiceError> {
        let request = lookups::require_active_request(txn, ctx, id).await?;
        let next = request
            .status
            .review(decision, self.settings.allow_re_review)?;

        if next == RequestStatus::Approved {
            if let Some(approved_items) = review.approved_items.as_deref() {
                apply_approved_quantities(txn, id, approved_items).await?;
            }
        }

        let now = Utc::now();
        let mut active = request.into_active_model();
        active.status = Set(next);
        active.approved_by = Set(Some(ctx.caller_id));
        active.approved_at = Set(Some(now));
        active.approval_remarks = Set(review.remarks.clone());
        active.updated_at = Set(now);
        Ok(active.update(txn).await?)
    }

    /// Hides a request from normal reads. Items, allocations and history stay.
    #[instrument(skip(self, ctx), fields(caller_id = %ctx.caller_id))]
    pub async fn soft_delete(&self, ctx: &RequestContext, id: Uuid) -> Result<(), ServiceError> {
        let request = lookups::require_active_request(&*self.db_pool, ctx, id).await?;

        let mut active = request.into_active_model();
        active.is_active = Set(false);
        active.updated_at = Set(Utc::now());
        active.update(&*self.db_pool).await?;

        info!(request_id = %id, "Material request deleted");
        self.event_sender.publish(Event::RequestDeleted {
            request_id: id,
            ctx: ctx.clone(),
        });
        Ok(())
    }

    async fn view(
        &self,
        request: material_request::Model,
    ) -> Result<MaterialRequestView, ServiceError> {
        let mut views = load_views(&*self.db_pool, vec![request]).await?;
        views
            .pop()
            .ok_or_else(|| ServiceError::InternalError("Failed to load material request".into()))
    }
}

async fn insert_items(
    txn: &DatabaseTransaction,
    request_id: Uuid,
    items: &[RequestItemInput],
    materials: &HashMap<Uuid, material::Model>,
) -> Result<(), ServiceError> {
    let now = Utc::now();
    for item in items {
        let unit_of_measure = item
            .unit_of_measure
            .clone()
            .filter(|u| !u.trim().is_empty())
            .or_else(|| materials.get(&item.material_id).map(|m| m.unit_of_measure.clone()))
            .unwrap_or_default();

        material_request_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            material_request_id: Set(request_id),
            material_id: Set(item.material_id),
            quantity_requested: Set(item.quantity),
            quantity_approved: Set(None),
            unit_of_measure: Set(unit_of_measure),
            remarks: Set(item.remarks.clone()),
            created_at: Set(now),
        }
        .insert(txn)
        .await?;
    }
    Ok(())
}

async fn apply_approved_quantities(
    txn: &DatabaseTransaction,
    request_id: Uuid,
    approved_items: &[ApprovedItemInput],
) -> Result<(), ServiceError> {
    let items: HashMap<Uuid, material_request_item::Model> = material_request_item::Entity::find()
        .filter(material_request_item::Column::MaterialRequestId.eq(request_id))
        .all(txn)
        .await?
        .into_iter()
        .map(|item| (item.id, item))
        .collect();

    for approved in approved_items {
        let item = items.get(&approved.item_id).ok_or_else(|| {
            ServiceError::NotFound(format!(
                "Request item {} not found in material request {}",
                approved.item_id, request_id
            ))
        })?;

        let quantity = match approved.quantity_approved {
            None | Some(0) => item.quantity_requested,
            Some(q) if q < 0 => {
                return Err(ServiceError::ValidationError(format!(
                    "Approved quantity for item {} must not be negative",
                    item.id
                )))
            }
            Some(q) => q,
        };
        if quantity > item.quantity_requested {
            return Err(ServiceError::ValidationError(format!(
                "Approved quantity for item {} exceeds requested quantity ({})",
                item.id, item.quantity_requested
            )));
        }

        let mut active = item.clone().into_active_model();
        active.quantity_approved = Set(Some(quantity));
        active.update(txn).await?;
    }
    Ok(())
}

/// Attaches items, materials, allocation counts and user profiles to each request.
pub(crate) async fn load_views<C: ConnectionTrait>(
    db: &C,
    requests: Vec<material_request::Model>,
) -> Result<Vec<MaterialRequestView>, ServiceError> {
    if requests.is_empty() {
        return Ok(Vec::new());
    }

    let request_ids: Vec<Uuid> = requests.iter().map(|r| r.id).collect();
    let items = material_request_item::Entity::find()
        .filter(material_request_item::Column::MaterialRequestId.is_in(request_ids))
        .order_by_asc(material_request_item::Column::CreatedAt)
        .order_by_asc(material_request_item::Column::Id)
        .all(db)
        .await?;

    let materials = lookups::materials_by_id(db, items.iter().map(|i| i.material_id)).await?;

    let mut allocated: HashMap<Uuid, u64> = HashMap::new();
    if !items.is_empty() {
        let active = material_allocation::Entity::find()
            .filter(
                material_allocation::Column::RequestItemId
                    .is_in(items.iter().map(|i| i.id).collect::<Vec<_>>()),
            )
            .filter(material_allocation::Column::Status.is_in(AllocationStatus::ACTIVE))
            .all(db)
            .await?;
        for allocation in active {
            *allocated.entry(allocation.request_item_id).or_default() += 1;
        }
    }

    let users = lookups::user_profiles(
        db,
        requests
            .iter()
            .flat_map(|r| std::iter::once(r.requested_by).chain(r.approved_by)),
    )
    .await?;

    let mut items_by_request: HashMap<Uuid, Vec<RequestItemView>> = HashMap::new();
    for item in items {
        let view = RequestItemView {
            material: materials.get(&item.material_id).cloned(),
            allocated_quantity: allocated.get(&item.id).copied().unwrap_or(0),
            item,
        };
        items_by_request
            .entry(view.item.material_request_id)
            .or_default()
            .push(view);
    }

    Ok(requests
        .into_iter()
        .map(|request| MaterialRequestView {
            items: items_by_request.remove(&request.id).unwrap_or_default(),
            requester: users.get(&request.requested_by).cloned(),
            approver: request.approved_by.and_then(|id| users.get(&id).cloned()),
            request,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn item(quantity: i32) -> RequestItemInput {
        RequestItemInput {
            material_id: Uuid::new_v4(),
            quantity,
            unit_of_measure: None,
            remarks: None,
        }
    }

    #[test]
    fn empty_inputs_are_rejected() {
        assert_matches!(validate_pr_numbers(&[]), Err(ServiceError::ValidationError(_)));
        assert_matches!(
            validate_pr_numbers(&["  ".to_string()]),
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(validate_items(&[]), Err(ServiceError::ValidationError(_)));
    }

    #[test]
    fn item_quantity_must_be_positive() {
        assert_matches!(validate_items(&[item(2), item(0)]), Err(ServiceError::ValidationError(_)));
        assert!(validate_items(&[item(1), item(5)]).is_ok());
    }

    #[test]
    fn pr_numbers_are_trimmed() {
        let value = pr_numbers_json(&[" PR-1 ".to_string(), "PR-2".to_string()]);
        assert_eq!(value, json!(["PR-1", "PR-2"]));
    }

    #[test]
    fn patch_serializes_only_present_fields() {
        let patch = UpdateMaterialRequest {
            remarks: Some("urgent".into()),
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&patch).unwrap(), json!({ "remarks": "urgent" }));
    }
}
