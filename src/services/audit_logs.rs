use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::context::RequestContext;
use crate::entities::audit_log;
use crate::errors::ServiceError;
use crate::events::{AuditEntry, AuditSink};
use crate::services::{Page, ServiceSettings};

/// Filters for listing audit entries
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuditLogFilters {
    pub entity_type: Option<String>,
    pub entity_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
}

/// Append-only store of who changed what.
#[derive(Clone)]
pub struct AuditLogService {
    db_pool: Arc<DatabaseConnection>,
    settings: ServiceSettings,
}

impl AuditLogService {
    pub fn new(db_pool: Arc<DatabaseConnection>, settings: ServiceSettings) -> Self {
        Self { db_pool, settings }
    }

    #[instrument(skip(self, entry), fields(entity_type = %entry.entity_type, entity_id = %entry.entity_id))]
    pub async fn record_entry(&self, entry: AuditEntry) -> Result<audit_log::Model, ServiceError> {
        let model = audit_log::ActiveModel {
            id: Set(Uuid::new_v4()),
            entity_type: Set(entry.entity_type),
            entity_id: Set(entry.entity_id),
            action: Set(entry.action),
            user_id: Set(entry.user_id),
            org_id: Set(entry.org_id),
            changes: Set(entry.changes),
            ip_address: Set(entry.ip_address),
            user_agent: Set(entry.user_agent),
            created_at: Set(Utc::now()),
        };
        Ok(model.insert(&*self.db_pool).await?)
    }

    /// Newest-first page of audit entries. A caller inside an organization only
    /// sees entries recorded under that organization.
    #[instrument(skip(self, ctx), fields(caller_id = %ctx.caller_id))]
    pub async fn list(
        &self,
        ctx: &RequestContext,
        filters: AuditLogFilters,
        page: Option<u64>,
        limit: Option<u64>,
    ) -> Result<Page<audit_log::Model>, ServiceError> {
        let request = self.settings.page_request(page, limit);

        let mut query = audit_log::Entity::find();
        if let Some(org_id) = ctx.org_id {
            query = query.filter(audit_log::Column::OrgId.eq(org_id));
        }
        if let Some(entity_type) = filters.entity_type.filter(|t| !t.trim().is_empty()) {
            query = query.filter(audit_log::Column::EntityType.eq(entity_type));
        }
        if let Some(entity_id) = filters.entity_id {
            query = query.filter(audit_log::Column::EntityId.eq(entity_id));
        }
        if let Some(user_id) = filters.user_id {
            query = query.filter(audit_log::Column::UserId.eq(user_id));
        }

        let paginator = query
            .order_by_desc(audit_log::Column::CreatedAt)
            .order_by_desc(audit_log::Column::Id)
            .paginate(&*self.db_pool, request.limit);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(request.index()).await?;

        Ok(Page::new(items, total, request))
    }
}

#[async_trait]
impl AuditSink for AuditLogService {
    async fn record(&self, entry: AuditEntry) -> Result<(), ServiceError> {
        self.record_entry(entry).await.map(|_| ())
    }
}
