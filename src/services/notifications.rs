use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::context::RequestContext;
use crate::entities::notification;
use crate::errors::ServiceError;
use crate::events::{NotificationEntry, NotificationSink};
use crate::services::{Page, ServiceSettings};

#[derive(Clone)]
pub struct NotificationService {
    db_pool: Arc<DatabaseConnection>,
    settings: ServiceSettings,
}

impl NotificationService {
    pub fn new(db_pool: Arc<DatabaseConnection>, settings: ServiceSettings) -> Self {
        Self { db_pool, settings }
    }

    #[instrument(skip(self, entry), fields(user_id = %entry.user_id, kind = ?entry.kind))]
    pub async fn create(
        &self,
        entry: NotificationEntry,
    ) -> Result<notification::Model, ServiceError> {
        let model = notification::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(entry.user_id),
            kind: Set(entry.kind),
            title: Set(entry.title),
            message: Set(entry.message),
            entity_type: Set(entry.entity_type),
            entity_id: Set(entry.entity_id),
            is_read: Set(false),
            created_at: Set(Utc::now()),
        };
        let created = model.insert(&*self.db_pool).await?;
        info!(notification_id = %created.id, "Notification created");
        Ok(created)
    }

    /// The caller's notifications, newest first.
    #[instrument(skip(self, ctx), fields(user_id = %ctx.caller_id))]
    pub async fn list_for_user(
        &self,
        ctx: &RequestContext,
        unread_only: bool,
        page: Option<u64>,
        limit: Option<u64>,
    ) -> Result<Page<notification::Model>, ServiceError> {
        let request = self.settings.page_request(page, limit);

        let mut query =
            notification::Entity::find().filter(notification::Column::UserId.eq(ctx.caller_id));
        if unread_only {
            query = query.filter(notification::Column::IsRead.eq(false));
        }

        let paginator = query
            .order_by_desc(notification::Column::CreatedAt)
            .order_by_desc(notification::Column::Id)
            .paginate(&*self.db_pool, request.limit);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(request.index()).await?;

        Ok(Page::new(items, total, request))
    }

    #[instrument(skip(self, ctx), fields(user_id = %ctx.caller_id))]
    pub async fn mark_read(
        &self,
        ctx: &RequestContext,
        id: Uuid,
    ) -> Result<notification::Model, ServiceError> {
        let existing = notification::Entity::find_by_id(id)
            .filter(notification::Column::UserId.eq(ctx.caller_id))
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Notification {} not found", id)))?;

        if existing.is_read {
            return Ok(existing);
        }

        let mut active = existing.into_active_model();
        active.is_read = Set(true);
        Ok(active.update(&*self.db_pool).await?)
    }
}

#[async_trait]
impl NotificationSink for NotificationService {
    async fn notify(&self, entry: NotificationEntry) -> Result<(), ServiceError> {
        self.create(entry).await.map(|_| ())
    }
}
