pub mod allocations;
pub mod audit_logs;
pub mod common;
pub mod health;
pub mod material_requests;
pub mod notifications;

use std::sync::Arc;

use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::{
    allocations::AllocationService, audit_logs::AuditLogService,
    material_requests::MaterialRequestService, notifications::NotificationService,
    ServiceSettings,
};

pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub material_requests: Arc<MaterialRequestService>,
    pub allocations: Arc<AllocationService>,
    pub audit_logs: Arc<AuditLogService>,
    pub notifications: Arc<NotificationService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            material_requests: Arc::new(MaterialRequestService::new(
                db_pool.clone(),
                event_sender.clone(),
                settings.clone(),
            )),
            allocations: Arc::new(AllocationService::new(
                db_pool.clone(),
                event_sender,
                settings.clone(),
            )),
            audit_logs: Arc::new(AuditLogService::new(db_pool.clone(), settings.clone())),
            notifications: Arc::new(NotificationService::new(db_pool, settings)),
        }
    }
}
