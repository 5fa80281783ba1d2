//! Post-commit side effects.
//!
//! Services publish an [`Event`] once their transaction has committed. A background
//! task running [`process_events`] turns each event into an audit-log row and, where
//! relevant, a notification for the requester. Failures on either path are logged
//! and counted under `side_effects.failed`; they never reach the caller of the
//! original operation.

use async_trait::async_trait;
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::context::RequestContext;
use crate::entities::audit_log::{AuditAction, ENTITY_MATERIAL_ALLOCATION, ENTITY_MATERIAL_REQUEST};
use crate::entities::material_request::RequestStatus;
use crate::entities::notification::NotificationKind;
use crate::errors::ServiceError;

pub const SIDE_EFFECTS_FAILED: &str = "side_effects.failed";

/// Domain facts published after a successful commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    RequestCreated {
        request_id: Uuid,
        ctx: RequestContext,
        changes: Value,
    },
    RequestSubmitted {
        request_id: Uuid,
        ctx: RequestContext,
    },
    RequestUpdated {
        request_id: Uuid,
        ctx: RequestContext,
        changes: Value,
    },
    RequestReviewed {
        request_id: Uuid,
        requester_id: Uuid,
        decision: RequestStatus,
        remarks: Option<String>,
        ctx: RequestContext,
    },
    RequestDeleted {
        request_id: Uuid,
        ctx: RequestContext,
    },
    MaterialsAllocated {
        request_id: Uuid,
        requester_id: Uuid,
        allocation_ids: Vec<Uuid>,
        ctx: RequestContext,
    },
    AllocationCancelled {
        request_id: Uuid,
        allocation_id: Uuid,
        inventory_id: Uuid,
        ctx: RequestContext,
    },
}

/// Arguments for one audit-log row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entity_type: String,
    pub entity_id: Uuid,
    pub action: AuditAction,
    pub user_id: Uuid,
    pub org_id: Option<Uuid>,
    pub changes: Option<Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Arguments for one user notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEntry {
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub message: String,
    pub title: Option<String>,
    pub entity_type: Option<String>,
    pub entity_id: Option<Uuid>,
}

impl Event {
    fn ctx(&self) -> &RequestContext {
        match self {
            Event::RequestCreated { ctx, .. }
            | Event::RequestSubmitted { ctx, .. }
            | Event::RequestUpdated { ctx, .. }
            | Event::RequestReviewed { ctx, .. }
            | Event::RequestDeleted { ctx, .. }
            | Event::MaterialsAllocated { ctx, .. }
            | Event::AllocationCancelled { ctx, .. } => ctx,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Event::RequestCreated { .. } => "request_created",
            Event::RequestSubmitted { .. } => "request_submitted",
            Event::RequestUpdated { .. } => "request_updated",
            Event::RequestReviewed { .. } => "request_reviewed",
            Event::RequestDeleted { .. } => "request_deleted",
            Event::MaterialsAllocated { .. } => "materials_allocated",
            Event::AllocationCancelled { .. } => "allocation_cancelled",
        }
    }

    /// The audit-log row this event produces.
    pub fn audit_entry(&self) -> AuditEntry {
        let (entity_type, entity_id, action, changes) = match self {
            Event::RequestCreated {
                request_id,
                changes,
                ..
            } => (
                ENTITY_MATERIAL_REQUEST,
                *request_id,
                AuditAction::Create,
                Some(changes.clone()),
            ),
            Event::RequestSubmitted { request_id, .. } => (
                ENTITY_MATERIAL_REQUEST,
                *request_id,
                AuditAction::Submit,
                Some(json!({ "status": RequestStatus::Submitted })),
            ),
            Event::RequestUpdated {
                request_id,
                changes,
                ..
            } => (
                ENTITY_MATERIAL_REQUEST,
                *request_id,
                AuditAction::Update,
                Some(changes.clone()),
            ),
            Event::RequestReviewed {
                request_id,
                decision,
                remarks,
                ..
            } => {
                let action = if *decision == RequestStatus::Approved {
                    AuditAction::Approve
                } else {
                    AuditAction::Reject
                };
                (
                    ENTITY_MATERIAL_REQUEST,
                    *request_id,
                    action,
                    Some(json!({ "status": decision, "remarks": remarks })),
                )
            }
            Event::RequestDeleted { request_id, .. } => (
                ENTITY_MATERIAL_REQUEST,
                *request_id,
                AuditAction::Delete,
                Some(json!({ "is_active": false })),
            ),
            Event::MaterialsAllocated {
                request_id,
                allocation_ids,
                ..
            } => (
                ENTITY_MATERIAL_REQUEST,
                *request_id,
                AuditAction::Allocate,
                Some(json!({ "allocation_ids": allocation_ids })),
            ),
            Event::AllocationCancelled {
                request_id,
                allocation_id,
                inventory_id,
                ..
            } => (
                ENTITY_MATERIAL_ALLOCATION,
                *allocation_id,
                AuditAction::Cancel,
                Some(json!({
                    "material_request_id": request_id,
                    "inventory_id": inventory_id,
                    "status": "CANCELLED",
                })),
            ),
        };

        let ctx = self.ctx();
        AuditEntry {
            entity_type: entity_type.to_string(),
            entity_id,
            action,
            user_id: ctx.caller_id,
            org_id: ctx.org_id,
            changes,
            ip_address: ctx.ip_address.clone(),
            user_agent: ctx.user_agent.clone(),
        }
    }

    /// The notification this event produces, if any.
    pub fn notification(&self) -> Option<NotificationEntry> {
        match self {
            Event::RequestReviewed {
                request_id,
                requester_id,
                decision,
                remarks,
                ..
            } => {
                let (kind, title, verb) = if *decision == RequestStatus::Approved {
                    (
                        NotificationKind::RequestApproved,
                        "Material Request Approved",
                        "approved",
                    )
                } else {
                    (
                        NotificationKind::RequestRejected,
                        "Material Request Rejected",
                        "rejected",
                    )
                };
                let mut message = format!("Your material request {} has been {}", request_id, verb);
                if let Some(remarks) = remarks.as_deref().filter(|r| !r.trim().is_empty()) {
                    message.push_str(&format!(". Remarks: {}", remarks));
                }
                Some(NotificationEntry {
                    user_id: *requester_id,
                    kind,
                    message,
                    title: Some(title.to_string()),
                    entity_type: Some(ENTITY_MATERIAL_REQUEST.to_string()),
                    entity_id: Some(*request_id),
                })
            }
            Event::MaterialsAllocated {
                request_id,
                requester_id,
                allocation_ids,
                ..
            } => Some(NotificationEntry {
                user_id: *requester_id,
                kind: NotificationKind::MaterialsAllocated,
                message: format!(
                    "{} inventory unit(s) have been allocated to your material request {}",
                    allocation_ids.len(),
                    request_id
                ),
                title: Some("Materials Allocated".to_string()),
                entity_type: Some(ENTITY_MATERIAL_REQUEST.to_string()),
                entity_id: Some(*request_id),
            }),
            _ => None,
        }
    }
}

/// Destination for audit-log rows.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> Result<(), ServiceError>;
}

/// Destination for user notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, entry: NotificationEntry) -> Result<(), ServiceError>;
}

/// Publishing half of the side-effect channel.
///
/// Publishing never waits: a full or closed channel drops the event with a warning.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a bounded channel and returns both halves.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    pub fn publish(&self, event: Event) {
        let name = event.name();
        match self.sender.try_send(event) {
            Ok(()) => debug!(event = name, "Event published"),
            Err(TrySendError::Full(_)) => {
                warn!(event = name, "Event channel full; dropping side effects");
                counter!(SIDE_EFFECTS_FAILED, 1, "reason" => "channel_full");
            }
            Err(TrySendError::Closed(_)) => {
                warn!(event = name, "Event channel closed; dropping side effects");
                counter!(SIDE_EFFECTS_FAILED, 1, "reason" => "channel_closed");
            }
        }
    }
}

/// Applies the side effects of a single event.
pub async fn dispatch(event: &Event, audit: &dyn AuditSink, notifications: &dyn NotificationSink) {
    let entry = event.audit_entry();
    let entity_id = entry.entity_id;
    if let Err(e) = audit.record(entry).await {
        warn!(event = event.name(), entity_id = %entity_id, error = %e, "Failed to write audit log");
        counter!(SIDE_EFFECTS_FAILED, 1, "reason" => "audit");
    }

    if let Some(notification) = event.notification() {
        let user_id = notification.user_id;
        if let Err(e) = notifications.notify(notification).await {
            warn!(event = event.name(), user_id = %user_id, error = %e, "Failed to create notification");
            counter!(SIDE_EFFECTS_FAILED, 1, "reason" => "notification");
        }
    }
}

/// Background loop draining the side-effect channel until every sender is dropped.
pub async fn process_events(
    mut rx: mpsc::Receiver<Event>,
    audit: Arc<dyn AuditSink>,
    notifications: Arc<dyn NotificationSink>,
) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        dispatch(&event, audit.as_ref(), notifications.as_ref()).await;
    }

    info!("Event processing loop has ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        audits: Mutex<Vec<AuditEntry>>,
        notifications: Mutex<Vec<NotificationEntry>>,
        fail_audit: bool,
    }

    #[async_trait]
    impl AuditSink for RecordingSink {
        async fn record(&self, entry: AuditEntry) -> Result<(), ServiceError> {
            if self.fail_audit {
                return Err(ServiceError::InternalError("audit store down".into()));
            }
            self.audits.lock().await.push(entry);
            Ok(())
        }
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn notify(&self, entry: NotificationEntry) -> Result<(), ServiceError> {
            self.notifications.lock().await.push(entry);
            Ok(())
        }
    }

    fn ctx() -> RequestContext {
        RequestContext {
            caller_id: Uuid::new_v4(),
            org_id: None,
            ip_address: Some("10.1.1.1".into()),
            user_agent: Some("test".into()),
        }
    }

    #[test]
    fn review_events_map_to_approve_and_reject() {
        let requester = Uuid::new_v4();
        let approved = Event::RequestReviewed {
            request_id: Uuid::new_v4(),
            requester_id: requester,
            decision: RequestStatus::Approved,
            remarks: None,
            ctx: ctx(),
        };
        assert_eq!(approved.audit_entry().action, AuditAction::Approve);
        let note = approved.notification().unwrap();
        assert_eq!(note.kind, NotificationKind::RequestApproved);
        assert_eq!(note.user_id, requester);

        let rejected = Event::RequestReviewed {
            request_id: Uuid::new_v4(),
            requester_id: requester,
            decision: RequestStatus::Rejected,
            remarks: Some("out of budget".into()),
            ctx: ctx(),
        };
        assert_eq!(rejected.audit_entry().action, AuditAction::Reject);
        let note = rejected.notification().unwrap();
        assert_eq!(note.kind, NotificationKind::RequestRejected);
        assert!(note.message.contains("out of budget"));
    }

    #[test]
    fn cancellation_is_audited_on_the_allocation() {
        let allocation_id = Uuid::new_v4();
        let event = Event::AllocationCancelled {
            request_id: Uuid::new_v4(),
            allocation_id,
            inventory_id: Uuid::new_v4(),
            ctx: ctx(),
        };
        let entry = event.audit_entry();
        assert_eq!(entry.entity_type, ENTITY_MATERIAL_ALLOCATION);
        assert_eq!(entry.entity_id, allocation_id);
        assert_eq!(entry.action, AuditAction::Cancel);
        assert_eq!(entry.org_id, None);
        assert!(event.notification().is_none());
    }

    #[test]
    fn audit_entry_carries_the_caller_org() {
        let org_id = Uuid::new_v4();
        let event = Event::RequestDeleted {
            request_id: Uuid::new_v4(),
            ctx: RequestContext {
                org_id: Some(org_id),
                ..ctx()
            },
        };
        assert_eq!(event.audit_entry().org_id, Some(org_id));
    }

    #[tokio::test]
    async fn audit_failure_does_not_block_notification() {
        let sink = RecordingSink {
            fail_audit: true,
            ..Default::default()
        };
        let event = Event::MaterialsAllocated {
            request_id: Uuid::new_v4(),
            requester_id: Uuid::new_v4(),
            allocation_ids: vec![Uuid::new_v4(), Uuid::new_v4()],
            ctx: ctx(),
        };

        dispatch(&event, &sink, &sink).await;

        assert!(sink.audits.lock().await.is_empty());
        let notes = sink.notifications.lock().await;
        assert_eq!(notes.len(), 1);
        assert!(notes[0].message.starts_with("2 inventory unit(s)"));
    }

    #[tokio::test]
    async fn publish_drops_when_channel_is_full() {
        let (sender, mut rx) = EventSender::channel(1);
        let event = Event::RequestDeleted {
            request_id: Uuid::new_v4(),
            ctx: ctx(),
        };
        sender.publish(event.clone());
        sender.publish(event.clone());

        assert_eq!(rx.try_recv().unwrap(), event);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn process_events_drains_until_senders_drop() {
        let sink = Arc::new(RecordingSink::default());
        let (sender, rx) = EventSender::channel(8);
        sender.publish(Event::RequestSubmitted {
            request_id: Uuid::new_v4(),
            ctx: ctx(),
        });
        drop(sender);

        process_events(rx, sink.clone(), sink.clone()).await;

        assert_eq!(sink.audits.lock().await.len(), 1);
        assert!(sink.notifications.lock().await.is_empty());
    }
}
