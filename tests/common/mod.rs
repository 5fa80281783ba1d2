#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use chrono::Utc;
use material_allocation_api::{
    build_router,
    config::AppConfig,
    context::{RequestContext, USER_ID_HEADER},
    db,
    entities::{
        inventory_unit::{self, InventoryStatus, LocationType},
        material, material_allocation, material_request, stock_area, user,
    },
    events::{dispatch, Event, EventSender},
    services::{
        audit_logs::AuditLogService,
        material_requests::{
            CreateMaterialRequest, MaterialRequestView, RequestItemInput, ReviewMaterialRequest,
        },
        notifications::NotificationService,
        ServiceSettings,
    },
    AppState,
};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, PaginatorTrait, Set};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tower::ServiceExt;
use uuid::Uuid;

/// Application state backed by a fresh in-memory SQLite database.
///
/// Side effects are not processed in the background; call [`TestApp::drain_events`]
/// to apply every queued event before asserting on audit logs or notifications.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub db: Arc<DatabaseConnection>,
    audit: AuditLogService,
    notifications: NotificationService,
    events: Mutex<mpsc::Receiver<Event>>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(customize: impl FnOnce(&mut AppConfig)) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // one connection keeps every query on the same in-memory database
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        customize(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db = Arc::new(pool);

        let (event_sender, event_rx) = EventSender::channel(cfg.event_channel_capacity);
        let settings = ServiceSettings::from(&cfg);
        let audit = AuditLogService::new(db.clone(), settings.clone());
        let notifications = NotificationService::new(db.clone(), settings);

        let state = AppState::new(db.clone(), cfg, event_sender);
        let router = build_router(state.clone());

        Self {
            router,
            state,
            db,
            audit,
            notifications,
            events: Mutex::new(event_rx),
        }
    }

    pub fn ctx(&self, caller_id: Uuid) -> RequestContext {
        RequestContext {
            caller_id,
            org_id: None,
            ip_address: Some("10.0.0.1".to_string()),
            user_agent: Some("integration-tests".to_string()),
        }
    }

    /// Applies every queued side effect and returns how many events were handled.
    pub async fn drain_events(&self) -> usize {
        let mut rx = self.events.lock().await;
        let mut handled = 0;
        while let Ok(event) = rx.try_recv() {
            dispatch(&event, &self.audit, &self.notifications).await;
            handled += 1;
        }
        handled
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        caller: Option<Uuid>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(caller) = caller {
            builder = builder.header(USER_ID_HEADER, caller.to_string());
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        self.router
            .clone()
            .oneshot(builder.body(body).expect("request"))
            .await
            .expect("router response")
    }

    // ---- seeding ----

    pub async fn seed_user(&self, name: &str) -> user::Model {
        let now = Utc::now();
        user::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            email: Set(format!("{}@example.com", name.to_lowercase())),
            org_id: Set(None),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .expect("seed user")
    }

    pub async fn seed_material(&self, code: &str, unit_of_measure: &str) -> material::Model {
        self.seed_material_in_org(code, unit_of_measure, None).await
    }

    pub async fn seed_material_in_org(
        &self,
        code: &str,
        unit_of_measure: &str,
        org_id: Option<Uuid>,
    ) -> material::Model {
        let now = Utc::now();
        material::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.to_string()),
            name: Set(format!("Material {}", code)),
            unit_of_measure: Set(unit_of_measure.to_string()),
            org_id: Set(org_id),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .expect("seed material")
    }

    pub async fn seed_stock_area(&self, name: &str) -> stock_area::Model {
        stock_area::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            org_id: Set(None),
            is_active: Set(true),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("seed stock area")
    }

    pub async fn seed_unit_with(
        &self,
        material_id: Uuid,
        stock_area_id: Option<Uuid>,
        serial: &str,
        location: LocationType,
        status: InventoryStatus,
        is_active: bool,
    ) -> inventory_unit::Model {
        let now = Utc::now();
        inventory_unit::ActiveModel {
            id: Set(Uuid::new_v4()),
            material_id: Set(material_id),
            serial_number: Set(Some(serial.to_string())),
            current_location_type: Set(location),
            location_id: Set(stock_area_id),
            status: Set(status),
            is_active: Set(is_active),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .expect("seed inventory unit")
    }

    /// Available warehouse units with serials `{prefix}-1..=count`.
    pub async fn seed_units(
        &self,
        material_id: Uuid,
        stock_area_id: Uuid,
        prefix: &str,
        count: usize,
    ) -> Vec<inventory_unit::Model> {
        let mut units = Vec::with_capacity(count);
        for n in 1..=count {
            units.push(
                self.seed_unit_with(
                    material_id,
                    Some(stock_area_id),
                    &format!("{}-{}", prefix, n),
                    LocationType::Warehouse,
                    InventoryStatus::Available,
                    true,
                )
                .await,
            );
        }
        units
    }

    // ---- workflow shortcuts ----

    pub async fn create_request(
        &self,
        ctx: &RequestContext,
        lines: &[(Uuid, i32)],
    ) -> MaterialRequestView {
        let input = CreateMaterialRequest {
            pr_numbers: vec!["PR-1001".to_string()],
            items: lines
                .iter()
                .map(|(material_id, quantity)| RequestItemInput {
                    material_id: *material_id,
                    quantity: *quantity,
                    unit_of_measure: None,
                    remarks: None,
                })
                .collect(),
            remarks: Some("for site build".to_string()),
            ticket_id: None,
        };
        self.state
            .services
            .material_requests
            .create(ctx, input)
            .await
            .expect("create material request")
    }

    pub async fn approve(&self, reviewer: &RequestContext, request_id: Uuid) -> MaterialRequestView {
        self.state
            .services
            .material_requests
            .approve_or_reject(
                reviewer,
                request_id,
                ReviewMaterialRequest {
                    status: "APPROVED".to_string(),
                    approved_items: None,
                    remarks: None,
                },
            )
            .await
            .expect("approve material request")
    }

    /// Creates and approves a request; returns it with its items.
    pub async fn approved_request(
        &self,
        requester: &RequestContext,
        reviewer: &RequestContext,
        lines: &[(Uuid, i32)],
    ) -> MaterialRequestView {
        let created = self.create_request(requester, lines).await;
        self.approve(reviewer, created.request.id).await
    }

    // ---- reads ----

    pub async fn unit(&self, id: Uuid) -> inventory_unit::Model {
        inventory_unit::Entity::find_by_id(id)
            .one(&*self.db)
            .await
            .expect("load unit")
            .expect("unit exists")
    }

    pub async fn allocation(&self, id: Uuid) -> material_allocation::Model {
        material_allocation::Entity::find_by_id(id)
            .one(&*self.db)
            .await
            .expect("load allocation")
            .expect("allocation exists")
    }

    pub async fn allocation_count(&self) -> u64 {
        material_allocation::Entity::find()
            .count(&*self.db)
            .await
            .expect("count allocations")
    }

    pub async fn request_count(&self) -> u64 {
        material_request::Entity::find()
            .count(&*self.db)
            .await
            .expect("count requests")
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}
