//! Allocation engine: binds serialized warehouse units to approved request lines.
//!
//! Every check of an allocation batch runs inside one transaction. The first failed
//! check rolls back the whole batch, so entries processed before it leave no rows.

use chrono::Utc;
use metrics::counter;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::context::RequestContext;
use crate::db;
use crate::entities::{
    inventory_unit::{self, InventoryStatus, LocationType},
    material, material_allocation,
    material_allocation::AllocationStatus,
    material_request::{self, RequestStatus},
    material_request_item, stock_area,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::lookups::{self, UserProfile};
use crate::services::ServiceSettings;

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AvailableStockFilters {
    pub stock_area_id: Option<Uuid>,
    pub material_id: Option<Uuid>,
}

/// Allocatable units of one material in one stock area.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StockGroup {
    pub material_id: Uuid,
    pub material: Option<material::Model>,
    pub stock_area_id: Option<Uuid>,
    pub stock_area: Option<stock_area::Model>,
    pub count: u64,
    pub units: Vec<inventory_unit::Model>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AvailableStock {
    pub total_units: u64,
    pub groups: Vec<StockGroup>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AllocationEntry {
    pub request_item_id: Uuid,
    #[serde(default)]
    pub inventory_unit_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AllocateMaterials {
    #[serde(default)]
    pub allocations: Vec<AllocationEntry>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AllocationView {
    #[serde(flatten)]
    pub allocation: material_allocation::Model,
    pub inventory_unit: Option<inventory_unit::Model>,
    pub material: Option<material::Model>,
    pub request_item: Option<material_request_item::Model>,
    pub allocated_by_user: Option<UserProfile>,
}

/// Allocations of one request line, newest first.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ItemAllocations {
    pub request_item: material_request_item::Model,
    pub material: Option<material::Model>,
    pub quantity_requested: i32,
    pub active_count: u64,
    pub allocations: Vec<AllocationView>,
}

fn validate_batch(entries: &[AllocationEntry]) -> Result<(), ServiceError> {
    if entries.is_empty() {
        return Err(ServiceError::ValidationError(
            "At least one allocation is required".to_string(),
        ));
    }
    if let Some(entry) = entries.iter().find(|e| e.inventory_unit_ids.is_empty()) {
        return Err(ServiceError::ValidationError(format!(
            "No inventory units given for request item {}",
            entry.request_item_id
        )));
    }
    Ok(())
}

/// Fails when allocating `adding` more units would exceed the requested quantity.
pub fn check_quantity(
    item_id: Uuid,
    requested: i32,
    already_allocated: u64,
    adding: u64,
) -> Result<(), ServiceError> {
    let requested_units = u64::try_from(requested).unwrap_or(0);
    if already_allocated.saturating_add(adding) > requested_units {
        return Err(ServiceError::InvalidState(format!(
            "Allocation exceeds requested quantity for item {}. Requested: {}, Already allocated: {}, Trying to allocate: {}",
            item_id, requested, already_allocated, adding
        )));
    }
    Ok(())
}

#[derive(Clone)]
pub struct AllocationService {
    db_pool: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    settings: ServiceSettings,
}

impl AllocationService {
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

    /// Warehouse units that can be allocated right now, grouped by material and stock area.
    #[instrument(skip(self, ctx), fields(caller_id = %ctx.caller_id))]
    pub async fn list_available_stock(
        &self,
        ctx: &RequestContext,
        request_id: Uuid,
        filters: AvailableStockFilters,
    ) -> Result<AvailableStock, ServiceError> {
        let db = &*self.db_pool;
        lookups::require_active_request(db, ctx, request_id).await?;

        let mut query = inventory_unit::Entity::find()
            .filter(inventory_unit::Column::CurrentLocationType.eq(LocationType::Warehouse))
            .filter(inventory_unit::Column::Status.eq(InventoryStatus::Available))
            .filter(inventory_unit::Column::IsActive.eq(true));
        if let Some(stock_area_id) = filters.stock_area_id {
            query = query.filter(inventory_unit::Column::LocationId.eq(stock_area_id));
        }
        if let Some(material_id) = filters.material_id {
            query = query.filter(inventory_unit::Column::MaterialId.eq(material_id));
        }
        let units = query
            .order_by_asc(inventory_unit::Column::MaterialId)
            .order_by_asc(inventory_unit::Column::LocationId)
            .order_by_asc(inventory_unit::Column::SerialNumber)
            .order_by_asc(inventory_unit::Column::Id)
            .all(db)
            .await?;

        let materials = lookups::materials_by_id(db, units.iter().map(|u| u.material_id)).await?;
        let areas = lookups::stock_areas_by_id(db, units.iter().filter_map(|u| u.location_id)).await?;

        let mut grouped: BTreeMap<(Uuid, Option<Uuid>), Vec<inventory_unit::Model>> =
            BTreeMap::new();
        for unit in units {
            let material = materials.get(&unit.material_id);
            let in_scope = match (ctx.org_id, material) {
                (Some(org_id), Some(m)) => m.org_id == Some(org_id),
                (Some(_), None) => false,
                (None, _) => true,
            };
            if in_scope {
                grouped
                    .entry((unit.material_id, unit.location_id))
                    .or_default()
                    .push(unit);
            }
        }

        let groups: Vec<StockGroup> = grouped
            .into_iter()
            .map(|((material_id, stock_area_id), units)| StockGroup {
                material_id,
                material: materials.get(&material_id).cloned(),
                stock_area_id,
                stock_area: stock_area_id.and_then(|id| areas.get(&id).cloned()),
                count: units.len() as u64,
                units,
            })
            .collect();

        Ok(AvailableStock {
            total_units: groups.iter().map(|g| g.count).sum(),
            groups,
        })
    }

    /// Allocates a batch of units to request lines. All or nothing.
    #[instrument(skip(self, ctx, input), fields(caller_id = %ctx.caller_id, entries = input.allocations.len()))]
    pub async fn allocate(
        &self,
        ctx: &RequestContext,
        request_id: Uuid,
        input: AllocateMaterials,
    ) -> Result<Vec<AllocationView>, ServiceError> {
        let txn = db::begin(&self.db_pool).await?;
        let result = self.allocate_batch(&txn, ctx, request_id, &input.allocations).await;
        let (request, created) = db::settle(txn, result).await?;

        counter!("allocations.created", created.len() as u64);
        info!(
            request_id = %request_id,
            count = created.len(),
            "Inventory allocated to material request"
        );
        self.event_sender.publish(Event::MaterialsAllocated {
            request_id,
            requester_id: request.requested_by,
            allocation_ids: created.iter().map(|a| a.id).collect(),
            ctx: ctx.clone(),
        });

        load_allocation_views(&*self.db_pool, created).await
    }

    async fn allocate_batch(
        &self,
        txn: &DatabaseTransaction,
        ctx: &RequestContext,
        request_id: Uuid,
        entries: &[AllocationEntry],
    ) -> Result<(material_request::Model, Vec<material_allocation::Model>), ServiceError> {
        let request = lookups::scoped_requests(ctx)
            .filter(material_request::Column::Id.eq(request_id))
            .one(txn)
            .await?
            .filter(|r| r.is_active && r.status == RequestStatus::Approved)
            .ok_or_else(|| {
                ServiceError::InvalidState(format!(
                    "Material request {} is not an active approved request",
                    request_id
                ))
            })?;

        validate_batch(entries)?;

        let lock = self.settings.allocation_row_locks;
        let mut created = Vec::new();
        for entry in entries {
            let item = lookups::with_row_lock(
                material_request_item::Entity::find_by_id(entry.request_item_id)
                    .filter(material_request_item::Column::MaterialRequestId.eq(request_id)),
                lock,
            )
            .one(txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Request item {} not found in material request {}",
                    entry.request_item_id, request_id
                ))
            })?;

            let already_allocated = active_allocations_for_item(txn, item.id).await?;
            check_quantity(
                item.id,
                item.quantity_requested,
                already_allocated,
                entry.inventory_unit_ids.len() as u64,
            )?;

            for unit_id in &entry.inventory_unit_ids {
                let unit = self.claim_unit(txn, &item, *unit_id).await?;
                let now = Utc::now();
                let allocation = material_allocation::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    material_request_id: Set(request_id),
                    request_item_id: Set(item.id),
                    inventory_id: Set(unit.id),
                    allocated_by: Set(ctx.caller_id),
                    allocated_at: Set(now),
                    status: Set(AllocationStatus::Allocated),
                    cancelled_by: Set(None),
                    cancelled_at: Set(None),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(txn)
                .await?;

                let mut unit = unit.into_active_model();
                unit.status = Set(InventoryStatus::Allocated);
                unit.updated_at = Set(now);
                unit.update(txn).await?;

                created.push(allocation);
            }
        }

        Ok((request, created))
    }

    /// Checks that a unit may be bound to `item`.
    async fn claim_unit(
        &self,
        txn: &DatabaseTransaction,
        item: &material_request_item::Model,
        unit_id: Uuid,
    ) -> Result<inventory_unit::Model, ServiceError> {
        let unit = lookups::with_row_lock(
            inventory_unit::Entity::find_by_id(unit_id),
            self.settings.allocation_row_locks,
        )
        .one(txn)
        .await?
        .filter(|u| u.material_id == item.material_id && u.is_allocatable())
        .ok_or_else(|| {
            ServiceError::NotFound(format!(
                "Inventory unit {} is not available for material {}",
                unit_id, item.material_id
            ))
        })?;

        let active = material_allocation::Entity::find()
            .filter(material_allocation::Column::InventoryId.eq(unit_id))
            .filter(material_allocation::Column::Status.is_in(AllocationStatus::ACTIVE))
            .count(txn)
            .await?;
        if active > 0 {
            return Err(ServiceError::Conflict(format!(
                "Inventory unit {} is already allocated",
                unit_id
            )));
        }

        Ok(unit)
    }

    /// Every allocation of a request grouped by request line.
    #[instrument(skip(self, ctx), fields(caller_id = %ctx.caller_id))]
    pub async fn list_allocations(
        &self,
        ctx: &RequestContext,
        request_id: Uuid,
    ) -> Result<Vec<ItemAllocations>, ServiceError> {
        let db = &*self.db_pool;
        lookups::require_active_request(db, ctx, request_id).await?;

        let items = material_request_item::Entity::find()
            .filter(material_request_item::Column::MaterialRequestId.eq(request_id))
            .order_by_asc(material_request_item::Column::CreatedAt)
            .order_by_asc(material_request_item::Column::Id)
            .all(db)
            .await?;

        let allocations = material_allocation::Entity::find()
            .filter(material_allocation::Column::MaterialRequestId.eq(request_id))
            .order_by_desc(material_allocation::Column::AllocatedAt)
            .order_by_desc(material_allocation::Column::Id)
            .all(db)
            .await?;
        let views = load_allocation_views(db, allocations).await?;

        let mut by_item: HashMap<Uuid, Vec<AllocationView>> = HashMap::new();
        for view in views {
            by_item
                .entry(view.allocation.request_item_id)
                .or_default()
                .push(view);
        }

        let materials = lookups::materials_by_id(db, items.iter().map(|i| i.material_id)).await?;
        Ok(items
            .into_iter()
            .map(|item| {
                let allocations = by_item.remove(&item.id).unwrap_or_default();
                ItemAllocations {
                    material: materials.get(&item.material_id).cloned(),
                    quantity_requested: item.quantity_requested,
                    active_count: allocations
                        .iter()
                        .filter(|a| a.allocation.status.is_active())
                        .count() as u64,
                    allocations,
                    request_item: item,
                }
            })
            .collect())
    }

    /// Cancels an `ALLOCATED` allocation and returns its unit to stock.
    #[instrument(skip(self, ctx), fields(caller_id = %ctx.caller_id))]
    pub async fn cancel_allocation(
        &self,
        ctx: &RequestContext,
        request_id: Uuid,
        allocation_id: Uuid,
    ) -> Result<AllocationView, ServiceError> {
        let txn = db::begin(&self.db_pool).await?;
        let result = self.cancel_in_txn(&txn, ctx, request_id, allocation_id).await;
        let cancelled = db::settle(txn, result).await?;

        counter!("allocations.cancelled", 1);
        info!(
            request_id = %request_id,
            allocation_id = %allocation_id,
            "Allocation cancelled"
        );
        self.event_sender.publish(Event::AllocationCancelled {
            request_id,
            allocation_id,
            inventory_id: cancelled.inventory_id,
            ctx: ctx.clone(),
        });

        let mut views = load_allocation_views(&*self.db_pool, vec![cancelled]).await?;
        views
            .pop()
            .ok_or_else(|| ServiceError::InternalError("Failed to load allocation".into()))
    }

    async fn cancel_in_txn(
        &self,
        txn: &DatabaseTransaction,
        ctx: &RequestContext,
        request_id: Uuid,
        allocation_id: Uuid,
    ) -> Result<material_allocation::Model, ServiceError> {
        let not_found = || {
            ServiceError::NotFound(format!(
                "Active allocation {} not found for material request {}",
                allocation_id, request_id
            ))
        };

        lookups::scoped_requests(ctx)
            .filter(material_request::Column::Id.eq(request_id))
            .one(txn)
            .await?
            .ok_or_else(not_found)?;

        let allocation = lookups::with_row_lock(
            material_allocation::Entity::find_by_id(allocation_id)
                .filter(material_allocation::Column::MaterialRequestId.eq(request_id))
                .filter(material_allocation::Column::Status.eq(AllocationStatus::Allocated)),
            self.settings.allocation_row_locks,
        )
        .one(txn)
        .await?
        .ok_or_else(not_found)?;

        let now = Utc::now();
        let inventory_id = allocation.inventory_id;
        let mut active = allocation.into_active_model();
        active.status = Set(AllocationStatus::Cancelled);
        active.cancelled_by = Set(Some(ctx.caller_id));
        active.cancelled_at = Set(Some(now));
        active.updated_at = Set(now);
        let cancelled = active.update(txn).await?;

        match inventory_unit::Entity::find_by_id(inventory_id).one(txn).await? {
            Some(unit) => {
                let mut unit = unit.into_active_model();
                unit.status = Set(InventoryStatus::Available);
                unit.updated_at = Set(now);
                unit.update(txn).await?;
            }
            None => warn!(
                inventory_id = %inventory_id,
                "Inventory unit for cancelled allocation no longer exists"
            ),
        }

        Ok(cancelled)
    }
}

async fn active_allocations_for_item<C: ConnectionTrait>(
    db: &C,
    item_id: Uuid,
) -> Result<u64, ServiceError> {
    Ok(material_allocation::Entity::find()
        .filter(material_allocation::Column::RequestItemId.eq(item_id))
        .filter(material_allocation::Column::Status.is_in(AllocationStatus::ACTIVE))
        .count(db)
        .await?)
}

async fn load_allocation_views<C: ConnectionTrait>(
    db: &C,
    allocations: Vec<material_allocation::Model>,
) -> Result<Vec<AllocationView>, ServiceError> {
    if allocations.is_empty() {
        return Ok(Vec::new());
    }

    let units: HashMap<Uuid, inventory_unit::Model> = inventory_unit::Entity::find()
        .filter(
            inventory_unit::Column::Id
                .is_in(allocations.iter().map(|a| a.inventory_id).collect::<Vec<_>>()),
        )
        .all(db)
        .await?
        .into_iter()
        .map(|u| (u.id, u))
        .collect();

    let items: HashMap<Uuid, material_request_item::Model> = material_request_item::Entity::find()
        .filter(
            material_request_item::Column::Id
                .is_in(allocations.iter().map(|a| a.request_item_id).collect::<Vec<_>>()),
        )
        .all(db)
        .await?
        .into_iter()
        .map(|i| (i.id, i))
        .collect();

    let materials = lookups::materials_by_id(
        db,
        units
            .values()
            .map(|u| u.material_id)
            .chain(items.values().map(|i| i.material_id)),
    )
    .await?;
    let users = lookups::user_profiles(db, allocations.iter().map(|a| a.allocated_by)).await?;

    Ok(allocations
        .into_iter()
        .map(|allocation| {
            let inventory_unit = units.get(&allocation.inventory_id).cloned();
            let request_item = items.get(&allocation.request_item_id).cloned();
            let material_id = inventory_unit
                .as_ref()
                .map(|u| u.material_id)
                .or_else(|| request_item.as_ref().map(|i| i.material_id));
            AllocationView {
                material: material_id.and_then(|id| materials.get(&id).cloned()),
                allocated_by_user: users.get(&allocation.allocated_by).cloned(),
                inventory_unit,
                request_item,
                allocation,
            }
        })
        .collect())
}
