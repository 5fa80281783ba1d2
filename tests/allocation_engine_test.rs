//! Allocation engine: available stock, batch allocation, listing and cancellation.

mod common;

use assert_matches::assert_matches;
use chrono::Utc;
use common::TestApp;
use material_allocation_api::{
    entities::{
        audit_log::{AuditAction, ENTITY_MATERIAL_ALLOCATION, ENTITY_MATERIAL_REQUEST},
        inventory_unit::{InventoryStatus, LocationType},
        material_allocation::AllocationStatus,
        notification::NotificationKind,
    },
    errors::ServiceError,
    services::{
        allocations::{AllocateMaterials, AllocationEntry, AvailableStockFilters},
        audit_logs::AuditLogFilters,
        material_requests::ReviewMaterialRequest,
    },
};
use sea_orm::{ActiveModelTrait, IntoActiveModel, Set};
use uuid::Uuid;

fn batch(entries: &[(Uuid, &[Uuid])]) -> AllocateMaterials {
    AllocateMaterials {
        allocations: entries
            .iter()
            .map(|(item_id, units)| AllocationEntry {
                request_item_id: *item_id,
                inventory_unit_ids: units.to_vec(),
            })
            .collect(),
    }
}

async fn set_unit_status(app: &TestApp, id: Uuid, status: InventoryStatus) {
    let mut unit = app.unit(id).await.into_active_model();
    unit.status = Set(status);
    unit.update(&*app.db).await.expect("update unit");
}

async fn set_allocation_status(app: &TestApp, id: Uuid, status: AllocationStatus) {
    let mut allocation = app.allocation(id).await.into_active_model();
    allocation.status = Set(status);
    allocation.updated_at = Set(Utc::now());
    allocation.update(&*app.db).await.expect("update allocation");
}

#[tokio::test]
async fn allocation_respects_requested_quantity() {
    let app = TestApp::new().await;
    let requester = app.ctx(Uuid::new_v4());
    let storekeeper = app.ctx(Uuid::new_v4());
    let cable = app.seed_material("CBL", "pcs").await;
    let area = app.seed_stock_area("Main store").await;
    let units = app.seed_units(cable.id, area.id, "CBL", 4).await;

    let request = app
        .approved_request(&requester, &storekeeper, &[(cable.id, 3)])
        .await;
    let item_id = request.items[0].item.id;
    let allocations = &app.state.services.allocations;

    let created = allocations
        .allocate(
            &storekeeper,
            request.request.id,
            batch(&[(item_id, &[units[0].id, units[1].id])]),
        )
        .await
        .unwrap();
    assert_eq!(created.len(), 2);
    for view in &created {
        assert_eq!(view.allocation.status, AllocationStatus::Allocated);
        assert_eq!(view.allocation.allocated_by, storekeeper.caller_id);
        assert_eq!(view.allocation.request_item_id, item_id);
        assert_eq!(
            view.inventory_unit.as_ref().map(|u| u.status),
            Some(InventoryStatus::Allocated)
        );
        assert_eq!(view.material.as_ref().map(|m| m.id), Some(cable.id));
    }

    let err = allocations
        .allocate(
            &storekeeper,
            request.request.id,
            batch(&[(item_id, &[units[2].id, units[3].id])]),
        )
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        format!(
            "Invalid state: Allocation exceeds requested quantity for item {}. Requested: 3, Already allocated: 2, Trying to allocate: 2",
            item_id
        )
    );
    assert_eq!(app.unit(units[2].id).await.status, InventoryStatus::Available);
    assert_eq!(app.unit(units[3].id).await.status, InventoryStatus::Available);

    allocations
        .allocate(&storekeeper, request.request.id, batch(&[(item_id, &[units[2].id])]))
        .await
        .unwrap();
    assert_eq!(app.unit(units[3].id).await.status, InventoryStatus::Available);
    assert_eq!(app.allocation_count().await, 3);

    let view = app
        .state
        .services
        .material_requests
        .get_by_id(&requester, request.request.id)
        .await
        .unwrap();
    assert_eq!(view.items[0].allocated_quantity, 3);
}

#[tokio::test]
async fn fourth_unit_is_refused_once_three_are_allocated() {
    let app = TestApp::new().await;
    let ctx = app.ctx(Uuid::new_v4());
    let other = app.ctx(Uuid::new_v4());
    let m = app.seed_material("M", "pcs").await;
    let area = app.seed_stock_area("Main store").await;
    let units = app.seed_units(m.id, area.id, "U", 4).await;
    let request = app.approved_request(&ctx, &ctx, &[(m.id, 3)]).await;
    let item_id = request.items[0].item.id;
    let allocations = &app.state.services.allocations;

    allocations
        .allocate(
            &ctx,
            request.request.id,
            batch(&[(item_id, &[units[0].id, units[1].id, units[2].id])]),
        )
        .await
        .unwrap();

    let expected = format!(
        "Allocation exceeds requested quantity for item {}. Requested: 3, Already allocated: 3, Trying to allocate: 1",
        item_id
    );
    assert_matches!(
        allocations
            .allocate(&ctx, request.request.id, batch(&[(item_id, &[units[3].id])]))
            .await,
        Err(ServiceError::InvalidState(msg)) if msg == expected
    );
    assert_eq!(app.unit(units[3].id).await.status, InventoryStatus::Available);

    // an allocated unit is no longer available to any other request
    let second = app.approved_request(&other, &other, &[(m.id, 1)]).await;
    assert_matches!(
        allocations
            .allocate(
                &other,
                second.request.id,
                batch(&[(second.items[0].item.id, &[units[0].id])])
            )
            .await,
        Err(ServiceError::NotFound(_))
    );
    assert_eq!(app.unit(units[0].id).await.status, InventoryStatus::Allocated);
    assert_eq!(app.allocation_count().await, 3);
}

#[tokio::test]
async fn only_active_approved_requests_accept_allocations() {
    let app = TestApp::new().await;
    let ctx = app.ctx(Uuid::new_v4());
    let bolt = app.seed_material("BOLT", "pcs").await;
    let area = app.seed_stock_area("Yard").await;
    let units = app.seed_units(bolt.id, area.id, "B", 1).await;
    let allocations = &app.state.services.allocations;

    let submitted = app.create_request(&ctx, &[(bolt.id, 1)]).await;
    let item_id = submitted.items[0].item.id;
    assert_matches!(
        allocations
            .allocate(&ctx, submitted.request.id, batch(&[(item_id, &[units[0].id])]))
            .await,
        Err(ServiceError::InvalidState(_))
    );

    assert_matches!(
        allocations
            .allocate(&ctx, Uuid::new_v4(), batch(&[(item_id, &[units[0].id])]))
            .await,
        Err(ServiceError::InvalidState(_))
    );

    let rejected = app.create_request(&ctx, &[(bolt.id, 1)]).await;
    app.state
        .services
        .material_requests
        .approve_or_reject(
            &ctx,
            rejected.request.id,
            ReviewMaterialRequest {
                status: "REJECTED".into(),
                approved_items: None,
                remarks: None,
            },
        )
        .await
        .unwrap();
    assert_matches!(
        allocations
            .allocate(
                &ctx,
                rejected.request.id,
                batch(&[(rejected.items[0].item.id, &[units[0].id])])
            )
            .await,
        Err(ServiceError::InvalidState(_))
    );

    let deleted = app.approved_request(&ctx, &ctx, &[(bolt.id, 1)]).await;
    app.state
        .services
        .material_requests
        .soft_delete(&ctx, deleted.request.id)
        .await
        .unwrap();
    assert_matches!(
        allocations
            .allocate(
                &ctx,
                deleted.request.id,
                batch(&[(deleted.items[0].item.id, &[units[0].id])])
            )
            .await,
        Err(ServiceError::InvalidState(_))
    );

    assert_eq!(app.allocation_count().await, 0);
    assert_eq!(app.unit(units[0].id).await.status, InventoryStatus::Available);
}

#[tokio::test]
async fn empty_batches_are_rejected() {
    let app = TestApp::new().await;
    let ctx = app.ctx(Uuid::new_v4());
    let bolt = app.seed_material("BOLT", "pcs").await;
    let request = app.approved_request(&ctx, &ctx, &[(bolt.id, 1)]).await;
    let allocations = &app.state.services.allocations;

    assert_matches!(
        allocations
            .allocate(&ctx, request.request.id, AllocateMaterials { allocations: vec![] })
            .await,
        Err(ServiceError::ValidationError(_))
    );
    assert_matches!(
        allocations
            .allocate(&ctx, request.request.id, batch(&[(request.items[0].item.id, &[])]))
            .await,
        Err(ServiceError::ValidationError(_))
    );
}

#[tokio::test]
async fn item_must_belong_to_the_request() {
    let app = TestApp::new().await;
    let ctx = app.ctx(Uuid::new_v4());
    let bolt = app.seed_material("BOLT", "pcs").await;
    let area = app.seed_stock_area("Yard").await;
    let units = app.seed_units(bolt.id, area.id, "B", 1).await;

    let first = app.approved_request(&ctx, &ctx, &[(bolt.id, 1)]).await;
    let second = app.approved_request(&ctx, &ctx, &[(bolt.id, 1)]).await;

    assert_matches!(
        app.state
            .services
            .allocations
            .allocate(
                &ctx,
                first.request.id,
                batch(&[(second.items[0].item.id, &[units[0].id])])
            )
            .await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn unavailable_units_are_not_found() {
    let app = TestApp::new().await;
    let ctx = app.ctx(Uuid::new_v4());
    let bolt = app.seed_material("BOLT", "pcs").await;
    let nut = app.seed_material("NUT", "pcs").await;
    let area = app.seed_stock_area("Yard").await;
    let request = app.approved_request(&ctx, &ctx, &[(bolt.id, 5)]).await;
    let item_id = request.items[0].item.id;

    let wrong_material = app.seed_units(nut.id, area.id, "N", 1).await[0].id;
    let at_site = app
        .seed_unit_with(bolt.id, None, "B-site", LocationType::Site, InventoryStatus::Available, true)
        .await
        .id;
    let damaged = app
        .seed_unit_with(
            bolt.id,
            Some(area.id),
            "B-dmg",
            LocationType::Warehouse,
            InventoryStatus::Damaged,
            true,
        )
        .await
        .id;
    let retired = app
        .seed_unit_with(
            bolt.id,
            Some(area.id),
            "B-old",
            LocationType::Warehouse,
            InventoryStatus::Available,
            false,
        )
        .await
        .id;

    for unit_id in [wrong_material, at_site, damaged, retired, Uuid::new_v4()] {
        let err = app
            .state
            .services
            .allocations
            .allocate(&ctx, request.request.id, batch(&[(item_id, &[unit_id])]))
            .await
            .unwrap_err();
        let expected = format!(
            "Inventory unit {} is not available for material {}",
            unit_id, bolt.id
        );
        assert_matches!(err, ServiceError::NotFound(msg) if msg == expected);
    }
    assert_eq!(app.allocation_count().await, 0);
}

#[tokio::test]
async fn unit_with_an_active_allocation_is_a_conflict() {
    let app = TestApp::new().await;
    let ctx = app.ctx(Uuid::new_v4());
    let bolt = app.seed_material("BOLT", "pcs").await;
    let area = app.seed_stock_area("Yard").await;
    let unit = app.seed_units(bolt.id, area.id, "B", 1).await.remove(0);

    let first = app.approved_request(&ctx, &ctx, &[(bolt.id, 1)]).await;
    let second = app.approved_request(&ctx, &ctx, &[(bolt.id, 1)]).await;
    let allocations = &app.state.services.allocations;

    allocations
        .allocate(&ctx, first.request.id, batch(&[(first.items[0].item.id, &[unit.id])]))
        .await
        .unwrap();

    // inventory status drifted back without the allocation being cancelled
    set_unit_status(&app, unit.id, InventoryStatus::Available).await;

    let err = allocations
        .allocate(&ctx, second.request.id, batch(&[(second.items[0].item.id, &[unit.id])]))
        .await
        .unwrap_err();
    let expected = format!("Inventory unit {} is already allocated", unit.id);
    assert_matches!(err, ServiceError::Conflict(msg) if msg == expected);
    assert_eq!(app.allocation_count().await, 1);
}

#[tokio::test]
async fn failed_batch_leaves_no_partial_allocations() {
    let app = TestApp::new().await;
    let ctx = app.ctx(Uuid::new_v4());
    let bolt = app.seed_material("BOLT", "pcs").await;
    let nut = app.seed_material("NUT", "pcs").await;
    let area = app.seed_stock_area("Yard").await;
    let bolts = app.seed_units(bolt.id, area.id, "B", 2).await;
    let nuts = app.seed_units(nut.id, area.id, "N", 2).await;

    let request = app
        .approved_request(&ctx, &ctx, &[(bolt.id, 2), (nut.id, 1)])
        .await;
    let bolt_item = request.items.iter().find(|i| i.item.material_id == bolt.id).unwrap();
    let nut_item = request.items.iter().find(|i| i.item.material_id == nut.id).unwrap();

    let result = app
        .state
        .services
        .allocations
        .allocate(
            &ctx,
            request.request.id,
            batch(&[
                (bolt_item.item.id, &[bolts[0].id, bolts[1].id]),
                (nut_item.item.id, &[nuts[0].id, nuts[1].id]),
            ]),
        )
        .await;
    assert_matches!(result, Err(ServiceError::InvalidState(_)));

    assert_eq!(app.allocation_count().await, 0);
    for unit in bolts.iter().chain(nuts.iter()) {
        assert_eq!(app.unit(unit.id).await.status, InventoryStatus::Available);
    }
    assert_eq!(app.drain_events().await, 2);
}

#[tokio::test]
async fn same_unit_twice_in_one_batch_is_rejected() {
    let app = TestApp::new().await;
    let ctx = app.ctx(Uuid::new_v4());
    let bolt = app.seed_material("BOLT", "pcs").await;
    let area = app.seed_stock_area("Yard").await;
    let unit = app.seed_units(bolt.id, area.id, "B", 1).await.remove(0);
    let request = app.approved_request(&ctx, &ctx, &[(bolt.id, 2)]).await;

    assert_matches!(
        app.state
            .services
            .allocations
            .allocate(
                &ctx,
                request.request.id,
                batch(&[(request.items[0].item.id, &[unit.id, unit.id])])
            )
            .await,
        Err(ServiceError::NotFound(_))
    );
    assert_eq!(app.allocation_count().await, 0);
    assert_eq!(app.unit(unit.id).await.status, InventoryStatus::Available);
}

#[tokio::test]
async fn cancel_returns_the_unit_to_stock() {
    let app = TestApp::new().await;
    let ctx = app.ctx(Uuid::new_v4());
    let canceller = app.ctx(Uuid::new_v4());
    let bolt = app.seed_material("BOLT", "pcs").await;
    let area = app.seed_stock_area("Yard").await;
    let unit = app.seed_units(bolt.id, area.id, "B", 1).await.remove(0);
    let request = app.approved_request(&ctx, &ctx, &[(bolt.id, 1)]).await;
    let allocations = &app.state.services.allocations;

    let created = allocations
        .allocate(&ctx, request.request.id, batch(&[(request.items[0].item.id, &[unit.id])]))
        .await
        .unwrap();
    let allocation_id = created[0].allocation.id;

    let cancelled = allocations
        .cancel_allocation(&canceller, request.request.id, allocation_id)
        .await
        .unwrap();
    assert_eq!(cancelled.allocation.status, AllocationStatus::Cancelled);
    assert_eq!(cancelled.allocation.cancelled_by, Some(canceller.caller_id));
    assert!(cancelled.allocation.cancelled_at.is_some());
    assert_eq!(app.unit(unit.id).await.status, InventoryStatus::Available);

    let expected = format!(
        "Active allocation {} not found for material request {}",
        allocation_id, request.request.id
    );
    assert_matches!(
        allocations
            .cancel_allocation(&canceller, request.request.id, allocation_id)
            .await,
        Err(ServiceError::NotFound(msg)) if msg == expected
    );

    // the freed unit can be allocated again
    let again = allocations
        .allocate(&ctx, request.request.id, batch(&[(request.items[0].item.id, &[unit.id])]))
        .await
        .unwrap();
    assert_eq!(again.len(), 1);
    assert_eq!(app.allocation_count().await, 2);
}

#[tokio::test]
async fn cancel_checks_the_owning_request() {
    let app = TestApp::new().await;
    let ctx = app.ctx(Uuid::new_v4());
    let bolt = app.seed_material("BOLT", "pcs").await;
    let area = app.seed_stock_area("Yard").await;
    let unit = app.seed_units(bolt.id, area.id, "B", 1).await.remove(0);
    let request = app.approved_request(&ctx, &ctx, &[(bolt.id, 1)]).await;
    let other = app.approved_request(&ctx, &ctx, &[(bolt.id, 1)]).await;
    let allocations = &app.state.services.allocations;

    let created = allocations
        .allocate(&ctx, request.request.id, batch(&[(request.items[0].item.id, &[unit.id])]))
        .await
        .unwrap();

    for request_id in [other.request.id, Uuid::new_v4()] {
        assert_matches!(
            allocations
                .cancel_allocation(&ctx, request_id, created[0].allocation.id)
                .await,
            Err(ServiceError::NotFound(_))
        );
    }
    assert_eq!(app.unit(unit.id).await.status, InventoryStatus::Allocated);
}

#[tokio::test]
async fn transferred_allocations_stay_and_keep_counting() {
    let app = TestApp::new().await;
    let ctx = app.ctx(Uuid::new_v4());
    let bolt = app.seed_material("BOLT", "pcs").await;
    let area = app.seed_stock_area("Yard").await;
    let units = app.seed_units(bolt.id, area.id, "B", 2).await;
    let request = app.approved_request(&ctx, &ctx, &[(bolt.id, 1)]).await;
    let item_id = request.items[0].item.id;
    let allocations = &app.state.services.allocations;

    let created = allocations
        .allocate(&ctx, request.request.id, batch(&[(item_id, &[units[0].id])]))
        .await
        .unwrap();
    set_allocation_status(&app, created[0].allocation.id, AllocationStatus::Transferred).await;

    assert_matches!(
        allocations
            .cancel_allocation(&ctx, request.request.id, created[0].allocation.id)
            .await,
        Err(ServiceError::NotFound(_))
    );
    assert_matches!(
        allocations
            .allocate(&ctx, request.request.id, batch(&[(item_id, &[units[1].id])]))
            .await,
        Err(ServiceError::InvalidState(_))
    );
    assert_eq!(
        app.allocation(created[0].allocation.id).await.status,
        AllocationStatus::Transferred
    );
}

#[tokio::test]
async fn allocations_are_listed_per_item_newest_first() {
    let app = TestApp::new().await;
    let storekeeper = app.seed_user("Store Keeper").await;
    let ctx = app.ctx(storekeeper.id);
    let bolt = app.seed_material("BOLT", "pcs").await;
    let nut = app.seed_material("NUT", "pcs").await;
    let area = app.seed_stock_area("Yard").await;
    let units = app.seed_units(bolt.id, area.id, "B", 3).await;
    let request = app
        .approved_request(&ctx, &ctx, &[(bolt.id, 3), (nut.id, 2)])
        .await;
    let bolt_item = request.items.iter().find(|i| i.item.material_id == bolt.id).unwrap();
    let allocations = &app.state.services.allocations;

    let mut ids = Vec::new();
    for unit in &units {
        let created = allocations
            .allocate(&ctx, request.request.id, batch(&[(bolt_item.item.id, &[unit.id])]))
            .await
            .unwrap();
        ids.push(created[0].allocation.id);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    allocations
        .cancel_allocation(&ctx, request.request.id, ids[0])
        .await
        .unwrap();

    let listed = allocations
        .list_allocations(&ctx, request.request.id)
        .await
        .unwrap();
    assert_eq!(listed.len(), 2);

    let bolts = listed
        .iter()
        .find(|group| group.request_item.id == bolt_item.item.id)
        .unwrap();
    assert_eq!(bolts.quantity_requested, 3);
    assert_eq!(bolts.active_count, 2);
    let listed_ids: Vec<Uuid> = bolts.allocations.iter().map(|a| a.allocation.id).collect();
    assert_eq!(listed_ids, vec![ids[2], ids[1], ids[0]]);
    assert_eq!(bolts.allocations[2].allocation.status, AllocationStatus::Cancelled);
    assert_eq!(
        bolts.allocations[0]
            .allocated_by_user
            .as_ref()
            .map(|u| u.name.as_str()),
        Some("Store Keeper")
    );
    assert!(bolts.allocations[0].request_item.is_some());

    let nuts = listed
        .iter()
        .find(|group| group.request_item.material_id == nut.id)
        .unwrap();
    assert!(nuts.allocations.is_empty());
    assert_eq!(nuts.active_count, 0);
    assert_eq!(nuts.material.as_ref().map(|m| m.code.as_str()), Some("NUT"));

    assert_matches!(
        allocations.list_allocations(&ctx, Uuid::new_v4()).await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn available_stock_groups_by_material_and_area() {
    let app = TestApp::new().await;
    let ctx = app.ctx(Uuid::new_v4());
    let bolt = app.seed_material("BOLT", "pcs").await;
    let nut = app.seed_material("NUT", "pcs").await;
    let north = app.seed_stock_area("North").await;
    let south = app.seed_stock_area("South").await;
    app.seed_units(bolt.id, north.id, "BN", 2).await;
    app.seed_units(bolt.id, south.id, "BS", 1).await;
    app.seed_units(nut.id, north.id, "NN", 3).await;
    app.seed_unit_with(
        bolt.id,
        Some(north.id),
        "BN-dmg",
        LocationType::Warehouse,
        InventoryStatus::Damaged,
        true,
    )
    .await;
    app.seed_unit_with(bolt.id, None, "B-site", LocationType::Site, InventoryStatus::Available, true)
        .await;

    let request = app.approved_request(&ctx, &ctx, &[(bolt.id, 1)]).await;
    let allocations = &app.state.services.allocations;

    let stock = allocations
        .list_available_stock(&ctx, request.request.id, AvailableStockFilters::default())
        .await
        .unwrap();
    assert_eq!(stock.total_units, 6);
    assert_eq!(stock.groups.len(), 3);
    for group in &stock.groups {
        assert_eq!(group.count as usize, group.units.len());
        assert!(group.units.iter().all(|u| u.is_allocatable()));
        assert!(group.material.is_some());
        assert!(group.stock_area.is_some());
    }
    let bolt_north = stock
        .groups
        .iter()
        .find(|g| g.material_id == bolt.id && g.stock_area_id == Some(north.id))
        .unwrap();
    assert_eq!(bolt_north.count, 2);
    let serials: Vec<&str> = bolt_north
        .units
        .iter()
        .filter_map(|u| u.serial_number.as_deref())
        .collect();
    assert_eq!(serials, vec!["BN-1", "BN-2"]);

    let north_only = allocations
        .list_available_stock(
            &ctx,
            request.request.id,
            AvailableStockFilters {
                stock_area_id: Some(north.id),
                material_id: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(north_only.total_units, 5);
    assert_eq!(north_only.groups.len(), 2);

    let nuts = allocations
        .list_available_stock(
            &ctx,
            request.request.id,
            AvailableStockFilters {
                stock_area_id: None,
                material_id: Some(nut.id),
            },
        )
        .await
        .unwrap();
    assert_eq!(nuts.total_units, 3);
    assert_eq!(nuts.groups.len(), 1);

    // reading stock changes nothing
    let again = allocations
        .list_available_stock(&ctx, request.request.id, AvailableStockFilters::default())
        .await
        .unwrap();
    assert_eq!(again.total_units, stock.total_units);
    assert_eq!(app.allocation_count().await, 0);

    assert_matches!(
        allocations
            .list_available_stock(&ctx, Uuid::new_v4(), AvailableStockFilters::default())
            .await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn allocated_units_leave_available_stock() {
    let app = TestApp::new().await;
    let ctx = app.ctx(Uuid::new_v4());
    let bolt = app.seed_material("BOLT", "pcs").await;
    let area = app.seed_stock_area("Yard").await;
    let units = app.seed_units(bolt.id, area.id, "B", 2).await;
    let request = app.approved_request(&ctx, &ctx, &[(bolt.id, 1)]).await;
    let allocations = &app.state.services.allocations;

    allocations
        .allocate(&ctx, request.request.id, batch(&[(request.items[0].item.id, &[units[0].id])]))
        .await
        .unwrap();

    let stock = allocations
        .list_available_stock(&ctx, request.request.id, AvailableStockFilters::default())
        .await
        .unwrap();
    assert_eq!(stock.total_units, 1);
    assert_eq!(stock.groups[0].units[0].id, units[1].id);
}

#[tokio::test]
async fn allocation_side_effects_are_recorded() {
    let app = TestApp::new().await;
    let requester = app.ctx(Uuid::new_v4());
    let storekeeper = app.ctx(Uuid::new_v4());
    let bolt = app.seed_material("BOLT", "pcs").await;
    let area = app.seed_stock_area("Yard").await;
    let units = app.seed_units(bolt.id, area.id, "B", 2).await;
    let request = app
        .approved_request(&requester, &storekeeper, &[(bolt.id, 2)])
        .await;
    let allocations = &app.state.services.allocations;

    let created = allocations
        .allocate(
            &storekeeper,
            request.request.id,
            batch(&[(request.items[0].item.id, &[units[0].id, units[1].id])]),
        )
        .await
        .unwrap();
    allocations
        .cancel_allocation(&storekeeper, request.request.id, created[1].allocation.id)
        .await
        .unwrap();

    // create, approve, allocate, cancel
    assert_eq!(app.drain_events().await, 4);

    let audit = &app.state.services.audit_logs;
    let allocate_logs = audit
        .list(
            &app.ctx(Uuid::new_v4()),
            AuditLogFilters {
                entity_type: Some(ENTITY_MATERIAL_REQUEST.to_string()),
                entity_id: Some(request.request.id),
                user_id: Some(storekeeper.caller_id),
            },
            None,
            None,
        )
        .await
        .unwrap();
    let allocate = allocate_logs
        .items
        .iter()
        .find(|l| l.action == AuditAction::Allocate)
        .expect("allocate audit entry");
    let ids = allocate.changes.as_ref().unwrap()["allocation_ids"]
        .as_array()
        .unwrap()
        .len();
    assert_eq!(ids, 2);

    let cancel_logs = audit
        .list(
            &app.ctx(Uuid::new_v4()),
            AuditLogFilters {
                entity_type: Some(ENTITY_MATERIAL_ALLOCATION.to_string()),
                entity_id: Some(created[1].allocation.id),
                user_id: None,
            },
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(cancel_logs.items.len(), 1);
    assert_eq!(cancel_logs.items[0].action, AuditAction::Cancel);
    assert_eq!(
        cancel_logs.items[0].changes.as_ref().unwrap()["inventory_id"],
        units[1].id.to_string()
    );

    let notes = app
        .state
        .services
        .notifications
        .list_for_user(&requester, false, None, None)
        .await
        .unwrap();
    let allocated = notes
        .items
        .iter()
        .find(|n| n.kind == NotificationKind::MaterialsAllocated)
        .expect("allocation notification");
    assert_eq!(allocated.entity_id, Some(request.request.id));
    assert!(allocated.message.starts_with("2 inventory unit(s)"));
    // no one is notified about a cancellation
    assert_eq!(notes.pagination.total_items, 2);
}

#[tokio::test]
async fn row_locking_mode_allocates_normally() {
    let app = TestApp::with_config(|cfg| cfg.allocation_row_locks = true).await;
    let ctx = app.ctx(Uuid::new_v4());
    let bolt = app.seed_material("BOLT", "pcs").await;
    let area = app.seed_stock_area("Yard").await;
    let units = app.seed_units(bolt.id, area.id, "B", 2).await;
    let request = app.approved_request(&ctx, &ctx, &[(bolt.id, 2)]).await;
    let allocations = &app.state.services.allocations;

    let created = allocations
        .allocate(
            &ctx,
            request.request.id,
            batch(&[(request.items[0].item.id, &[units[0].id, units[1].id])]),
        )
        .await
        .unwrap();
    assert_eq!(created.len(), 2);

    allocations
        .cancel_allocation(&ctx, request.request.id, created[0].allocation.id)
        .await
        .unwrap();
    assert_eq!(app.unit(units[0].id).await.status, InventoryStatus::Available);
    assert_eq!(app.unit(units[1].id).await.status, InventoryStatus::Allocated);
}
