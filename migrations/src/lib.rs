pub use sea_orm_migration::prelude::*;

mod m20260101_000001_create_reference_tables;
mod m20260101_000002_create_material_request_tables;
mod m20260101_000003_create_inventory_master_table;
mod m20260101_000004_create_material_allocations_table;
mod m20260101_000005_create_audit_and_notification_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260101_000001_create_reference_tables::Migration),
            Box::new(m20260101_000002_create_material_request_tables::Migration),
            Box::new(m20260101_000003_create_inventory_master_table::Migration),
            Box::new(m20260101_000004_create_material_allocations_table::Migration),
            Box::new(m20260101_000005_create_audit_and_notification_tables::Migration),
        ]
    }
}
