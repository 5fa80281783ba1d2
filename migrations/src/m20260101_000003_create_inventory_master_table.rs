use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // One row per serialized unit of stock
        manager
            .create_table(
                Table::create()
                    .table(InventoryMaster::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(InventoryMaster::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(InventoryMaster::MaterialId).uuid().not_null())
                    .col(ColumnDef::new(InventoryMaster::SerialNumber).string().null())
                    .col(
                        ColumnDef::new(InventoryMaster::CurrentLocationType)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(InventoryMaster::LocationId).uuid().null())
                    .col(ColumnDef::new(InventoryMaster::Status).string().not_null())
                    .col(
                        ColumnDef::new(InventoryMaster::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(InventoryMaster::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InventoryMaster::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_inventory_master_availability")
                    .table(InventoryMaster::Table)
                    .col(InventoryMaster::MaterialId)
                    .col(InventoryMaster::CurrentLocationType)
                    .col(InventoryMaster::Status)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(InventoryMaster::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum InventoryMaster {
    Table,
    Id,
    MaterialId,
    SerialNumber,
    CurrentLocationType,
    LocationId,
    Status,
    IsActive,
    CreatedAt,
    UpdatedAt,
}
