use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(MaterialAllocations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MaterialAllocations::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MaterialAllocations::MaterialRequestId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MaterialAllocations::RequestItemId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MaterialAllocations::InventoryId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MaterialAllocations::AllocatedBy)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MaterialAllocations::AllocatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(MaterialAllocations::Status).string().not_null())
                    .col(ColumnDef::new(MaterialAllocations::CancelledBy).uuid().null())
                    .col(
                        ColumnDef::new(MaterialAllocations::CancelledAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(MaterialAllocations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MaterialAllocations::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_material_allocations_item_status")
                    .table(MaterialAllocations::Table)
                    .col(MaterialAllocations::RequestItemId)
                    .col(MaterialAllocations::Status)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_material_allocations_inventory_status")
                    .table(MaterialAllocations::Table)
                    .col(MaterialAllocations::InventoryId)
                    .col(MaterialAllocations::Status)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_material_allocations_request")
                    .table(MaterialAllocations::Table)
                    .col(MaterialAllocations::MaterialRequestId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(MaterialAllocations::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum MaterialAllocations {
    Table,
    Id,
    MaterialRequestId,
    RequestItemId,
    InventoryId,
    AllocatedBy,
    AllocatedAt,
    Status,
    CancelledBy,
    CancelledAt,
    CreatedAt,
    UpdatedAt,
}
