use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(MaterialRequests::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MaterialRequests::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(MaterialRequests::PrNumbers).json().not_null())
                    .col(ColumnDef::new(MaterialRequests::Status).string().not_null())
                    .col(ColumnDef::new(MaterialRequests::RequestedBy).uuid().not_null())
                    .col(ColumnDef::new(MaterialRequests::ApprovedBy).uuid().null())
                    .col(
                        ColumnDef::new(MaterialRequests::ApprovedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(MaterialRequests::Remarks).text().null())
                    .col(ColumnDef::new(MaterialRequests::ApprovalRemarks).text().null())
                    .col(ColumnDef::new(MaterialRequests::TicketId).string().null())
                    .col(ColumnDef::new(MaterialRequests::OrgId).uuid().null())
                    .col(
                        ColumnDef::new(MaterialRequests::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(MaterialRequests::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MaterialRequests::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(MaterialRequestItems::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MaterialRequestItems::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MaterialRequestItems::MaterialRequestId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MaterialRequestItems::MaterialId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MaterialRequestItems::QuantityRequested)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MaterialRequestItems::QuantityApproved)
                            .integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(MaterialRequestItems::UnitOfMeasure)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(MaterialRequestItems::Remarks).text().null())
                    .col(
                        ColumnDef::new(MaterialRequestItems::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_material_request_items_request")
                            .from(
                                MaterialRequestItems::Table,
                                MaterialRequestItems::MaterialRequestId,
                            )
                            .to(MaterialRequests::Table, MaterialRequests::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_material_requests_status")
                    .table(MaterialRequests::Table)
                    .col(MaterialRequests::Status)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_material_request_items_request")
                    .table(MaterialRequestItems::Table)
                    .col(MaterialRequestItems::MaterialRequestId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(MaterialRequestItems::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(MaterialRequests::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum MaterialRequests {
    Table,
    Id,
    PrNumbers,
    Status,
    RequestedBy,
    ApprovedBy,
    ApprovedAt,
    Remarks,
    ApprovalRemarks,
    TicketId,
    OrgId,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum MaterialRequestItems {
    Table,
    Id,
    MaterialRequestId,
    MaterialId,
    QuantityRequested,
    QuantityApproved,
    UnitOfMeasure,
    Remarks,
    CreatedAt,
}
