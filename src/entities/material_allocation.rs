use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationStatus {
    #[sea_orm(string_value = "ALLOCATED")]
    Allocated,
    #[sea_orm(string_value = "TRANSFERRED")]
    Transferred,
    #[sea_orm(string_value = "CANCELLED")]
    Cancelled,
}

impl AllocationStatus {
    /// Statuses that hold an inventory unit and count against the requested quantity.
    pub const ACTIVE: [AllocationStatus; 2] =
        [AllocationStatus::Allocated, AllocationStatus::Transferred];

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }
}

/// Binds one inventory unit to one request item.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "material_allocations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub material_request_id: Uuid,
    pub request_item_id: Uuid,
    pub inventory_id: Uuid,
    pub allocated_by: Uuid,
    pub allocated_at: DateTime<Utc>,
    pub status: AllocationStatus,
    pub cancelled_by: Option<Uuid>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::material_request::Entity",
        from = "Column::MaterialRequestId",
        to = "super::material_request::Column::Id"
    )]
    MaterialRequest,
    #[sea_orm(
        belongs_to = "super::material_request_item::Entity",
        from = "Column::RequestItemId",
        to = "super::material_request_item::Column::Id"
    )]
    RequestItem,
    #[sea_orm(
        belongs_to = "super::inventory_unit::Entity",
        from = "Column::InventoryId",
        to = "super::inventory_unit::Column::Id"
    )]
    InventoryUnit,
}

impl Related<super::material_request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MaterialRequest.def()
    }
}

impl Related<super::material_request_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RequestItem.def()
    }
}

impl Related<super::inventory_unit::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InventoryUnit.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
