//! Queries shared by the request and allocation services.

use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QuerySelect, Select,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::context::RequestContext;
use crate::entities::{material, material_request, stock_area, user};
use crate::errors::ServiceError;

/// Public part of a user record embedded in responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

impl From<user::Model> for UserProfile {
    fn from(model: user::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            email: model.email,
        }
    }
}

/// Adds `FOR UPDATE` when row locking is enabled. SQLite ignores the clause.
pub fn with_row_lock<E: EntityTrait>(select: Select<E>, lock: bool) -> Select<E> {
    if lock {
        select.lock_exclusive()
    } else {
        select
    }
}

/// Restricts a request query to the caller's organization, if any.
pub fn scoped_requests(ctx: &RequestContext) -> Select<material_request::Entity> {
    let select = material_request::Entity::find();
    match ctx.org_id {
        Some(org_id) => select.filter(material_request::Column::OrgId.eq(org_id)),
        None => select,
    }
}

pub async fn find_active_request<C: ConnectionTrait>(
    db: &C,
    ctx: &RequestContext,
    id: Uuid,
) -> Result<Option<material_request::Model>, ServiceError> {
    Ok(scoped_requests(ctx)
        .filter(material_request::Column::Id.eq(id))
        .filter(material_request::Column::IsActive.eq(true))
        .one(db)
        .await?)
}

pub async fn require_active_request<C: ConnectionTrait>(
    db: &C,
    ctx: &RequestContext,
    id: Uuid,
) -> Result<material_request::Model, ServiceError> {
    find_active_request(db, ctx, id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Material request {} not found", id)))
}

fn unique(ids: impl IntoIterator<Item = Uuid>) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

/// Resolves every id to an active material in the caller's organization.
pub async fn resolve_materials<C: ConnectionTrait>(
    db: &C,
    ctx: &RequestContext,
    ids: impl IntoIterator<Item = Uuid>,
) -> Result<HashMap<Uuid, material::Model>, ServiceError> {
    let ids = unique(ids);
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let mut select = material::Entity::find()
        .filter(material::Column::Id.is_in(ids.clone()))
        .filter(material::Column::IsActive.eq(true));
    if let Some(org_id) = ctx.org_id {
        select = select.filter(material::Column::OrgId.eq(org_id));
    }
    let found: HashMap<Uuid, material::Model> = select
        .all(db)
        .await?
        .into_iter()
        .map(|m| (m.id, m))
        .collect();

    if let Some(missing) = ids.iter().find(|id| !found.contains_key(id)) {
        return Err(ServiceError::NotFound(format!("Material {} not found", missing)));
    }
    Ok(found)
}

/// Loads materials for display, including inactive ones.
pub async fn materials_by_id<C: ConnectionTrait>(
    db: &C,
    ids: impl IntoIterator<Item = Uuid>,
) -> Result<HashMap<Uuid, material::Model>, ServiceError> {
    let ids = unique(ids);
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    Ok(material::Entity::find()
        .filter(material::Column::Id.is_in(ids))
        .all(db)
        .await?
        .into_iter()
        .map(|m| (m.id, m))
        .collect())
}

pub async fn stock_areas_by_id<C: ConnectionTrait>(
    db: &C,
    ids: impl IntoIterator<Item = Uuid>,
) -> Result<HashMap<Uuid, stock_area::Model>, ServiceError> {
    let ids = unique(ids);
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    Ok(stock_area::Entity::find()
        .filter(stock_area::Column::Id.is_in(ids))
        .all(db)
        .await?
        .into_iter()
        .map(|a| (a.id, a))
        .collect())
}

pub async fn user_profiles<C: ConnectionTrait>(
    db: &C,
    ids: impl IntoIterator<Item = Uuid>,
) -> Result<HashMap<Uuid, UserProfile>, ServiceError> {
    let ids = unique(ids);
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    Ok(user::Entity::find()
        .filter(user::Column::Id.is_in(ids))
        .all(db)
        .await?
        .into_iter()
        .map(|u| (u.id, UserProfile::from(u)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_keeps_first_occurrence_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(unique(vec![a, b, a, b]), vec![a, b]);
    }

    #[test]
    fn org_scope_adds_filter() {
        use sea_orm::{DbBackend, QueryTrait};

        let ctx = RequestContext::new(Uuid::new_v4()).with_org(Uuid::nil());
        let sql = scoped_requests(&ctx).build(DbBackend::Postgres).to_string();
        assert!(sql.contains("\"org_id\""));

        let unscoped = scoped_requests(&RequestContext::new(Uuid::new_v4()))
            .build(DbBackend::Postgres)
            .to_string();
        assert!(!unscoped.contains("WHERE"));
    }
}
