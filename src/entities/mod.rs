pub mod audit_log;
pub mod inventory_unit;
pub mod material;
pub mod material_allocation;
pub mod material_request;
pub mod material_request_item;
pub mod notification;
pub mod stock_area;
pub mod user;
