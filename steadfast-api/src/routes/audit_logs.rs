/// Read-only audit trail: list, get, search, count, stats and export

use axum::Router;
use steadfast_shared::models::audit_log::AuditLogResource;

use super::crud;
use crate::app::AppState;

pub fn routes() -> Router<AppState> {
    crud::read_routes::<AuditLogResource>()
}
