//! Explicit transaction boundaries.
//!
//! Service methods open a transaction with [`begin`], run every read and write through
//! it, and hand the outcome to [`settle`]. A failed body is rolled back before its
//! original error is returned, so callers always see the typed `ServiceError` that
//! caused the abort rather than a flattened database error.

use crate::errors::ServiceError;
use metrics::counter;
use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionTrait};
use tracing::{debug, warn};

pub async fn begin(db: &DatabaseConnection) -> Result<DatabaseTransaction, ServiceError> {
    let txn = db.begin().await?;
    counter!("db.transaction.started", 1);
    Ok(txn)
}

/// Commits `txn` when `result` is `Ok`, otherwise rolls it back and returns the error.
pub async fn settle<T>(
    txn: DatabaseTransaction,
    result: Result<T, ServiceError>,
) -> Result<T, ServiceError> {
    match result {
        Ok(value) => {
            txn.commit().await?;
            counter!("db.transaction.committed", 1);
            debug!("Transaction committed");
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = txn.rollback().await {
                warn!(error = %rollback_err, "Transaction rollback failed");
            }
            counter!("db.transaction.rolled_back", 1);
            debug!(error = %err, "Transaction rolled back");
            Err(err)
        }
    }
}
