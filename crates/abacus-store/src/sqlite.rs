//! Durable SQLite-backed operation store.
//!
//! Translates the domain-level store primitives into guarded SQL statements.
//! Concurrency-critical transitions use conditional UPDATEs whose WHERE
//! clause re-checks the precondition (`status = 'ready'`, `left_value IS
//! NULL`, status not terminal), so a lost race surfaces as zero affected
//! rows instead of a clobbered row. The connection itself is serialized
//! behind a mutex; multi-statement primitives run inside one transaction.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;

use abacus_core::error::{StoreError, StoreResult};
use abacus_core::store::OperationStore;
use abacus_core::types::{
    ChildSide, Expression, ExpressionId, ExpressionStatus, NewOperation, Operation, OperationId,
    OperationStatus, Operator,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS expressions (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id      INTEGER NOT NULL,
    text          TEXT    NOT NULL,
    status        TEXT    NOT NULL,
    result        REAL,
    error_message TEXT,
    created_at    TEXT    NOT NULL,
    updated_at    TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS operations (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    expression_id INTEGER NOT NULL REFERENCES expressions(id) ON DELETE CASCADE,
    parent_id     INTEGER REFERENCES operations(id),
    child_side    TEXT,
    is_root       INTEGER NOT NULL,
    operator      TEXT    NOT NULL,
    left_value    REAL,
    right_value   REAL,
    result        REAL,
    status        TEXT    NOT NULL,
    error_message TEXT,
    created_at    TEXT    NOT NULL,
    updated_at    TEXT    NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_operations_status ON operations(status);
CREATE INDEX IF NOT EXISTS idx_operations_expression ON operations(expression_id);
CREATE INDEX IF NOT EXISTS idx_expressions_owner ON expressions(owner_id);
";

const OPERATION_COLUMNS: &str = "id, expression_id, parent_id, child_side, is_root, operator, \
     left_value, right_value, result, status, error_message, created_at, updated_at";

const EXPRESSION_COLUMNS: &str =
    "id, owner_id, text, status, result, error_message, created_at, updated_at";

const TERMINAL_STATUSES: &str = "('completed', 'error', 'canceled')";

/// SQLite implementation of [`OperationStore`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file and apply the schema.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Arc<Self>> {
        let conn = Connection::open(path).map_err(StoreError::backend)?;
        Self::with_connection(conn)
    }

    /// Open a private in-memory database. Each call gets a fresh store.
    pub fn open_in_memory() -> StoreResult<Arc<Self>> {
        let conn = Connection::open_in_memory().map_err(StoreError::backend)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> StoreResult<Arc<Self>> {
        conn.pragma_update(None, "foreign_keys", "ON").map_err(StoreError::backend)?;
        conn.execute_batch(SCHEMA).map_err(StoreError::backend)?;
        Ok(Arc::new(Self { conn: Mutex::new(conn) }))
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

fn parse_timestamp(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::CorruptRow { reason: format!("bad timestamp '{raw}': {e}") })
}

// Raw column values pulled out of a row before domain decoding. Keeping the
// rusqlite closure free of domain parsing lets decode failures surface as
// CorruptRow instead of being shoehorned into rusqlite's error type.
struct RawOperation {
    id: i64,
    expression_id: i64,
    parent_id: Option<i64>,
    child_side: Option<String>,
    is_root: bool,
    operator: String,
    left_value: Option<f64>,
    right_value: Option<f64>,
    result: Option<f64>,
    status: String,
    error_message: Option<String>,
    created_at: String,
    updated_at: String,
}

fn raw_operation(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawOperation> {
    Ok(RawOperation {
        id: row.get(0)?,
        expression_id: row.get(1)?,
        parent_id: row.get(2)?,
        child_side: row.get(3)?,
        is_root: row.get(4)?,
        operator: row.get(5)?,
        left_value: row.get(6)?,
        right_value: row.get(7)?,
        result: row.get(8)?,
        status: row.get(9)?,
        error_message: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

fn decode_operation(raw: RawOperation) -> StoreResult<Operation> {
    let operator = Operator::parse(&raw.operator).ok_or_else(|| StoreError::CorruptRow {
        reason: format!("unknown operator '{}'", raw.operator),
    })?;
    let status = OperationStatus::parse(&raw.status).ok_or_else(|| StoreError::CorruptRow {
        reason: format!("unknown operation status '{}'", raw.status),
    })?;
    let child_side = match raw.child_side {
        Some(side) => Some(ChildSide::parse(&side).ok_or_else(|| StoreError::CorruptRow {
            reason: format!("unknown child side '{side}'"),
        })?),
        None => None,
    };

    Ok(Operation {
        id: OperationId(raw.id),
        expression_id: ExpressionId(raw.expression_id),
        parent_id: raw.parent_id.map(OperationId),
        child_side,
        is_root: raw.is_root,
        operator,
        left_value: raw.left_value,
        right_value: raw.right_value,
        result: raw.result,
        status,
        error_message: raw.error_message,
        created_at: parse_timestamp(&raw.created_at)?,
        updated_at: parse_timestamp(&raw.updated_at)?,
    })
}

struct RawExpression {
    id: i64,
    owner_id: i64,
    text: String,
    status: String,
    result: Option<f64>,
    error_message: Option<String>,
    created_at: String,
    updated_at: String,
}

fn raw_expression(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawExpression> {
    Ok(RawExpression {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        text: row.get(2)?,
        status: row.get(3)?,
        result: row.get(4)?,
        error_message: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn decode_expression(raw: RawExpression) -> StoreResult<Expression> {
    let status = ExpressionStatus::parse(&raw.status).ok_or_else(|| StoreError::CorruptRow {
        reason: format!("unknown expression status '{}'", raw.status),
    })?;
    Ok(Expression {
        id: ExpressionId(raw.id),
        owner_id: raw.owner_id,
        text: raw.text,
        status,
        result: raw.result,
        error_message: raw.error_message,
        created_at: parse_timestamp(&raw.created_at)?,
        updated_at: parse_timestamp(&raw.updated_at)?,
    })
}

fn query_operation(conn: &Connection, id: OperationId) -> StoreResult<Operation> {
    let raw = conn
        .query_row(
            &format!("SELECT {OPERATION_COLUMNS} FROM operations WHERE id = ?1"),
            params![id.0],
            raw_operation,
        )
        .optional()
        .map_err(StoreError::backend)?
        .ok_or(StoreError::OperationNotFound { id })?;
    decode_operation(raw)
}

fn query_expression(conn: &Connection, id: ExpressionId) -> StoreResult<Expression> {
    let raw = conn
        .query_row(
            &format!("SELECT {EXPRESSION_COLUMNS} FROM expressions WHERE id = ?1"),
            params![id.0],
            raw_expression,
        )
        .optional()
        .map_err(StoreError::backend)?
        .ok_or(StoreError::ExpressionNotFound { id })?;
    decode_expression(raw)
}

#[async_trait]
impl OperationStore for SqliteStore {
    async fn create_expression(&self, owner_id: i64, text: &str) -> StoreResult<Expression> {
        let conn = self.conn.lock().await;
        let now = now_rfc3339();
        conn.execute(
            "INSERT INTO expressions (owner_id, text, status, created_at, updated_at) \
             VALUES (?1, ?2, 'pending', ?3, ?3)",
            params![owner_id, text, now],
        )
        .map_err(StoreError::backend)?;
        query_expression(&conn, ExpressionId(conn.last_insert_rowid()))
    }

    async fn create_operation(&self, op: NewOperation) -> StoreResult<Operation> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().map_err(StoreError::backend)?;

        let expression_exists: bool = tx
            .query_row(
                "SELECT COUNT(*) FROM expressions WHERE id = ?1",
                params![op.expression_id.0],
                |row| row.get::<_, i64>(0),
            )
            .map(|count| count > 0)
            .map_err(StoreError::backend)?;
        if !expression_exists {
            return Err(StoreError::ExpressionNotFound { id: op.expression_id });
        }

        let now = now_rfc3339();
        let (parent_id, child_side) = match op.parent {
            Some((id, side)) => (Some(id.0), Some(side.as_str())),
            None => (None, None),
        };
        tx.execute(
            "INSERT INTO operations \
             (expression_id, parent_id, child_side, is_root, operator, left_value, right_value, \
              status, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
            params![
                op.expression_id.0,
                parent_id,
                child_side,
                op.is_root(),
                op.operator.as_str(),
                op.left_value,
                op.right_value,
                op.initial_status().as_str(),
                now,
            ],
        )
        .map_err(StoreError::backend)?;

        let operation = query_operation(&tx, OperationId(tx.last_insert_rowid()))?;
        tx.commit().map_err(StoreError::backend)?;
        Ok(operation)
    }

    async fn fetch_expression(&self, id: ExpressionId) -> StoreResult<Expression> {
        let conn = self.conn.lock().await;
        query_expression(&conn, id)
    }

    async fn fetch_operation(&self, id: OperationId) -> StoreResult<Operation> {
        let conn = self.conn.lock().await;
        query_operation(&conn, id)
    }

    async fn list_operations_by_expression(
        &self,
        expression_id: ExpressionId,
    ) -> StoreResult<Vec<Operation>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {OPERATION_COLUMNS} FROM operations WHERE expression_id = ?1 ORDER BY id"
            ))
            .map_err(StoreError::backend)?;
        let raws = stmt
            .query_map(params![expression_id.0], raw_operation)
            .map_err(StoreError::backend)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::backend)?;
        raws.into_iter().map(decode_operation).collect()
    }

    async fn list_expressions_by_owner(&self, owner_id: i64) -> StoreResult<Vec<Expression>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {EXPRESSION_COLUMNS} FROM expressions WHERE owner_id = ?1 ORDER BY id"
            ))
            .map_err(StoreError::backend)?;
        let raws = stmt
            .query_map(params![owner_id], raw_expression)
            .map_err(StoreError::backend)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::backend)?;
        raws.into_iter().map(decode_expression).collect()
    }

    async fn update_operation_operand(
        &self,
        id: OperationId,
        side: ChildSide,
        value: f64,
    ) -> StoreResult<Operation> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().map_err(StoreError::backend)?;
        let now = now_rfc3339();

        // The IS NULL guard makes the write first-wins: a populated slot
        // is never overwritten, and losing a race reads as zero rows.
        let column = match side {
            ChildSide::Left => "left_value",
            ChildSide::Right => "right_value",
        };
        let updated = tx
            .execute(
                &format!(
                    "UPDATE operations SET {column} = ?1, updated_at = ?2 \
                     WHERE id = ?3 AND {column} IS NULL"
                ),
                params![value, now, id.0],
            )
            .map_err(StoreError::backend)?;
        if updated == 0 {
            // Dropping the transaction rolls back.
            return match query_operation(&tx, id) {
                Ok(_) => Err(StoreError::OperandAlreadySet { id, side }),
                Err(err) => Err(err),
            };
        }

        // Readiness promotion in the same transaction as the operand write.
        tx.execute(
            "UPDATE operations SET status = 'ready', updated_at = ?1 \
             WHERE id = ?2 AND status = 'pending' \
               AND left_value IS NOT NULL AND right_value IS NOT NULL",
            params![now, id.0],
        )
        .map_err(StoreError::backend)?;

        let operation = query_operation(&tx, id)?;
        tx.commit().map_err(StoreError::backend)?;
        Ok(operation)
    }

    async fn update_operation_status(
        &self,
        id: OperationId,
        status: OperationStatus,
    ) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        let updated = conn
            .execute(
                "UPDATE operations SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), now_rfc3339(), id.0],
            )
            .map_err(StoreError::backend)?;
        if updated == 0 {
            return Err(StoreError::OperationNotFound { id });
        }
        Ok(())
    }

    async fn update_operation_result(&self, id: OperationId, value: f64) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        let updated = conn
            .execute(
                &format!(
                    "UPDATE operations SET result = ?1, status = 'completed', updated_at = ?2 \
                     WHERE id = ?3 AND status NOT IN {TERMINAL_STATUSES}"
                ),
                params![value, now_rfc3339(), id.0],
            )
            .map_err(StoreError::backend)?;
        if updated == 0 {
            // Either the row is already terminal (a no-op by contract) or
            // it does not exist at all.
            query_operation(&conn, id)?;
        }
        Ok(())
    }

    async fn update_operation_error(&self, id: OperationId, message: &str) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        let updated = conn
            .execute(
                &format!(
                    "UPDATE operations SET error_message = ?1, status = 'error', updated_at = ?2 \
                     WHERE id = ?3 AND status NOT IN {TERMINAL_STATUSES}"
                ),
                params![message, now_rfc3339(), id.0],
            )
            .map_err(StoreError::backend)?;
        if updated == 0 {
            query_operation(&conn, id)?;
        }
        Ok(())
    }

    async fn cancel_expression_operations(&self, expression_id: ExpressionId) -> StoreResult<u64> {
        let conn = self.conn.lock().await;
        let canceled = conn
            .execute(
                &format!(
                    "UPDATE operations SET status = 'canceled', updated_at = ?1 \
                     WHERE expression_id = ?2 AND status NOT IN {TERMINAL_STATUSES}"
                ),
                params![now_rfc3339(), expression_id.0],
            )
            .map_err(StoreError::backend)?;
        Ok(canceled as u64)
    }

    async fn lease_ready_operation(&self) -> StoreResult<Option<Operation>> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().map_err(StoreError::backend)?;

        let ready_id: Option<i64> = tx
            .query_row(
                "SELECT id FROM operations WHERE status = 'ready' ORDER BY id LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::backend)?;

        let Some(id) = ready_id else {
            return Ok(None);
        };

        // Re-checks the status: if a concurrent caller already took the
        // row, we lose the race and report nothing available.
        let claimed = tx
            .execute(
                "UPDATE operations SET status = 'processing', updated_at = ?1 \
                 WHERE id = ?2 AND status = 'ready'",
                params![now_rfc3339(), id],
            )
            .map_err(StoreError::backend)?;
        if claimed == 0 {
            return Ok(None);
        }

        let operation = query_operation(&tx, OperationId(id))?;
        tx.commit().map_err(StoreError::backend)?;
        Ok(Some(operation))
    }

    async fn finalize_expression(&self, id: ExpressionId, result: f64) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        let updated = conn
            .execute(
                "UPDATE expressions SET status = 'completed', result = ?1, updated_at = ?2 \
                 WHERE id = ?3",
                params![result, now_rfc3339(), id.0],
            )
            .map_err(StoreError::backend)?;
        if updated == 0 {
            return Err(StoreError::ExpressionNotFound { id });
        }
        Ok(())
    }

    async fn set_expression_error(&self, id: ExpressionId, message: &str) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        let updated = conn
            .execute(
                "UPDATE expressions SET status = 'error', error_message = ?1, updated_at = ?2 \
                 WHERE id = ?3",
                params![message, now_rfc3339(), id.0],
            )
            .map_err(StoreError::backend)?;
        if updated == 0 {
            return Err(StoreError::ExpressionNotFound { id });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn timestamps_round_trip_through_rfc3339() {
        let store = SqliteStore::open_in_memory().unwrap();
        let created = store.create_expression(1, "2+3").await.unwrap();
        let fetched = store.fetch_expression(created.id).await.unwrap();
        assert_eq!(fetched.created_at, created.created_at);
        assert_eq!(fetched.text, "2+3");
    }

    #[tokio::test]
    async fn operand_guard_rejects_double_write() {
        let store = SqliteStore::open_in_memory().unwrap();
        let expr = store.create_expression(1, "2+3").await.unwrap();
        let op = store
            .create_operation(NewOperation {
                expression_id: expr.id,
                parent: None,
                operator: Operator::Add,
                left_value: None,
                right_value: Some(3.0),
            })
            .await
            .unwrap();

        let updated = store.update_operation_operand(op.id, ChildSide::Left, 2.0).await.unwrap();
        assert_eq!(updated.status, OperationStatus::Ready);

        let err = store.update_operation_operand(op.id, ChildSide::Left, 5.0).await.unwrap_err();
        assert!(matches!(err, StoreError::OperandAlreadySet { .. }));
    }

    #[tokio::test]
    async fn lease_claims_each_ready_row_once() {
        let store = SqliteStore::open_in_memory().unwrap();
        let expr = store.create_expression(1, "(1+2)*(3+4)").await.unwrap();
        for _ in 0..2 {
            store
                .create_operation(NewOperation {
                    expression_id: expr.id,
                    parent: None,
                    operator: Operator::Add,
                    left_value: Some(1.0),
                    right_value: Some(2.0),
                })
                .await
                .unwrap();
        }

        let first = store.lease_ready_operation().await.unwrap().unwrap();
        let second = store.lease_ready_operation().await.unwrap().unwrap();
        assert_ne!(first.id, second.id);
        assert!(store.lease_ready_operation().await.unwrap().is_none());
    }
}
