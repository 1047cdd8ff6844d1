//! Order queries. Every function takes a connection so that callers can run them inside a transaction by passing
//! `&mut *tx`.
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use log::{debug, trace};
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqliteConnection};

use crate::{
    db_types::{
        Actor,
        ActorType,
        ConversionError,
        Dispute,
        EscrowRecord,
        ExtensionRequest,
        NewOrder,
        Order,
        OrderId,
        OrderStatusType,
        DEFAULT_MAX_EXTENSIONS,
    },
    traits::{OrderQueryFilter, OrderStoreError},
};

const SELECT_ORDERS: &str = r#"
    SELECT o.*,
        d.reason AS d_reason,
        d.description AS d_description,
        d.status AS d_status,
        d.resolution AS d_resolution,
        d.raised_by AS d_raised_by,
        d.previous_status AS d_previous_status,
        e.order_id AS e_order_id,
        e.escrow_tx_hash,
        e.escrow_address,
        e.release_tx_hash,
        e.refund_tx_hash
    FROM orders o
    LEFT JOIN disputes d ON d.order_id = o.id
    LEFT JOIN escrow_records e ON e.order_id = o.id
"#;

/// Statuses from which an order can still run out of time. Later stages have funds locked and need a refund first.
const EXPIRABLE: [OrderStatusType; 3] =
    [OrderStatusType::Pending, OrderStatusType::Accepted, OrderStatusType::EscrowPending];

/// Inserts the order into the database, returning `false` in the second parameter if the order already exists.
pub async fn idempotent_insert(
    order: NewOrder,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(Order, bool), OrderStoreError> {
    if let Some(id) = &order.id {
        if let Some(existing) = fetch_order_by_id(id, conn).await? {
            debug!("🗃️ Order [{id}] already exists. Insert skipped.");
            return Ok((existing, false));
        }
    }
    let order = insert_order(order, now, conn).await?;
    debug!("🗃️ Order [{}] inserted as {}", order.id, order.order_number);
    Ok((order, true))
}

async fn insert_order(
    order: NewOrder,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Order, OrderStoreError> {
    let id = order.id.unwrap_or_else(OrderId::random);
    let expires_at = order.ttl_secs.map(|secs| now + Duration::seconds(secs));
    sqlx::query(
        r#"
            INSERT INTO orders (
                id,
                order_type,
                crypto_amount,
                fiat_amount,
                rate,
                payment_method,
                user_id,
                merchant_id,
                buyer_merchant_id,
                status,
                order_version,
                created_at,
                updated_at,
                expires_at,
                max_extensions
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 1, $11, $12, $13, $14);
        "#,
    )
    .bind(id.as_str())
    .bind(order.order_type.to_string())
    .bind(order.crypto_amount)
    .bind(order.fiat_amount)
    .bind(order.rate)
    .bind(order.payment_method.to_string())
    .bind(order.user_id)
    .bind(order.merchant_id)
    .bind(order.buyer_merchant_id)
    .bind(OrderStatusType::Pending.to_string())
    .bind(now)
    .bind(now)
    .bind(expires_at)
    .bind(order.max_extensions.unwrap_or(DEFAULT_MAX_EXTENSIONS))
    .execute(&mut *conn)
    .await?;
    fetch_order_by_id(&id, conn).await?.ok_or(OrderStoreError::OrderNotFound(id))
}

pub async fn fetch_order_by_id(id: &OrderId, conn: &mut SqliteConnection) -> Result<Option<Order>, OrderStoreError> {
    let sql = format!("{SELECT_ORDERS} WHERE o.id = $1");
    let row = sqlx::query(&sql).bind(id.as_str()).fetch_optional(conn).await?;
    let order = row.as_ref().map(order_from_row).transpose()?;
    Ok(order)
}

/// Fetches orders matching the query filter. Resulting orders are ordered by `created_at` in ascending order.
pub async fn search_orders(
    query: OrderQueryFilter,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, OrderStoreError> {
    let mut builder = QueryBuilder::<Sqlite>::new(SELECT_ORDERS);
    if !query.is_empty() {
        builder.push(" WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(user_id) = query.user_id {
        where_clause.push("o.user_id = ");
        where_clause.push_bind_unseparated(user_id);
    }
    if let Some(merchant_id) = query.merchant_id {
        where_clause.push("(o.merchant_id = ");
        where_clause.push_bind_unseparated(merchant_id.clone());
        where_clause.push_unseparated(" OR o.buyer_merchant_id = ");
        where_clause.push_bind_unseparated(merchant_id);
        where_clause.push_unseparated(")");
    }
    if let Some(statuses) = query.status.as_ref().filter(|s| !s.is_empty()) {
        let status_clause = statuses.iter().map(|s| format!("'{s}'")).collect::<Vec<_>>().join(",");
        where_clause.push(format!("o.status IN ({status_clause})"));
    }
    if let Some(since) = query.since {
        where_clause.push("o.created_at >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = query.until {
        where_clause.push("o.created_at <= ");
        where_clause.push_bind_unseparated(until);
    }
    builder.push(" ORDER BY o.created_at ASC, o.seq ASC");

    trace!("🗃️ Executing query: {}", builder.sql());
    let rows = builder.build().fetch_all(conn).await?;
    trace!("🗃️ Result of search_orders: {}", rows.len());
    let orders = rows.iter().map(order_from_row).collect::<Result<Vec<_>, _>>()?;
    Ok(orders)
}

pub async fn fetch_expirable_orders(
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, OrderStoreError> {
    let query = EXPIRABLE.iter().fold(OrderQueryFilter::default(), |q, s| q.with_status(*s));
    let orders = search_orders(query, conn).await?;
    Ok(orders.into_iter().filter(|o| o.expires_at.map(|t| t <= now).unwrap_or(false)).collect())
}

/// Writes the order back if, and only if, the stored version is still `expected_version`. The version is incremented
/// by one. Not atomic on its own: run it inside a transaction.
pub async fn save_order(
    order: &Order,
    expected_version: i64,
    conn: &mut SqliteConnection,
) -> Result<Order, OrderStoreError> {
    let ext = order.pending_extension.as_ref();
    let result = sqlx::query(
        r#"
            UPDATE orders SET
                status = $1,
                order_version = order_version + 1,
                updated_at = $2,
                accepted_at = $3,
                escrowed_at = $4,
                payment_sent_at = $5,
                payment_confirmed_at = $6,
                completed_at = $7,
                cancelled_at = $8,
                expires_at = $9,
                extension_count = $10,
                max_extensions = $11,
                ext_requested_by_type = $12,
                ext_requested_by_id = $13,
                ext_minutes = $14,
                ext_requested_at = $15,
                cancelled_by = $16,
                cancellation_reason = $17
            WHERE id = $18 AND order_version = $19
        "#,
    )
    .bind(order.status.to_string())
    .bind(order.updated_at)
    .bind(order.accepted_at)
    .bind(order.escrowed_at)
    .bind(order.payment_sent_at)
    .bind(order.payment_confirmed_at)
    .bind(order.completed_at)
    .bind(order.cancelled_at)
    .bind(order.expires_at)
    .bind(order.extension_count)
    .bind(order.max_extensions)
    .bind(ext.map(|e| e.requested_by.kind.to_string()))
    .bind(ext.map(|e| e.requested_by.id.clone()))
    .bind(ext.map(|e| e.minutes))
    .bind(ext.map(|e| e.requested_at))
    .bind(order.cancelled_by.map(|a| a.to_string()))
    .bind(order.cancellation_reason.as_deref())
    .bind(order.id.as_str())
    .bind(expected_version)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 0 {
        let actual: Option<i64> = sqlx::query_scalar("SELECT order_version FROM orders WHERE id = $1")
            .bind(order.id.as_str())
            .fetch_optional(&mut *conn)
            .await?;
        return Err(match actual {
            None => OrderStoreError::OrderNotFound(order.id.clone()),
            Some(actual) => {
                OrderStoreError::VersionConflict { order_id: order.id.clone(), expected: expected_version, actual }
            },
        });
    }
    save_dispute(&order.id, order.dispute.as_ref(), conn).await?;
    save_escrow(&order.id, order.escrow.as_ref(), conn).await?;
    fetch_order_by_id(&order.id, conn).await?.ok_or_else(|| OrderStoreError::OrderNotFound(order.id.clone()))
}

async fn save_dispute(
    id: &OrderId,
    dispute: Option<&Dispute>,
    conn: &mut SqliteConnection,
) -> Result<(), OrderStoreError> {
    let Some(d) = dispute else {
        sqlx::query("DELETE FROM disputes WHERE order_id = $1").bind(id.as_str()).execute(conn).await?;
        return Ok(());
    };
    sqlx::query(
        r#"
            INSERT INTO disputes (order_id, reason, description, status, resolution, raised_by, previous_status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (order_id) DO UPDATE SET
                reason = excluded.reason,
                description = excluded.description,
                status = excluded.status,
                resolution = excluded.resolution,
                raised_by = excluded.raised_by,
                previous_status = excluded.previous_status
        "#,
    )
    .bind(id.as_str())
    .bind(d.reason.as_str())
    .bind(d.description.as_deref())
    .bind(d.status.to_string())
    .bind(d.resolution.map(|r| r.to_string()))
    .bind(d.raised_by.to_string())
    .bind(d.previous_status.to_string())
    .execute(conn)
    .await?;
    Ok(())
}

async fn save_escrow(
    id: &OrderId,
    escrow: Option<&EscrowRecord>,
    conn: &mut SqliteConnection,
) -> Result<(), OrderStoreError> {
    let Some(e) = escrow else {
        sqlx::query("DELETE FROM escrow_records WHERE order_id = $1").bind(id.as_str()).execute(conn).await?;
        return Ok(());
    };
    sqlx::query(
        r#"
            INSERT INTO escrow_records (order_id, escrow_tx_hash, escrow_address, release_tx_hash, refund_tx_hash)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (order_id) DO UPDATE SET
                escrow_tx_hash = excluded.escrow_tx_hash,
                escrow_address = excluded.escrow_address,
                release_tx_hash = excluded.release_tx_hash,
                refund_tx_hash = excluded.refund_tx_hash
        "#,
    )
    .bind(id.as_str())
    .bind(e.escrow_tx_hash.as_deref())
    .bind(e.escrow_address.as_deref())
    .bind(e.release_tx_hash.as_deref())
    .bind(e.refund_tx_hash.as_deref())
    .execute(conn)
    .await?;
    Ok(())
}

fn parse<T: FromStr<Err = ConversionError>>(row: &SqliteRow, col: &str) -> Result<T, sqlx::Error> {
    let value: String = row.try_get(col)?;
    value.parse().map_err(|e| sqlx::Error::ColumnDecode { index: col.to_string(), source: Box::new(e) })
}

fn parse_opt<T: FromStr<Err = ConversionError>>(row: &SqliteRow, col: &str) -> Result<Option<T>, sqlx::Error> {
    let value: Option<String> = row.try_get(col)?;
    value
        .map(|v| v.parse().map_err(|e| sqlx::Error::ColumnDecode { index: col.to_string(), source: Box::new(e) }))
        .transpose()
}

fn order_from_row(row: &SqliteRow) -> Result<Order, sqlx::Error> {
    let seq: i64 = row.try_get("seq")?;
    let status: OrderStatusType = parse(row, "status")?;

    let ext_kind = parse_opt::<ActorType>(row, "ext_requested_by_type")?;
    let ext_id: Option<String> = row.try_get("ext_requested_by_id")?;
    let ext_minutes: Option<i64> = row.try_get("ext_minutes")?;
    let ext_at: Option<DateTime<Utc>> = row.try_get("ext_requested_at")?;
    let pending_extension = match (ext_kind, ext_id, ext_minutes, ext_at) {
        (Some(kind), Some(id), Some(minutes), Some(requested_at)) => {
            Some(ExtensionRequest { requested_by: Actor::new(kind, id), minutes, requested_at })
        },
        _ => None,
    };

    let dispute = match row.try_get::<Option<String>, _>("d_reason")? {
        Some(reason) => Some(Dispute {
            reason,
            description: row.try_get("d_description")?,
            status: parse(row, "d_status")?,
            resolution: parse_opt(row, "d_resolution")?,
            raised_by: parse(row, "d_raised_by")?,
            previous_status: parse(row, "d_previous_status")?,
        }),
        None => None,
    };

    let escrow = match row.try_get::<Option<String>, _>("e_order_id")? {
        Some(_) => Some(EscrowRecord {
            escrow_tx_hash: row.try_get("escrow_tx_hash")?,
            escrow_address: row.try_get("escrow_address")?,
            release_tx_hash: row.try_get("release_tx_hash")?,
            refund_tx_hash: row.try_get("refund_tx_hash")?,
        }),
        None => None,
    };

    Ok(Order {
        id: OrderId(row.try_get("id")?),
        order_number: format!("P2P-{seq:06}"),
        order_type: parse(row, "order_type")?,
        crypto_amount: row.try_get("crypto_amount")?,
        fiat_amount: row.try_get("fiat_amount")?,
        rate: row.try_get("rate")?,
        payment_method: parse(row, "payment_method")?,
        user_id: row.try_get("user_id")?,
        merchant_id: row.try_get("merchant_id")?,
        buyer_merchant_id: row.try_get("buyer_merchant_id")?,
        status,
        minimal_status: status.minimal(),
        order_version: row.try_get("order_version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        accepted_at: row.try_get("accepted_at")?,
        escrowed_at: row.try_get("escrowed_at")?,
        payment_sent_at: row.try_get("payment_sent_at")?,
        payment_confirmed_at: row.try_get("payment_confirmed_at")?,
        completed_at: row.try_get("completed_at")?,
        cancelled_at: row.try_get("cancelled_at")?,
        expires_at: row.try_get("expires_at")?,
        extension_count: row.try_get("extension_count")?,
        max_extensions: row.try_get("max_extensions")?,
        pending_extension,
        cancelled_by: parse_opt(row, "cancelled_by")?,
        cancellation_reason: row.try_get("cancellation_reason")?,
        dispute,
        escrow,
    })
}
