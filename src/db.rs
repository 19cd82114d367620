use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::AppResult;

/// Fresh UUID v4 identity for any record
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Event for audit trail ("Every change is an event")
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: new_id(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

/// Open (or create) the database file and bring the schema up to date
pub fn open_database(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }
    }
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database {:?}", path))?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery (in-memory databases report "memory")
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // ==========================================================================
    // People & catalog
    // ==========================================================================
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE COLLATE NOCASE,
            phone TEXT,
            company TEXT,
            address TEXT,
            role TEXT NOT NULL,
            api_token_hash TEXT NOT NULL UNIQUE,
            converted_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_users_role ON users(role);

        CREATE TABLE IF NOT EXISTS categories (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            description TEXT,
            created_at TEXT NOT NULL,
            UNIQUE(name, kind)
        );

        CREATE TABLE IF NOT EXISTS products (
            id TEXT PRIMARY KEY,
            category_id TEXT NOT NULL REFERENCES categories(id) ON DELETE RESTRICT,
            name TEXT NOT NULL,
            sku TEXT NOT NULL UNIQUE,
            description TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS product_prices (
            id TEXT PRIMARY KEY,
            product_id TEXT NOT NULL REFERENCES products(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            monthly_price TEXT NOT NULL,
            setup_fee TEXT NOT NULL,
            min_months INTEGER NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        );",
    )?;

    // ==========================================================================
    // Sales pipeline
    // ==========================================================================
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS offers (
            id TEXT PRIMARY KEY,
            lead_id TEXT NOT NULL REFERENCES users(id) ON DELETE RESTRICT,
            sales_id TEXT NOT NULL REFERENCES users(id) ON DELETE RESTRICT,
            product_price_id TEXT NOT NULL REFERENCES product_prices(id) ON DELETE RESTRICT,
            monthly_price TEXT NOT NULL,
            setup_fee TEXT NOT NULL,
            months INTEGER NOT NULL,
            discount_percent TEXT NOT NULL,
            valid_until TEXT NOT NULL,
            status TEXT NOT NULL,
            notes TEXT,
            response_note TEXT,
            responded_at TEXT,
            subscription_id TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_offers_lead ON offers(lead_id);
        CREATE INDEX IF NOT EXISTS idx_offers_status ON offers(status);

        CREATE TABLE IF NOT EXISTS subscriptions (
            id TEXT PRIMARY KEY,
            customer_id TEXT NOT NULL REFERENCES users(id) ON DELETE RESTRICT,
            product_price_id TEXT NOT NULL REFERENCES product_prices(id) ON DELETE RESTRICT,
            offer_id TEXT REFERENCES offers(id) ON DELETE SET NULL,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            months INTEGER NOT NULL,
            monthly_price TEXT NOT NULL,
            setup_fee TEXT NOT NULL,
            discount_percent TEXT NOT NULL,
            status TEXT NOT NULL,
            notes TEXT,
            decided_by TEXT REFERENCES users(id) ON DELETE SET NULL,
            decided_at TEXT,
            decision_note TEXT,
            created_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_subscriptions_customer ON subscriptions(customer_id);
        CREATE INDEX IF NOT EXISTS idx_subscriptions_status ON subscriptions(status);",
    )?;

    // ==========================================================================
    // Personal finance
    // ==========================================================================
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS wallets (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            currency TEXT NOT NULL,
            balance TEXT NOT NULL,
            description TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS user_wallets (
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            wallet_id TEXT NOT NULL REFERENCES wallets(id) ON DELETE CASCADE,
            role TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (user_id, wallet_id)
        );

        CREATE TABLE IF NOT EXISTS transactions (
            id TEXT PRIMARY KEY,
            wallet_id TEXT NOT NULL REFERENCES wallets(id) ON DELETE CASCADE,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE RESTRICT,
            category_id TEXT REFERENCES categories(id) ON DELETE RESTRICT,
            kind TEXT NOT NULL,
            amount TEXT NOT NULL,
            description TEXT NOT NULL,
            transaction_date TEXT NOT NULL,
            transfer_id TEXT,
            idempotency_hash TEXT UNIQUE,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_transactions_wallet ON transactions(wallet_id, transaction_date);
        CREATE INDEX IF NOT EXISTS idx_transactions_transfer ON transactions(transfer_id);

        CREATE TABLE IF NOT EXISTS budget_plans (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            period_start TEXT NOT NULL,
            period_end TEXT NOT NULL,
            notes TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS budget_items (
            id TEXT PRIMARY KEY,
            budget_plan_id TEXT NOT NULL REFERENCES budget_plans(id) ON DELETE CASCADE,
            category_id TEXT REFERENCES categories(id) ON DELETE RESTRICT,
            name TEXT NOT NULL,
            planned_amount TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS split_bills (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            title TEXT NOT NULL,
            bill_date TEXT NOT NULL,
            service_percent TEXT NOT NULL,
            tax_percent TEXT NOT NULL,
            notes TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS split_bill_participants (
            id TEXT PRIMARY KEY,
            split_bill_id TEXT NOT NULL REFERENCES split_bills(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            name TEXT NOT NULL,
            is_paid INTEGER NOT NULL DEFAULT 0,
            paid_at TEXT
        );

        CREATE TABLE IF NOT EXISTS split_bill_items (
            id TEXT PRIMARY KEY,
            split_bill_id TEXT NOT NULL REFERENCES split_bills(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            name TEXT NOT NULL,
            quantity INTEGER NOT NULL,
            unit_price TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS split_bill_item_participants (
            item_id TEXT NOT NULL REFERENCES split_bill_items(id) ON DELETE CASCADE,
            participant_id TEXT NOT NULL REFERENCES split_bill_participants(id) ON DELETE CASCADE,
            PRIMARY KEY (item_id, participant_id)
        );",
    )?;

    // ==========================================================================
    // Events Table (audit trail - append-only)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            event_id TEXT PRIMARY KEY,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> AppResult<()> {
    conn.execute(
        "INSERT INTO events (event_id, timestamp, event_type, entity_type, entity_id, data, actor)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
            event.event_type,
            event.entity_type,
            event.entity_id,
            event.data.to_string(),
            event.actor,
        ],
    )?;

    Ok(())
}

/// Shorthand for recording an event in one call
pub fn record_event(
    conn: &Connection,
    event_type: &str,
    entity_type: &str,
    entity_id: &str,
    data: serde_json::Value,
    actor: &str,
) -> AppResult<()> {
    insert_event(conn, &Event::new(event_type, entity_type, entity_id, data, actor))
}

/// Get all events for an entity, oldest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> AppResult<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp ASC, rowid ASC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_str: String = row.get(5)?;

            let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp,
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_str).unwrap_or(serde_json::Value::Null),
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

// ============================================================================
// Row helpers
// ============================================================================

/// Money columns are stored as TEXT so no precision is lost to REAL
pub fn decimal_at(row: &Row, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: String = row.get(idx)?;
    raw.parse::<Decimal>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Enum columns are stored by their wire name
pub fn enum_at<T>(row: &Row, idx: usize, parse: fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unknown value '{}'", raw).into(),
        )
    })
}

/// Does a row with this id exist in `table`?
pub fn exists(conn: &Connection, table: &str, id: &str) -> AppResult<bool> {
    let sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1)", table);
    Ok(conn.query_row(&sql, [id], |row| row.get(0))?)
}

/// Build a `%term%` LIKE pattern with wildcards escaped (use `ESCAPE '\'`)
pub fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[cfg(test)]
pub(crate) fn test_connection() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    setup_database(&conn).unwrap();
    conn
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        setup_database(&conn).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 16);
    }

    #[test]
    fn test_foreign_keys_enforced() {
        let conn = test_connection();
        let result = conn.execute(
            "INSERT INTO products (id, category_id, name, sku, created_at, updated_at)
             VALUES ('p1', 'missing', 'Internet', 'NET-1', '2024-01-01', '2024-01-01')",
            [],
        );
        assert!(result.is_err(), "dangling category_id must be rejected");
    }

    #[test]
    fn test_event_log() {
        let conn = test_connection();

        let event = Event::new(
            "subscription.approved",
            "subscription",
            "test_id_123",
            serde_json::json!({"test": "data"}),
            "test_actor",
        );

        insert_event(&conn, &event).unwrap();
        record_event(&conn, "subscription.cancelled", "subscription", "test_id_123", serde_json::json!({}), "other").unwrap();

        let events = get_events_for_entity(&conn, "subscription", "test_id_123").unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "subscription.approved");
        assert_eq!(events[0].actor, "test_actor");
        assert_eq!(events[0].data["test"], "data");
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }
}
