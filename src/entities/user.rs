// User Entity - leads, customers and staff share one table
//
// The role column is the sales pipeline stage for external users
// (lead → customer) and the job function for staff.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::db::{self, enum_at, like_pattern, new_id};
use crate::entities::wallet::WalletRole;
use crate::error::{AppError, AppResult};
use crate::pagination::{PageRequest, Paginated};
use crate::permissions::Role;
use crate::validation::Validator;

// ============================================================================
// USER ENTITY
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub address: Option<String>,
    pub role: Role,
    /// Set when a lead became a customer
    pub converted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }
}

/// Create/update payload (all fields optional so validation can report them)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserInput {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub address: Option<String>,
}

/// Result of creating a user: the token is only ever shown here
#[derive(Debug, Clone, Serialize)]
pub struct CreatedUser {
    pub user: User,
    pub api_token: String,
}

struct ValidUser {
    name: String,
    email: String,
    phone: Option<String>,
    company: Option<String>,
    address: Option<String>,
}

pub const ANONYMOUS_ID: &str = "anonymous";

const USER_COLUMNS: &str =
    "id, name, email, phone, company, address, role, converted_at, created_at, updated_at";

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        company: row.get(4)?,
        address: row.get(5)?,
        role: enum_at(row, 6, Role::parse)?,
        converted_at: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

// ============================================================================
// API TOKENS
// ============================================================================

/// SHA-256 hex of a token; only the hash is stored
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn generate_token() -> String {
    format!(
        "{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}

// ============================================================================
// QUERIES
// ============================================================================

fn validate(conn: &Connection, input: &UserInput, existing_id: Option<&str>) -> AppResult<ValidUser> {
    let mut v = Validator::new();

    let name = v.required_str("name", "Nama", input.name.as_deref(), 255);
    let email = v.required_str("email", "Email", input.email.as_deref(), 255);
    if let Some(email) = &email {
        v.email("email", email);
        if !v.has("email") {
            if let Some(other) = find_by_email(conn, email)? {
                if Some(other.id.as_str()) != existing_id {
                    v.taken("email", "Email");
                }
            }
        }
    }
    let phone = v.optional_str("phone", "Nomor telepon", input.phone.as_deref(), 30);
    let company = v.optional_str("company", "Perusahaan", input.company.as_deref(), 255);
    let address = v.optional_str("address", "Alamat", input.address.as_deref(), 1000);

    v.finish()?;

    Ok(ValidUser {
        name: name.unwrap_or_default(),
        email: email.unwrap_or_default().to_lowercase(),
        phone,
        company,
        address,
    })
}

pub fn create_user(conn: &Connection, input: &UserInput, role: Role) -> AppResult<CreatedUser> {
    let valid = validate(conn, input, None)?;
    let token = generate_token();
    let now = Utc::now();
    let id = new_id();

    conn.execute(
        "INSERT INTO users (id, name, email, phone, company, address, role, api_token_hash, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
        params![
            id,
            valid.name,
            valid.email,
            valid.phone,
            valid.company,
            valid.address,
            role.as_str(),
            hash_token(&token),
            now,
        ],
    )?;

    tracing::info!(user_id = %id, role = role.as_str(), "user created");

    Ok(CreatedUser {
        user: get_user(conn, &id)?,
        api_token: token,
    })
}

pub fn get_user(conn: &Connection, id: &str) -> AppResult<User> {
    let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
    conn.query_row(&sql, [id], user_from_row)
        .optional()?
        .ok_or(AppError::NotFound("Pengguna"))
}

/// Fetch a user, treating a role mismatch as "not found" so that
/// `/leads/:id` never exposes a manager.
pub fn get_user_with_role(conn: &Connection, id: &str, role: Role) -> AppResult<User> {
    match get_user(conn, id) {
        Ok(user) if user.role == role => Ok(user),
        Ok(_) | Err(AppError::NotFound(_)) => Err(AppError::NotFound(role.label())),
        Err(e) => Err(e),
    }
}

pub fn find_by_email(conn: &Connection, email: &str) -> AppResult<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE email = ?1 COLLATE NOCASE", USER_COLUMNS);
    Ok(conn.query_row(&sql, [email.trim()], user_from_row).optional()?)
}

pub fn find_by_token(conn: &Connection, token: &str) -> AppResult<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE api_token_hash = ?1", USER_COLUMNS);
    Ok(conn
        .query_row(&sql, [hash_token(token)], user_from_row)
        .optional()?)
}

pub fn list_users(
    conn: &Connection,
    role: Role,
    search: Option<&str>,
    page: PageRequest,
) -> AppResult<Paginated<User>> {
    let pattern = search
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(like_pattern);

    let filter = "role = ?1 AND (?2 IS NULL
            OR name LIKE ?2 ESCAPE '\\'
            OR email LIKE ?2 ESCAPE '\\'
            OR company LIKE ?2 ESCAPE '\\')";

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM users WHERE {}", filter),
        params![role.as_str(), pattern],
        |row| row.get(0),
    )?;

    let sql = format!(
        "SELECT {} FROM users WHERE {} ORDER BY created_at DESC, name ASC LIMIT ?3 OFFSET ?4",
        USER_COLUMNS, filter
    );
    let mut stmt = conn.prepare(&sql)?;
    let users = stmt
        .query_map(
            params![role.as_str(), pattern, page.limit(), page.offset()],
            user_from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Paginated::new(users, page, total))
}

pub fn update_user(conn: &Connection, id: &str, role: Role, input: &UserInput) -> AppResult<User> {
    get_user_with_role(conn, id, role)?;
    let valid = validate(conn, input, Some(id))?;

    conn.execute(
        "UPDATE users SET name = ?2, email = ?3, phone = ?4, company = ?5, address = ?6, updated_at = ?7
         WHERE id = ?1",
        params![
            id,
            valid.name,
            valid.email,
            valid.phone,
            valid.company,
            valid.address,
            Utc::now(),
        ],
    )?;

    get_user(conn, id)
}

/// Wallets the user owns go with them, but only when nobody else is a
/// member. Owning a shared wallet is a conflict, and so is a transfer
/// leading out of the wallets being removed.
pub fn delete_user(conn: &Connection, id: &str, role: Role) -> AppResult<()> {
    get_user_with_role(conn, id, role)?;

    let tx = conn.unchecked_transaction()?;
    let shared: bool = tx.query_row(
        "SELECT EXISTS(
             SELECT 1 FROM user_wallets mine
             JOIN user_wallets other ON other.wallet_id = mine.wallet_id AND other.user_id <> mine.user_id
             WHERE mine.user_id = ?1 AND mine.role = ?2)",
        params![id, WalletRole::Owner.as_str()],
        |row| row.get(0),
    )?;
    if shared {
        return Err(AppError::conflict(
            "Pengguna masih memiliki dompet bersama. Keluarkan anggota lain terlebih dahulu.",
        ));
    }

    let owned: Vec<String> = tx
        .prepare("SELECT wallet_id FROM user_wallets WHERE user_id = ?1 AND role = ?2")?
        .query_map(params![id, WalletRole::Owner.as_str()], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    for wallet_id in &owned {
        let outbound: bool = tx.query_row(
            "SELECT EXISTS(
                 SELECT 1 FROM transactions t
                 JOIN transactions o ON o.transfer_id = t.transfer_id AND o.id <> t.id
                 WHERE t.wallet_id = ?1
                   AND o.wallet_id NOT IN (
                       SELECT wallet_id FROM user_wallets WHERE user_id = ?2 AND role = ?3))",
            params![wallet_id, id, WalletRole::Owner.as_str()],
            |row| row.get(0),
        )?;
        if outbound {
            return Err(AppError::conflict(
                "Dompet pengguna memiliki transfer ke dompet lain. Hapus transfer tersebut terlebih dahulu.",
            ));
        }
    }

    for wallet_id in &owned {
        tx.execute("DELETE FROM wallets WHERE id = ?1", [wallet_id])?;
    }
    tx.execute("DELETE FROM users WHERE id = ?1", [id])?;
    tx.commit()?;

    tracing::info!(user_id = %id, role = role.as_str(), wallets = owned.len(), "user deleted");
    Ok(())
}

/// Turn a lead into a customer. Anything but a lead is a conflict.
pub fn convert_lead(conn: &Connection, id: &str, actor: &User) -> AppResult<User> {
    let user = get_user_with_role(conn, id, Role::Lead)?;
    if !promote_to_customer(conn, &user.id, &actor.id)? {
        return Err(AppError::conflict("Lead sudah menjadi pelanggan."));
    }
    get_user(conn, id)
}

/// Promote a lead to customer if it still is one; returns whether it changed.
pub fn promote_to_customer(conn: &Connection, id: &str, actor_id: &str) -> AppResult<bool> {
    let now = Utc::now();
    let changed = conn.execute(
        "UPDATE users SET role = ?2, converted_at = ?3, updated_at = ?3 WHERE id = ?1 AND role = ?4",
        params![id, Role::Customer.as_str(), now, Role::Lead.as_str()],
    )?;

    if changed > 0 {
        db::record_event(
            conn,
            "lead.converted",
            "user",
            id,
            serde_json::json!({ "from": "lead", "to": "customer" }),
            actor_id,
        )?;
        tracing::info!(user_id = %id, "lead converted to customer");
    }

    Ok(changed > 0)
}

/// Issue a fresh token; the previous one stops working immediately.
pub fn regenerate_token(conn: &Connection, id: &str) -> AppResult<String> {
    let token = generate_token();
    let changed = conn.execute(
        "UPDATE users SET api_token_hash = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, hash_token(&token), Utc::now()],
    )?;
    if changed == 0 {
        return Err(AppError::NotFound("Pengguna"));
    }
    Ok(token)
}

/// Persisted stand-in admin used when authentication is disabled, so
/// records that reference the acting user still satisfy foreign keys.
pub fn ensure_anonymous_admin(conn: &Connection) -> AppResult<User> {
    let now = Utc::now();
    conn.execute(
        "INSERT OR IGNORE INTO users (id, name, email, role, api_token_hash, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![
            ANONYMOUS_ID,
            "Anonymous",
            "anonymous@localhost",
            Role::Admin.as_str(),
            hash_token(&generate_token()),
            now,
        ],
    )?;
    get_user(conn, ANONYMOUS_ID)
}

pub fn count_by_role(conn: &Connection, role: Role) -> AppResult<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM users WHERE role = ?1",
        [role.as_str()],
        |row| row.get(0),
    )?)
}

#[cfg(test)]
pub(crate) fn create_test_user(conn: &Connection, name: &str, role: Role) -> User {
    let input = UserInput {
        name: Some(name.to_string()),
        email: Some(format!("{}@example.com", name.to_lowercase().replace(' ', "."))),
        ..Default::default()
    };
    create_user(conn, &input, role).unwrap().user
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_events_for_entity, test_connection};

    fn input(name: &str, email: &str) -> UserInput {
        UserInput {
            name: Some(name.to_string()),
            email: Some(email.to_string()),
            phone: Some("08123456789".to_string()),
            company: Some("PT Maju Jaya".to_string()),
            address: None,
        }
    }

    #[test]
    fn test_create_user_persists_fields() {
        let conn = test_connection();
        let created = create_user(&conn, &input("Budi Santoso", "Budi@Example.com"), Role::Lead).unwrap();

        assert_eq!(created.user.name, "Budi Santoso");
        assert_eq!(created.user.email, "budi@example.com");
        assert_eq!(created.user.role, Role::Lead);
        assert_eq!(created.user.company.as_deref(), Some("PT Maju Jaya"));
        assert_eq!(created.api_token.len(), 64);
    }

    #[test]
    fn test_create_user_validation_errors() {
        let conn = test_connection();
        let err = create_user(&conn, &UserInput::default(), Role::Lead).unwrap_err();

        match err {
            AppError::Validation(errors) => {
                assert_eq!(errors.fields(), vec!["email", "name"]);
                assert_eq!(errors.get("name").unwrap()[0], "Nama wajib diisi.");
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_email_must_be_unique_case_insensitive() {
        let conn = test_connection();
        create_user(&conn, &input("Sari", "sari@example.com"), Role::Lead).unwrap();

        let err = create_user(&conn, &input("Sari Dua", "SARI@example.com"), Role::Customer).unwrap_err();
        match err {
            AppError::Validation(errors) => {
                assert_eq!(errors.get("email").unwrap()[0], "Email sudah digunakan.");
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_update_keeps_own_email() {
        let conn = test_connection();
        let created = create_user(&conn, &input("Sari", "sari@example.com"), Role::Lead).unwrap();

        let mut changed = input("Sari Wulandari", "sari@example.com");
        changed.phone = None;
        let updated = update_user(&conn, &created.user.id, Role::Lead, &changed).unwrap();

        assert_eq!(updated.name, "Sari Wulandari");
        assert_eq!(updated.phone, None);
    }

    #[test]
    fn test_role_scoped_lookup() {
        let conn = test_connection();
        let manager = create_test_user(&conn, "Manager One", Role::Manager);

        let err = get_user_with_role(&conn, &manager.id, Role::Lead).unwrap_err();
        assert!(matches!(err, AppError::NotFound("Lead")));
    }

    #[test]
    fn test_list_users_filters_role_and_search() {
        let conn = test_connection();
        create_test_user(&conn, "Andi Lead", Role::Lead);
        create_test_user(&conn, "Bambang Lead", Role::Lead);
        create_test_user(&conn, "Citra Customer", Role::Customer);

        let leads = list_users(&conn, Role::Lead, None, PageRequest::default()).unwrap();
        assert_eq!(leads.meta.total, 2);

        let found = list_users(&conn, Role::Lead, Some("bambang"), PageRequest::default()).unwrap();
        assert_eq!(found.items.len(), 1);
        assert_eq!(found.items[0].name, "Bambang Lead");

        let paged = list_users(&conn, Role::Lead, None, PageRequest::new(2, 1)).unwrap();
        assert_eq!(paged.items.len(), 1);
        assert_eq!(paged.meta.last_page, 2);
    }

    #[test]
    fn test_convert_lead() {
        let conn = test_connection();
        let admin = create_test_user(&conn, "Admin", Role::Admin);
        let lead = create_test_user(&conn, "Dewi", Role::Lead);

        let customer = convert_lead(&conn, &lead.id, &admin).unwrap();
        assert_eq!(customer.role, Role::Customer);
        assert!(customer.converted_at.is_some());

        let events = get_events_for_entity(&conn, "user", &lead.id).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "lead.converted");

        // Already a customer: no longer reachable as a lead
        let err = convert_lead(&conn, &lead.id, &admin).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn test_token_lookup_and_regeneration() {
        let conn = test_connection();
        let created = create_user(&conn, &input("Eko", "eko@example.com"), Role::Sales).unwrap();

        let found = find_by_token(&conn, &created.api_token).unwrap().unwrap();
        assert_eq!(found.id, created.user.id);

        let new_token = regenerate_token(&conn, &created.user.id).unwrap();
        assert!(find_by_token(&conn, &created.api_token).unwrap().is_none());
        assert!(find_by_token(&conn, &new_token).unwrap().is_some());
    }

    #[test]
    fn test_hash_token_is_sha256_hex() {
        let hash = hash_token("secret");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_token("secret"));
    }

    #[test]
    fn test_anonymous_admin_is_persisted_once() {
        let conn = test_connection();
        let first = ensure_anonymous_admin(&conn).unwrap();
        let second = ensure_anonymous_admin(&conn).unwrap();
        assert_eq!(first.id, ANONYMOUS_ID);
        assert_eq!(first, second);
        assert_eq!(count_by_role(&conn, Role::Admin).unwrap(), 1);
    }

    #[test]
    fn test_delete_user_takes_sole_wallets_and_keeps_shared_ones() {
        use crate::entities::transaction::{ledger_balance, transfer, TransferInput};
        use crate::entities::wallet::{add_member, create_test_wallet, get_wallet_for, remove_member, MemberInput};
        use chrono::NaiveDate;
        use rust_decimal_macros::dec;

        let conn = test_connection();
        let owner = create_test_user(&conn, "Rina", Role::Customer);
        let friend = create_test_user(&conn, "Dewi", Role::Customer);
        let private = create_test_wallet(&conn, &owner, "Pribadi", dec!(50000));
        let shared = create_test_wallet(&conn, &owner, "Dapur", dec!(0));
        add_member(&conn, &shared.id, &MemberInput { email: Some(friend.email.clone()) }, &owner).unwrap();

        assert!(matches!(delete_user(&conn, &owner.id, Role::Customer), Err(AppError::Conflict(_))));
        assert!(get_wallet_for(&conn, &shared.id, &friend).is_ok());

        // Once the friend leaves, a transfer into the friend's own wallet still blocks
        remove_member(&conn, &shared.id, &friend.id, &friend).unwrap();
        let kept = create_test_wallet(&conn, &friend, "Milik Dewi", dec!(0));
        add_member(&conn, &kept.id, &MemberInput { email: Some(owner.email.clone()) }, &friend).unwrap();
        let moved = transfer(
            &conn,
            &TransferInput {
                from_wallet_id: Some(private.id.clone()),
                to_wallet_id: Some(kept.id.clone()),
                amount: Some(dec!(10000)),
                description: Some("Titip".to_string()),
                transaction_date: None,
            },
            &owner,
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        )
        .unwrap();
        assert!(matches!(delete_user(&conn, &owner.id, Role::Customer), Err(AppError::Conflict(_))));

        crate::entities::transaction::delete_transaction(&conn, &moved.outgoing.id, &owner).unwrap();
        remove_member(&conn, &kept.id, &owner.id, &owner).unwrap();
        delete_user(&conn, &owner.id, Role::Customer).unwrap();

        let orphans: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM wallets WHERE id IN (?1, ?2)",
                params![private.id, shared.id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(orphans, 0);
        assert_eq!(ledger_balance(&conn, &kept.id).unwrap(), dec!(0));
    }
}
