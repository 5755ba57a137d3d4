//! Identity store: publisher and administrator accounts.
//!
//! Each account carries at most one live login token
//! (`connection_token`). Issuing a new token overwrites the previous one,
//! which is how a second login invalidates the first.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::credentials::generate_token;
use crate::{is_constraint_violation, StoreError};

/// A publisher or administrator account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    /// Internal database ID.
    pub id: i64,
    /// Unique login email.
    pub email: String,
    /// Salted password hash. Never serialized.
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Current login token. Never serialized.
    #[serde(skip_serializing)]
    pub connection_token: Option<String>,
    /// Admins bypass every ownership check.
    pub is_admin: bool,
    /// Creation timestamp (RFC 3339).
    pub created_at: String,
}

/// Parameters for creating an account.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub password_hash: String,
    pub is_admin: bool,
}

/// Partial update of an account. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateAccountParams {
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub is_admin: Option<bool>,
}

const ACCOUNT_COLUMNS: &str = "id, email, password_hash, connection_token, is_admin, created_at";

fn map_row_to_account(row: &Row) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        connection_token: row.get(3)?,
        is_admin: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Creates a new account.
///
/// # Errors
///
/// Returns `StoreError::DuplicateEmail` if the email is already registered.
pub fn create_account(conn: &Connection, account: &NewAccount) -> Result<Account, StoreError> {
    conn.execute(
        "INSERT INTO accounts (email, password_hash, is_admin) VALUES (?1, ?2, ?3)",
        params![account.email, account.password_hash, account.is_admin],
    )
    .map_err(|e| {
        if is_constraint_violation(&e) {
            StoreError::DuplicateEmail(account.email.clone())
        } else {
            StoreError::Database(e)
        }
    })?;

    get_account(conn, conn.last_insert_rowid())
}

/// Retrieves an account by ID.
pub fn get_account(conn: &Connection, id: i64) -> Result<Account, StoreError> {
    conn.query_row(
        &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1"),
        [id],
        map_row_to_account,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found("account", id))
}

/// Looks up an account by email.
pub fn find_account_by_email(conn: &Connection, email: &str) -> Result<Option<Account>, StoreError> {
    Ok(conn
        .query_row(
            &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = ?1"),
            [email],
            map_row_to_account,
        )
        .optional()?)
}

/// Looks up the account currently holding `token` as its login token.
pub fn find_account_by_token(conn: &Connection, token: &str) -> Result<Option<Account>, StoreError> {
    Ok(conn
        .query_row(
            &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE connection_token = ?1"),
            [token],
            map_row_to_account,
        )
        .optional()?)
}

/// Generates and stores a fresh login token, replacing any previous one.
pub fn issue_connection_token(conn: &Connection, account_id: i64) -> Result<String, StoreError> {
    let token = generate_token();
    set_connection_token(conn, account_id, Some(&token))?;
    Ok(token)
}

/// Sets or clears (`None`) the login token of an account.
pub fn set_connection_token(
    conn: &Connection,
    account_id: i64,
    token: Option<&str>,
) -> Result<(), StoreError> {
    let changed = conn.execute(
        "UPDATE accounts SET connection_token = ?1 WHERE id = ?2",
        params![token, account_id],
    )?;
    if changed == 0 {
        return Err(StoreError::not_found("account", account_id));
    }
    Ok(())
}

/// Lists all accounts ordered by ID.
pub fn list_accounts(conn: &Connection) -> Result<Vec<Account>, StoreError> {
    let mut stmt = conn.prepare(&format!("SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY id ASC"))?;
    let rows = stmt.query_map([], map_row_to_account)?;
    let mut accounts = Vec::new();
    for row in rows {
        accounts.push(row?);
    }
    Ok(accounts)
}

/// Applies a partial update in a single UPDATE statement and returns the
/// updated account.
pub fn update_account(
    conn: &Connection,
    id: i64,
    updates: &UpdateAccountParams,
) -> Result<Account, StoreError> {
    let mut set_parts: Vec<String> = Vec::new();
    let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(email) = &updates.email {
        values.push(Box::new(email.clone()));
        set_parts.push(format!("email = ?{}", values.len()));
    }
    if let Some(hash) = &updates.password_hash {
        values.push(Box::new(hash.clone()));
        set_parts.push(format!("password_hash = ?{}", values.len()));
    }
    if let Some(is_admin) = updates.is_admin {
        values.push(Box::new(is_admin));
        set_parts.push(format!("is_admin = ?{}", values.len()));
    }

    if set_parts.is_empty() {
        return get_account(conn, id);
    }

    values.push(Box::new(id));
    let sql = format!(
        "UPDATE accounts SET {} WHERE id = ?{}",
        set_parts.join(", "),
        values.len()
    );
    let params_refs: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(|v| &**v).collect();

    let changed = conn.execute(&sql, params_refs.as_slice()).map_err(|e| {
        match (&updates.email, is_constraint_violation(&e)) {
            (Some(email), true) => StoreError::DuplicateEmail(email.clone()),
            _ => StoreError::Database(e),
        }
    })?;
    if changed == 0 {
        return Err(StoreError::not_found("account", id));
    }

    get_account(conn, id)
}

/// Deletes an account. Its games, sessions, events and keys cascade.
pub fn delete_account(conn: &Connection, id: i64) -> Result<(), StoreError> {
    let changed = conn.execute("DELETE FROM accounts WHERE id = ?1", [id])?;
    if changed == 0 {
        return Err(StoreError::not_found("account", id));
    }
    tracing::info!(account_id = id, "account deleted");
    Ok(())
}
