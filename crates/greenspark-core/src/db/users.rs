//! User account operations

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use super::{is_unique_violation, now_ts, parse_datetime, uuid_col, Database};
use crate::error::{Error, Result};
use crate::models::{NewUser, User, UserFilter, UserRole, UserUpdate, DEFAULT_TIMEZONE};

const USER_COLUMNS: &str = "id, email, first_name, last_name, username, role, timezone, \
     is_active, is_verified, hashed_password, tokens_valid_from, created_at, updated_at";

impl Database {
    /// Helper to convert a row to User
    /// Column order matches `USER_COLUMNS`
    fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
        let role_str: String = row.get(5)?;
        let created_at: String = row.get(11)?;
        let updated_at: String = row.get(12)?;
        Ok(User {
            id: uuid_col(row, 0)?,
            email: row.get(1)?,
            first_name: row.get(2)?,
            last_name: row.get(3)?,
            username: row.get(4)?,
            role: role_str.parse().unwrap_or_default(),
            timezone: row.get(6)?,
            is_active: row.get(7)?,
            is_verified: row.get(8)?,
            hashed_password: row.get(9)?,
            tokens_valid_from: row.get(10)?,
            created_at: parse_datetime(&created_at),
            updated_at: parse_datetime(&updated_at),
        })
    }

    fn query_user(&self, where_clause: &str, value: &str) -> Result<Option<User>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM users WHERE {}", USER_COLUMNS, where_clause);
        let user = conn
            .query_row(&sql, params![value], Self::row_to_user)
            .optional()?;
        Ok(user)
    }

    /// Create a user from an already validated signup payload
    ///
    /// Returns `Error::Conflict` when the email or username is taken.
    pub fn create_user(
        &self,
        new_user: &NewUser,
        hashed_password: &str,
        role: UserRole,
        is_verified: bool,
    ) -> Result<User> {
        if self.get_user_by_email(&new_user.email)?.is_some() {
            return Err(Error::Conflict("Email already registered".to_string()));
        }
        if self.get_user_by_username(&new_user.username)?.is_some() {
            return Err(Error::Conflict("Username already taken".to_string()));
        }

        let id = Uuid::new_v4();
        let now = now_ts();
        let timezone = new_user.timezone.as_deref().unwrap_or(DEFAULT_TIMEZONE);

        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO users (id, email, first_name, last_name, username, hashed_password,
                               role, timezone, is_active, is_verified, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?, ?)
            "#,
            params![
                id.to_string(),
                new_user.email,
                new_user.first_name,
                new_user.last_name,
                new_user.username,
                hashed_password,
                role.as_str(),
                timezone,
                is_verified,
                now,
                now,
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::Conflict("Email or username already registered".to_string())
            } else {
                Error::Database(e)
            }
        })?;

        self.get_user(id)?
            .ok_or_else(|| Error::NotFound(format!("User {}", id)))
    }

    pub fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        self.query_user("id = ?", &id.to_string())
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.query_user("email = ?", &email.trim().to_lowercase())
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.query_user("username = ?", &username.trim().to_lowercase())
    }

    /// Look up a login identifier, which may be an email or a username
    pub fn get_user_by_login(&self, identifier: &str) -> Result<Option<User>> {
        self.query_user(
            "email = ?1 OR username = ?1",
            &identifier.trim().to_lowercase(),
        )
    }

    fn user_filter_sql(filter: &UserFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref q) = filter.search {
            if !q.trim().is_empty() {
                conditions.push(
                    "(email LIKE ? OR username LIKE ? OR first_name LIKE ? COLLATE NOCASE \
                     OR last_name LIKE ? COLLATE NOCASE)"
                        .to_string(),
                );
                let pattern = format!("%{}%", q.trim().to_lowercase());
                for _ in 0..4 {
                    params.push(Box::new(pattern.clone()));
                }
            }
        }
        if let Some(role) = filter.role {
            conditions.push("role = ?".to_string());
            params.push(Box::new(role.as_str()));
        }
        if let Some(active) = filter.is_active {
            conditions.push("is_active = ?".to_string());
            params.push(Box::new(active));
        }
        if let Some(verified) = filter.is_verified {
            conditions.push("is_verified = ?".to_string());
            params.push(Box::new(verified));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        (where_clause, params)
    }

    /// List users matching a filter, newest first
    pub fn list_users(&self, filter: &UserFilter, skip: i64, limit: i64) -> Result<Vec<User>> {
        let conn = self.conn()?;
        let (where_clause, mut params) = Self::user_filter_sql(filter);
        let sql = format!(
            "SELECT {} FROM users {} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            USER_COLUMNS, where_clause
        );
        params.push(Box::new(limit));
        params.push(Box::new(skip));

        let mut stmt = conn.prepare(&sql)?;
        let refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let users = stmt
            .query_map(refs.as_slice(), Self::row_to_user)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(users)
    }

    pub fn count_users(&self, filter: &UserFilter) -> Result<i64> {
        let conn = self.conn()?;
        let (where_clause, params) = Self::user_filter_sql(filter);
        let sql = format!("SELECT COUNT(*) FROM users {}", where_clause);
        let refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let count: i64 = conn.query_row(&sql, refs.as_slice(), |row| row.get(0))?;
        Ok(count)
    }

    /// Apply a validated profile update
    pub fn update_user_profile(&self, id: Uuid, update: &UserUpdate) -> Result<User> {
        let existing = self
            .get_user(id)?
            .ok_or_else(|| Error::NotFound(format!("User {}", id)))?;

        if let Some(ref username) = update.username {
            if *username != existing.username {
                if let Some(other) = self.get_user_by_username(username)? {
                    if other.id != id {
                        return Err(Error::Conflict("Username already taken".to_string()));
                    }
                }
            }
        }

        let conn = self.conn()?;
        conn.execute(
            r#"
            UPDATE users SET
                first_name = COALESCE(?, first_name),
                last_name = COALESCE(?, last_name),
                username = COALESCE(?, username),
                timezone = COALESCE(?, timezone),
                updated_at = ?
            WHERE id = ?
            "#,
            params![
                update.first_name,
                update.last_name,
                update.username,
                update.timezone,
                now_ts(),
                id.to_string(),
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::Conflict("Username already taken".to_string())
            } else {
                Error::Database(e)
            }
        })?;

        self.get_user(id)?
            .ok_or_else(|| Error::NotFound(format!("User {}", id)))
    }

    fn update_user_column(&self, id: Uuid, column: &str, value: &dyn rusqlite::ToSql) -> Result<()> {
        let conn = self.conn()?;
        let sql = format!("UPDATE users SET {} = ?, updated_at = ? WHERE id = ?", column);
        let changed = conn.execute(&sql, params![value, now_ts(), id.to_string()])?;
        if changed == 0 {
            return Err(Error::NotFound(format!("User {}", id)));
        }
        Ok(())
    }

    pub fn set_user_password(&self, id: Uuid, hashed_password: &str) -> Result<()> {
        self.update_user_column(id, "hashed_password", &hashed_password)
    }

    pub fn set_user_role(&self, id: Uuid, role: UserRole) -> Result<()> {
        self.update_user_column(id, "role", &role.as_str())
    }

    pub fn set_user_active(&self, id: Uuid, active: bool) -> Result<()> {
        self.update_user_column(id, "is_active", &active)
    }

    pub fn set_user_verified(&self, id: Uuid, verified: bool) -> Result<()> {
        self.update_user_column(id, "is_verified", &verified)
    }

    /// Change the login email; `Error::Conflict` if another account has it
    pub fn set_user_email(&self, id: Uuid, email: &str) -> Result<()> {
        let email = email.trim().to_lowercase();
        if let Some(other) = self.get_user_by_email(&email)? {
            if other.id != id {
                return Err(Error::Conflict("Email already registered".to_string()));
            }
        }
        self.update_user_column(id, "email", &email)
    }

    /// Reject every token issued at or before `unix_ms`
    pub fn set_tokens_valid_from(&self, id: Uuid, unix_ms: i64) -> Result<()> {
        self.update_user_column(id, "tokens_valid_from", &unix_ms)
    }

    /// Delete a user; bills, appliances and insights cascade
    pub fn delete_user(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM users WHERE id = ?", params![id.to_string()])?;
        Ok(deleted > 0)
    }

    pub fn count_active_admins(&self) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM users WHERE role = 'admin' AND is_active = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
