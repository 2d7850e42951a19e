//! Revoked token denylist

use rusqlite::params;

use super::Database;
use crate::error::Result;

impl Database {
    /// Add a token id to the denylist until it would have expired anyway
    pub fn revoke_token(&self, jti: &str, expires_at: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO revoked_tokens (jti, expires_at) VALUES (?, ?)",
            params![jti, expires_at],
        )?;
        Ok(())
    }

    pub fn is_token_revoked(&self, jti: &str) -> Result<bool> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM revoked_tokens WHERE jti = ?",
            params![jti],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Drop denylist entries whose tokens have expired; returns rows removed
    pub fn purge_expired_tokens(&self, now_unix: i64) -> Result<usize> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM revoked_tokens WHERE expires_at < ?",
            params![now_unix],
        )?;
        Ok(removed)
    }
}
