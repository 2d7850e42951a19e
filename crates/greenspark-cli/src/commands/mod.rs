//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - init plus shared utilities (open_db, task_context)
//! - `catalog` - appliance catalog seeding and listing
//! - `users` - account listing, admin bootstrap, role changes
//! - `bills` - on-demand bill estimation
//! - `serve` - web server command
//! - `status` - database and backend status

pub mod bills;
pub mod catalog;
pub mod core;
pub mod serve;
pub mod status;
pub mod users;

// Re-export command functions for main.rs
pub use bills::*;
pub use catalog::*;
pub use core::*;
pub use serve::*;
pub use status::*;
pub use users::*;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
