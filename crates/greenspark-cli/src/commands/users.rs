//! User account commands

use anyhow::{bail, Context, Result};
use greenspark_core::{
    db::Database,
    models::{NewUser, User, UserFilter, UserRole},
    security::hash_password,
    validation::validate_password_strength,
};

use super::truncate;

/// Details for `users create-admin`
#[derive(Debug, Clone)]
pub struct AdminAccount {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

fn parse_role(role: &str) -> Result<UserRole> {
    role.parse::<UserRole>().map_err(|e| anyhow::anyhow!(e))
}

pub fn cmd_users_list(db: &Database, role: Option<&str>, limit: i64) -> Result<()> {
    let filter = UserFilter {
        role: role.map(parse_role).transpose()?,
        ..UserFilter::default()
    };
    let users = db.list_users(&filter, 0, limit.max(1))?;
    let total = db.count_users(&filter)?;

    if users.is_empty() {
        println!("No users found.");
        return Ok(());
    }

    println!();
    println!(
        "   {:<20} {:<32} {:<6} {:<8} {:<8}",
        "USERNAME", "EMAIL", "ROLE", "ACTIVE", "VERIFIED"
    );
    println!("   ─────────────────────────────────────────────────────────────────────────");
    for user in &users {
        println!(
            "   {:<20} {:<32} {:<6} {:<8} {:<8}",
            truncate(&user.username, 20),
            truncate(&user.email, 32),
            user.role.as_str(),
            if user.is_active { "yes" } else { "no" },
            if user.is_verified { "yes" } else { "no" },
        );
    }
    println!();
    println!("   Showing {} of {} users", users.len(), total);
    Ok(())
}

/// Create a verified admin, ready to log in
pub fn cmd_users_create_admin(db: &Database, account: AdminAccount) -> Result<User> {
    // Admin accounts get the reset-strength rule rather than the signup minimum
    validate_password_strength(&account.password, 8)?;

    let new_user = NewUser {
        email: account.email,
        first_name: account.first_name,
        last_name: account.last_name,
        username: account.username,
        password: account.password,
        timezone: None,
    }
    .validate()?;

    if db.get_user_by_email(&new_user.email)?.is_some() {
        bail!("A user with email {} already exists", new_user.email);
    }
    if db.get_user_by_username(&new_user.username)?.is_some() {
        bail!("Username {} is already taken", new_user.username);
    }

    let hash = hash_password(&new_user.password).context("Failed to hash password")?;
    let user = db.create_user(&new_user, &hash, UserRole::Admin, true)?;

    println!("✅ Created admin {} <{}>", user.username, user.email);
    Ok(user)
}

pub fn cmd_users_set_role(db: &Database, login: &str, role: &str) -> Result<()> {
    let role = parse_role(role)?;
    let user = db
        .get_user_by_login(login)?
        .with_context(|| format!("No user matches '{}'", login))?;

    if user.role == role {
        println!("{} already has role {}", user.username, role.as_str());
        return Ok(());
    }
    if user.role == UserRole::Admin && user.is_active && db.count_active_admins()? <= 1 {
        bail!("Refusing to demote the last active administrator");
    }

    db.set_user_role(user.id, role)?;
    println!("✅ {} is now {}", user.username, role.as_str());
    Ok(())
}
