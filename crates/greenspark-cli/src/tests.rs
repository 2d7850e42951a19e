//! CLI command tests

use chrono::NaiveDate;
use greenspark_core::config::CacheSettings;
use greenspark_core::db::Database;
use greenspark_core::models::{NewAppliance, NewManualBill, NewUser, User, UserRole};
use greenspark_core::{
    CacheService, Mailer, RetryPolicy, Storage, TaskContext, TemplateContext,
};
use serde_json::json;

use crate::commands::{self, truncate, AdminAccount};

fn setup_test_db() -> Database {
    let db = Database::in_memory().unwrap();
    db.seed_default_catalog().unwrap();
    db
}

fn test_context(db: Database) -> TaskContext {
    TaskContext {
        db,
        ai: None,
        cache: CacheService::memory(CacheSettings::default()),
        storage: Storage::memory(),
        mailer: Mailer::log(),
        templates: TemplateContext {
            project_name: "GreenSpark API".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
        },
        retry: RetryPolicy::immediate(),
    }
}

fn admin_account(username: &str) -> AdminAccount {
    AdminAccount {
        email: format!("{}@example.com", username),
        username: username.to_string(),
        first_name: "Admin".to_string(),
        last_name: "User".to_string(),
        password: "Adm1n!pass".to_string(),
    }
}

fn create_user(db: &Database, username: &str) -> User {
    let new_user = NewUser {
        email: format!("{}@example.com", username),
        first_name: "Test".to_string(),
        last_name: "User".to_string(),
        username: username.to_string(),
        password: "Secret1!".to_string(),
        timezone: None,
    };
    db.create_user(&new_user, "not-a-real-hash", UserRole::User, true)
        .unwrap()
}

fn appliance(name: &str, watts: i64, hours: f64) -> NewAppliance {
    serde_json::from_value(json!({
        "custom_name": name,
        "custom_wattage": watts,
        "hours_per_day": hours,
        "days_per_week": 7,
    }))
    .unwrap()
}

fn manual_bill() -> NewManualBill {
    NewManualBill {
        billing_period_start: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        billing_period_end: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        kwh_total: 300.0,
        cost_total: 2400.0,
        provider: "BESCOM".to_string(),
    }
}

// ========== Init / Status ==========

#[test]
fn test_cmd_init_creates_and_seeds() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("greenspark.db");

    commands::cmd_init(&path, true).unwrap();
    assert!(path.exists());

    let db = commands::open_db(&path, true).unwrap();
    assert!(!db.list_catalog(None).unwrap().is_empty());

    // Running init again is harmless
    assert!(commands::cmd_init(&path, true).is_ok());
}

#[test]
fn test_cmd_status_without_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.db");
    assert!(commands::cmd_status(&path, true).is_ok());
    assert!(!path.exists(), "status must not create the database");
}

#[test]
fn test_database_counts() {
    let db = setup_test_db();
    let user = create_user(&db, "counter");
    db.create_appliance(user.id, &appliance("Fan", 75, 8.0))
        .unwrap();
    db.create_manual_bill(user.id, &manual_bill()).unwrap();
    db.create_placeholder_bill(user.id, "s3://greenspark-bills/x/y.pdf")
        .unwrap();

    let counts = commands::database_counts(&db).unwrap();
    assert_eq!(counts.users, 1);
    assert_eq!(counts.bills, 2);
    assert_eq!(counts.bills_processing, 1);
    assert_eq!(counts.bills_failed, 0);
    assert_eq!(counts.appliances, 1);
    assert!(counts.catalog_entries > 0);
}

// ========== Catalog ==========

#[test]
fn test_cmd_catalog_seed_is_idempotent() {
    let db = Database::in_memory().unwrap();
    commands::cmd_catalog_seed(&db).unwrap();
    let first = db.list_catalog(None).unwrap().len();

    commands::cmd_catalog_seed(&db).unwrap();
    assert_eq!(db.list_catalog(None).unwrap().len(), first);
}

#[test]
fn test_cmd_catalog_list() {
    let db = setup_test_db();
    assert!(commands::cmd_catalog_list(&db, None).is_ok());
    assert!(commands::cmd_catalog_list(&db, Some("fridge")).is_ok());

    let empty = Database::in_memory().unwrap();
    assert!(commands::cmd_catalog_list(&empty, None).is_ok());
}

// ========== Users ==========

#[test]
fn test_cmd_users_create_admin() {
    let db = setup_test_db();
    let admin = commands::cmd_users_create_admin(&db, admin_account("Root")).unwrap();

    assert_eq!(admin.username, "root");
    assert_eq!(admin.role, UserRole::Admin);
    assert!(admin.is_verified);
    assert!(greenspark_core::security::verify_password(
        "Adm1n!pass",
        &db.get_user(admin.id).unwrap().unwrap().hashed_password
    ));
}

#[test]
fn test_cmd_users_create_admin_rejects_duplicates() {
    let db = setup_test_db();
    commands::cmd_users_create_admin(&db, admin_account("root")).unwrap();

    let err = commands::cmd_users_create_admin(&db, admin_account("root")).unwrap_err();
    assert!(err.to_string().contains("already exists"));
}

#[test]
fn test_cmd_users_create_admin_requires_strong_password() {
    let db = setup_test_db();
    let mut account = admin_account("weakling");
    account.password = "short".to_string();
    assert!(commands::cmd_users_create_admin(&db, account).is_err());
    assert!(db.get_user_by_username("weakling").unwrap().is_none());
}

#[test]
fn test_cmd_users_set_role() {
    let db = setup_test_db();
    commands::cmd_users_create_admin(&db, admin_account("root")).unwrap();
    let user = create_user(&db, "promoted");

    commands::cmd_users_set_role(&db, "promoted@example.com", "admin").unwrap();
    assert_eq!(
        db.get_user(user.id).unwrap().unwrap().role,
        UserRole::Admin
    );

    commands::cmd_users_set_role(&db, "promoted", "user").unwrap();
    assert_eq!(db.get_user(user.id).unwrap().unwrap().role, UserRole::User);
}

#[test]
fn test_cmd_users_set_role_keeps_last_admin() {
    let db = setup_test_db();
    commands::cmd_users_create_admin(&db, admin_account("root")).unwrap();

    let err = commands::cmd_users_set_role(&db, "root", "user").unwrap_err();
    assert!(err.to_string().contains("last active administrator"));
}

#[test]
fn test_cmd_users_set_role_errors() {
    let db = setup_test_db();
    create_user(&db, "someone");

    assert!(commands::cmd_users_set_role(&db, "nobody", "admin").is_err());
    assert!(commands::cmd_users_set_role(&db, "someone", "superuser").is_err());
}

#[test]
fn test_cmd_users_list() {
    let db = setup_test_db();
    create_user(&db, "alpha");
    assert!(commands::cmd_users_list(&db, None, 10).is_ok());
    assert!(commands::cmd_users_list(&db, Some("admin"), 10).is_ok());
    assert!(commands::cmd_users_list(&db, Some("emperor"), 10).is_err());
}

// ========== Bills ==========

#[tokio::test]
async fn test_cmd_bills_estimate() {
    let db = setup_test_db();
    let user = create_user(&db, "estimator");
    db.create_appliances(
        user.id,
        &[appliance("Fridge", 150, 24.0), appliance("AC", 1500, 6.0)],
    )
    .unwrap();
    let bill = db.create_manual_bill(user.id, &manual_bill()).unwrap();

    let ctx = test_context(db);
    let estimates = commands::cmd_bills_estimate(&ctx, bill.id).await.unwrap();

    assert_eq!(estimates.len(), 2);
    assert_eq!(estimates[0].appliance_name, "AC");
    let total: f64 = estimates.iter().map(|e| e.estimate.estimated_kwh).sum();
    assert!((total - 300.0).abs() < 0.1);
}

#[tokio::test]
async fn test_cmd_bills_estimate_requires_parsed_bill() {
    let db = setup_test_db();
    let user = create_user(&db, "impatient");
    let bill = db
        .create_placeholder_bill(user.id, "s3://greenspark-bills/x/y.pdf")
        .unwrap();

    let ctx = test_context(db);
    let err = commands::cmd_bills_estimate(&ctx, bill.id).await.unwrap_err();
    assert!(err.to_string().contains("processing"));

    assert!(commands::cmd_bills_estimate(&ctx, uuid::Uuid::new_v4())
        .await
        .is_err());
}

// ========== Helpers ==========

#[test]
fn test_truncate() {
    assert_eq!(truncate("short", 10), "short");
    assert_eq!(truncate("exactly10!", 10), "exactly10!");
    assert_eq!(truncate("this is a long label", 10), "this is...");
    assert_eq!(truncate("Geyser ⚡⚡⚡⚡⚡", 9), "Geyser...");
}
