//! Integration tests for greenspark-core
//!
//! These tests exercise the full upload → parse → estimate → insight workflow
//! against the mock Gemini server.

use std::time::Duration;

use chrono::NaiveDate;
use greenspark_core::{
    config::CacheSettings,
    db::Database,
    insights::ReportSource,
    models::{InsightStatus, NewAppliance, NewManualBill, NewUser, ParseStatus, User, UserRole},
    storage::object_key,
    test_utils::{MockGeminiServer, MOCK_API_KEY},
    AIClient, CacheSchema, CacheService, EmailKind, InsightReport, Job, JobQueue, Mailer,
    RetryPolicy, Storage, TaskContext, TemplateContext,
};

fn context(ai: Option<AIClient>) -> TaskContext {
    TaskContext {
        db: Database::in_memory().expect("Failed to create in-memory database"),
        ai,
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

fn create_user(db: &Database, name: &str) -> User {
    let new_user = NewUser {
        email: format!("{}@example.com", name),
        first_name: "Priya".to_string(),
        last_name: "Sharma".to_string(),
        username: name.to_string(),
        password: "Secret1!".to_string(),
        timezone: None,
    };
    db.create_user(&new_user, "not-a-hash", UserRole::User, true)
        .expect("Failed to create user")
}

fn appliance(name: &str, watts: i64, hours: f64) -> NewAppliance {
    NewAppliance {
        appliance_catalog_id: None,
        custom_name: name.to_string(),
        count: 1,
        custom_wattage: Some(watts),
        hours_per_day: hours,
        days_per_week: 7,
        brand: None,
        model: None,
        star_rating: None,
        purchase_year: None,
        notes: None,
    }
}

// =============================================================================
// Bill pipeline
// =============================================================================

#[tokio::test]
async fn test_uploaded_bill_pipeline_with_gemini() {
    let server = MockGeminiServer::start().await;
    let ai = AIClient::gemini(&server.url(), "gemini-1.5-flash", MOCK_API_KEY);
    let ctx = context(Some(ai));

    let user = create_user(&ctx.db, "priya");
    ctx.db
        .create_appliances(
            user.id,
            &[
                appliance("Geyser", 2000, 1.0),
                appliance("Ceiling Fan", 75, 10.0),
                appliance("Refrigerator", 150, 24.0),
            ],
        )
        .unwrap();

    let key = object_key(user.id, "feb bill.pdf");
    ctx.storage
        .put_object(&key, b"%PDF-1.4 mock".to_vec(), "application/pdf")
        .await
        .unwrap();
    let bill = ctx
        .db
        .create_placeholder_bill(user.id, &ctx.storage.file_uri(&key))
        .unwrap();
    assert_eq!(bill.parse_status, ParseStatus::Processing);

    let queue = JobQueue::eager(ctx.clone());
    queue.enqueue(Job::ParseBill { bill_id: bill.id }).await.unwrap();

    let parsed = ctx.db.get_bill(bill.id).unwrap().unwrap();
    assert_eq!(parsed.parse_status, ParseStatus::Success);
    assert_eq!(parsed.provider, "MSEDCL");
    assert_eq!(parsed.kwh_total, 320.0);
    assert_eq!(parsed.cost_total, 2560.0);
    assert!(parsed.checksum.unwrap().starts_with("sha256:"));

    let estimates = ctx.db.list_estimates(bill.id).unwrap();
    assert_eq!(estimates.len(), 3);
    let total: f64 = estimates.iter().map(|e| e.estimate.estimated_kwh).sum();
    assert!((total - 320.0).abs() < 0.5, "estimates sum to {}", total);
    assert_eq!(estimates[0].appliance_name, "Refrigerator");

    let insight = ctx.db.get_insight(bill.id).unwrap().unwrap();
    assert_eq!(insight.status, InsightStatus::Completed);
    let report: InsightReport = serde_json::from_value(insight.structured_data.unwrap()).unwrap();
    assert_eq!(report.source, ReportSource::Ai);
    assert_eq!(report.recommendations.len(), 1);
    assert_eq!(report.recommendations[0].title, "Shift Geyser Use");
    assert!(!report.recommendations[0].id.is_empty());
    assert_eq!(report.consumption_breakdown.len(), 3);
}

#[tokio::test]
async fn test_bad_api_key_fails_bill() {
    let server = MockGeminiServer::start().await;
    let ai = AIClient::gemini(&server.url(), "gemini-1.5-flash", "wrong-key");
    let ctx = context(Some(ai));
    let user = create_user(&ctx.db, "priya");

    let key = object_key(user.id, "bill.pdf");
    ctx.storage
        .put_object(&key, b"%PDF".to_vec(), "application/pdf")
        .await
        .unwrap();
    let bill = ctx
        .db
        .create_placeholder_bill(user.id, &ctx.storage.file_uri(&key))
        .unwrap();

    JobQueue::eager(ctx.clone())
        .enqueue(Job::ParseBill { bill_id: bill.id })
        .await
        .unwrap();

    let failed = ctx.db.get_bill(bill.id).unwrap().unwrap();
    assert_eq!(failed.parse_status, ParseStatus::Failed);
    assert!(ctx.db.list_estimates(bill.id).unwrap().is_empty());
    assert!(ctx.db.get_insight(bill.id).unwrap().is_none());
}

#[tokio::test]
async fn test_manual_bill_compares_with_previous_month() {
    let ctx = context(None);
    let user = create_user(&ctx.db, "priya");
    ctx.db
        .create_appliance(user.id, &appliance("Air Conditioner", 1500, 6.0))
        .unwrap();

    let jan = ctx
        .db
        .create_manual_bill(
            user.id,
            &NewManualBill {
                billing_period_start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                billing_period_end: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
                kwh_total: 200.0,
                cost_total: 1600.0,
                provider: "TPDDL".to_string(),
            },
        )
        .unwrap();
    let feb = ctx
        .db
        .create_manual_bill(
            user.id,
            &NewManualBill {
                billing_period_start: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
                billing_period_end: NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
                kwh_total: 260.0,
                cost_total: 2080.0,
                provider: "TPDDL".to_string(),
            },
        )
        .unwrap();

    let queue = JobQueue::eager(ctx.clone());
    queue.enqueue(Job::ParseBill { bill_id: jan.id }).await.unwrap();
    queue.enqueue(Job::ParseBill { bill_id: feb.id }).await.unwrap();

    let insight = ctx.db.get_insight(feb.id).unwrap().unwrap();
    let report: InsightReport = serde_json::from_value(insight.structured_data.unwrap()).unwrap();
    assert_eq!(report.source, ReportSource::Rules);
    assert_eq!(report.kpis.kwh_change_percent, Some(30.0));
    assert!(report
        .recommendations
        .iter()
        .any(|r| r.id == "usage-increasing"));

    let cached: Option<InsightReport> = ctx
        .cache
        .get(CacheSchema::InsightReport, &feb.id.to_string())
        .await;
    assert!(cached.is_none());
}

// =============================================================================
// Email
// =============================================================================

#[tokio::test]
async fn test_welcome_email_job() {
    let ctx = context(None);
    let queue = JobQueue::eager(ctx.clone());
    queue
        .enqueue(Job::SendEmail {
            to: "priya@example.com".to_string(),
            email: EmailKind::Welcome {
                first_name: "Priya".to_string(),
            },
        })
        .await
        .unwrap();

    let sent = ctx.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "priya@example.com");
    assert!(sent[0].html.contains("Priya"));
}

#[tokio::test]
async fn test_worker_queue_processes_manual_bill() {
    let ctx = context(None);
    let user = create_user(&ctx.db, "priya");
    ctx.db
        .create_appliance(user.id, &appliance("Television", 120, 5.0))
        .unwrap();
    let bill = ctx
        .db
        .create_manual_bill(
            user.id,
            &NewManualBill {
                billing_period_start: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                billing_period_end: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
                kwh_total: 90.0,
                cost_total: 720.0,
                provider: "BESCOM".to_string(),
            },
        )
        .unwrap();

    let queue = JobQueue::start(ctx.clone(), 2);
    assert!(!queue.is_eager());
    queue.enqueue(Job::EstimateBill { bill_id: bill.id }).await.unwrap();

    let mut completed = false;
    for _ in 0..100 {
        if let Some(insight) = ctx.db.get_insight(bill.id).unwrap() {
            if insight.status == InsightStatus::Completed {
                completed = true;
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(completed, "insight was not generated by the workers");
    assert_eq!(ctx.db.list_estimates(bill.id).unwrap().len(), 1);
}
