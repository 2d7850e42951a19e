//! Background job queue
//!
//! Bills move through three stages after upload: parse, estimate and
//! insight. Each stage is a `Job`; a job handler returns the jobs that should
//! run next, so the whole pipeline is driven by the queue rather than by
//! handlers calling each other.
//!
//! Two queue flavours exist:
//! - `JobQueue::start`: a bounded tokio channel drained by worker tasks
//! - `JobQueue::eager`: runs each job (and its follow-ups) inline before
//!   `enqueue` returns; used by tests and one-shot CLI commands

mod tasks;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::ai::AIClient;
use crate::cache::CacheService;
use crate::db::Database;
use crate::email::{EmailKind, Mailer, TemplateContext};
use crate::error::{Error, Result};
use crate::storage::Storage;

const QUEUE_CAPACITY: usize = 1024;

/// A unit of background work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum Job {
    SendEmail { to: String, email: EmailKind },
    ParseBill { bill_id: Uuid },
    EstimateBill { bill_id: Uuid },
    GenerateInsight { bill_id: Uuid },
}

impl Job {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SendEmail { .. } => "send_email",
            Self::ParseBill { .. } => "parse_bill",
            Self::EstimateBill { .. } => "estimate_bill",
            Self::GenerateInsight { .. } => "generate_insight",
        }
    }
}

impl std::fmt::Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SendEmail { email, .. } => write!(f, "send_email({})", email.as_str()),
            Self::ParseBill { bill_id }
            | Self::EstimateBill { bill_id }
            | Self::GenerateInsight { bill_id } => write!(f, "{}({})", self.as_str(), bill_id),
        }
    }
}

/// Retry schedule for transient failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Retries without waiting (tests)
    pub fn immediate() -> Self {
        Self {
            base_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based): base, 2×base, 4×base, ...
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Everything a job handler may touch
#[derive(Clone)]
pub struct TaskContext {
    pub db: Database,
    pub ai: Option<AIClient>,
    pub cache: CacheService,
    pub storage: Storage,
    pub mailer: Mailer,
    pub templates: TemplateContext,
    pub retry: RetryPolicy,
}

/// Run one job, returning its follow-ups
async fn run_job(ctx: &TaskContext, job: &Job) -> Result<Vec<Job>> {
    match job {
        Job::SendEmail { to, email } => tasks::send_email(ctx, to, email).await,
        Job::ParseBill { bill_id } => tasks::parse_bill(ctx, *bill_id).await,
        Job::EstimateBill { bill_id } => tasks::estimate_bill(ctx, *bill_id).await,
        Job::GenerateInsight { bill_id } => tasks::generate_insight(ctx, *bill_id).await,
    }
}

/// Run a job and every job it chains to
pub async fn run_chain(ctx: &TaskContext, job: Job) {
    let mut pending = VecDeque::from([job]);
    while let Some(job) = pending.pop_front() {
        debug!(job = %job, "Running job");
        match run_job(ctx, &job).await {
            Ok(next) => pending.extend(next),
            Err(e) => error!(job = %job, error = %e, "Job failed"),
        }
    }
}

#[derive(Clone)]
pub enum JobQueue {
    Workers(mpsc::Sender<Job>),
    Eager(Arc<TaskContext>),
}

impl JobQueue {
    /// Spawn `workers` tasks sharing one channel
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(ctx: TaskContext, workers: usize) -> Self {
        let (tx, rx) = mpsc::channel::<Job>(QUEUE_CAPACITY);
        let rx = Arc::new(Mutex::new(rx));
        let ctx = Arc::new(ctx);
        let workers = workers.max(1);

        for worker in 0..workers {
            let rx = Arc::clone(&rx);
            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move {
                loop {
                    let job = rx.lock().await.recv().await;
                    match job {
                        Some(job) => run_chain(&ctx, job).await,
                        None => break,
                    }
                }
                debug!(worker, "Job worker stopped");
            });
        }

        info!(workers, "Job workers started");
        JobQueue::Workers(tx)
    }

    pub fn eager(ctx: TaskContext) -> Self {
        JobQueue::Eager(Arc::new(ctx))
    }

    pub async fn enqueue(&self, job: Job) -> Result<()> {
        match self {
            JobQueue::Workers(tx) => tx
                .send(job)
                .await
                .map_err(|_| Error::Unavailable("Job queue is not running".to_string())),
            JobQueue::Eager(ctx) => {
                run_chain(ctx, job).await;
                Ok(())
            }
        }
    }

    pub fn is_eager(&self) -> bool {
        matches!(self, JobQueue::Eager(_))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ai::{mock_bill_json, MockBackend};
    use crate::cache::CacheSchema;
    use crate::config::CacheSettings;
    use crate::insights::{InsightReport, ReportSource};
    use crate::models::{
        InsightStatus, NewAppliance, NewManualBill, NewUser, ParseStatus, User, UserRole,
    };
    use chrono::NaiveDate;

    pub(crate) fn context(ai: Option<AIClient>) -> TaskContext {
        TaskContext {
            db: Database::in_memory().unwrap(),
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

    pub(crate) fn user(db: &Database, name: &str) -> User {
        let new_user = NewUser {
            email: format!("{}@example.com", name),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            username: name.to_string(),
            password: "Secret1!".to_string(),
            timezone: None,
        };
        db.create_user(&new_user, "not-a-hash", UserRole::User, true)
            .unwrap()
    }

    pub(crate) fn appliance(name: &str, watts: i64, hours: f64) -> NewAppliance {
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

    async fn uploaded_bill(ctx: &TaskContext, user: &User) -> Uuid {
        let key = format!("{}/abc-bill.pdf", user.id);
        ctx.storage
            .put_object(&key, b"%PDF-1.4 fake".to_vec(), "application/pdf")
            .await
            .unwrap();
        ctx.db
            .create_placeholder_bill(user.id, &ctx.storage.file_uri(&key))
            .unwrap()
            .id
    }

    #[test]
    fn test_retry_delays_double() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
        };
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(2), Duration::from_secs(4));
        assert_eq!(policy.delay(3), Duration::from_secs(8));
    }

    #[test]
    fn test_job_serialization() {
        let id = Uuid::new_v4();
        let json = serde_json::to_value(Job::ParseBill { bill_id: id }).unwrap();
        assert_eq!(json["job"], "parse_bill");
        assert_eq!(json["bill_id"], id.to_string());
        assert_eq!(Job::EstimateBill { bill_id: id }.to_string(), format!("estimate_bill({})", id));
    }

    #[tokio::test]
    async fn test_pipeline_parse_estimate_insight() {
        let ctx = context(Some(AIClient::mock()));
        let owner = user(&ctx.db, "asha");
        ctx.db
            .create_appliance(owner.id, &appliance("Air Conditioner", 1500, 6.0))
            .unwrap();
        ctx.db
            .create_appliance(owner.id, &appliance("Fridge", 200, 24.0))
            .unwrap();
        let bill_id = uploaded_bill(&ctx, &owner).await;

        let queue = JobQueue::eager(ctx.clone());
        queue.enqueue(Job::ParseBill { bill_id }).await.unwrap();

        let bill = ctx.db.get_bill(bill_id).unwrap().unwrap();
        assert_eq!(bill.parse_status, ParseStatus::Success);
        assert_eq!(bill.provider, "MSEDCL");
        assert_eq!(bill.kwh_total, 320.0);
        assert_eq!(bill.cost_total, 2560.0);
        assert_eq!(bill.parser_version.as_deref(), Some("1.1"));
        assert!(bill.checksum.as_deref().unwrap().starts_with("sha256:"));

        let estimates = ctx.db.list_estimates(bill_id).unwrap();
        assert_eq!(estimates.len(), 2);
        let total: f64 = estimates.iter().map(|e| e.estimate.estimated_kwh).sum();
        assert!((total - 320.0).abs() < 0.05);

        let insight = ctx.db.get_insight(bill_id).unwrap().unwrap();
        assert_eq!(insight.status, InsightStatus::Completed);
        let report: InsightReport =
            serde_json::from_value(insight.structured_data.unwrap()).unwrap();
        assert_eq!(report.source, ReportSource::Rules);
        assert_eq!(report.consumption_breakdown.len(), 2);
    }

    #[tokio::test]
    async fn test_parse_failure_marks_bill_failed() {
        let ctx = context(Some(AIClient::Mock(MockBackend::failing())));
        let owner = user(&ctx.db, "ravi");
        let bill_id = uploaded_bill(&ctx, &owner).await;

        JobQueue::eager(ctx.clone())
            .enqueue(Job::ParseBill { bill_id })
            .await
            .unwrap();

        let bill = ctx.db.get_bill(bill_id).unwrap().unwrap();
        assert_eq!(bill.parse_status, ParseStatus::Failed);
        assert!(ctx.db.list_estimates(bill_id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_parse_without_ai_backend_fails_bill() {
        let ctx = context(None);
        let owner = user(&ctx.db, "meena");
        let bill_id = uploaded_bill(&ctx, &owner).await;

        JobQueue::eager(ctx.clone())
            .enqueue(Job::ParseBill { bill_id })
            .await
            .unwrap();

        assert_eq!(
            ctx.db.get_bill(bill_id).unwrap().unwrap().parse_status,
            ParseStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_invalid_document_fails_bill() {
        let mut bill = mock_bill_json();
        bill["period"]["end"] = serde_json::json!("2024-01-01");
        let ctx = context(Some(AIClient::Mock(MockBackend::new().with_bill(bill))));
        let owner = user(&ctx.db, "kiran");
        let bill_id = uploaded_bill(&ctx, &owner).await;

        JobQueue::eager(ctx.clone())
            .enqueue(Job::ParseBill { bill_id })
            .await
            .unwrap();

        assert_eq!(
            ctx.db.get_bill(bill_id).unwrap().unwrap().parse_status,
            ParseStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_estimate_invalidates_cached_detail() {
        let ctx = context(None);
        let owner = user(&ctx.db, "dev");
        ctx.db
            .create_appliance(owner.id, &appliance("Geyser", 2000, 1.0))
            .unwrap();
        let bill = ctx
            .db
            .create_manual_bill(
                owner.id,
                &NewManualBill {
                    billing_period_start: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                    billing_period_end: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
                    kwh_total: 150.0,
                    cost_total: 1200.0,
                    provider: "BESCOM".to_string(),
                },
            )
            .unwrap();
        let pk = bill.id.to_string();
        ctx.cache
            .set(CacheSchema::BillDetail, &pk, &serde_json::json!({"stale": true}))
            .await;

        JobQueue::eager(ctx.clone())
            .enqueue(Job::EstimateBill { bill_id: bill.id })
            .await
            .unwrap();

        let cached: Option<serde_json::Value> = ctx.cache.get(CacheSchema::BillDetail, &pk).await;
        assert!(cached.is_none());
        let estimates = ctx.db.list_estimates(bill.id).unwrap();
        assert_eq!(estimates.len(), 1);
        assert_eq!(estimates[0].estimate.estimated_kwh, 150.0);
        assert_eq!(estimates[0].estimate.estimated_cost, 1200.0);
        assert!(ctx.db.get_insight(bill.id).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_estimate_skips_unparsed_bill() {
        let ctx = context(None);
        let owner = user(&ctx.db, "nila");
        ctx.db
            .create_appliance(owner.id, &appliance("Fan", 75, 10.0))
            .unwrap();
        let bill = ctx
            .db
            .create_placeholder_bill(owner.id, "s3://greenspark-bills/x/y.pdf")
            .unwrap();

        let next = tasks::estimate_bill(&ctx, bill.id).await.unwrap();
        assert!(next.is_empty());
        assert!(ctx.db.list_estimates(bill.id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_email_records_message() {
        let ctx = context(None);
        JobQueue::eager(ctx.clone())
            .enqueue(Job::SendEmail {
                to: "asha@example.com".to_string(),
                email: EmailKind::Verification {
                    token: "tok".to_string(),
                },
            })
            .await
            .unwrap();

        let sent = ctx.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Verify Your Email for GreenSpark");
        assert!(sent[0].text.contains("/verify-email?token=tok"));
    }

    #[tokio::test]
    async fn test_worker_queue_runs_jobs() {
        let ctx = context(None);
        let queue = JobQueue::start(ctx.clone(), 2);
        assert!(!queue.is_eager());
        queue
            .enqueue(Job::SendEmail {
                to: "bg@example.com".to_string(),
                email: EmailKind::Welcome {
                    first_name: "Bg".to_string(),
                },
            })
            .await
            .unwrap();

        for _ in 0..50 {
            if !ctx.mailer.sent().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(ctx.mailer.sent().len(), 1);
    }
}
