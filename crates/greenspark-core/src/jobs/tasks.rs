//! Job handlers

use tracing::{info, warn};
use uuid::Uuid;

use super::{Job, TaskContext};
use crate::ai::{mime_from_name, AIBackend};
use crate::cache::CacheSchema;
use crate::email::{render, EmailKind};
use crate::error::{Error, Result};
use crate::estimation::{estimate_bill as run_estimation, EstimationOutcome};
use crate::insights::{build_report, InsightContext};
use crate::models::{Bill, ParseStatus, SourceType};
use crate::storage::sigv4::sha256_hex;

pub(super) async fn send_email(ctx: &TaskContext, to: &str, kind: &EmailKind) -> Result<Vec<Job>> {
    let message = render(kind, to, &ctx.templates);
    let mut attempt = 0;
    loop {
        match ctx.mailer.send(&message).await {
            Ok(()) => {
                info!(to = %to, kind = kind.as_str(), "Email sent");
                return Ok(Vec::new());
            }
            Err(e) if e.is_transient() && attempt < ctx.retry.max_retries => {
                attempt += 1;
                let delay = ctx.retry.delay(attempt);
                warn!(to = %to, attempt, error = %e, "Email failed, retrying in {:?}", delay);
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn download_and_parse(ctx: &TaskContext, bill: &Bill) -> Result<Bill> {
    let uri = bill
        .file_uri
        .as_deref()
        .ok_or_else(|| Error::InvalidData("Bill has no uploaded file".to_string()))?;
    let key = ctx.storage.key_from_uri(uri)?;
    let ai = ctx
        .ai
        .as_ref()
        .ok_or_else(|| Error::Unavailable("No AI backend configured".to_string()))?;

    let data = ctx.storage.get_object(&key).await?;
    let parsed = ai.parse_bill(&data, mime_from_name(&key)).await?;
    parsed.validate()?;

    let checksum = format!("sha256:{}", sha256_hex(&data));
    ctx.db.complete_bill_parse(bill.id, &parsed, &checksum)
}

pub(super) async fn parse_bill(ctx: &TaskContext, bill_id: Uuid) -> Result<Vec<Job>> {
    let Some(bill) = ctx.db.get_bill(bill_id)? else {
        warn!(bill_id = %bill_id, "Bill vanished before parsing");
        return Ok(Vec::new());
    };
    if bill.source_type == SourceType::Manual {
        return Ok(vec![Job::EstimateBill { bill_id }]);
    }

    let result = download_and_parse(ctx, &bill).await;
    ctx.cache
        .invalidate(CacheSchema::BillDetail, &bill_id.to_string())
        .await;

    match result {
        Ok(parsed) => {
            info!(
                bill_id = %bill_id,
                provider = %parsed.provider,
                kwh = parsed.kwh_total,
                "Bill parsed"
            );
            Ok(vec![Job::EstimateBill { bill_id }])
        }
        Err(e) => {
            ctx.db.set_bill_status(bill_id, ParseStatus::Failed)?;
            Err(e)
        }
    }
}

pub(super) async fn estimate_bill(ctx: &TaskContext, bill_id: Uuid) -> Result<Vec<Job>> {
    let Some(bill) = ctx.db.get_bill(bill_id)? else {
        warn!(bill_id = %bill_id, "Bill vanished before estimation");
        return Ok(Vec::new());
    };
    if bill.parse_status != ParseStatus::Success {
        warn!(bill_id = %bill_id, status = bill.parse_status.as_str(), "Skipping estimation of unparsed bill");
        return Ok(Vec::new());
    }

    let appliances = ctx.db.list_user_appliances(bill.user_id)?;
    let next = match run_estimation(&bill, &appliances) {
        EstimationOutcome::Estimated(estimates) => {
            ctx.db.replace_estimates(bill_id, &estimates)?;
            info!(bill_id = %bill_id, count = estimates.len(), "Appliance estimates saved");
            vec![Job::GenerateInsight { bill_id }]
        }
        EstimationOutcome::NoAppliances => {
            info!(bill_id = %bill_id, "User has no appliances, skipping estimation");
            return Ok(Vec::new());
        }
        EstimationOutcome::ZeroUsage => {
            let removed = ctx.db.delete_estimates(bill_id)?;
            warn!(bill_id = %bill_id, removed, "Theoretical consumption is zero, cleared estimates");
            Vec::new()
        }
    };

    ctx.cache
        .invalidate(CacheSchema::BillDetail, &bill_id.to_string())
        .await;
    Ok(next)
}

async fn build_and_store_insight(ctx: &TaskContext, bill: &Bill) -> Result<()> {
    let previous =
        ctx.db
            .previous_successful_bill(bill.user_id, bill.billing_period_start, bill.id)?;
    let estimates = ctx.db.list_estimates(bill.id)?;
    let mut report = build_report(&InsightContext {
        bill,
        previous: previous.as_ref(),
        estimates: &estimates,
    });

    if let Some(ref ai) = ctx.ai {
        match ai.generate_recommendations(&report.ai_context(bill)).await {
            Ok(recommendations) => report = report.with_ai_recommendations(recommendations),
            Err(e) => warn!(bill_id = %bill.id, error = %e, "AI recommendations unavailable, keeping rule output"),
        }
    }

    let data = serde_json::to_value(&report)?;
    ctx.db.complete_insight(bill.id, bill.user_id, &data)?;
    info!(
        bill_id = %bill.id,
        recommendations = report.recommendations.len(),
        source = ?report.source,
        "Insight generated"
    );
    Ok(())
}

pub(super) async fn generate_insight(ctx: &TaskContext, bill_id: Uuid) -> Result<Vec<Job>> {
    let Some(bill) = ctx.db.get_bill(bill_id)? else {
        warn!(bill_id = %bill_id, "Bill vanished before insight generation");
        return Ok(Vec::new());
    };

    ctx.db.create_pending_insight(bill.id, bill.user_id)?;
    let result = if bill.parse_status == ParseStatus::Success {
        build_and_store_insight(ctx, &bill).await
    } else {
        Err(Error::BusinessRule(format!(
            "Bill {} has not been parsed successfully",
            bill_id
        )))
    };
    if result.is_err() {
        ctx.db.fail_insight(bill_id)?;
    }
    ctx.cache
        .invalidate(CacheSchema::InsightReport, &bill_id.to_string())
        .await;
    result.map(|()| Vec::new())
}
