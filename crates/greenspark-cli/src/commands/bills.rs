//! Bill commands

use anyhow::{bail, Context, Result};
use greenspark_core::{
    jobs::run_chain,
    models::{EstimateView, ParseStatus},
    Job, TaskContext,
};
use uuid::Uuid;

use super::truncate;

/// Run estimation (and the insight it chains to) in this process
pub async fn cmd_bills_estimate(ctx: &TaskContext, bill_id: Uuid) -> Result<Vec<EstimateView>> {
    let bill = ctx
        .db
        .get_bill(bill_id)?
        .with_context(|| format!("Bill {} not found", bill_id))?;
    if bill.parse_status != ParseStatus::Success {
        bail!(
            "Bill {} has parse status '{}'; only parsed bills can be estimated",
            bill_id,
            bill.parse_status.as_str()
        );
    }

    println!(
        "⚡ Estimating {} ({} to {}, {:.1} kWh)...",
        bill.provider, bill.billing_period_start, bill.billing_period_end, bill.kwh_total
    );
    run_chain(ctx, Job::EstimateBill { bill_id }).await;

    let estimates = ctx.db.list_estimates(bill_id)?;
    if estimates.is_empty() {
        println!("   No estimates produced (no appliances with wattage, or zero usage).");
        return Ok(estimates);
    }

    println!();
    println!("   {:<28} {:>10} {:>12}", "APPLIANCE", "KWH", "COST");
    println!("   ─────────────────────────────────────────────────────");
    for view in &estimates {
        println!(
            "   {:<28} {:>10.2} {:>12.2}",
            truncate(&view.appliance_name, 28),
            view.estimate.estimated_kwh,
            view.estimate.estimated_cost
        );
    }
    println!();
    Ok(estimates)
}
