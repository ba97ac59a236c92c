use clap::Subcommand;

use ascent_core::{BaselineOptions, MonthKey};

use crate::common::Ctx;

#[derive(Subcommand)]
pub enum BaselineAction {
    /// Show the current month's baseline (computing it if needed)
    Show,
    /// Force a recomputation, bypassing the cache
    Refresh,
}

pub fn run(action: BaselineAction) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = Ctx::open()?;
    let month = MonthKey::from_date(ctx.clock.today());
    let analyzer = ctx.analyzer();

    let options = BaselineOptions {
        force_recompute: matches!(action, BaselineAction::Refresh),
        window_days: ctx.config.baseline.window_days,
    };
    let baseline = analyzer.calculate_monthly_baseline(month, &options);
    ctx.repo().save_baseline(&baseline)?;
    println!("{}", serde_json::to_string_pretty(&baseline)?);
    Ok(())
}
