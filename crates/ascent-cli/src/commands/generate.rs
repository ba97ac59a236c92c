use ascent_core::{BaselineOptions, MonthKey};

use crate::common::Ctx;

pub fn run(month: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = Ctx::open()?;
    let month = match month {
        Some(raw) => raw.parse::<MonthKey>()?,
        None => MonthKey::from_date(ctx.clock.today()),
    };

    let analyzer = ctx.analyzer();
    let options = BaselineOptions {
        window_days: ctx.config.baseline.window_days,
        ..Default::default()
    };
    let baseline = analyzer.calculate_monthly_baseline(month, &options);
    ctx.repo().save_baseline(&baseline)?;

    let generator = ctx.generator();
    let context = generator.context_for_month(month, Some(baseline))?;
    let outcome = generator.generate(&context)?;

    if outcome.newly_created {
        eprintln!(
            "Generated {} challenge '{}' for {} ({} requirements, {} XP)",
            outcome.challenge.category,
            outcome.challenge.title,
            outcome.challenge.month,
            outcome.challenge.requirements.len(),
            outcome.challenge.xp_reward,
        );
    } else {
        eprintln!("Challenge for {} already exists", outcome.challenge.month);
    }
    for warning in &outcome.metadata.warnings {
        eprintln!("warning: {warning}");
    }
    println!("{}", serde_json::to_string_pretty(&outcome.challenge)?);
    Ok(())
}
