use serde::Serialize;

use ascent_core::{ChallengeLifecycleStatus, MonthlyChallenge, MonthlyChallengeProgress};

use crate::common::Ctx;

#[derive(Serialize)]
struct StatusReport {
    lifecycle: ChallengeLifecycleStatus,
    active_challenge: Option<MonthlyChallenge>,
    progress: Option<MonthlyChallengeProgress>,
}

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let ctx = Ctx::open()?;
    let repo = ctx.repo();

    let lifecycle = ctx.lifecycle().get_lifecycle_status();
    let active_challenge = repo.active_challenges()?.into_iter().next();
    let progress = match &active_challenge {
        Some(challenge) => repo.progress(&challenge.id)?,
        None => None,
    };

    let report = StatusReport {
        lifecycle,
        active_challenge,
        progress,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
