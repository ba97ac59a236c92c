use clap::Subcommand;

use ascent_core::ActivityLedger;

use crate::common::{parse_source, Ctx};

#[derive(Subcommand)]
pub enum ProgressAction {
    /// Show the active challenge's progress
    Show,
    /// Feed one activity event into the tracker
    Record {
        /// Event source: habit | journal | goal | goal_completion | other
        source: String,
        /// Signed XP amount (negative = undo)
        amount: i64,
        /// Optional source record id
        #[arg(long)]
        source_id: Option<String>,
    },
}

pub fn run(action: ProgressAction) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = Ctx::open()?;

    match action {
        ProgressAction::Show => {
            let repo = ctx.repo();
            match repo.active_challenges()?.into_iter().next() {
                Some(challenge) => {
                    let progress = repo.progress(&challenge.id)?;
                    println!("{}", serde_json::to_string_pretty(&progress)?);
                }
                None => eprintln!("No active challenge"),
            }
        }
        ProgressAction::Record {
            source,
            amount,
            source_id,
        } => {
            let source = parse_source(&source)?;
            // Record in the ledger first: it is the source of truth the
            // daily feature analysis reads from.
            ctx.ledger()
                .add_xp(amount, source, source_id.as_deref(), source.as_str())?;
            ctx.tracker().on_activity(source, amount, source_id.as_deref());
            eprintln!("Recorded {} ({amount:+} XP)", source.as_str());
        }
    }
    Ok(())
}
