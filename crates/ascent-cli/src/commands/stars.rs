use clap::Subcommand;

use crate::common::{parse_category, Ctx};

#[derive(Subcommand)]
pub enum StarsAction {
    /// Show all category ratings and their history
    Show,
    /// Manually set a category's star level (1-5)
    Reset {
        /// habits | journal | goals | consistency
        category: String,
        /// Star level 1-5
        stars: u8,
    },
}

pub fn run(action: StarsAction) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = Ctx::open()?;
    let engine = ctx.stars();

    match action {
        StarsAction::Show => {
            let ratings = engine.ratings()?;
            println!("{}", serde_json::to_string_pretty(&ratings)?);
        }
        StarsAction::Reset { category, stars } => {
            let category = parse_category(&category)?;
            let entry = engine.reset_rating(category, stars)?;
            eprintln!(
                "{}: {} -> {} stars",
                category, entry.previous_stars, entry.new_stars
            );
        }
    }
    Ok(())
}
