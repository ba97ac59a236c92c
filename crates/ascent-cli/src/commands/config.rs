use clap::Subcommand;

use ascent_core::AscentConfig;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Print the config file path
    Path,
    /// Write the default configuration to disk
    Init,
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Show => {
            let config = AscentConfig::load()?;
            println!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Path => {
            println!("{}", AscentConfig::path()?.display());
        }
        ConfigAction::Init => {
            let config = AscentConfig::load()?;
            config.save()?;
            eprintln!("Wrote {}", AscentConfig::path()?.display());
        }
    }
    Ok(())
}
