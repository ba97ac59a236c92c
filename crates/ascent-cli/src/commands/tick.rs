use crate::common::Ctx;

pub fn run(force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = Ctx::open()?;
    let lifecycle = ctx.lifecycle();

    let status = if force {
        lifecycle.force_tick()
    } else {
        lifecycle.startup_check();
        lifecycle.tick()
    };
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
