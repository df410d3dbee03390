//! Region detection command handler

use anyhow::Result;

use crate::cli::SessionArgs;
use crate::config::Config;

use super::open_session;

/// Handle `regions` command
pub fn handle(args: &SessionArgs) -> Result<()> {
    let config = Config::load()?;
    let session = open_session(args, &config)?;

    println!("Template: {}", session.template().id);
    println!("Header shift: {:#x}", session.header_shift());

    match session.regions() {
        [] => println!("Regions: none declared"),
        [active, rest @ ..] => {
            println!("Region: {}", active);
            if !rest.is_empty() {
                println!("Also matches: {}", rest.join(", "));
            }
        }
    }
    Ok(())
}
