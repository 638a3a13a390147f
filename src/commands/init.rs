// ABOUTME: Init command implementation.
// ABOUTME: Scaffolds slotctl.yml in the current directory.

use slotctl::config::{self, CONFIG_FILENAME};
use slotctl::error::Result;
use slotctl::output::Output;
use std::env;

pub fn init(service: Option<&str>, image: Option<&str>, force: bool, output: &Output) -> Result<()> {
    let cwd = env::current_dir()?;
    config::init_config(&cwd, service, image, force)?;
    output.success(&format!("Wrote {}", cwd.join(CONFIG_FILENAME).display()));
    Ok(())
}
