//! Build script rendering the `coap-matcher(1)` manual page.
//!
//! The page is generated from the clap definition of the demo binary's
//! options and written to `target/generated-man/coap-matcher.1`.

use std::{fs, path::Path};

use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli.rs"]
mod cli;

const MAN_DIR: &str = "target/generated-man";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=src/cli.rs");

    let command = cli::Cli::command();
    let page = format!("{}.1", command.get_name());
    let mut rendered = Vec::new();
    Man::new(command).render(&mut rendered)?;

    let dir = Path::new(MAN_DIR);
    fs::create_dir_all(dir)?;
    fs::write(dir.join(page), rendered)?;
    Ok(())
}
