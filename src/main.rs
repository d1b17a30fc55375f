use std::io;

use anyhow::Result;
use clap::Parser;

use sndframe::cli::Cli;
use sndframe::{logging, Library};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging (early)
    logging::init(cli.log_level(), cli.log_file.as_deref())?;

    let library = Library::global();
    log::info!("sndframe {} using {}", env!("CARGO_PKG_VERSION"), library.version());
    log::debug!("Command line: {:?}", cli);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    cli.run(library, &mut out)
}
