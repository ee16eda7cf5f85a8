//! sassline: SCSS build, watch and live-reload runner.
//!
//! # Usage
//!
//! ```text
//! sassline            # default: sass + watch
//! sassline sass       # compile ltr + rtl stylesheets once
//! sassline html       # push HTML pages to connected browsers
//! sassline watch      # recompile / reload on change
//! sassline serve      # sass + html + watch, then serve with live reload
//! sassline sass --json
//! ```

mod commands;

use anyhow::Result;
use clap::Parser;

use commands::run::RunArgs;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "sassline",
    version,
    about = "Compile ltr/rtl stylesheets, watch sources and live-reload browsers",
    long_about = None,
)]
struct Cli {
    #[command(flatten)]
    run: RunArgs,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.run.run()
}
