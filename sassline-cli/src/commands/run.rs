//! `sassline [TASK]`: run a task and its prerequisites in the current directory.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use sassline_core::graph::DEFAULT;
use sassline_devserver::{start_blocking, RunReport};

/// Arguments for `sassline`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Task to run: sass, html, watch, serve or default.
    #[arg(default_value = DEFAULT)]
    pub task: String,

    /// Print the run report as JSON instead of the summary lines.
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    pub fn run(self) -> Result<()> {
        let root: PathBuf =
            std::env::current_dir().context("could not determine current directory")?;

        let report = start_blocking(&root, &self.task)
            .with_context(|| format!("task '{}' failed", self.task))?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_report(&report);
        }
        Ok(())
    }
}

fn print_report(report: &RunReport) {
    for task in &report.tasks {
        println!(
            "{} '{}' finished in {} ms",
            "✓".green(),
            task.name,
            task.duration_ms
        );
    }
}
