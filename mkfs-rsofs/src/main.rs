use anyhow::{Context, Result};
use clap::Parser;
use rsofs::{format_path, FormatOpts};

use crate::cli::Cli;

mod cli;

fn main() -> Result<()> {
	let cli = Cli::parse();

	env_logger::builder()
		.filter_level(cli.verbose.log_level_filter())
		.init();

	let opts = FormatOpts {
		name:   cli.name.clone(),
		itotal: cli.inodes,
		zero:   cli.zero,
	};
	let quiet = cli.verbose.log_level_filter() < log::LevelFilter::Warn;

	if !quiet {
		println!(
			"Installing an rsofs file system in {} ...",
			cli.device.display()
		);
	}

	format_path(&cli.device, &opts)
		.with_context(|| format!("failed to format {}", cli.device.display()))?;

	if !quiet {
		println!("Formatting concluded.");
	}
	Ok(())
}
