use std::path::PathBuf;

use clap::Parser;
use clap_verbosity_flag::{Verbosity, WarnLevel};

#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
	/// Volume name
	#[arg(short, long, default_value = "rsofs")]
	pub name: String,

	/// Number of inodes (default: one per eight blocks)
	#[arg(short, long)]
	pub inodes: Option<u32>,

	/// Zero-fill every free data cluster
	#[arg(short, long)]
	pub zero: bool,

	/// `-q` silences the progress messages, `-v` raises the log level
	#[command(flatten)]
	pub verbose: Verbosity<WarnLevel>,

	/// Path to the backing device
	pub device: PathBuf,
}
