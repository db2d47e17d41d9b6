use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use afstar_core::dump::unix_time;
use afstar_core::{ConvertConfig, ConvertStage, Converter, DumpInventory};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{ArgAction, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "afstar", version, about = "Convert AFS volume dumps to tar archives")]
struct Cli {
	/// Log every archived path; repeat for byte counts
	#[arg(short, long, action = ArgAction::Count, global = true)]
	verbose: u8,
	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// Convert a volume dump into a tar archive
	Create {
		/// Volume dump to read (stdin if omitted)
		dump: Option<PathBuf>,
		/// Archive to write (stdout if omitted)
		#[arg(short = 'f', long = "file")]
		archive: Option<PathBuf>,
		/// Add a script restoring the AFS ACL to every directory
		#[arg(short, long)]
		acls: bool,
		/// Treat the 64-bit file size tag as malformed input
		#[arg(long)]
		no_large_files: bool,
		/// Print the conversion summary as JSON on stderr
		#[arg(long)]
		json: bool,
	},
	/// Show the headers and contents of a volume dump
	Info {
		dump: PathBuf,
		#[arg(long)]
		no_large_files: bool,
		#[arg(long)]
		json: bool,
	},
	/// Restore a dump from a tar archive (not implemented)
	Extract,
}

fn main() -> Result<()> {
	let cli = Cli::parse();
	init_tracing(cli.verbose);

	match cli.command {
		Commands::Create { dump, archive, acls, no_large_files, json } => {
			let config = ConvertConfig {
				verbose: cli.verbose,
				acl_scripts: acls,
				large_files: !no_large_files,
			};
			create(dump.as_deref(), archive.as_deref(), config, json)?;
		}
		Commands::Info { dump, no_large_files, json } => {
			info(&dump, !no_large_files, json)?;
		}
		Commands::Extract => {
			eprintln!("extract not implemented yet");
			std::process::exit(1);
		}
	}
	Ok(())
}

/// Logs go to stderr since the archive may be on stdout
fn init_tracing(verbose: u8) {
	let default_level = if verbose > 0 { "info" } else { "warn" };
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(io::stderr)
		.with_target(false)
		.init();
}

fn create(dump: Option<&Path>, archive: Option<&Path>, config: ConvertConfig, json: bool) -> Result<()> {
	if archive.is_none() && atty::is(atty::Stream::Stdout) {
		bail!("refusing to write a tar archive to a terminal, use -f or redirect stdout");
	}

	let (input, input_len): (Box<dyn Read>, Option<u64>) = match dump {
		Some(path) => {
			let file = File::open(path)
				.with_context(|| format!("Failed to open dump {}", path.display()))?;
			let len = file.metadata().ok().map(|m| m.len());
			(Box::new(BufReader::new(file)), len)
		}
		None => (Box::new(BufReader::new(io::stdin().lock())), None),
	};

	let output: Box<dyn Write> = match archive {
		Some(path) => {
			let file = File::create(path)
				.with_context(|| format!("Failed to create archive {}", path.display()))?;
			Box::new(BufWriter::new(file))
		}
		None => Box::new(BufWriter::new(io::stdout().lock())),
	};

	// The bar would interleave with per-entry logging
	let progress = match input_len {
		Some(len) if config.verbose == 0 && atty::is(atty::Stream::Stderr) => Some(progress_bar(len)),
		_ => None,
	};

	tracing::debug!("Converting with {:?}", config);
	let mut converter = Converter::new(output, config);
	if let Some(bar) = progress.clone() {
		converter.set_progress_callback(move |p| {
			bar.set_position(p.bytes_read);
			match p.stage {
				ConvertStage::Volumes => bar.set_message(format!("{} vnodes", p.vnodes)),
				ConvertStage::Orphans => bar.set_message(format!("resolving {} orphans", p.pending_orphans)),
				ConvertStage::Complete => bar.finish_and_clear(),
			}
		});
	}

	let result = converter.convert(input);
	if let Some(bar) = &progress {
		bar.finish_and_clear();
	}

	let source = dump.map(|p| p.display().to_string()).unwrap_or_else(|| "stdin".to_string());
	let summary = result.with_context(|| format!("Failed to convert {}", source))?;

	eprintln!("Total bytes written: {}", summary.bytes_written);
	if json {
		eprintln!("{}", serde_json::to_string_pretty(&summary)?);
	} else if !summary.orphans_dropped.is_empty() {
		eprintln!(
			"⚠️  {} vnodes could not be placed and are missing from the archive",
			summary.orphans_dropped.len()
		);
	}
	Ok(())
}

fn progress_bar(len: u64) -> ProgressBar {
	let bar = ProgressBar::new(len);
	let style = ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bytes}/{total_bytes} {msg}")
		.unwrap_or_else(|_| ProgressStyle::default_spinner());
	bar.set_style(style);
	bar.enable_steady_tick(Duration::from_millis(120));
	bar
}

fn info(dump: &Path, large_files: bool, json: bool) -> Result<()> {
	let inventory = afstar_core::inspect_file(dump, large_files)?;

	if json {
		println!("{}", serde_json::to_string_pretty(&inventory)?);
	} else {
		print_inventory(&inventory);
	}
	Ok(())
}

fn print_inventory(inventory: &DumpInventory) {
	let header = &inventory.header;
	println!("📋 Dump of volume {} ({})", header.volume_name, header.volume_id);
	for range in &header.dump_times {
		println!("   Covers: {} to {}", format_time(range.from_time()), format_time(range.to_time()));
	}

	for volume in &inventory.volumes {
		let vh = &volume.header;
		println!();
		println!("📁 Volume {} ({})", vh.volume_name, vh.volume_id);
		println!("   Created:  {}", format_time(unix_time(vh.creation_date)));
		println!("   Updated:  {}", format_time(unix_time(vh.update_date)));
		println!("   Backup:   {}", format_time(unix_time(vh.backup_date)));
		println!("   Quota:    {} KB, {} KB used", vh.max_quota, vh.disk_used);
		println!(
			"   Vnodes:   {} directories, {} files, {} symlinks, {} other",
			volume.directories, volume.files, volume.symlinks, volume.other_vnodes
		);
		println!("   Data:     {} bytes", volume.data_bytes);
	}

	println!();
	println!("💾 Read {} bytes", inventory.bytes_read);
	if inventory.short_reads > 0 {
		println!("⚠️  {} short reads, the dump is truncated or damaged", inventory.short_reads);
	}
}

fn format_time(time: Option<DateTime<Utc>>) -> String {
	time.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
		.unwrap_or_else(|| "never".to_string())
}
