//! CLI entry point for `mailscrub`.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};

use mailscrub::config::Config;
use mailscrub::pipeline::{Collaborators, Disposition, Identity, Pipeline};
use mailscrub::record::{writer::SizeFields, RecordReader, RecordType};

#[derive(Parser)]
#[command(name = "mailscrub", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one record stream through the cleanup pipeline
    Process {
        /// Input record stream
        input: PathBuf,
        /// Queue file to produce
        #[arg(short, long)]
        output: PathBuf,
        /// Configuration file (overrides the default search path)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Dump the records of a queue file or record stream
    Inspect {
        path: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Process {
            input,
            output,
            config,
        } => cmd_process(&input, &output, config.as_deref()),
        Commands::Inspect { path } => cmd_inspect(&path),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("mailscrub: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Map `-v` counts onto an env-filter; `RUST_LOG` wins when set.
fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_process(
    input: &std::path::Path,
    output: &std::path::Path,
    config_path: Option<&std::path::Path>,
) -> anyhow::Result<ExitCode> {
    let config = match config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    let collaborators = Collaborators::from_config(&config, &hostname)?;
    let identity = Identity::generate(hostname);

    if !input.exists() {
        return Err(mailscrub::error::ScrubError::InputNotFound(input.to_path_buf()).into());
    }
    let file = File::open(input).with_context(|| format!("cannot open {}", input.display()))?;
    let mut reader = RecordReader::new(BufReader::new(file), config.limits.line_length_limit);

    let mut pipeline = Pipeline::new(config, collaborators, identity, output)?;
    pipeline.run(&mut reader)?;

    match pipeline.finish()? {
        Disposition::Accepted { path, recipients } => {
            println!("accepted: {} ({recipients} recipients)", path.display());
            Ok(ExitCode::SUCCESS)
        }
        Disposition::Bounced { notice, status } => {
            println!("bounced ({status}): {notice}");
            Ok(ExitCode::FAILURE)
        }
        Disposition::Rejected { status } => {
            println!("rejected: {status}");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn cmd_inspect(path: &std::path::Path) -> anyhow::Result<ExitCode> {
    let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    // Inspection accepts anything the writer could have produced.
    let mut reader = RecordReader::new(BufReader::new(file), 1 << 20);

    loop {
        let offset = reader.offset();
        let Some(record) = reader.next_record()? else {
            break;
        };
        match record.rtype {
            RecordType::Size => match SizeFields::parse(&record.payload) {
                Some(fields) => println!(
                    "{offset:>8}  {:<16} content_length={} content_offset={} recipients={} flags={:#x}",
                    record.rtype,
                    fields.content_length,
                    fields.content_offset,
                    fields.recipient_count,
                    fields.flags
                ),
                None => println!("{offset:>8}  {:<16} (unparseable)", record.rtype),
            },
            _ => {
                let preview: String = record
                    .text()
                    .chars()
                    .take(60)
                    .map(|ch| if ch.is_control() { '.' } else { ch })
                    .collect();
                println!(
                    "{offset:>8}  {:<16} {:>6}  {preview}",
                    record.rtype,
                    record.payload.len()
                );
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}
