#![deny(unsafe_code)]
mod version;

use anyhow::Result;
use clap::Parser;
use clap::builder::styling::{AnsiColor, Effects, Styles};
use env_logger::Env;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;
use zmwalign_lib::engine::BandedEngine;
use zmwalign_lib::pipeline::{self, PipelineOptions};
use zmwalign_lib::validation::validate_min_max;
use zmwalign_lib::zmw_reader::{ChunkSpec, ModuloSpec, ZmwFilter};

/// Custom styles for CLI help output
const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Align subreads to per-well consensus reads
#[derive(Parser, Debug)]
#[command(name = "zmwalign", version = version::VERSION.as_str(), styles = STYLES)]
struct Args {
    /// Input subreads BAM (or consensus queries with --ccs-query)
    subreads: PathBuf,

    /// Input consensus reads BAM
    ccs: PathBuf,

    /// Output BAM; the reference FASTA is written alongside it
    output: PathBuf,

    /// Process only the i-th of N chunks of the well space, e.g. 2/10
    #[arg(long, value_name = "I/N")]
    chunk: Option<ChunkSpec>,

    /// Number of threads to use, 0 means all available
    #[arg(short = 'j', long = "num-threads", value_name = "INT", default_value_t = 0)]
    num_threads: usize,

    /// Smallest well hole number to include
    #[arg(long, value_name = "INT")]
    min_zmw: Option<i32>,

    /// Largest well hole number to include
    #[arg(long, value_name = "INT")]
    max_zmw: Option<i32>,

    /// Keep only wells where hole % M == V, given as M/V
    #[arg(long, value_name = "M/V", hide = true)]
    zmw_modulo: Option<ModuloSpec>,

    /// Treat the first input as consensus queries and skip wells without
    /// indexed reads
    #[arg(long, hide = true)]
    ccs_query: bool,

    /// BGZF compression level for the output BAM
    #[arg(long, value_name = "INT", default_value_t = 6, value_parser = clap::value_parser!(u32).range(1..=9))]
    compression_level: u32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    // Capture full command line BEFORE clap parsing for @PG records
    let command_line = std::env::args().collect::<Vec<_>>().join(" ");

    let args = Args::parse();

    info!("Running zmwalign version {}", version::VERSION.as_str());

    if let Some(min) = args.min_zmw {
        validate_min_max(min, args.max_zmw, "min-zmw", "max-zmw")?;
    }

    let threads = if args.num_threads == 0 {
        std::thread::available_parallelism().map_or(1, std::num::NonZero::get)
    } else {
        args.num_threads
    };

    let options = PipelineOptions {
        input_a: args.subreads,
        input_b: args.ccs,
        output: args.output,
        threads,
        chunk: args.chunk,
        filter: ZmwFilter {
            min_hole: args.min_zmw,
            max_hole: args.max_zmw,
            modulo: args.zmw_modulo,
        },
        ccs_query: args.ccs_query,
        compression_level: args.compression_level,
        version: version::VERSION.clone(),
        command_line,
    };

    let summary = pipeline::run(&options, Arc::new(BandedEngine::new()))?;
    info!(
        "Aligned {} of {} wells ({} records)",
        summary.wells_aligned, summary.wells_total, summary.records_written
    );

    Ok(())
}
