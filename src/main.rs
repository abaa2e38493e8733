//! Fixed-Point MAC Golden Model - Command Line Interface
//!
//! Usage:
//!   mac-oracle run [OPTIONS]      Check one seeded run against a behavioral device
//!   mac-oracle sweep [OPTIONS]    Check many seeds in parallel
//!   mac-oracle info [OPTIONS]     Show derived widths and latencies
//!   mac-oracle config [OPTIONS]   Write a configuration file

use std::fmt::Display;

use clap::{Args, Parser, Subcommand};
use colored::*;
use serde::Serialize;

use mac_oracle::prelude::*;

#[derive(Parser)]
#[command(name = "mac-oracle")]
#[command(about = "Golden model for a pipelined fixed-point MAC convolution block")]
#[command(version)]
struct Cli {
    /// Output results in JSON format (for machine parsing)
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConfigArgs {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Use the small preset instead of the defaults
    #[arg(long, conflicts_with = "config")]
    small: bool,
}

#[derive(Args)]
struct StimulusArgs {
    /// Block to check (mac, slice, engine)
    #[arg(short, long, default_value = "engine")]
    block: Block,

    /// Number of valid beats
    #[arg(long, default_value = "64")]
    beats: usize,

    /// Probability that a beat follows without a gap (1.0 = contiguous)
    #[arg(short = 'p', long, default_value = "1.0")]
    valid_probability: f64,

    /// Assert reset just before this beat
    #[arg(long)]
    reset_at: Option<usize>,
}

impl StimulusArgs {
    fn scenario(&self, seed: u64, fault: Option<OutputFault>) -> Scenario {
        Scenario {
            block: self.block,
            seed,
            stimulus: StimulusConfig {
                beats: self.beats,
                valid_probability: self.valid_probability,
                reset_at: self.reset_at,
            },
            fault,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Check one seeded run against a behavioral device
    Run {
        #[command(flatten)]
        stimulus: StimulusArgs,

        #[command(flatten)]
        config: ConfigArgs,

        /// Random seed
        #[arg(short, long, default_value = "0")]
        seed: u64,

        /// Corrupt the device output on this cycle
        #[arg(long)]
        fault_cycle: Option<u64>,

        /// Bits flipped by the injected fault
        #[arg(long, default_value = "1")]
        fault_flip: u128,
    },

    /// Check many seeds in parallel
    Sweep {
        #[command(flatten)]
        stimulus: StimulusArgs,

        #[command(flatten)]
        config: ConfigArgs,

        /// Number of seeds
        #[arg(short = 'n', long, default_value = "16")]
        seeds: u64,

        /// First seed
        #[arg(long, default_value = "0")]
        first_seed: u64,
    },

    /// Show derived widths and pipeline latencies
    Info {
        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Write a configuration file
    Config {
        /// Output path
        #[arg(short, long, default_value = "mac-oracle.toml")]
        output: String,

        /// Write the small preset
        #[arg(long)]
        small: bool,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let json_output = cli.json;

    match cli.command {
        Commands::Run { stimulus, config, seed, fault_cycle, fault_flip } => {
            let fault = fault_cycle.map(|cycle| OutputFault { cycle, flip: fault_flip });
            run_once(&stimulus.scenario(seed, fault), &config, json_output);
        }
        Commands::Sweep { stimulus, config, seeds, first_seed } => {
            let seeds: Vec<u64> = (first_seed..first_seed + seeds).collect();
            run_sweep(&stimulus.scenario(first_seed, None), &config, &seeds, json_output);
        }
        Commands::Info { config } => {
            show_info(&config, json_output);
        }
        Commands::Config { output, small } => {
            write_config(&output, small, json_output);
        }
    }
}

fn fail(message: impl Display, json_output: bool) -> ! {
    if json_output {
        eprintln!("{}", serde_json::json!({ "error": message.to_string() }));
    } else {
        eprintln!("{}: {}", "Error".red(), message);
    }
    std::process::exit(1);
}

fn print_json(value: &impl Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(err) => fail(err, true),
    }
}

fn banner(title: &str) {
    println!("{}", "╔══════════════════════════════════════════════════════════════╗".cyan());
    println!("{}", format!("║ {:<60} ║", title).cyan());
    println!("{}", "╚══════════════════════════════════════════════════════════════╝".cyan());
    println!();
}

fn load_config(args: &ConfigArgs, json_output: bool) -> OracleConfig {
    match (&args.config, args.small) {
        (Some(path), _) => OracleConfig::load(path).unwrap_or_else(|err| fail(err, json_output)),
        (None, true) => OracleConfig::small(),
        (None, false) => OracleConfig::default(),
    }
}

fn run_once(scenario: &Scenario, args: &ConfigArgs, json_output: bool) {
    let config = load_config(args, json_output);
    if !json_output {
        banner("Golden Model Check");
        println!("Configuration:");
        println!("  • Block: {}", scenario.block);
        println!("  • Seed: {}", scenario.seed);
        println!("  • Beats: {}", scenario.stimulus.beats);
        println!("  • Valid probability: {}", scenario.stimulus.valid_probability);
        if let Some(fault) = &scenario.fault {
            println!("  • Fault: cycle {}, flip {:#x}", fault.cycle, fault.flip);
        }
        println!();
        println!("{}", "Running checker...".yellow());
    }

    let start = std::time::Instant::now();
    let report = run(&config, scenario).unwrap_or_else(|err| fail(err, json_output));
    let elapsed = start.elapsed();

    if json_output {
        print_json(&report);
    } else {
        if report.passed {
            println!("{}", "Check passed!".green());
        } else {
            println!("{}", "Check failed!".red());
        }
        println!();
        println!("{}", report);
        println!("Wall-clock time: {:.3}s", elapsed.as_secs_f64());
    }
    if !report.passed {
        std::process::exit(1);
    }
}

fn run_sweep(scenario: &Scenario, args: &ConfigArgs, seeds: &[u64], json_output: bool) {
    let config = load_config(args, json_output);
    if !json_output {
        banner("Seed Sweep");
        println!("Checking {} seeds of {}...", seeds.len(), scenario.block);
        println!();
    }

    let report = sweep(&config, scenario, seeds).unwrap_or_else(|err| fail(err, json_output));

    if json_output {
        print_json(&report);
    } else {
        println!("{:^10} {:^10} {:^12} {:^12} {:^8}", "Seed", "Beats", "Cycles", "Non-zero", "Result");
        println!("──────────────────────────────────────────────────────");
        for r in &report.runs {
            let verdict = if r.passed { "PASS".green() } else { "FAIL".red() };
            println!(
                "{:^10} {:^10} {:^12} {:^12} {:^8}",
                r.seed, r.beats, r.cycles, r.stats.nonzero_matches, verdict
            );
        }
        println!();
        let failing = report.failing_seeds();
        if failing.is_empty() {
            println!("{}", format!("All {} seeds passed", report.runs.len()).green());
        } else {
            println!("{} {:?}", "Failing seeds:".red(), failing);
            for r in report.runs.iter().filter(|r| !r.passed) {
                if let Some(failure) = &r.failure {
                    println!("  seed {}: {}", r.seed, failure);
                }
            }
        }
    }
    if !report.passed() {
        std::process::exit(1);
    }
}

/// JSON output structure for block information
#[derive(Serialize)]
struct BlockInfo {
    block: Block,
    pipeline_depth: usize,
    product_width: u32,
    result_width: u32,
    output_width: u32,
    input_bus_width: u32,
}

fn show_info(args: &ConfigArgs, json_output: bool) {
    let config = load_config(args, json_output);
    let (m, s, e) = (&config.mac, &config.slice, &config.engine);
    let blocks = [
        BlockInfo {
            block: Block::Mac,
            pipeline_depth: m.pipeline_depth,
            product_width: m.product_width(),
            result_width: m.result_width(),
            output_width: m.result_width(),
            input_bus_width: m.m1_width + m.m2_width + m.result_width(),
        },
        BlockInfo {
            block: Block::Slice,
            pipeline_depth: s.pipeline_depth,
            product_width: s.product_width(),
            result_width: s.result_width(),
            output_width: s.result_width(),
            input_bus_width: s.image_bus_width(),
        },
        BlockInfo {
            block: Block::Engine,
            pipeline_depth: e.pipeline_depth,
            product_width: e.product_width(),
            result_width: e.result_width(),
            output_width: e.word_width(),
            input_bus_width: e.image_bus_width(),
        },
    ];

    if json_output {
        print_json(&blocks);
        return;
    }

    banner("Block Information");
    println!("{:^10} {:^8} {:^10} {:^10} {:^10} {:^10}", "Block", "Depth", "Product", "Result", "Output", "Input Bus");
    println!("──────────────────────────────────────────────────────────────");
    for b in &blocks {
        println!(
            "{:^10} {:^8} {:^10} {:^10} {:^10} {:^10}",
            b.block.to_string(),
            b.pipeline_depth,
            b.product_width,
            b.result_width,
            b.output_width,
            b.input_bus_width
        );
    }
    println!();
    println!("Engine:");
    println!("  • Kernel: {}x{} ({} weights)", e.kernel_width, e.kernel_height, e.kernel_count());
    println!("  • Channels: {}", e.image_count);
    println!("  • Shift bus: {} bits (max shift {})", e.shift_width, e.max_shift());
    println!("Slice:");
    println!("  • MACs: {}, offset {}", s.mac_count, s.offset);
}

fn write_config(path: &str, small: bool, json_output: bool) {
    let config = if small { OracleConfig::small() } else { OracleConfig::default() };
    if let Err(err) = config.save(path) {
        fail(err, json_output);
    }
    if json_output {
        print_json(&serde_json::json!({ "written": path }));
    } else {
        println!("{} {}", "Configuration written to".green(), path);
    }
}
