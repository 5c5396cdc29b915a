//! CLI for bitverdict: feed a byte stream to a statistical test and print
//! the verdict.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "bitverdict")]
#[command(about = "bitverdict: streaming statistical tests for random bit generators")]
#[command(version = bitverdict_tests::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every test preset and the names recognised but not implemented
    List,

    /// Run one test over a byte stream, one verdict per trial
    Run {
        /// Preset name (see `bitverdict list`)
        test: String,

        /// Input file, or "-" for stdin (default: stdin)
        #[arg(long, conflicts_with = "os_random")]
        input: Option<String>,

        /// Test this many bytes from the OS random generator instead of a file
        #[arg(long)]
        os_random: Option<u64>,

        /// Significance level (default 0.01)
        #[arg(long)]
        alpha: Option<f64>,

        /// Bytes handed to each `update` call
        #[arg(long, default_value = "65536")]
        chunk: usize,

        /// Byte of each 32-bit stroke to read (otso, rank-6x8)
        #[arg(long)]
        byte_offset: Option<u32>,

        /// Independent trials over consecutive stretches of the input. Whole
        /// bytes a trial reads but does not use start the next trial
        #[arg(long, default_value = "1")]
        trials: usize,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a JSON plan of several tests over the same bytes
    Battery {
        /// Plan file: [{"test": "opso", "alpha": 0.01, "byte_offset": 0}, ...]
        #[arg(long)]
        plan: String,

        /// Input file, or "-" for stdin (default: stdin)
        #[arg(long, conflicts_with = "os_random")]
        input: Option<String>,

        /// Test this many bytes from the OS random generator instead of a file
        #[arg(long)]
        os_random: Option<u64>,

        /// Bytes handed to each `update` call
        #[arg(long, default_value = "65536")]
        chunk: usize,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::List => commands::list::run(),
        Commands::Run {
            test,
            input,
            os_random,
            alpha,
            chunk,
            byte_offset,
            trials,
            json,
        } => commands::run::run(commands::run::RunCommandConfig {
            test: &test,
            input: commands::InputSpec::new(input.as_deref(), os_random),
            alpha,
            chunk,
            byte_offset,
            trials,
            json,
        }),
        Commands::Battery {
            plan,
            input,
            os_random,
            chunk,
            json,
        } => commands::battery::run(
            &plan,
            commands::InputSpec::new(input.as_deref(), os_random),
            chunk,
            json,
        ),
    }
}
