//! paritest CLI: the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use paritest_core::model::QuestionType;

mod commands;

#[derive(Parser)]
#[command(name = "paritest", version, about = "Equivalence and feature grader for Java exercises")]
struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate question TOML files and their reference sources
    Validate {
        /// Path to a question file or directory
        #[arg(long)]
        questions: PathBuf,
    },

    /// List the language constructs used by a Java source file
    Features {
        /// Java source file
        #[arg(long)]
        source: PathBuf,

        /// Source shape: klass, method, or snippet (default: try all)
        #[arg(long = "type")]
        question_type: Option<QuestionType>,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Check a submission's constructs against a question's feature policy
    Check {
        /// Question TOML file
        #[arg(long)]
        question: PathBuf,

        /// Submitted Java source file
        #[arg(long)]
        submission: PathBuf,
    },

    /// Print the test cases a question generates
    Cases {
        /// Question TOML file
        #[arg(long)]
        question: PathBuf,

        /// Override the question's seed
        #[arg(long)]
        seed: Option<u64>,

        /// Show at most this many cases
        #[arg(long)]
        limit: Option<usize>,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Pin a seed into a question file
    PinSeed {
        /// Question TOML file
        #[arg(long)]
        question: PathBuf,

        /// Seed to write
        #[arg(long)]
        seed: u64,
    },

    /// Compare two grading reports
    Compare {
        /// Baseline report JSON (looked up in the output directory if not found)
        #[arg(long)]
        baseline: PathBuf,

        /// Current report JSON (looked up in the output directory if not found)
        #[arg(long)]
        current: PathBuf,

        /// Output format: text, json, markdown
        #[arg(long, default_value = "text")]
        format: String,

        /// Exit code 1 if any verdict changed
        #[arg(long)]
        fail_on_change: bool,
    },

    /// Create starter config and an example question
    Init,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(
                "paritest=info"
                    .parse()
                    .unwrap_or_else(|_| tracing_subscriber::filter::LevelFilter::INFO.into()),
            ),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.config;

    let result = match cli.command {
        Commands::Validate { questions } => commands::validate::execute(questions, config),
        Commands::Features {
            source,
            question_type,
            format,
        } => commands::features::execute(source, question_type, format),
        Commands::Check {
            question,
            submission,
        } => commands::check::execute(question, submission),
        Commands::Cases {
            question,
            seed,
            limit,
            format,
        } => commands::cases::execute(question, seed, limit, format, config),
        Commands::PinSeed { question, seed } => commands::pin_seed::execute(question, seed),
        Commands::Compare {
            baseline,
            current,
            format,
            fail_on_change,
        } => commands::compare::execute(baseline, current, format, fail_on_change, config),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
