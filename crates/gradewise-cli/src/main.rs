//! gradewise CLI: the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "gradewise", version, about = "Exam grading engine and grading quality monitor")]
struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Grade answer sheets against an answer key
    Grade {
        /// Answer key file (.toml or .json)
        #[arg(long)]
        reference: PathBuf,

        /// Answer sheet file or directory of answer sheets
        #[arg(long)]
        answers: PathBuf,

        /// Max sheets graded concurrently (default: from config)
        #[arg(long)]
        parallelism: Option<usize>,

        /// Output directory (default: from config)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Output format: json, html, all, none
        #[arg(long, default_value = "json")]
        format: String,

        /// Append every graded question to the grading record log
        #[arg(long)]
        record: bool,

        /// Grader id used for logged records
        #[arg(long, default_value = "gradewise")]
        grader: String,
    },

    /// Validate answer key files
    Validate {
        /// Answer key file or directory
        #[arg(long)]
        reference: PathBuf,
    },

    /// Manage grading rules
    Rules {
        #[command(subcommand)]
        action: RulesAction,
    },

    /// Grading quality analysis over the record log
    Quality {
        #[command(subcommand)]
        action: QualityAction,
    },

    /// Compare two quality reports
    Compare {
        /// Baseline report JSON
        #[arg(long)]
        baseline: PathBuf,

        /// Current report JSON
        #[arg(long)]
        current: PathBuf,

        /// Regression threshold
        #[arg(long, default_value = "0.05")]
        threshold: f64,

        /// Exit code 1 if regressions found
        #[arg(long)]
        fail_on_regression: bool,

        /// Output format: text, json, markdown
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Create starter config and an example exam
    Init,
}

#[derive(Subcommand)]
enum RulesAction {
    /// List every registered rule
    List,

    /// Print one rule as JSON
    Show {
        /// Question type, e.g. short_answer
        question_type: String,
    },

    /// Check a rule file without importing it
    Validate {
        /// Rule file (.toml or .json)
        file: PathBuf,
    },

    /// Export every rule to a JSON file
    Export {
        /// Destination file
        #[arg(long)]
        output: PathBuf,
    },

    /// Import rules from a rule file
    Import {
        /// Rule file (.toml or .json)
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum QualityAction {
    /// Log one grading decision
    Record {
        /// Exam id
        #[arg(long)]
        exam: String,

        /// Question id
        #[arg(long)]
        question: String,

        /// Student id
        #[arg(long)]
        student: String,

        /// Grader id
        #[arg(long)]
        grader: String,

        /// Awarded score
        #[arg(long, allow_hyphen_values = true)]
        score: f64,

        /// Maximum score of the question
        #[arg(long)]
        max_score: f64,

        /// Seconds spent grading
        #[arg(long)]
        duration: Option<f64>,

        /// Grader confidence in [0, 1]
        #[arg(long)]
        confidence: Option<f64>,

        /// Free-form grader comments
        #[arg(long)]
        comments: Option<String>,
    },

    /// Generate a quality report
    Report {
        /// Restrict to one exam
        #[arg(long)]
        exam: Option<String>,

        /// Output format: text, json, markdown, html
        #[arg(long, default_value = "text")]
        format: String,

        /// Write the report to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Analyze one grader
    Grader {
        /// Grader id
        grader_id: String,

        /// Only consider the last N days
        #[arg(long)]
        days: Option<u32>,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Rank every grader by overall quality
    Graders {
        /// Restrict to one exam
        #[arg(long)]
        exam: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("gradewise=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.config;

    let result = match cli.command {
        Commands::Grade {
            reference,
            answers,
            parallelism,
            output,
            format,
            record,
            grader,
        } => {
            commands::grade::execute(commands::grade::GradeArgs {
                reference,
                answers,
                parallelism,
                output,
                format,
                record,
                grader,
                config,
            })
            .await
        }
        Commands::Validate { reference } => commands::validate::execute(reference, config),
        Commands::Rules { action } => match action {
            RulesAction::List => commands::rules::list(config),
            RulesAction::Show { question_type } => commands::rules::show(&question_type, config),
            RulesAction::Validate { file } => commands::rules::validate(&file),
            RulesAction::Export { output } => commands::rules::export(&output, config),
            RulesAction::Import { file } => commands::rules::import(&file, config),
        },
        Commands::Quality { action } => match action {
            QualityAction::Record {
                exam,
                question,
                student,
                grader,
                score,
                max_score,
                duration,
                confidence,
                comments,
            } => commands::quality::record(
                commands::quality::RecordArgs {
                    exam,
                    question,
                    student,
                    grader,
                    score,
                    max_score,
                    duration,
                    confidence,
                    comments,
                },
                config,
            ),
            QualityAction::Report {
                exam,
                format,
                output,
            } => commands::quality::report(exam, format, output, config),
            QualityAction::Grader {
                grader_id,
                days,
                format,
            } => commands::quality::grader(&grader_id, days, format, config),
            QualityAction::Graders { exam } => commands::quality::graders(exam, config),
        },
        Commands::Compare {
            baseline,
            current,
            threshold,
            fail_on_regression,
            format,
        } => commands::compare::execute(baseline, current, threshold, fail_on_regression, format),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
