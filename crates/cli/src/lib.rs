pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "merit",
    about = "Merit award approval operator CLI",
    long_about = "Operate the merit approval workflow store: readiness, migrations, demo data, config inspection, and approval queues.",
    after_help = "Examples:\n  merit start\n  merit seed\n  merit pending --approver emp-mgr\n  merit overdue --at 2025-03-01T00:00:00Z"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run startup preflight checks and return structured status output")]
    Start,
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load demo employees, roles, workflows, and awards (safe to re-run)")]
    Seed,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "List approval levels currently waiting on one approver")]
    Pending {
        #[arg(long, help = "Employee id of the approver")]
        approver: String,
    },
    #[command(about = "List active approval levels past their timeout")]
    Overdue {
        #[arg(long, help = "Evaluate at this RFC 3339 instant instead of now")]
        at: Option<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Start => commands::start::run(),
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Pending { approver } => commands::pending::run(&approver),
        Command::Overdue { at } => commands::overdue::run(at.as_deref()),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
