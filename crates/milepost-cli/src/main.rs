#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{Parser, Subcommand};
use milepost_core::config::resolve_config;
use output::{CliError, OutputMode, render_error};
use std::env;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "milepost: projects, roles, milestones, and tickets",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Act as this user (overrides MILEPOST_USER and the user config).
    #[arg(long = "as", global = true, value_name = "LOGIN")]
    actor: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Setup",
        about = "Initialize a milepost store",
        long_about = "Create .milepost/ with a default config and a store seeded with the default roles.",
        after_help = "EXAMPLES:\n    # Initialize and register the first user\n    mp init --user ada"
    )]
    Init(cmd::init::InitArgs),

    #[command(next_help_heading = "Setup", about = "Manage users")]
    User(cmd::user::UserArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Manage the role registry",
        after_help = "EXAMPLES:\n    # Define a role\n    mp --as ada function add Developer\n\n    # Make Owner the only admin role\n    mp --as ada function set-admin Owner"
    )]
    Function(cmd::function::FunctionArgs),

    #[command(
        next_help_heading = "Projects",
        about = "Create, show, update, and destroy projects",
        after_help = "EXAMPLES:\n    # Create a project owned by ada\n    mp --as ada project create apollo\n\n    # Emit machine-readable output\n    mp project show apollo --json"
    )]
    Project(cmd::project::ProjectArgs),

    #[command(next_help_heading = "Projects", about = "Manage project members")]
    Member(cmd::member::MemberArgs),

    #[command(next_help_heading = "Projects", about = "Manage milestones")]
    Milestone(cmd::milestone::MilestoneArgs),

    #[command(next_help_heading = "Tickets", about = "Manage tickets")]
    Ticket(cmd::ticket::TicketArgs),

    #[command(next_help_heading = "Tickets", about = "Inspect tag counts")]
    Tags(cmd::tags::TagsArgs),

    #[command(next_help_heading = "Read", about = "Show a project's audit trail")]
    Events(cmd::events::EventsArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("MILEPOST_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "milepost_core=debug,mp=debug,info"
        } else {
            "milepost_core=warn,mp=warn"
        })
    });

    let format = env::var("MILEPOST_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let root = env::current_dir()?;
    let config = resolve_config(&root, cli.json, cli.actor.as_deref())?;
    let output = OutputMode::from_resolved(&config.resolved_output);
    debug!(root = %root.display(), actor = ?config.resolved_actor, "resolved config");

    let ctx = cmd::Context {
        root,
        config,
        output,
    };

    let command_result = match &cli.command {
        Commands::Init(args) => cmd::init::run_init(args, &ctx),
        Commands::User(args) => cmd::user::run_user(args, &ctx),
        Commands::Function(args) => cmd::function::run_function(args, &ctx),
        Commands::Project(args) => cmd::project::run_project(args, &ctx),
        Commands::Member(args) => cmd::member::run_member(args, &ctx),
        Commands::Milestone(args) => cmd::milestone::run_milestone(args, &ctx),
        Commands::Ticket(args) => cmd::ticket::run_ticket(args, &ctx),
        Commands::Tags(args) => cmd::tags::run_tags(args, &ctx),
        Commands::Events(args) => cmd::events::run_events(args, &ctx),
    };

    if let Err(err) = command_result {
        render_error(output, &CliError::from_anyhow(&err))?;
        std::process::exit(1);
    }
    Ok(())
}
