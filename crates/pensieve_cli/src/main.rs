//! Pensieve command-line front end.
//!
//! # Responsibility
//! - Map `<resource> <verb>` commands onto the core request-level API.
//! - Print response bodies as pretty JSON.
//!
//! # Invariants
//! - Exit code is zero only for success statuses.

use clap::{Args, Parser, Subcommand};
use log::error;
use pensieve_core::db::open_db_with_options;
use pensieve_core::{api, init_logging, ApiResponse, CatalogService, CoreConfig};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "pensieve",
    version = pensieve_core::core_version(),
    about = "Track activities, their typed properties and recorded events",
    propagate_version = true
)]
struct Cli {
    /// SQLite database file (overrides the config file)
    #[arg(long, global = true, env = "PENSIEVE_DB")]
    db: Option<PathBuf>,

    /// JSON config file
    #[arg(long, global = true, env = "PENSIEVE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (overrides the config file)
    #[arg(long, global = true, env = "PENSIEVE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Absolute directory for rolling log files
    #[arg(long, global = true, env = "PENSIEVE_LOG_DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Property definitions
    #[command(subcommand)]
    Property(CatalogCommands),

    /// Activity definitions
    #[command(subcommand)]
    Activity(CatalogCommands),

    /// Recorded events
    #[command(subcommand)]
    Event(EventCommands),
}

#[derive(Subcommand)]
enum CatalogCommands {
    /// Create from a JSON body
    Create(BodyArgs),
    /// Fetch by id
    Get(IdArgs),
    /// Fetch by unique name
    GetByName(NameArgs),
    /// List all records
    List,
    /// Partially update from a JSON body; prints the previous record
    Update(UpdateArgs),
    /// Delete by id
    Delete(IdArgs),
}

#[derive(Subcommand)]
enum EventCommands {
    /// Create from a JSON body
    Create(BodyArgs),
    /// Fetch by id
    Get(IdArgs),
    /// List all events
    List,
    /// List events of one activity
    ListByActivity(IdArgs),
    /// Re-validate and update from a JSON body; prints the previous event
    Update(UpdateArgs),
    /// Delete by id
    Delete(IdArgs),
}

#[derive(Args)]
struct BodyArgs {
    /// JSON request body
    body: String,
}

#[derive(Args)]
struct IdArgs {
    id: String,
}

#[derive(Args)]
struct NameArgs {
    name: String,
}

#[derive(Args)]
struct UpdateArgs {
    id: String,
    /// JSON request body
    body: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match resolve_config(&cli) {
        Ok(config) => config,
        Err(message) => {
            eprintln!("error: {message}");
            return ExitCode::FAILURE;
        }
    };

    if let Some(log_dir) = &config.log_dir {
        if let Err(err) = init_logging(&config.log_level, log_dir) {
            eprintln!("warning: logging disabled: {err}");
        }
    }

    let conn = match open_db_with_options(&config.db_path, &config.open_options()) {
        Ok(conn) => conn,
        Err(err) => {
            error!("event=cli_run module=cli status=error error={err}");
            eprintln!("error: cannot open database `{}`: {err}", config.db_path.display());
            return ExitCode::FAILURE;
        }
    };
    let service = match CatalogService::try_new(&conn) {
        Ok(service) => service,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let response = dispatch(&service, cli.command);
    print_response(&response)
}

fn resolve_config(cli: &Cli) -> Result<CoreConfig, String> {
    let mut config = match &cli.config {
        Some(path) => CoreConfig::from_json_file(path).map_err(|err| err.to_string())?,
        None => CoreConfig::default(),
    };
    if let Some(db) = &cli.db {
        config.db_path = db.clone();
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    if let Some(log_dir) = &cli.log_dir {
        config.log_dir = Some(log_dir.clone());
    }
    config.validate().map_err(|err| err.to_string())?;
    Ok(config)
}

fn dispatch(service: &CatalogService<'_>, command: Commands) -> ApiResponse {
    match command {
        Commands::Property(command) => match command {
            CatalogCommands::Create(args) => api::create_property(service, &args.body),
            CatalogCommands::Get(args) => api::get_property(service, &args.id),
            CatalogCommands::GetByName(args) => api::get_property_by_name(service, &args.name),
            CatalogCommands::List => api::list_properties(service),
            CatalogCommands::Update(args) => api::update_property(service, &args.id, &args.body),
            CatalogCommands::Delete(args) => api::delete_property(service, &args.id),
        },
        Commands::Activity(command) => match command {
            CatalogCommands::Create(args) => api::create_activity(service, &args.body),
            CatalogCommands::Get(args) => api::get_activity(service, &args.id),
            CatalogCommands::GetByName(args) => api::get_activity_by_name(service, &args.name),
            CatalogCommands::List => api::list_activities(service),
            CatalogCommands::Update(args) => api::update_activity(service, &args.id, &args.body),
            CatalogCommands::Delete(args) => api::delete_activity(service, &args.id),
        },
        Commands::Event(command) => match command {
            EventCommands::Create(args) => api::create_event(service, &args.body),
            EventCommands::Get(args) => api::get_event(service, &args.id),
            EventCommands::List => api::list_events(service),
            EventCommands::ListByActivity(args) => api::list_events_by_activity(service, &args.id),
            EventCommands::Update(args) => api::update_event(service, &args.id, &args.body),
            EventCommands::Delete(args) => api::delete_event(service, &args.id),
        },
    }
}

fn print_response(response: &ApiResponse) -> ExitCode {
    let rendered = serde_json::to_string_pretty(&response.body)
        .unwrap_or_else(|_| response.body.to_string());
    if response.status.is_success() {
        if !response.body.is_null() {
            println!("{rendered}");
        }
        ExitCode::SUCCESS
    } else {
        eprintln!("{} {rendered}", response.status.http_code());
        ExitCode::FAILURE
    }
}
