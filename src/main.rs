//! testops CLI - decode test reports and upload them to a test run.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, NaiveTime};
use clap::{ArgGroup, Args, Parser, Subcommand};
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use testops::client::{EnvironmentCreate, HttpClient, MilestoneCreate, MilestoneStatus, RunWindow};
use testops::config::{self, Config};
use testops::manage::{self, FieldSelection, FilterFramework, ProjectAdmin, RunSelection};
use testops::parser::{ParserOptions, ReportFormat, StepLevel, build_parser};
use testops::report::ConsoleReporter;
use testops::upload::{
    ExtensionFilter, RunLifecycle, RunSpec, RunTarget, StatusMap, UploadParams, Uploader,
};

const ENV_FILE: &str = "qase.env";
const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Parser)]
#[command(name = "testops")]
#[command(about = "Decode test reports and upload them to a test-management service", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "testops.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a report and upload the results
    Upload(UploadArgs),

    /// Decode a report and print the canonical results as JSON
    Parse {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Validate configuration file
    Validate,

    /// Manage test runs
    Run {
        #[command(subcommand)]
        command: RunCommands,
    },

    /// Manage environments
    Env {
        #[command(subcommand)]
        command: EnvCommands,
    },

    /// Manage milestones
    Milestone {
        #[command(subcommand)]
        command: MilestoneCommands,
    },

    /// Manage fields
    Field {
        #[command(subcommand)]
        command: FieldCommands,
    },

    /// Build a test filter from the cases of a plan
    Filter(FilterArgs),
}

#[derive(Subcommand)]
enum RunCommands {
    /// Create a run and write its id to an env file
    Create(RunCreateArgs),

    /// Complete a run
    Complete {
        /// Run id
        #[arg(long)]
        id: i64,

        #[command(flatten)]
        api: ApiArgs,
    },

    /// Delete runs by id, or every run within a date range
    Delete(RunDeleteArgs),
}

#[derive(Subcommand)]
enum EnvCommands {
    /// Create an environment unless one with the slug exists
    Create(EnvCreateArgs),
}

#[derive(Subcommand)]
enum MilestoneCommands {
    /// Create a milestone unless one with the title exists
    Create(MilestoneCreateArgs),
}

#[derive(Subcommand)]
enum FieldCommands {
    /// Manage custom fields
    Custom {
        #[command(subcommand)]
        command: CustomFieldCommands,
    },
}

#[derive(Subcommand)]
enum CustomFieldCommands {
    /// Delete one custom field or all of them
    Delete(FieldDeleteArgs),
}

#[derive(Args)]
struct ApiArgs {
    /// Project code (overrides config)
    #[arg(long, env = "TESTOPS_PROJECT")]
    project: Option<String>,

    /// API token (overrides config)
    #[arg(long, env = "TESTOPS_TOKEN", hide_env_values = true)]
    token: Option<String>,
}

#[derive(Args)]
struct SourceArgs {
    /// Report file or directory
    #[arg(short, long)]
    path: String,

    /// Report format
    #[arg(short, long, value_enum)]
    format: ReportFormat,

    /// Which xcresult activities become steps
    #[arg(long, value_enum)]
    steps: Option<StepLevel>,
}

#[derive(Args)]
#[command(group(ArgGroup::new("run").required(true).args(["id", "title"])))]
struct UploadArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Upload into this existing run
    #[arg(long)]
    id: Option<i64>,

    /// Create a run with this title and complete it afterwards
    #[arg(long)]
    title: Option<String>,

    /// Description of the created run
    #[arg(long, requires = "title")]
    description: Option<String>,

    /// Environment slug of the created run
    #[arg(long, requires = "title")]
    environment: Option<String>,

    /// Milestone title of the created run
    #[arg(long, requires = "title")]
    milestone: Option<String>,

    /// Test plan title of the created run
    #[arg(long, requires = "title")]
    plan: Option<String>,

    /// Tag for the created run (repeatable)
    #[arg(long = "tag", requires = "title")]
    tags: Vec<String>,

    /// Results per request (overrides config)
    #[arg(long)]
    batch: Option<usize>,

    /// Suite title prepended to every result's suite path
    #[arg(long)]
    suite: Option<String>,

    /// Status remapping as a JSON object, e.g. '{"invalid": "failed"}'
    #[arg(long)]
    replace_statuses: Option<String>,

    /// Drop test parameters before upload
    #[arg(long)]
    skip_params: bool,

    /// Comma-separated attachment extensions to keep, e.g. "png,txt"
    #[arg(long)]
    attachments: Option<String>,

    #[command(flatten)]
    api: ApiArgs,
}

#[derive(Args)]
struct RunCreateArgs {
    /// Run title
    #[arg(long)]
    title: String,

    /// Run description
    #[arg(short, long)]
    description: Option<String>,

    /// Environment slug
    #[arg(short, long)]
    environment: Option<String>,

    /// Milestone title
    #[arg(short, long)]
    milestone: Option<String>,

    /// Test plan title
    #[arg(long)]
    plan: Option<String>,

    /// Run tag (repeatable)
    #[arg(long = "tag")]
    tags: Vec<String>,

    /// File the run id is written to
    #[arg(short, long, default_value = ENV_FILE)]
    output: PathBuf,

    #[command(flatten)]
    api: ApiArgs,
}

#[derive(Args)]
#[command(group(ArgGroup::new("runs").required(true).args(["ids", "all"])))]
struct RunDeleteArgs {
    /// Run ids, e.g. --ids 1,2,3
    #[arg(long, value_delimiter = ',')]
    ids: Vec<i64>,

    /// Delete every run of the project
    #[arg(long)]
    all: bool,

    /// Earliest run start date, YYYY-MM-DD
    #[arg(short, long, value_parser = parse_date, requires = "all")]
    start: Option<NaiveDate>,

    /// Latest run start date, YYYY-MM-DD (inclusive)
    #[arg(short, long, value_parser = parse_date, requires = "all")]
    end: Option<NaiveDate>,

    #[command(flatten)]
    api: ApiArgs,
}

#[derive(Args)]
struct EnvCreateArgs {
    /// Environment title
    #[arg(long)]
    title: String,

    /// Environment slug, without spaces
    #[arg(short, long)]
    slug: String,

    /// Environment description
    #[arg(short, long)]
    description: Option<String>,

    /// Host the environment runs on
    #[arg(long)]
    host: Option<String>,

    /// File the environment id is written to
    #[arg(short, long, default_value = ENV_FILE)]
    output: PathBuf,

    #[command(flatten)]
    api: ApiArgs,
}

#[derive(Args)]
struct MilestoneCreateArgs {
    /// Milestone title
    #[arg(long)]
    title: String,

    /// Milestone description
    #[arg(short, long)]
    description: Option<String>,

    /// Milestone status
    #[arg(long, value_enum)]
    status: Option<MilestoneStatus>,

    /// Due date, YYYY-MM-DD
    #[arg(long, value_parser = parse_date)]
    due_date: Option<NaiveDate>,

    /// File the milestone id is written to
    #[arg(short, long, default_value = ENV_FILE)]
    output: PathBuf,

    #[command(flatten)]
    api: ApiArgs,
}

#[derive(Args)]
#[command(group(ArgGroup::new("fields").required(true).args(["id", "all"])))]
struct FieldDeleteArgs {
    /// Custom field id
    #[arg(long)]
    id: Option<i64>,

    /// Delete every custom field
    #[arg(long)]
    all: bool,

    #[command(flatten)]
    api: ApiArgs,
}

#[derive(Args)]
struct FilterArgs {
    /// Test plan id
    #[arg(long)]
    plan_id: i64,

    /// Framework the filter is written for
    #[arg(long, value_enum)]
    framework: FilterFramework,

    /// File the filter is written to
    #[arg(short, long, default_value = ENV_FILE)]
    output: PathBuf,

    #[command(flatten)]
    api: ApiArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose)?;

    let config_path = expand_path(&cli.config.to_string_lossy());

    if let Err(e) = dispatch(cli.command, &config_path, cli.verbose).await {
        eprintln!("{} {:#}", console::style("Error:").red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}

async fn dispatch(command: Commands, config_path: &Path, verbose: bool) -> Result<()> {
    let load = || config::load_config_or_default(config_path);
    match command {
        Commands::Upload(args) => upload(args, load()?, verbose).await,
        Commands::Parse { source } => parse(source, &load()?).await,
        Commands::Validate => validate_config(config_path),
        Commands::Run { command } => match command {
            RunCommands::Create(args) => create_run(args, load()?).await,
            RunCommands::Complete { id, api } => complete_run(id, &api, load()?).await,
            RunCommands::Delete(args) => delete_runs(args, load()?).await,
        },
        Commands::Env {
            command: EnvCommands::Create(args),
        } => create_environment(args, load()?).await,
        Commands::Milestone {
            command: MilestoneCommands::Create(args),
        } => create_milestone(args, load()?).await,
        Commands::Field {
            command:
                FieldCommands::Custom {
                    command: CustomFieldCommands::Delete(args),
                },
        } => delete_custom_fields(args, load()?).await,
        Commands::Filter(args) => filter(args, load()?).await,
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    if std::env::var_os("RUST_LOG").is_some() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .with_target(false)
            .with_writer(std::io::stderr)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
        return Ok(());
    }

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

async fn decode(source: &SourceArgs, config: &Config) -> Result<Vec<testops::TestResult>> {
    let path = expand_path(&source.path);
    let options = ParserOptions {
        step_level: source.steps.unwrap_or(config.xcresult.step_level),
        xcresult_program: config.xcresult.program.clone(),
    };

    let parser = build_parser(source.format, &path, &options)
        .with_context(|| format!("Cannot read {} report at {}", source.format, path.display()))?;
    info!("Decoding {} report at {}", parser.name(), path.display());

    let results = parser
        .parse()
        .await
        .with_context(|| format!("Failed to decode {}", path.display()))?;
    info!("Decoded {} results", results.len());
    Ok(results)
}

async fn parse(source: SourceArgs, config: &Config) -> Result<()> {
    let results = decode(&source, config).await?;
    let json = serde_json::to_string_pretty(&results).context("Failed to serialize results")?;
    println!("{}", json);
    Ok(())
}

/// Applies `--project` and `--token` over the config.
fn apply_api_args(api: &ApiArgs, config: &mut Config) {
    if let Some(token) = api.token.clone() {
        config.api.token = Some(token);
    }
    if let Some(project) = api.project.clone() {
        config.api.project = Some(project);
    }
}

fn require_project(config: &Config) -> Result<String> {
    let Some(project) = config.api.project.clone().filter(|p| !p.trim().is_empty()) else {
        bail!("No project given: pass --project, set TESTOPS_PROJECT, or set api.project");
    };
    Ok(project)
}

fn connect(api: &ApiArgs, mut config: Config) -> Result<(HttpClient, String)> {
    apply_api_args(api, &mut config);
    let project = require_project(&config)?;
    let client = HttpClient::from_config(&config.api).context("Cannot create API client")?;
    Ok((client, project))
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| format!("expected YYYY-MM-DD, got {:?}: {}", raw, e))
}

/// Midnight UTC of `date`, in seconds since the Unix epoch.
fn day_start(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}

fn write_output(path: &Path, key: &str, value: impl ToString) -> Result<()> {
    let path = expand_path(&path.to_string_lossy());
    manage::write_env_file(&path, key, &value.to_string())?;
    info!("Wrote {} to {}", key, path.display());
    Ok(())
}

async fn create_run(args: RunCreateArgs, config: Config) -> Result<()> {
    let (client, project) = connect(&args.api, config)?;
    let spec = RunSpec {
        title: args.title,
        description: args.description,
        environment: args.environment,
        milestone: args.milestone,
        plan: args.plan,
        tags: args.tags,
    };

    let id = RunLifecycle::new(&client, &project).create(&spec, None).await?;
    println!("{}", id);
    write_output(&args.output, "QASE_TESTOPS_RUN_ID", id)
}

async fn complete_run(id: i64, api: &ApiArgs, config: Config) -> Result<()> {
    let (client, project) = connect(api, config)?;
    RunLifecycle::new(&client, &project).complete(id).await?;
    Ok(())
}

async fn delete_runs(args: RunDeleteArgs, config: Config) -> Result<()> {
    let (client, project) = connect(&args.api, config)?;
    let selection = if args.all {
        RunSelection::All(RunWindow {
            from: args.start.map(day_start),
            to: args.end.map(|d| day_start(d) + SECONDS_PER_DAY - 1),
        })
    } else {
        RunSelection::Ids(args.ids)
    };

    let deleted = ProjectAdmin::new(&client, &project)
        .delete_runs(&selection)
        .await
        .context("Failed to delete test runs")?;
    println!("Deleted {} runs", deleted);
    Ok(())
}

async fn create_environment(args: EnvCreateArgs, config: Config) -> Result<()> {
    let (client, project) = connect(&args.api, config)?;
    let spec = EnvironmentCreate {
        title: args.title,
        slug: args.slug,
        description: args.description,
        host: args.host,
    };

    let env = ProjectAdmin::new(&client, &project)
        .ensure_environment(&spec)
        .await?;
    println!("{}", env.id);
    write_output(&args.output, "QASE_ENVIRONMENT", env.id)
}

async fn create_milestone(args: MilestoneCreateArgs, config: Config) -> Result<()> {
    let (client, project) = connect(&args.api, config)?;
    let spec = MilestoneCreate {
        title: args.title,
        description: args.description,
        status: args.status,
        due_date: args.due_date.map(day_start),
    };

    let milestone = ProjectAdmin::new(&client, &project)
        .ensure_milestone(&spec)
        .await?;
    println!("{}", milestone.id);
    write_output(&args.output, "QASE_MILESTONE", milestone.id)
}

async fn delete_custom_fields(args: FieldDeleteArgs, mut config: Config) -> Result<()> {
    apply_api_args(&args.api, &mut config);
    let client = HttpClient::from_config(&config.api).context("Cannot create API client")?;
    let selection = match args.id {
        Some(id) => FieldSelection::One(id),
        None => FieldSelection::All,
    };

    // Custom fields belong to the workspace, not a project.
    let deleted = ProjectAdmin::new(&client, "")
        .delete_custom_fields(selection)
        .await?;
    println!("Deleted {} custom fields", deleted);
    Ok(())
}

async fn filter(args: FilterArgs, config: Config) -> Result<()> {
    let (client, project) = connect(&args.api, config)?;
    let pattern = ProjectAdmin::new(&client, &project)
        .case_filter(args.plan_id, args.framework)
        .await?;
    println!("{}", pattern);
    write_output(&args.output, "QASE_FILTERED_RESULTS", pattern)
}

async fn upload(args: UploadArgs, mut config: Config, verbose: bool) -> Result<()> {
    apply_api_args(&args.api, &mut config);
    let project = require_project(&config)?;

    let params = upload_params(&args, &config, project)?;
    let client = HttpClient::from_config(&config.api).context("Cannot create API client")?;
    let results = decode(&args.source, &config).await?;

    let uploader = Uploader::new(client, ConsoleReporter::new(verbose));
    uploader.upload(results, &params).await?;
    Ok(())
}

fn upload_params(args: &UploadArgs, config: &Config, project: String) -> Result<UploadParams> {
    let target = match (args.id, &args.title) {
        (Some(id), _) => RunTarget::Existing(id),
        (None, Some(title)) => RunTarget::Create(RunSpec {
            title: title.clone(),
            description: args.description.clone(),
            environment: args.environment.clone(),
            milestone: args.milestone.clone(),
            plan: args.plan.clone(),
            tags: args.tags.clone(),
        }),
        (None, None) => bail!("Either --id or --title is required"),
    };

    let statuses = match &args.replace_statuses {
        Some(json) => StatusMap::from_json(json)?,
        None => StatusMap::default(),
    };

    let mut params = UploadParams::new(project, target)
        .with_batch_size(args.batch.unwrap_or(config.upload.batch_size))
        .with_statuses(statuses)
        .with_skip_params(args.skip_params)
        .with_attachments(args.attachments.as_deref().and_then(ExtensionFilter::parse))
        .with_lead_in(Duration::from_secs(config.upload.run_lead_in_secs));
    if let Some(suite) = &args.suite {
        params = params.with_suite(suite);
    }
    Ok(params)
}

fn validate_config(path: &Path) -> Result<()> {
    match config::load_config(path) {
        Ok(config) => {
            println!("Configuration is valid!");
            println!();
            println!("  Host:       {}", config.api.host);
            println!(
                "  Project:    {}",
                config.api.project.as_deref().unwrap_or("(not set)")
            );
            println!(
                "  Token:      {}",
                if config.api.token.is_some() { "set" } else { "(not set)" }
            );
            println!("  Batch size: {}", config.upload.batch_size);
            println!("  Lead-in:    {}s", config.upload.run_lead_in_secs);
            println!("  xcresult:   {}", config.xcresult.program);
            println!("  Steps:      {:?}", config.xcresult.step_level);

            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            std::process::exit(1);
        }
    }
}
