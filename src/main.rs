//! Report Forge
//!
//! Fills Word templates with the results of SQL queries, from the command
//! line or through a small web UI.

use anyhow::{Context, Result, bail};
use clap::Parser;
use report_forge::ai::SqlAssistant;
use report_forge::cli::{
    Cli, Command, GenerateArgs, PlaceholdersArgs, ServeArgs, SuggestArgs, VerifyArgs,
};
use report_forge::config::{Config, ConfigLoader};
use report_forge::dashboard::{self, ReportServer};
use report_forge::db::Database;
use report_forge::db::query::QueryOutcome;
use report_forge::docx::Template;
use report_forge::logging::{LogTarget, init_logging};
use report_forge::params::ParameterStore;
use report_forge::report::{ReportGenerator, output_file_name};
use report_forge::types::ReportDate;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on --log option
    init_logging(&LogTarget::parse(&cli.log), cli.verbose)?;

    let mut loader = ConfigLoader::load(cli.config.as_deref())?;
    if let Some(path) = loader.config_path() {
        info!("Using config file {}", path.display());
    }

    // Override paths from CLI arguments
    let config = loader.config_mut();
    if let Some(db_path) = &cli.database {
        config.server.db_path = db_path.clone();
    }

    let config = loader.into_config();

    // Handle subcommands
    match cli.command {
        Some(Command::Generate(args)) => run_generate(&config, args)?,
        Some(Command::Seed) => run_seed(&config)?,
        Some(Command::Placeholders(args)) => run_placeholders(args)?,
        Some(Command::Suggest(args)) => run_suggest(&config, args).await?,
        Some(Command::Verify(args)) => run_verify(&config, args).await?,
        Some(Command::Serve(args)) => run_server(config, args).await?,
        None => run_server(config, ServeArgs::default()).await?,
    }

    Ok(())
}

fn open_database(config: &Config) -> Result<Database> {
    config.ensure_db_dir()?;
    let db = Database::open(&config.server.db_path).with_context(|| {
        format!(
            "failed to open database {}",
            config.server.db_path.display()
        )
    })?;
    info!("Database: {}", config.server.db_path.display());
    Ok(db)
}

/// Parameters from an explicit file, the configured file, or the built-in set.
fn load_parameters(config: &Config, explicit: Option<&Path>) -> Result<ParameterStore> {
    match explicit.or(config.server.parameters_file.as_deref()) {
        Some(path) => ParameterStore::load(path),
        None => {
            info!("No parameters file configured; using built-in parameters");
            Ok(ParameterStore::with_defaults())
        }
    }
}

fn read_template(path: &Path) -> Result<Template> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Template::from_bytes(bytes).with_context(|| format!("{} is not a usable template", path.display()))
}

fn assistant(config: &Config) -> Result<SqlAssistant> {
    match SqlAssistant::from_config(&config.llm, &config.report.date_token)? {
        Some(assistant) => Ok(assistant),
        None => bail!("the SQL assistant is disabled (llm.provider = none)"),
    }
}

async fn run_server(mut config: Config, args: ServeArgs) -> Result<()> {
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(parameters) = args.parameters {
        config.server.parameters_file = Some(parameters);
    }

    let db = open_database(&config)?;
    if config.server.seed_if_empty && db.is_empty()? {
        info!("Database has no tables; loading sample data");
        db.seed_sample()?;
    }

    let params = load_parameters(&config, None)?;
    let assistant = match SqlAssistant::from_config(&config.llm, &config.report.date_token) {
        Ok(Some(assistant)) => {
            info!("SQL assistant enabled: {:?}", assistant);
            Some(assistant)
        }
        Ok(None) => {
            info!("SQL assistant disabled (llm.provider = none)");
            None
        }
        Err(e) => {
            warn!("SQL assistant unavailable: {}", e);
            None
        }
    };

    let state = ReportServer::new(
        db.clone(),
        params,
        config.report.clone(),
        assistant,
        config.server.max_upload_bytes,
    );
    let handle = dashboard::start_server(state, &config.server.bind, config.server.port).await?;
    info!("Open http://{} in a browser", handle.addr());

    tokio::signal::ctrl_c().await?;
    info!("Interrupt received");
    handle.shutdown().await;

    if let Err(e) = db.close() {
        warn!("Database not closed cleanly: {:#}", e);
    }
    Ok(())
}

fn run_generate(config: &Config, args: GenerateArgs) -> Result<()> {
    let date = match args.date.as_deref() {
        Some(raw) => raw.parse::<ReportDate>()?,
        None => ReportDate::current(),
    };
    let template = read_template(&args.template)?;
    let params = load_parameters(config, args.parameters.as_deref())?;
    let db = open_database(config)?;

    let report = ReportGenerator::new(&db, &config.report).generate(
        &template,
        params.list(),
        &date,
    )?;

    let output = args.output.unwrap_or_else(|| {
        let name = output_file_name(
            args.template.file_name().and_then(|n| n.to_str()),
            &date,
        );
        args.template
            .parent()
            .map(|dir| dir.join(&name))
            .unwrap_or_else(|| PathBuf::from(&name))
    });
    std::fs::write(&output, &report.content)
        .with_context(|| format!("failed to write {}", output.display()))?;

    println!("Report for {} written to {}", date, output.display());
    for outcome in &report.outcomes {
        let shown = match &outcome.outcome {
            QueryOutcome::Value(v) => v.clone(),
            QueryOutcome::NoData => config.report.no_data_text.clone(),
            QueryOutcome::Failed(err) => format!("{} ({})", config.report.error_marker, err),
        };
        println!("  {:<24} {}", outcome.name, shown);
    }
    println!(
        "{} placeholder(s) replaced, {} failed quer{}",
        report.replaced,
        report.substitutions.error_count(),
        if report.substitutions.error_count() == 1 { "y" } else { "ies" }
    );

    db.close()
}

fn run_seed(config: &Config) -> Result<()> {
    let db = open_database(config)?;
    db.seed_sample()?;
    let tables = db.get_table_names()?;
    println!(
        "Sample data ready in {} ({})",
        config.server.db_path.display(),
        tables.join(", ")
    );
    db.close()
}

fn run_placeholders(args: PlaceholdersArgs) -> Result<()> {
    let template = read_template(&args.template)?;
    let keys = template.placeholders()?;
    if keys.is_empty() {
        println!("No placeholders found in {}", args.template.display());
    }
    for key in keys {
        println!("{}", key);
    }
    Ok(())
}

fn schema_summary(config: &Config) -> Result<String> {
    let db = open_database(config)?;
    let summary = db.get_schema()?.summary();
    db.close()?;
    Ok(summary)
}

async fn run_suggest(config: &Config, args: SuggestArgs) -> Result<()> {
    let assistant = assistant(config)?;
    let schema = schema_summary(config)?;
    let sql = assistant
        .suggest(&args.name, &args.description, &schema)
        .await?;
    println!("{}", sql);
    Ok(())
}

async fn run_verify(config: &Config, args: VerifyArgs) -> Result<()> {
    let assistant = assistant(config)?;
    let schema = schema_summary(config)?;
    let verdict = assistant
        .verify(&args.sql, &args.description, &schema)
        .await?;
    println!(
        "{}: {}",
        if verdict.is_suitable {
            "Suitable"
        } else {
            "Not suitable"
        },
        verdict.reason
    );
    Ok(())
}
