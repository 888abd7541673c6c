use broker_scrub::cli::{self, BrokerCommand, Cli, Command, ProfileCommand};
use broker_scrub::{config, db};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    // Open database
    let db_path = config::db_path()?;
    let db = db::Database::open(&db_path)?;

    match cli.command {
        Command::Broker { command } => match command {
            BrokerCommand::Import { dir } => {
                let dir = match dir {
                    Some(dir) => dir,
                    None => config::default_brokers_dir()?,
                };
                cli::broker::import_brokers(&db, &dir)?
            }
            BrokerCommand::List => cli::broker::list_brokers(&db)?,
            BrokerCommand::Info { name } => cli::broker::broker_info(&db, &name)?,
        },
        Command::Profile { command } => match command {
            ProfileCommand::Set {
                names,
                locations,
                phones,
                birth_year,
            } => cli::profile::set_profile(&db, &names, &locations, &phones, birth_year)?,
            ProfileCommand::Show => cli::profile::show_profile(&db)?,
        },
        Command::Jobs {
            operation,
            due_by,
            all_dates,
        } => cli::jobs::list_jobs(&db, operation, due_by, all_dates)?,
        Command::Run(args) => cli::run::run(&db, args).await?,
        Command::Status => cli::status::status(&db)?,
        Command::Report { format, output } => {
            cli::report::generate_report(&db, &format, output.as_deref())?;
        }
    }

    Ok(())
}
