use std::sync::Arc;

use breadboard::{
    CancelToken, Dialect, Engine, MemoryMetadataStore, MetadataStore, PgBackend, PgMetadataStore,
    TablePayload,
};
use facet::Facet;
use figue as args;

mod config;
mod output;

use config::{Settings, StoreKind};

type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Table administration for admin panels: introspect, plan, apply, and BREAD records.
#[derive(Facet, Debug)]
struct Cli {
    /// Show version information
    #[facet(args::named, args::short = 'V')]
    version: bool,

    /// Database connection URL (overrides DATABASE_URL and the config file)
    #[facet(default, args::named)]
    database_url: Option<String>,

    /// Command to run
    #[facet(default, args::subcommand)]
    command: Option<Commands>,
}

/// Available commands
#[derive(Facet, Debug)]
#[repr(u8)]
enum Commands {
    /// List tables and whether they have BREAD screens
    Tables {
        /// Print JSON instead of text
        #[facet(default, args::named)]
        json: bool,
    },
    /// Describe a table's columns
    Describe {
        #[facet(args::positional)]
        table: String,
    },
    /// List the column types of the configured dialect
    Types {
        /// Print the type-selector JSON
        #[facet(default, args::named)]
        json: bool,
    },
    /// Show what a table payload would change
    Plan {
        /// Path to a JSON table payload
        #[facet(args::positional)]
        payload: String,
        /// Also print the SQL
        #[facet(default, args::named)]
        sql: bool,
        /// Run the plan against an in-memory copy of the table
        #[facet(default, args::named)]
        dry_run: bool,
    },
    /// Apply a table payload
    Apply {
        /// Path to a JSON table payload
        #[facet(args::positional)]
        payload: String,
    },
    /// Drop a table
    Drop {
        #[facet(args::positional)]
        table: String,
        /// Don't ask, just drop
        #[facet(default, args::named)]
        yes: bool,
    },
    /// Show a table's BREAD record
    BreadShow {
        #[facet(args::positional)]
        table: String,
        /// Print JSON instead of text
        #[facet(default, args::named)]
        json: bool,
    },
    /// Create a BREAD record with suggested fields
    BreadInit {
        #[facet(args::positional)]
        table: String,
    },
    /// Save a BREAD record from a JSON file
    BreadSave {
        #[facet(args::positional)]
        path: String,
    },
    /// Delete a table's BREAD record
    BreadDelete {
        #[facet(args::positional)]
        table: String,
    },
    /// List BREAD records whose table no longer exists
    BreadStale {
        /// Delete them
        #[facet(default, args::named)]
        delete: bool,
    },
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let args_ref: Vec<&str> = args.iter().map(|s| s.as_str()).collect();

    let result: Result<Cli, _> = args::from_slice(&args_ref);

    match result {
        Ok(cli) => {
            if let Err(e) = run(cli) {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
        Err(err) if err.is_help_request() => {
            print!("{}", err.help_text().unwrap_or(""));
        }
        Err(err) => {
            eprintln!("{}", err);
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

fn run(cli: Cli) -> CliResult {
    if cli.version {
        println!("breadboard {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let Some(command) = cli.command else {
        let config = args::HelpConfig {
            program_name: Some("breadboard".to_string()),
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
            ..Default::default()
        };
        print!("{}", args::generate_help::<Cli>(&config));
        return Ok(());
    };

    init_tracing();
    // A missing .env is normal.
    let _ = dotenvy::dotenv();

    let (config, source) = config::load()?;
    let settings = config::resolve(
        config,
        source,
        cli.database_url,
        std::env::var("DATABASE_URL").ok(),
    )?;
    if let Some(path) = &settings.source {
        tracing::debug!(config = %path.display(), "loaded config");
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(dispatch(command, settings))
}

async fn dispatch(command: Commands, settings: Settings) -> CliResult {
    // Listing types doesn't need a database.
    if let Commands::Types { json } = command {
        let catalog = settings.dialect.catalog();
        if json {
            println!("{}", catalog.listing().to_json()?);
        } else {
            output::print_types(catalog);
        }
        return Ok(());
    }

    let engine = connect(&settings).await?;
    let cancel = CancelToken::new();

    match command {
        Commands::Types { .. } => {}
        Commands::Tables { json } => {
            let tables = engine.tables().await?;
            if json {
                println!("{}", facet_json::to_string(&tables).map_err(|e| e.to_string())?);
            } else {
                output::print_listing(&tables);
            }
        }
        Commands::Describe { table } => {
            output::print_table(&engine.describe(&table).await?);
        }
        Commands::Plan {
            payload,
            sql,
            dry_run,
        } => {
            let request = read_payload(&payload)?;
            let plan = engine.preview(&request).await?;
            output::print_plan(&plan);
            if sql {
                output::print_sql(&breadboard_sql::render_plan(settings.dialect, &plan)?);
            }
            if dry_run {
                let (_, result) = engine.dry_run(&request).await?;
                match result.failure() {
                    Some(failure) => println!("dry run failed: {failure}"),
                    None => println!("dry run ok"),
                }
            }
        }
        Commands::Apply { payload } => {
            let request = read_payload(&payload)?;
            let outcome = if engine.reader().table_exists(request.current_name()).await? {
                engine.update_table(&request, &cancel).await?
            } else {
                engine.create_table(&request, &cancel).await?
            };
            output::print_plan(&outcome.plan);
            if !output::print_outcome(&outcome) {
                return Err("apply failed".into());
            }
        }
        Commands::Drop { table, yes } => {
            if !yes {
                return Err(format!("refusing to drop '{table}' without --yes").into());
            }
            let outcome = engine.drop_table(&table, &cancel).await?;
            if !output::print_outcome(&outcome) {
                return Err("drop failed".into());
            }
        }
        Commands::BreadShow { table, json } => match engine.bread(&table).await? {
            Some(record) if json => {
                println!("{}", facet_json::to_string(&record).map_err(|e| e.to_string())?)
            }
            Some(record) => output::print_bread(&record),
            None => println!("No BREAD record for '{table}'."),
        },
        Commands::BreadInit { table } => {
            if engine.bread(&table).await?.is_some() {
                return Err(format!("'{table}' already has a BREAD record").into());
            }
            let record = engine.prepopulate_bread(&table).await?;
            let record = engine.save_bread(record).await?;
            output::print_bread(&record);
        }
        Commands::BreadSave { path } => {
            let json = std::fs::read_to_string(&path)?;
            let record: breadboard::BreadRecord =
                facet_json::from_str(&json).map_err(|e| e.to_string())?;
            let record = engine.save_bread(record).await?;
            output::print_bread(&record);
        }
        Commands::BreadDelete { table } => {
            if engine.delete_bread(&table).await? {
                println!("Deleted BREAD record for '{table}'.");
            } else {
                println!("No BREAD record for '{table}'.");
            }
        }
        Commands::BreadStale { delete } => {
            let stale = engine.stale_bread().await?;
            if stale.is_empty() {
                println!("No stale BREAD records.");
            }
            for table in &stale {
                if delete {
                    engine.delete_bread(table).await?;
                    println!("  {table} (deleted)");
                } else {
                    println!("  {table}");
                }
            }
        }
    }
    Ok(())
}

async fn connect(settings: &Settings) -> CliResult<Engine> {
    if settings.dialect != Dialect::Postgres {
        return Err(format!(
            "connecting to {} databases is not supported; only `types` works offline",
            settings.dialect
        )
        .into());
    }
    let url = settings
        .database_url
        .as_deref()
        .ok_or("no database URL: pass --database-url, set DATABASE_URL, or add one to .config/breadboard.styx")?;
    tracing::info!(database = %mask_password(url), "connecting");

    let backend = PgBackend::connect(url)?;
    let store: Arc<dyn MetadataStore> = match settings.store {
        StoreKind::Postgres => {
            let store = PgMetadataStore::new(backend.pool().clone());
            store.ensure_tables().await?;
            Arc::new(store)
        }
        StoreKind::Memory => Arc::new(MemoryMetadataStore::new()),
    };
    Ok(Engine::new(Arc::new(backend), store).with_timeout(settings.timeout))
}

fn read_payload(path: &str) -> CliResult<breadboard::TableRequest> {
    let json = std::fs::read_to_string(path)?;
    Ok(TablePayload::from_json(&json)?.into_request()?)
}

/// Mask password in database URL for display
fn mask_password(url: &str) -> String {
    if let Some(start) = url.find("://")
        && let Some(at) = url.rfind('@')
        && at > start + 3
        && let Some(colon) = url[start + 3..at].find(':')
    {
        let prefix = &url[..start + 3];
        let user = &url[start + 3..start + 3 + colon];
        return format!("{prefix}{user}:***{}", &url[at..]);
    }
    url.to_string()
}
