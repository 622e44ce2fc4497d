//! ReQL command-line client
//!
//! Small shell over the `reql_client` library:
//!
//! ```bash
//! # List databases
//! reql db-list
//!
//! # Tables of a database
//! reql --host db.internal table-list --db blog
//!
//! # Run a query given in wire JSON: r.table("posts").count()
//! reql --db blog query '[43, [[15, ["posts"]]]]'
//!
//! # Follow a change feed
//! reql --db blog changes posts --limit 10
//! ```

use clap::{Args, Parser, Subcommand};
use reql_client::query::QueryCompiler;
use reql_client::reql::{r, ChangesOptions, Datum, Term};
use reql_client::{CloseOptions, ConnectOptions, Connection, RunOptions, RunResult};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Command-line client for ReQL servers
#[derive(Parser, Debug)]
#[command(name = "reql")]
#[command(version = reql_client::VERSION)]
#[command(about = "Command-line client for ReQL servers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    conn: ConnArgs,

    /// Log directory; logs go to stderr only when unset
    #[arg(long, global = true, env = "REQL_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn", env = "RUST_LOG")]
    log_level: String,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Args, Debug)]
struct ConnArgs {
    /// Connection config file; flags below override it
    #[arg(long, global = true, env = "REQL_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, global = true, env = "REQL_HOST")]
    host: Option<String>,

    #[arg(long, global = true, env = "REQL_PORT")]
    port: Option<u16>,

    /// Default database
    #[arg(long, global = true, env = "REQL_DB")]
    db: Option<String>,

    #[arg(long, global = true, env = "REQL_AUTH_KEY", hide_env_values = true)]
    auth_key: Option<String>,

    /// Connect and handshake timeout in seconds
    #[arg(long, global = true, env = "REQL_TIMEOUT")]
    timeout: Option<f64>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List databases
    DbList,

    /// List tables of a database
    TableList {
        /// Database; the default database when omitted
        #[arg(long)]
        db: Option<String>,
    },

    /// Show the identity of the server
    ServerInfo,

    /// Run a query given as wire JSON
    Query(QueryArgs),

    /// Print changes to a table as they happen
    Changes {
        table: String,

        /// Stop after this many changes
        #[arg(long)]
        limit: Option<usize>,

        /// Emit the current contents first
        #[arg(long)]
        include_initial: bool,
    },
}

#[derive(Args, Debug)]
struct QueryArgs {
    /// Term in wire format, e.g. '[59, []]' for r.dbList()
    term: String,

    /// Run options as a JSON object, e.g. '{"read_mode": "outdated"}'
    #[arg(long)]
    options: Option<String>,

    /// Print the server profile
    #[arg(long)]
    profile: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli)?;

    let options = connect_options(&cli.conn)?;
    info!(address = %options.address(), "Connecting");
    let conn = reql_client::connect(options).await?;

    let outcome = match cli.command {
        Commands::DbList => print_result(conn.run(&r::db_list(), RunOptions::new()).await?).await,
        Commands::TableList { db } => {
            let term = match db {
                Some(db) => r::db(db).table_list(),
                None => r::table_list(),
            };
            print_result(conn.run(&term, RunOptions::new()).await?).await
        }
        Commands::ServerInfo => {
            let info = conn.server().await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(())
        }
        Commands::Query(args) => query_command(&conn, args).await,
        Commands::Changes {
            table,
            limit,
            include_initial,
        } => changes_command(&conn, table, limit, include_initial).await,
    };

    conn.close(CloseOptions::default()).await?;
    outcome
}

/// Setup logging: stderr, plus a daily rolling file when a log dir is set
fn setup_logging(cli: &Cli) -> anyhow::Result<()> {
    let log_level = cli
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::WARN);

    let file_layer = match &cli.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, "reql.log");
            Some(fmt::layer().with_writer(appender).with_ansi(false))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(!cli.no_color),
        )
        .with(file_layer)
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .init();

    Ok(())
}

fn connect_options(args: &ConnArgs) -> anyhow::Result<ConnectOptions> {
    let mut options = match &args.config {
        Some(path) => ConnectOptions::load(path)?,
        None => ConnectOptions::from_env(),
    };
    if let Some(host) = &args.host {
        options.host = host.clone();
    }
    if let Some(port) = args.port {
        options.port = port;
    }
    if let Some(db) = &args.db {
        options.db = Some(db.clone());
    }
    if let Some(key) = &args.auth_key {
        options.auth_key = key.clone();
    }
    if let Some(secs) = args.timeout {
        options.timeout = Duration::try_from_secs_f64(secs)?;
    }
    Ok(options)
}

async fn query_command(conn: &Connection, args: QueryArgs) -> anyhow::Result<()> {
    let wire: serde_json::Value = serde_json::from_str(&args.term)?;
    let term: Term = QueryCompiler::decode(&wire)?;
    debug!(term = %term.pretty_print(0), "Decoded query");

    let mut options: RunOptions = match &args.options {
        Some(json) => serde_json::from_str(json)?,
        None => RunOptions::new(),
    };
    if args.profile {
        options.profile = Some(true);
    }

    let result = conn.run(&term, options).await?;
    if let Some(profile) = result.profile() {
        eprintln!("{}", serde_json::to_string_pretty(&profile)?);
    }
    print_result(result).await
}

async fn changes_command(
    conn: &Connection,
    table: String,
    limit: Option<usize>,
    include_initial: bool,
) -> anyhow::Result<()> {
    let feed = r::table(table).changes(ChangesOptions {
        include_initial: Some(include_initial),
        ..Default::default()
    });
    let cursor = conn.run(&feed, RunOptions::new()).await?.into_cursor()?;

    let mut seen = 0usize;
    while let Some(change) = cursor.next().await? {
        print_datum(&change)?;
        seen += 1;
        if limit.is_some_and(|limit| seen >= limit) {
            break;
        }
    }
    cursor.close();
    Ok(())
}

async fn print_result(result: RunResult) -> anyhow::Result<()> {
    match result {
        RunResult::Atom { value, .. } => print_datum(&value),
        RunResult::Cursor(cursor) => {
            while let Some(value) = cursor.next().await? {
                print_datum(&value)?;
            }
            Ok(())
        }
        RunResult::NoReply => Ok(()),
    }
}

fn print_datum(datum: &Datum) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(datum)?);
    Ok(())
}
