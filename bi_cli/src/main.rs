//! # BI command-line front end
//!

use bi_cli::FileBackend;
use bi_compiler::config::RuntimeConfig;
use bi_compiler::logging::codes;
use bi_compiler::{log_error, log_info, logging, HostSpec, Identity, LeafKey};
use bi_evaluator::{
    AggregationRow, AssumptionKey, BiService, HostTableQuery, JsonFileAssumptionStore,
    JsonFileTreeStateStore, State, TableQuery,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "bi", version, about = "Compile and evaluate BI aggregations")]
struct Cli {
    /// Rule configuration (TOML, or JSON with a .json extension)
    #[arg(long, default_value = "bi_rules.toml")]
    rules: PathBuf,

    /// Host inventory with status data
    #[arg(long, default_value = "bi_inventory.json")]
    inventory: PathBuf,

    /// Directory holding per-user assumptions and tree state
    #[arg(long, default_value = ".bi")]
    state_dir: PathBuf,

    /// User to act as
    #[arg(long, default_value = "admin")]
    user: String,

    /// Only show hosts the user is a contact of
    #[arg(long)]
    own_contacts: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the compiled forest
    Forest,
    /// Evaluate aggregations
    Table {
        #[arg(long)]
        group: Option<String>,
        /// Only aggregations containing site/host/service
        #[arg(long)]
        service: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Evaluate single-host aggregations
    Hosts {
        #[arg(long = "site")]
        sites: Vec<String>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Set or clear an assumed state: <site> <host> [service] <state|none>
    Assume {
        site: String,
        host: String,
        #[arg(num_args = 1..=2, required = true)]
        target: Vec<String>,
    },
    /// Check whether a host or service is part of any aggregation
    Affected {
        site: String,
        host: String,
        service: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    logging::init_global_logging()?;

    let cli = Cli::parse();
    let runtime = RuntimeConfig::from_env();
    let identity = Identity::new(&cli.user, !cli.own_contacts);

    let backend = Arc::new(FileBackend::new(&cli.rules, &cli.inventory));
    let service = BiService::new(backend.clone(), backend.clone(), backend)
        .with_assumption_store(Arc::new(JsonFileAssumptionStore::new(&cli.state_dir)))
        .with_tree_state_store(Arc::new(JsonFileTreeStateStore::new(&cli.state_dir)))
        .with_compiler_preferences(runtime.compiler)
        .with_evaluator_preferences(runtime.evaluator);

    let result = run(&service, &identity, cli.command);
    if let Err(e) = &result {
        log_error!(codes::system::INTERNAL_ERROR, "Command failed",
            "user" => &identity.user,
            "error" => e
        );
    }
    result
}

fn run(
    service: &BiService,
    identity: &Identity,
    command: Command,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Forest => print!("{}", service.render(identity)?),
        Command::Table {
            group,
            service: filter,
            limit,
            json,
        } => {
            let query = TableQuery {
                group,
                service: filter.as_deref().map(parse_service_key).transpose()?,
                limit,
            };
            print_rows(&service.table(identity, &query)?, json)?;
        }
        Command::Hosts { sites, limit, json } => {
            let rows = service.host_table(identity, &HostTableQuery { sites, limit })?;
            print_rows(&rows, json)?;
        }
        Command::Assume { site, host, target } => {
            let (service_name, state) = match target.as_slice() {
                [state] => (None, state),
                [service_name, state] => (Some(service_name.as_str()), state),
                _ => return Err("expected [service] <state|none>".into()),
            };
            let state = parse_assumed_state(state)?;
            let key = match service_name {
                Some(service_name) => AssumptionKey::service(&site, &host, service_name),
                None => AssumptionKey::host(&site, &host),
            };
            service.set_assumption(identity, key, state)?;
            log_info!("Assumption stored", "site" => &site, "host" => &host);
        }
        Command::Affected {
            site,
            host,
            service: service_name,
        } => {
            let affected = service.is_part_of_aggregation(
                identity,
                &HostSpec::new(site, host),
                service_name.as_deref(),
            )?;
            println!("{}", if affected { "yes" } else { "no" });
        }
    }
    Ok(())
}

fn parse_service_key(text: &str) -> Result<LeafKey, String> {
    match text.splitn(3, '/').collect::<Vec<_>>().as_slice() {
        [site, host, service] => Ok(LeafKey::new(site, host, service)),
        _ => Err(format!("expected site/host/service, got '{}'", text)),
    }
}

fn parse_assumed_state(text: &str) -> Result<Option<State>, String> {
    if text.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    text.parse::<State>()
        .map(Some)
        .map_err(|_| format!("invalid state '{}'", text))
}

fn print_rows(rows: &[AggregationRow], json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(rows)?);
        return Ok(());
    }

    for row in rows {
        let state = match row.assumed_state {
            Some(assumed) => format!("{} (assumed {})", row.state, assumed),
            None => row.state.to_string(),
        };
        let host = row
            .host
            .as_ref()
            .map(|h| format!("{}/{} ", h.site, h.name))
            .unwrap_or_default();
        println!("{}{}\t{}\t{}\t{}", host, row.group, row.name, state, row.output);
    }
    println!("\n{} rows", rows.len());
    Ok(())
}
