//! NetAcuity lookup CLI
//!
//! Looks up addresses given on the command line or in a file and prints one
//! result per line.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use netacuity_client::{
    CachingResolver, ClientConfig, EdgeRecord, NetAcuityClient, Resolver, ServerConfig,
    DEFAULT_LISTEN_PORT, DEFAULT_SERVER_PORT,
};

/// Look up addresses in NetAcuity Edge
#[derive(Parser)]
#[command(name = "netacuity-lookup")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Addresses (IPs or hostnames) to look up
    addresses: Vec<String>,

    /// NetAcuity server, repeat for failover servers
    #[arg(short = 'H', long = "host")]
    hosts: Vec<String>,

    /// NetAcuity server port
    #[arg(short, long, default_value_t = DEFAULT_SERVER_PORT)]
    port: u16,

    /// Local port to receive responses on
    #[arg(short, long, default_value_t = DEFAULT_LISTEN_PORT)]
    listen: u16,

    /// Response timeout in milliseconds
    #[arg(short, long, default_value_t = 500)]
    timeout: u64,

    /// Client configuration file, used instead of the server options
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Application id reported to NetAcuity (0-127)
    #[arg(long, default_value_t = 3)]
    app_id: u8,

    /// File with one address per line
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Number of lookups in flight at once
    #[arg(short, long, default_value_t = 1)]
    jobs: usize,

    /// Output template, e.g. "{ip} {country} {city}" (default: JSON)
    #[arg(short, long)]
    format: Option<String>,

    /// Keep going and exit successfully when lookups fail
    #[arg(long)]
    ignore_errors: bool,

    /// Do not report failed lookups
    #[arg(short, long)]
    quiet: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Print a sample configuration file and exit
    #[arg(long)]
    sample_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level);

    if cli.sample_config {
        print!("{}", ClientConfig::sample());
        return Ok(());
    }

    run(cli).await
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries the lookup results
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = build_config(&cli)?;
    let addresses = collect_addresses(&cli)?;
    if addresses.is_empty() {
        bail!("No addresses to look up (pass them as arguments or with --input)");
    }

    let client = Arc::new(
        NetAcuityClient::new(&config)
            .await
            .context("Failed to create NetAcuity client")?,
    );
    let resolver = Arc::new(CachingResolver::new(
        cli.jobs.max(1),
        Duration::from_secs(60),
    ));
    let format = cli.format.as_deref();
    let jobs = Arc::new(Semaphore::new(cli.jobs.max(1)));

    info!(
        "Looking up {} addresses with {} jobs",
        addresses.len(),
        cli.jobs.max(1)
    );

    let mut tasks = JoinSet::new();
    let mut failed = 0;
    for address in addresses.iter().cloned() {
        let permit = jobs.clone().acquire_owned().await?;
        let client = client.clone();
        let resolver = resolver.clone();

        tasks.spawn(async move {
            let result = lookup(&client, resolver.as_ref(), &address).await;
            drop(permit);
            (address, result)
        });

        // Print whatever finished while waiting for a free slot
        while let Some(done) = tasks.try_join_next() {
            let (address, result) = done?;
            if !report(&address, result, format, cli.quiet) {
                failed += 1;
            }
        }
    }

    while let Some(done) = tasks.join_next().await {
        let (address, result) = done?;
        if !report(&address, result, format, cli.quiet) {
            failed += 1;
        }
    }
    debug!("{} of {} lookups failed", failed, addresses.len());

    client.close().await.context("Failed to close NetAcuity client")?;

    if failed > 0 && !cli.ignore_errors {
        bail!("{} of {} lookups failed", failed, addresses.len());
    }
    Ok(())
}

/// Build the client configuration from `--config` or the server options
fn build_config(cli: &Cli) -> Result<ClientConfig> {
    if let Some(path) = &cli.config {
        return load_config(path);
    }

    if cli.hosts.is_empty() {
        bail!("No NetAcuity server given (use --host or --config)");
    }

    let mut config = ClientConfig::new(
        cli.hosts
            .iter()
            .map(|host| ServerConfig::new(host.as_str(), cli.port))
            .collect(),
    );
    config.port = cli.listen;
    config.timeout = cli.timeout;
    config.app_id = cli.app_id;
    config.validate().context("Invalid client configuration")?;
    Ok(config)
}

fn load_config(path: &Path) -> Result<ClientConfig> {
    ClientConfig::load(path).with_context(|| format!("Failed to load configuration from {:?}", path))
}

/// Addresses from the command line followed by those from `--input`
fn collect_addresses(cli: &Cli) -> Result<Vec<String>> {
    let mut addresses = cli.addresses.clone();

    if let Some(path) = &cli.input {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read addresses from {:?}", path))?;
        addresses.extend(parse_address_list(&content));
    }

    Ok(addresses)
}

/// One address per line; blank lines and `#` comments are skipped
fn parse_address_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

async fn lookup(
    client: &NetAcuityClient,
    resolver: &dyn Resolver,
    address: &str,
) -> netacuity_client::Result<EdgeRecord> {
    let ip = match address.parse::<IpAddr>() {
        Ok(ip) => ip,
        Err(_) => {
            let ip = resolver.resolve(address).await?;
            debug!("{} resolved to {}", address, ip);
            ip
        }
    };
    client.lookup(&ip.to_string()).await
}

/// Print one result, returning whether the lookup succeeded
fn report(
    address: &str,
    result: netacuity_client::Result<EdgeRecord>,
    format: Option<&str>,
    quiet: bool,
) -> bool {
    match result {
        Ok(record) => {
            println!("{}", render(&record, format));
            true
        }
        Err(e) => {
            if !quiet {
                eprintln!("{}: {}", address, e);
            }
            false
        }
    }
}

fn render(record: &EdgeRecord, format: Option<&str>) -> String {
    match format {
        Some(template) => render_template(template, record),
        None => serde_json::to_string(record).unwrap_or_default(),
    }
}

/// Replace `{field}` placeholders with record values; unknown names are kept
fn render_template(template: &str, record: &EdgeRecord) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];

        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match record.field(name) {
                    Some(value) => out.push_str(&value),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}
