use std::path::PathBuf;
use std::process::exit;

use clap::{ArgGroup, Parser};
use tracing::info;
use tracing_subscriber::EnvFilter;

use mrt2bmp::config::Config;
use mrt2bmp::sync::{MirrorBackend, SyncSource};

/// Replay archived MRT routing data as a live BMP stream.
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(group(ArgGroup::new("source").required(true)))]
struct Cli {
    /// Configuration file
    #[clap(short = 'c', long = "config", default_value = "mrt2bmp.yml")]
    config: PathBuf,

    /// Replay locally provided MRT files for the named router
    #[clap(short = 'r', long = "router", group = "source", value_name = "NAME")]
    router: Option<String>,

    /// Sync the named router from the RouteViews mirror; NAME=list prints
    /// the available routers
    #[clap(long = "routeviews", alias = "rv", group = "source", value_name = "NAME")]
    routeviews: Option<String>,

    /// Sync the named router from the RIPE RIS mirror; NAME=list prints the
    /// available routers
    #[clap(long = "ripe", alias = "rp", group = "source", value_name = "NAME")]
    ripe: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let (router, source) = resolve_source(&cli).await;

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            exit(2);
        }
    };

    let _log_guard = init_logging(&config, &router);

    info!(
        "starting mrt2bmp for router {} toward {}:{}",
        router,
        config.collector().host,
        config.collector().port
    );
    mrt2bmp::supervisor::run(config, &router, source).await;
}

/// Resolve the source flags. `list` is handled here and exits.
async fn resolve_source(cli: &Cli) -> (String, SyncSource) {
    if let Some(name) = &cli.routeviews {
        if name == "list" {
            print_routers(MirrorBackend::RouteViews).await;
        }
        return (name.clone(), SyncSource::Mirror(MirrorBackend::RouteViews));
    }
    if let Some(name) = &cli.ripe {
        if name == "list" {
            print_routers(MirrorBackend::RipeRis).await;
        }
        return (name.clone(), SyncSource::Mirror(MirrorBackend::RipeRis));
    }
    let name = cli.router.clone().expect("clap enforces one source flag");
    (name, SyncSource::Local)
}

async fn print_routers(backend: MirrorBackend) -> ! {
    match backend.list_routers().await {
        Ok(routers) => {
            for router in routers {
                println!("{router}");
            }
            exit(0);
        }
        Err(e) => {
            eprintln!("cannot list routers: {e}");
            exit(1);
        }
    }
}

/// Set up tracing: stderr, plus the rotating per-router log file when a log
/// directory is configured. The returned guard must stay alive for the
/// non-blocking file writer to flush.
fn init_logging(config: &Config, router: &str) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_new(&config.logging.level)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match &config.logging.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::never(
                directory,
                format!("openbmp-mrt2bmp_{router}.log"),
            );
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}
