use std::io;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use fern::colors::{Color, ColoredLevelConfig};
use log::{info, LevelFilter};

mod access;
mod chart;
mod command;
mod config;
mod console;
mod datetime;
mod error;
mod export;
mod hours;
mod model;
mod period;
mod report;
mod repository;
mod source;
mod summary;

use access::Principal;
use command::SubCommands;
use config::Config;
use console::{ConsoleJson, ConsoleMarkdownList};
use report::ReportService;
use repository::Repository;
use source::Source;

/// 作業時間と請求のレポートを表示するためのCLIアプリケーション。
///
/// # Examples
/// ```
/// $ cargo run -- --as alice report --period current_month
/// $ cargo run -- --as admin chart alice bob --sum --from 2024-01-01 --to 2024-03-31
/// $ cargo run -- --as acme-user summary --order-by -amount
/// ```
#[derive(Debug, Parser)]
#[clap(version, about)]
struct Args {
    #[clap(
        long = "as",
        global = true,
        help = "User making the request, defaults to EFF_USER"
    )]
    principal: Option<String>,

    #[clap(
        long = "source",
        global = true,
        help = "Snapshot file or URL, defaults to EFF_SOURCE"
    )]
    source: Option<String>,

    #[clap(long = "json", global = true, help = "Print reports as JSON")]
    json: bool,

    #[clap(short = 'v', long = "verbose", global = true, help = "Show debug logs")]
    verbose: bool,

    #[clap(subcommand)]
    subcommand: SubCommands,
}

/// ログの出力先を標準エラー出力に設定する。
fn setup_logger(verbose: bool) -> Result<()> {
    let colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Cyan);
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S"),
                colors.color(record.level()),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(io::stderr())
        .apply()
        .context("Failed to set up logger")?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logger(args.verbose)?;

    let config = Config::load().context("Failed to load config")?;
    let location = args
        .source
        .or_else(|| config.source.clone())
        .ok_or_else(|| anyhow!("No snapshot source given, use --source or EFF_SOURCE"))?;
    let snapshot = Source::parse(&location, config.api_token.clone())
        .load()
        .await
        .context("Failed to load snapshot")?;

    let username = args
        .principal
        .or_else(|| config.username.clone())
        .ok_or_else(|| anyhow!("No requesting user given, use --as or EFF_USER"))?;
    let profile = snapshot
        .profile(&username)
        .ok_or_else(|| anyhow!("Unknown user: {}", username))?;
    let principal = Principal::from_profile(&profile);
    info!("Requesting as {}", principal.username);

    let calendar = config.calendar()?;
    let service = ReportService::new(&snapshot, calendar, &config);
    let mut stdout = io::stdout();
    if args.json {
        let mut presenter = ConsoleJson::new(&mut stdout);
        command::run(&service, &principal, args.subcommand, &mut presenter)?;
    } else {
        let mut presenter = ConsoleMarkdownList::new(&mut stdout);
        command::run(&service, &principal, args.subcommand, &mut presenter)?;
    }

    Ok(())
}
