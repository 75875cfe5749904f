use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use log::{error, info};

mod args;
use args::Args;

mod auth;
mod backend;
mod config;
mod dashboard;
mod feed;
mod field;
mod flash;
mod pages;
mod password;
mod routes;
mod time;
mod user;

use backend::Backend;
use dashboard::Dashboard;
use feed::FeedClient;
use pages::Pages;

#[tokio::main]
async fn main() -> ExitCode {
    pretty_env_logger::formatted_builder()
        .parse_filters(&std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let addr = match args.addr() {
        Ok(addr) => addr,
        Err(e) => {
            error!("invalid listen address: {e}");
            return ExitCode::FAILURE;
        }
    };

    let backend = match Backend::new(args.data_dir()).await {
        Ok(backend) => backend,
        Err(e) => {
            error!("couldn't open database in {}: {e}", args.data_dir().display());
            return ExitCode::FAILURE;
        }
    };

    let config = args.config();
    if config.channel.id.is_empty() {
        error!("no channel configured, sensor pages will be empty");
    }

    let feeds = match FeedClient::new(config.channel.clone()) {
        Ok(feeds) => feeds,
        Err(e) => {
            error!("couldn't create upstream client: {e}");
            return ExitCode::FAILURE;
        }
    };

    let pages = match Pages::new() {
        Ok(pages) => pages,
        Err(e) => {
            error!("couldn't load templates: {e:?}");
            return ExitCode::FAILURE;
        }
    };

    let dash = Arc::new(Dashboard::new(backend, feeds, config));
    let routes = routes::routes(dash, pages);

    info!("listening on {addr}");
    warp::serve(routes).run(addr).await;

    ExitCode::SUCCESS
}
