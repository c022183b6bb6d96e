mod app;
mod manager;
mod models;
mod worker;

use clap::Parser;

use app::cli::{self, Args};

fn main() -> anyhow::Result<()> {
    app::logging::init();
    let args = Args::parse();
    cli::run(args)
}
