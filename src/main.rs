mod app;
mod cli;
mod routes;

use clap::Parser;
use cli::{Cli, Command, RunArgs};
use ferrule_core::lifecycle::logging::{LogOptions, init_logging};

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let command = cli.command.unwrap_or(Command::Run(RunArgs::default()));

    match command {
        Command::Run(args) => cmd_run(args),
        Command::Check(args) => cmd_check(args),
    }
}

fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    let (config, loaded) = app::load_config(&args)?;
    let _guard = init_logging(&LogOptions::from_config(&config));
    if !loaded {
        tracing::warn!("config file '{}' not found, using defaults", args.config);
    }

    // Build and run on a multi-thread runtime
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(app::Application::build(config).serve())
}

fn cmd_check(args: RunArgs) -> anyhow::Result<()> {
    let (config, loaded) = app::load_config(&args)?;
    if !loaded {
        println!("{} not found, showing defaults", args.config);
    }
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
