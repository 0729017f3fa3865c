use clap::Parser;
use sigex::adapter::inbound::cli::command::{Cli, Commands};
use sigex::adapter::inbound::cli::{check, run, status};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run::execute(&args.config).await?,
        Commands::Status(args) => status::execute(&args.config)?,
        Commands::Check(args) => check::execute(&args.config)?,
    }
    Ok(())
}
