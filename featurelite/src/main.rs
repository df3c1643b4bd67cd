mod cli;
mod commands;
mod runtime;
mod stdio_rpc;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use runtime::{Runtime, Settings};

/// Per-thread heap accounting for sandbox runs.
#[global_allocator]
static GLOBAL: featurelite_sandbox::heap::TrackingAllocator = featurelite_sandbox::heap::TrackingAllocator;

fn main() -> Result<()> {
    featurelite_core::observability::init_tracing();
    let cli = Cli::parse();
    let settings = Settings::load(cli.timeout_ms, cli.max_source_bytes);

    let output = match cli.command {
        Commands::CheckPlan { plan } => {
            commands::candidate::check_plan(&settings, &commands::read_file_or_stdin(&plan)?)?
        }
        Commands::Scan { code, json } => commands::candidate::scan(&settings, &code, json)?,
        Commands::Sandbox { code } => commands::candidate::sandbox(&settings, &code)?,
        Commands::Submit { plan, code } => {
            let runtime = Runtime::open(&settings)?;
            commands::candidate::submit(&runtime, &plan, &code)?
        }
        Commands::List { json } => commands::feature::list(&Runtime::open(&settings)?, json)?,
        Commands::Show { id } => commands::feature::show(&Runtime::open(&settings)?, &id)?,
        Commands::Invoke { id, input_json } => {
            let input_json = commands::arg_or_stdin(input_json)?;
            commands::feature::invoke(&Runtime::open(&settings)?, &id, &input_json)?
        }
        Commands::Delete { id } => commands::feature::delete(&Runtime::open(&settings)?, &id)?,
        Commands::Serve { stdio } => {
            if stdio {
                stdio_rpc::serve_stdio(Runtime::open(&settings)?)?;
            }
            return Ok(());
        }
    };
    println!("{}", output);
    Ok(())
}
