// Entrypoint for the CLI application.
// - Keeps `main` small: parse arguments and hand them to `cli::run`.
// - Returns `anyhow::Result` so fatal errors print with their context chain.

use clap::Parser;

mod cli;

fn main() -> anyhow::Result<()> {
    let args = cli::CliArgs::parse();
    cli::run(args)
}
