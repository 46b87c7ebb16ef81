use clap::{Parser, Subcommand};
use keyless_provenance::cli::{self, BuildArgs, ProvenanceArgs};
use std::process::ExitCode;

#[derive(Parser)]
#[command(author, version = cli::CLI_VERSION, about)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run `go build` from a build configuration and print what was run
    Build(BuildArgs),
    /// Sign build provenance and publish it to the transparency log
    Provenance(ProvenanceArgs),
}

fn main() -> ExitCode {
    // A logger that is already installed is not fatal
    if let Err(e) = keyless_provenance::init_logging() {
        eprintln!("{}", cli::format_error(&e));
    }

    // Every argument error exits 1; help and version exit 0.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                eprint!("{}", cli::usage());
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let result = match cli.command {
        Commands::Build(args) => cli::handlers::handle_build_command(args),
        Commands::Provenance(args) => cli::handlers::handle_provenance_command(args),
    };

    // Format and display any errors
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", cli::format_error(&e));
            ExitCode::FAILURE
        }
    }
}
