//! `rigkit`: a thin CLI front-end over the engine kernel. Parses a
//! `RunRequest`-shaped invocation, runs it, and maps the outcome to a
//! process exit code (SPEC_FULL.md §3.1, §6).

mod args;
mod commands;
mod reporter;
mod run;

use clap::Parser;

fn main() {
    let cli = args::Cli::parse();
    let exit_code = run::run(cli);
    std::process::exit(exit_code.as_i32());
}
