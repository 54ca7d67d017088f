use clap::{CommandFactory, Parser};
use ideam_processor::cli::{args::Args, commands};
use std::process;
use tokio_util::sync::CancellationToken;

fn main() {
    let args = Args::parse();

    // No subcommand: show help and the available commands
    if args.command.is_none() {
        let _ = Args::command().print_help();
        println!();
        process::exit(0);
    }

    let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("Failed to create async runtime: {}", e);
        process::exit(1);
    });

    let result = runtime.block_on(async {
        let cancellation_token = CancellationToken::new();

        // Ctrl+C stops the current pass between files; the command still
        // reports what was merged and which files are pending
        let signal_token = cancellation_token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nReceived CTRL+C, finishing the current files...");
                signal_token.cancel();
            }
        });

        commands::run(args, cancellation_token).await
    });

    match result {
        Ok(status) => process::exit(status),
        Err(error) => {
            eprintln!("Error: {:#}", error);
            process::exit(1);
        }
    }
}
