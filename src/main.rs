use clap::{CommandFactory, Parser};
use precip_grid::cli::{Args, commands};
use std::process;
use tokio_util::sync::CancellationToken;

fn main() {
    let args = Args::parse();

    // No subcommand: show help instead of touching the store
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

        // On Ctrl+C the importer sees the token, rolls back and returns
        let signal_token = cancellation_token.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    eprintln!("\nReceived CTRL+C, rolling back the current import...");
                    signal_token.cancel();
                }
                Err(e) => eprintln!("Failed to install CTRL+C handler: {}", e),
            }
        });

        commands::run(args, cancellation_token).await
    });

    match result {
        Ok(()) => process::exit(0),
        Err(error) => {
            eprintln!("Error: {:#}", error);
            process::exit(1);
        }
    }
}
