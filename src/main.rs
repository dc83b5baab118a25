use clap::Parser;
use egasa_datamart::cli::{args::Args, commands};
use std::process;

fn main() {
    let args = Args::parse();

    // If no subcommand was provided, show the short command overview
    if args.command.is_none() {
        show_help_and_commands();
        process::exit(0);
    }

    match commands::run(args) {
        Ok(()) => process::exit(0),
        Err(error) => {
            eprintln!("Error: {}", error);
            process::exit(1);
        }
    }
}

/// Show help information when no subcommand is provided
fn show_help_and_commands() {
    println!("EGASA Data-Mart Normalizer");
    println!("==========================");
    println!();
    println!("Normalize EGASA's irregular spreadsheet exports (generation, hydrology,");
    println!("billing, contracts, energy balance) into a long-format CSV data mart.");
    println!();
    println!("USAGE:");
    println!("    egasa_datamart <COMMAND> [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("    run       Run the full normalization pipeline (main command)");
    println!("    plants    Print the canonical plant reference table");
    println!("    sources   Show which landing file each source pattern matches");
    println!("    help      Show this help message or help for specific commands");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help       Show help information");
    println!("    -V, --version    Show version information");
    println!();
    println!("EXAMPLES:");
    println!("    # Run against the default directories (./data_landing -> ./data_mart):");
    println!("    egasa_datamart run");
    println!();
    println!("    # Run with explicit directories, continuing past validation failures:");
    println!("    egasa_datamart run --input /srv/landing --output /srv/mart --no-strict");
    println!();
    println!("    # Re-normalize one 15-minute partition from a corrected export:");
    println!("    egasa_datamart run --month 202501");
    println!();
    println!("    # Print the plant reference as JSON:");
    println!("    egasa_datamart plants --format json");
    println!();
    println!("    # Check which landing files the configured patterns would pick:");
    println!("    egasa_datamart sources -i /srv/landing");
    println!();
    println!("For detailed help on any command, use:");
    println!("    egasa_datamart <COMMAND> --help");
}
