pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "tacoexpress",
    about = "TacoExpress orders operator CLI",
    long_about = "Operate the TacoExpress orders service: migrations, config inspection, readiness checks, offline pricing and identity tokens.",
    after_help = "Examples:\n  tacoexpress doctor --json\n  tacoexpress price --item 20.00x2 --item 18x1 --coupon TACO10\n  tacoexpress token --user-id 7"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, identity signing and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(
        about = "Price order lines offline with the default pricing rules (flat delivery fee, TACO10)"
    )]
    Price {
        #[arg(long = "item", required = true, value_name = "UNIT_PRICExQTY")]
        items: Vec<String>,
        #[arg(long)]
        coupon: Option<String>,
        #[arg(long, value_name = "AMOUNT", help = "Override the flat delivery fee")]
        delivery_fee: Option<String>,
    },
    #[command(about = "Mint a signed identity token for a user id")]
    Token {
        #[arg(long)]
        user_id: i64,
        #[arg(long, help = "Token lifetime; defaults to auth.token_ttl_secs")]
        ttl_secs: Option<u64>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Price { items, coupon, delivery_fee } => {
            commands::price::run(&items, coupon.as_deref(), delivery_fee.as_deref())
        }
        Command::Token { user_id, ttl_secs } => commands::token::run(user_id, ttl_secs),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
