use clap::{Parser, Subcommand};
use colored::*;
use comfy_table::{presets::UTF8_FULL, Table};
use hbar_swap_optimizer::{
    Config, Dispatcher, LogEntry, OptimizationResult, OptimizeRequest, PipelineReport, QuoteSet,
    Result, Route, SwapError, SwapOptimizer,
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Read;
use std::str::FromStr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "swapopt")]
#[command(about = "HBAR Swap Optimizer - Find, pick and settle the best swap route", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(short, long, global = true)]
    json: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List candidate routes for a swap
    Routes {
        /// Amount to swap
        amount: String,

        /// Input token symbol
        from: String,

        /// Output token symbol
        to: String,
    },

    /// Gather routes and pick the best one
    Optimize {
        /// Amount to swap
        amount: String,

        /// Input token symbol
        from: String,

        /// Output token symbol
        to: String,
    },

    /// Run the full pipeline from a plain-language request
    Swap {
        /// e.g. "swap 10 HBAR to USDC"
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },

    /// Send a raw tool request to the dispatcher
    Call {
        /// Request body, or "-" to read it from stdin
        body: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_json);

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            eprintln!("\nCheck the values in your .env file.");
            std::process::exit(1);
        }
    };

    let optimizer = match SwapOptimizer::new(config) {
        Ok(opt) => opt,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Routes { amount, from, to } => {
            handle_routes(&optimizer, &amount, &from, &to, cli.json).await
        }
        Commands::Optimize { amount, from, to } => {
            handle_optimize(&optimizer, &amount, &from, &to, cli.json).await
        }
        Commands::Swap { query } => handle_swap(&optimizer, &query.join(" "), cli.json).await,
        Commands::Call { body } => handle_call(optimizer, &body).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool, log_json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    let installed = if log_json {
        builder.json().try_init()
    } else {
        builder.without_time().try_init()
    };

    if let Err(e) = installed {
        eprintln!("{} failed to install log subscriber: {}", "Warning:".yellow().bold(), e);
    }
}

fn parse_amount(raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw.trim())
        .map_err(|e| SwapError::InvalidAmount(format!("could not parse '{}': {}", raw, e)))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn handle_routes(
    optimizer: &SwapOptimizer,
    amount: &str,
    from: &str,
    to: &str,
    json_output: bool,
) -> Result<()> {
    let amount = parse_amount(amount)?;
    let quotes = optimizer.get_routes(from, to, amount).await?;

    if json_output {
        print_json(&quotes)
    } else {
        print_routes(&quotes);
        Ok(())
    }
}

async fn handle_optimize(
    optimizer: &SwapOptimizer,
    amount: &str,
    from: &str,
    to: &str,
    json_output: bool,
) -> Result<()> {
    let amount = parse_amount(amount)?;
    let quotes = optimizer.get_routes(from, to, amount).await?;
    let result = optimizer
        .optimize(&OptimizeRequest {
            routes: quotes.routes.clone(),
            amount: quotes.amount,
            from: quotes.from.clone(),
            to: quotes.to.clone(),
        })
        .await?;

    if json_output {
        print_json(&result)
    } else {
        print_routes(&quotes);
        print_selection(&result);
        Ok(())
    }
}

async fn handle_swap(optimizer: &SwapOptimizer, query: &str, json_output: bool) -> Result<()> {
    if !json_output {
        println!("\n{}", "━".repeat(60).bright_cyan());
        println!("  {}", "Running Swap Pipeline".bright_cyan().bold());
        println!("{}", "━".repeat(60).bright_cyan());
        println!("  Request: {}", query.bright_white().bold());
    }

    let report = optimizer.run(query).await?;

    if json_output {
        print_json(&report)
    } else {
        print_report(&report);
        Ok(())
    }
}

async fn handle_call(optimizer: SwapOptimizer, body: &str) -> Result<()> {
    let body = if body == "-" {
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        body.to_string()
    };

    let dispatcher = Dispatcher::new(Arc::new(optimizer));
    let response = dispatcher.handle(&body).await;

    print_json(&response)?;

    if response.is_success() {
        Ok(())
    } else {
        Err(SwapError::Other(anyhow::anyhow!(
            "request failed with status {}",
            response.status
        )))
    }
}

fn print_routes(quotes: &QuoteSet) {
    println!("\n{}", "━".repeat(60).bright_cyan());
    println!(
        "  {} - {} {} → {}",
        "Candidate Routes".bright_cyan().bold(),
        quotes.amount.to_string().bright_yellow().bold(),
        quotes.from.bright_white(),
        quotes.to.bright_white()
    );
    println!("{}", "━".repeat(60).bright_cyan());
    println!();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        "ID".bright_white().bold().to_string(),
        "Source".bright_white().bold().to_string(),
        "Path".bright_white().bold().to_string(),
        "Est. Out".bright_white().bold().to_string(),
        "Slippage".bright_white().bold().to_string(),
        "Fee".bright_white().bold().to_string(),
    ]);

    for route in &quotes.routes {
        table.add_row(route_row(route));
    }

    println!("{}", table);
    println!();
}

fn route_row(route: &Route) -> Vec<String> {
    vec![
        route.id.bright_black().to_string(),
        route.source.bright_cyan().to_string(),
        route.describe_path(),
        route.estimated_out.to_string().bright_green().to_string(),
        format!("{:.2}%", route.slippage_percent),
        format!("{:.2}%", route.fee_percent),
    ]
}

fn print_selection(result: &OptimizationResult) {
    println!("{}", "━".repeat(60).bright_green());
    println!("  {}", "Best Route".bright_green().bold());
    println!("{}", "━".repeat(60).bright_green());
    println!();
    println!("  {} {}", "Route:".bright_white().bold(), result.best.id.bright_cyan().bold());
    println!("  {} {}", "Source:".bright_white().bold(), result.best.source);
    println!("  {} {}", "Path:".bright_white().bold(), result.best.describe_path());
    println!(
        "  {} {}",
        "Est. Out:".bright_white().bold(),
        result.best.estimated_out.to_string().bright_green().bold()
    );
    println!("  {} {}", "Reason:".bright_white().bold(), result.reason.bright_yellow());
    if let Some(err) = &result.error {
        println!("  {} {}", "Scorer error:".bright_white().bold(), err.bright_red());
    }
    println!();
}

fn print_report(report: &PipelineReport) {
    print_routes(&report.quotes);
    print_selection(&report.optimization);

    let receipt = &report.receipt;
    println!("{}", "━".repeat(60).bright_blue());
    println!("  {}", "Execution".bright_blue().bold());
    println!("{}", "━".repeat(60).bright_blue());
    println!();
    println!("  {} {}", "Transaction:".bright_white().bold(), receipt.transaction_id.bright_cyan());
    println!("  {} {}", "Status:".bright_white().bold(), receipt.status.to_string().bright_green().bold());
    println!(
        "  {} {} {} → {} {}",
        "Swap:".bright_white().bold(),
        receipt.amount_in.to_string().bright_cyan(),
        receipt.from_token,
        receipt.amount_out.to_string().bright_green(),
        receipt.to_token
    );
    println!();

    print_log(&report.log);
}

fn print_log(log: &LogEntry) {
    println!("{}", "━".repeat(60).bright_magenta());
    println!("  {}", "Ledger".bright_magenta().bold());
    println!("{}", "━".repeat(60).bright_magenta());
    println!();

    let status = if log.is_error() {
        log.status.bright_red().bold()
    } else {
        log.status.bright_green().bold()
    };
    println!("  {} {}", "Status:".bright_white().bold(), status);
    if let Some(tx_id) = &log.tx_id {
        println!("  {} {}", "Tx:".bright_white().bold(), tx_id.bright_cyan());
    }
    if let Some(err) = &log.error {
        println!("  {} {}", "Error:".bright_white().bold(), err.bright_red());
    }
    println!();
}
