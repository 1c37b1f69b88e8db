mod commands;
mod config;
mod error;
mod scenario;
mod session;

use std::env;

use ledger::{Amount, EventId};
use logger::logger;
use protocol::Message;

use commands::*;
use config::Config;
use error::CtlError;
use scenario::Scenario;
use session::{TcpTransport, Transport};

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  branch-ctl deposit <branch> <amount> <event_id>");
    eprintln!("  branch-ctl withdraw <branch> <amount> <event_id>");
    eprintln!("  branch-ctl query <branch> [last_event_id]");
    eprintln!("  branch-ctl stats <branch>");
    eprintln!();
    eprintln!("Scenario replay:");
    eprintln!("  branch-ctl run <scenario.json> [output.json]   - Replay customer events (default output: output.json)");
    eprintln!();
    eprintln!("Amounts are decimal with at most two fractional digits, e.g. 400 or 12.50");
    eprintln!();
    eprintln!("Config file ~/.branchrc (toml): host, base_port, connect_timeout_ms,");
    eprintln!("  request_timeout_ms (default: 60000, 0 = wait forever)");
    eprintln!();
    eprintln!("Environment variables:");
    eprintln!("  BRANCH_HOST      - Branch host (default: 127.0.0.1)");
    eprintln!("  BRANCH_BASE_PORT - Port of branch 1 (default: 8080)");
    eprintln!("  BRANCH_LOG       - Log filter (default: info)");
}

fn usage_error(message: &str) -> ! {
    eprintln!("Error: {}", message);
    print_usage();
    std::process::exit(1);
}

fn parse_arg<T: std::str::FromStr>(args: &[String], index: usize, name: &str) -> T
where
    T::Err: std::fmt::Display,
{
    let raw = match args.get(index) {
        Some(raw) => raw,
        None => usage_error(&format!("missing <{}>", name)),
    };
    match raw.parse() {
        Ok(value) => value,
        Err(e) => usage_error(&format!("invalid {} '{}': {}", name, raw, e)),
    }
}

fn main() {
    logger::setup_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    if let Err(e) = run(&args) {
        eprintln!("ERR {}", e);
        std::process::exit(1);
    }
}

fn run(args: &[String]) -> Result<(), CtlError> {
    let target = Config::load()?.resolve()?;
    let mut transport = TcpTransport::new(target);

    match args[1].as_str() {
        COMMAND_DEPOSIT | COMMAND_WITHDRAW => {
            if args.len() < 5 {
                usage_error(&format!("{} requires <branch> <amount> <event_id>", args[1]));
            }
            let branch: u32 = parse_arg(args, 2, "branch");
            let amount: Amount = parse_arg(args, 3, "amount");
            let event: EventId = parse_arg(args, 4, "event_id");

            let message = if args[1] == COMMAND_DEPOSIT {
                Message::deposit(amount, event)
            } else {
                Message::withdraw(amount, event)
            };
            let response = transport.call(branch, &message)?;
            println!(
                "OK {} {} (event {}) on branch {}, balance: {}",
                args[1].to_uppercase(),
                amount,
                event,
                branch,
                response.amount()
            );
        }
        COMMAND_QUERY => {
            if args.len() < 3 {
                usage_error("query requires <branch>");
            }
            let branch: u32 = parse_arg(args, 2, "branch");
            let last_write = if args.len() > 3 {
                Some(parse_arg::<EventId>(args, 3, "last_event_id"))
            } else {
                None
            };

            let response = transport.call(branch, &Message::query_balance(last_write))?;
            println!("{}", response.amount());
        }
        COMMAND_STATS => {
            if args.len() < 3 {
                usage_error("stats requires <branch>");
            }
            let branch: u32 = parse_arg(args, 2, "branch");

            let response = transport.call(branch, &Message::stats())?;
            println!("{}", response.body);
        }
        COMMAND_RUN => {
            if args.len() < 3 {
                usage_error("run requires <scenario.json>");
            }
            let output_path = args.get(3).map(|s| s.as_str()).unwrap_or(DEFAULT_OUTPUT);

            let scenario = Scenario::from_file(&args[2])?;
            let output = scenario::replay(&scenario, &mut transport);
            scenario::write_output(output_path, &output)?;

            let events: usize = output.iter().map(|c| c.recv.len()).sum();
            println!(
                "OK replayed {} events for {} customers, wrote {}",
                events,
                output.len(),
                output_path
            );
        }
        other => usage_error(&format!("unknown command '{}'", other)),
    }

    Ok(())
}
