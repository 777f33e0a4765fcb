// Binary entry point for the command-line host.
use anyhow::Result;
use inbound_invites::cli::{self, Command};
use inbound_invites::config::Config;
use inbound_invites::context::StandardContext;
use inbound_invites::logging;
use inbound_invites::storage::SnapshotStorage;
use inbound_invites::triggers::TriggerTable;
use std::env;

const BINARY_NAME: &str = "inbound-invites";

fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();

    let invocation = match cli::parse_args(&args) {
        Ok(inv) => inv,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Run '{} --help' for usage.", BINARY_NAME);
            std::process::exit(2);
        }
    };

    if invocation.command == Command::Help {
        cli::print_help(BINARY_NAME);
        return Ok(());
    }

    let ctx = StandardContext::new(invocation.root.clone());
    let config = Config::load_or_default(&ctx)?;
    logging::init(&ctx, config.log_level_filter())?;

    let table = TriggerTable::standard(&config);
    let mut stdout = std::io::stdout().lock();
    let command = &invocation.command;

    if command.mutates() {
        SnapshotStorage::modify(&ctx, |repo| {
            cli::execute(repo, &table, &config, command, &mut stdout)
        })
    } else {
        let mut repo = SnapshotStorage::load(&ctx)?;
        cli::execute(&mut repo, &table, &config, command, &mut stdout)
    }
}
