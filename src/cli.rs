// File: ./src/cli.rs
//! Command-line parsing and the host commands behind the `inbound-invites` binary.

use crate::config::Config;
use crate::model::entries_to_ics;
use crate::repository::{NodeId, Repository};
use crate::store::{EmailHeaders, MemoryRepository};
use crate::triggers::{ChangeKind, Dispatch, DispatchStatus, TriggerTable};
use anyhow::{Context, Result};
use chrono::Utc;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Provision {
        group: String,
    },
    Deliver {
        alias: String,
        files: Vec<PathBuf>,
        from: Option<String>,
        to: Option<String>,
    },
    Export {
        group: String,
    },
}

impl Command {
    /// Whether the repository snapshot must be written back afterwards.
    pub fn mutates(&self) -> bool {
        matches!(self, Command::Provision { .. } | Command::Deliver { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub root: Option<PathBuf>,
    pub command: Command,
}

/// Parses the arguments following the binary name.
pub fn parse_args(args: &[String]) -> Result<Invocation> {
    let mut root: Option<PathBuf> = None;
    let mut from: Option<String> = None;
    let mut to: Option<String> = None;
    let mut positional: Vec<String> = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" | "help" => {
                return Ok(Invocation {
                    root,
                    command: Command::Help,
                });
            }
            flag @ ("--root" | "-r" | "--from" | "--to") => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| anyhow::anyhow!("{} needs a value", flag))?
                    .clone();
                match flag {
                    "--from" => from = Some(value),
                    "--to" => to = Some(value),
                    _ => root = Some(PathBuf::from(value)),
                }
                i += 1; // Also consumed the value
            }
            arg if arg.starts_with('-') && arg.len() > 1 => {
                anyhow::bail!("Unknown option '{}'", arg);
            }
            arg => positional.push(arg.to_string()),
        }
        i += 1;
    }

    let mut positional = positional.into_iter();
    let command = match positional.next().as_deref() {
        None => Command::Help,
        Some("provision") => Command::Provision {
            group: positional
                .next()
                .ok_or_else(|| anyhow::anyhow!("provision needs a group id"))?,
        },
        Some("export") => Command::Export {
            group: positional
                .next()
                .ok_or_else(|| anyhow::anyhow!("export needs a group id"))?,
        },
        Some("deliver") => {
            let alias = positional
                .next()
                .ok_or_else(|| anyhow::anyhow!("deliver needs an alias"))?;
            let files: Vec<PathBuf> = positional.by_ref().map(PathBuf::from).collect();
            if files.is_empty() {
                anyhow::bail!("deliver needs at least one attachment file");
            }
            Command::Deliver {
                alias,
                files,
                from,
                to,
            }
        }
        Some(other) => anyhow::bail!("Unknown command '{}'", other),
    };

    if positional.next().is_some() {
        anyhow::bail!("Too many arguments");
    }

    Ok(Invocation { root, command })
}

/// Runs `command` against `repo`, writing human-readable output to `out`.
pub fn execute(
    repo: &mut MemoryRepository,
    table: &TriggerTable,
    config: &Config,
    command: &Command,
    out: &mut dyn Write,
) -> Result<()> {
    match command {
        Command::Help => print_help_to(out, "inbound-invites")?,
        Command::Provision { group } => {
            let top = repo.root.clone();
            let kind = match repo.child_by_name(&top, group)? {
                Some(_) => ChangeKind::NodeUpdated,
                None => ChangeKind::NodeCreated,
            };
            let root = repo.create_group(group)?;
            let results = table.dispatch(repo, kind, &root);
            report(out, &results)?;
        }
        Command::Deliver {
            alias,
            files,
            from,
            to,
        } => {
            let email = deliver(repo, config, alias, files, from.as_deref(), to.as_deref())?;
            writeln!(out, "Delivered email {}", email)?;
            let results = table.dispatch(repo, ChangeKind::NodeUpdated, &email);
            report(out, &results)?;
        }
        Command::Export { group } => {
            let entries = match repo.group_container(group, &config.calendar_component)? {
                Some(calendar) => repo.entries_in(&calendar),
                None => Vec::new(),
            };
            write!(out, "{}", entries_to_ics(&entries))?;
        }
    }
    Ok(())
}

/// Drops an email with `files` attached into the inbox carrying `alias`.
pub fn deliver(
    repo: &mut MemoryRepository,
    config: &Config,
    alias: &str,
    files: &[PathBuf],
    from: Option<&str>,
    to: Option<&str>,
) -> Result<NodeId> {
    let inbox = repo
        .resolve_alias(alias)
        .ok_or_else(|| anyhow::anyhow!("No inbox is registered for alias '{}'", alias))?;

    let stem = format!("email-{}", uuid::Uuid::new_v4());
    let headers = EmailHeaders {
        from: from.map(str::to_string),
        to: to.map(str::to_string),
        recipients: to.map(|t| vec![t.to_string()]).unwrap_or_default(),
        subject: None,
        sent: Some(Utc::now()),
    };
    let email = repo.add_email(&inbox, &format!("{}.eml", stem), &config.email_marker, &headers)?;

    for path in files {
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read '{}'", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());
        let mime = guess_mime_type(path, config);
        repo.add_attachment(&email, &format!("{}-{}", stem, file_name), &mime, bytes)?;
    }
    Ok(email)
}

/// `.ics` files get the configured calendar type; anything else is opaque.
pub fn guess_mime_type(path: &Path, config: &Config) -> String {
    let is_ics = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("ics"));
    if is_ics {
        config.calendar_mime_type.clone()
    } else {
        FALLBACK_MIME_TYPE.to_string()
    }
}

fn report(out: &mut dyn Write, results: &[Dispatch]) -> Result<()> {
    for d in results {
        match &d.status {
            DispatchStatus::Handled(summary) => writeln!(out, "  {}: {}", d.binding, summary)?,
            DispatchStatus::Rejected => writeln!(out, "  {}: not applicable", d.binding)?,
            DispatchStatus::Failed(reason) => writeln!(out, "  {}: FAILED: {}", d.binding, reason)?,
        }
    }
    Ok(())
}

pub fn print_help(binary_name: &str) {
    let mut stdout = std::io::stdout();
    let _ = print_help_to(&mut stdout, binary_name);
}

fn print_help_to(out: &mut dyn Write, binary_name: &str) -> std::io::Result<()> {
    writeln!(
        out,
        "Inbound Invites v{} - turn emailed calendar invitations into group calendar entries",
        env!("CARGO_PKG_VERSION")
    )?;
    writeln!(out)?;
    writeln!(out, "USAGE:")?;
    writeln!(out, "    {} [--root <path>] provision <group>", binary_name)?;
    writeln!(
        out,
        "    {} [--root <path>] deliver <alias> <file>... [--from <addr>] [--to <addr>]",
        binary_name
    )?;
    writeln!(out, "    {} [--root <path>] export <group>", binary_name)?;
    writeln!(out, "    {} --help", binary_name)?;
    writeln!(out)?;
    writeln!(out, "OPTIONS:")?;
    writeln!(out, "    -r, --root <path>     Use a different directory for config and data.")?;
    writeln!(out, "    --from <addr>         Sender recorded on a delivered email.")?;
    writeln!(out, "    --to <addr>           Recipient recorded on a delivered email.")?;
    writeln!(out, "    -h, --help            Show this help message.")?;
    writeln!(out)?;
    writeln!(out, "COMMANDS:")?;
    writeln!(
        out,
        "    provision <group>     Create the group if needed and set up its invitation inbox."
    )?;
    writeln!(
        out,
        "    deliver <alias> ...   Drop an email with the given files attached into the inbox"
    )?;
    writeln!(
        out,
        "                          routed by <alias>; .ics files are treated as invitations."
    )?;
    writeln!(out, "    export <group>        Print the group calendar as an .ics document.")?;
    writeln!(out)?;
    writeln!(out, "EXAMPLES:")?;
    writeln!(out, "    {} provision finance", binary_name)?;
    writeln!(
        out,
        "    {} deliver finance budget.ics agenda.pdf --from cfo@example.com",
        binary_name
    )?;
    writeln!(out, "    {} export finance > finance.ics", binary_name)?;
    Ok(())
}
