//! # Keyward Operator Tool
//!
//! Manages a license database from the shell, without the bot running.
//!
//! ## Usage
//! ```bash
//! # Issue 10 codes for role 7 in guild 1
//! cargo run -p keyward-db --bin keyward -- generate 1 7 10
//!
//! # Show up to 20 unredeemed codes
//! cargo run -p keyward-db --bin keyward -- list 1 7 20
//!
//! # Redeem a code on behalf of member 3
//! cargo run -p keyward-db --bin keyward -- redeem 1 3 ABCDE-12345-FFFFF-00000
//!
//! # Work on another database file
//! cargo run -p keyward-db --bin keyward -- --db staging expired
//! ```
//!
//! Every command prints one JSON document on stdout. Logs go to stderr and
//! follow `RUST_LOG`.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde_json::json;
use std::env;
use tracing::info;
use tracing_subscriber::EnvFilter;

use keyward_core::{GuildConfig, GuildId, MemberId, RoleId};
use keyward_db::{LicenseStore, StoreConfig};

const DEFAULT_DB_NAME: &str = "main";
const DEFAULT_LIST_LIMIT: u32 = 25;
const DEFAULT_EXPIRED_LIMIT: u32 = 100;

const USAGE: &str = "\
Keyward license store tool

Usage: keyward [--db <NAME>] <COMMAND>

Commands:
  generate <GUILD> <ROLE> <COUNT>   Issue COUNT new license codes
  list <GUILD> <ROLE> [LIMIT]       Show unredeemed codes (default limit 25)
  redeem <GUILD> <MEMBER> <CODE>    Redeem CODE for MEMBER
  default-role <GUILD>              Show the guild's default license role
  config <GUILD>                    Show the guild's settings
  member <GUILD> <MEMBER>           Show a member's grant if still valid
  expired [LIMIT]                   Show grants past their expiry (default 100)
  backup                            Write a timestamped copy of the database

Options:
  -d, --db <NAME>    Database name under KEYWARD_DB_DIR (default: main)
  -h, --help         Show this help message";

/// Parsed command line.
#[derive(Debug)]
enum Command {
    Generate {
        guild: GuildId,
        role: RoleId,
        count: usize,
    },
    List {
        guild: GuildId,
        role: RoleId,
        limit: u32,
    },
    Redeem {
        guild: GuildId,
        member: MemberId,
        code: String,
    },
    DefaultRole {
        guild: GuildId,
    },
    Config {
        guild: GuildId,
    },
    Member {
        guild: GuildId,
        member: MemberId,
    },
    Expired {
        limit: u32,
    },
    Backup,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() || args.iter().any(|a| a == "-h" || a == "--help") {
        println!("{USAGE}");
        return Ok(());
    }

    let (db_name, command) = parse_args(&args)?;

    let config = StoreConfig::from_env().context("invalid store configuration")?;
    let store = LicenseStore::open(config, &db_name)
        .await
        .with_context(|| format!("cannot open database '{db_name}'"))?;

    let result = run(&store, command).await;
    store.close().await;

    let output = result?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Initializes stderr logging, filtered by `RUST_LOG`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,keyward=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Splits `--db <name>` from the positional command.
fn parse_args(args: &[String]) -> Result<(String, Command)> {
    let mut db_name = DEFAULT_DB_NAME.to_string();
    let mut positional = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-d" | "--db" => {
                let Some(name) = args.get(i + 1) else {
                    bail!("--db requires a database name");
                };
                db_name = name.clone();
                i += 1;
            }
            other => positional.push(other),
        }
        i += 1;
    }

    let command = match positional.as_slice() {
        ["generate", guild, role, count] => Command::Generate {
            guild: guild.parse()?,
            role: role.parse()?,
            count: count.parse().context("COUNT must be a number")?,
        },
        ["list", guild, role] => Command::List {
            guild: guild.parse()?,
            role: role.parse()?,
            limit: DEFAULT_LIST_LIMIT,
        },
        ["list", guild, role, limit] => Command::List {
            guild: guild.parse()?,
            role: role.parse()?,
            limit: limit.parse().context("LIMIT must be a number")?,
        },
        ["redeem", guild, member, code] => Command::Redeem {
            guild: guild.parse()?,
            member: member.parse()?,
            code: code.to_string(),
        },
        ["default-role", guild] => Command::DefaultRole {
            guild: guild.parse()?,
        },
        ["config", guild] => Command::Config {
            guild: guild.parse()?,
        },
        ["member", guild, member] => Command::Member {
            guild: guild.parse()?,
            member: member.parse()?,
        },
        ["expired"] => Command::Expired {
            limit: DEFAULT_EXPIRED_LIMIT,
        },
        ["expired", limit] => Command::Expired {
            limit: limit.parse().context("LIMIT must be a number")?,
        },
        ["backup"] => Command::Backup,
        _ => bail!("unrecognized command; run with --help for usage"),
    };

    Ok((db_name, command))
}

async fn run(store: &LicenseStore, command: Command) -> Result<serde_json::Value> {
    let output = match command {
        Command::Generate { guild, role, count } => {
            let codes = store.licenses().generate_licenses(count, guild, role).await?;
            info!(count = codes.len(), "Generated licenses");
            json!({ "guild_id": guild, "role_id": role, "licenses": codes })
        }
        Command::List { guild, role, limit } => {
            let codes = store.licenses().list_licenses(limit, guild, role).await?;
            json!({ "guild_id": guild, "role_id": role, "licenses": codes })
        }
        Command::Redeem {
            guild,
            member,
            code,
        } => {
            let grant = store
                .licenses()
                .redeem_for_member(&code, guild, member)
                .await?;
            serde_json::to_value(grant)?
        }
        Command::DefaultRole { guild } => {
            let role = store.guilds().get_default_license_role(guild).await?;
            let hours = store.guilds().default_license_duration(guild).await?;
            json!({ "guild_id": guild, "role_id": role, "duration_hours": hours })
        }
        Command::Config { guild } => {
            let config = store
                .guilds()
                .get(guild)
                .await?
                .unwrap_or_else(|| GuildConfig::new(guild));
            json!({
                "config": config,
                "log_channel": config.active_log_channel(),
                "join_role": config.active_join_role(),
            })
        }
        Command::Member { guild, member } => {
            let grant = store.members().active(member, guild, Utc::now()).await?;
            json!({ "guild_id": guild, "member_id": member, "grant": grant })
        }
        Command::Expired { limit } => {
            let grants = store.members().expired(Utc::now(), limit).await?;
            serde_json::to_value(grants)?
        }
        Command::Backup => {
            let path = store.backup().await?;
            json!({ "backup": path.display().to_string() })
        }
    };

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(line: &str) -> Vec<String> {
        line.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn test_parse_generate() {
        let (db, command) = parse_args(&args("generate 1 7 10")).unwrap();
        assert_eq!(db, "main");
        match command {
            Command::Generate { guild, role, count } => {
                assert_eq!(guild, GuildId::new(1));
                assert_eq!(role, RoleId::new(7));
                assert_eq!(count, 10);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_db_flag_anywhere() {
        let (db, command) = parse_args(&args("list 1 7 --db staging")).unwrap();
        assert_eq!(db, "staging");
        assert!(matches!(command, Command::List { limit: DEFAULT_LIST_LIMIT, .. }));
    }

    #[test]
    fn test_parse_member_and_config() {
        let (_, command) = parse_args(&args("member 1 3")).unwrap();
        assert!(matches!(
            command,
            Command::Member { guild, member } if guild == GuildId::new(1) && member == MemberId::new(3)
        ));

        let (_, command) = parse_args(&args("config 1")).unwrap();
        assert!(matches!(command, Command::Config { guild } if guild == GuildId::new(1)));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse_args(&args("generate 1 7")).is_err());
        assert!(parse_args(&args("generate one 7 3")).is_err());
        assert!(parse_args(&args("expired --db")).is_err());
        assert!(parse_args(&args("frobnicate")).is_err());
    }
}
