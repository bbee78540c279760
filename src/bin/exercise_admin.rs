//! Maintains the exercise table the pose server polls.
//!
//! Usage: exercise_admin [-c config.toml] <command>
//!   init                          create the table
//!   add <name> <category> [code]  insert a record (default status 3)
//!   list [--json]                 show all records
//!   select <id>...                put records into calibration (status 1)
//!   status <id> <code>            set a record's status

use anyhow::{anyhow, bail, Context, Result};

use yogavision::config::Config;
use yogavision::exercise::store::SqliteConnection;
use yogavision::exercise::{ExerciseId, ExerciseStatus, RecordConnection, RecordStore, SqliteStore};

const USAGE: &str = "usage: exercise_admin [-c config.toml] init | add <name> <category> [code] | list [--json] | select <id>... | status <id> <code>";

fn parse_id(s: &str) -> Result<ExerciseId> {
    s.parse().with_context(|| format!("invalid exercise id: {s}"))
}

fn parse_status(s: &str) -> Result<ExerciseStatus> {
    let code: i64 = s.parse().with_context(|| format!("invalid status: {s}"))?;
    ExerciseStatus::from_code(code).ok_or_else(|| anyhow!("unknown status code {code} (expected 1, 2 or 3)"))
}

fn run(conn: &mut SqliteConnection, command: &str, args: &[String]) -> Result<()> {
    match (command, args) {
        ("init", []) => {
            conn.init_schema()?;
            println!("exercise table ready");
        }
        ("add", [name, category, rest @ ..]) if rest.len() <= 1 => {
            let status = match rest.first() {
                Some(code) => parse_status(code)?,
                None => ExerciseStatus::ReadyOrDone,
            };
            let id = conn.insert(name, category, status)?;
            println!("added {id}: {name} [{category}] {status}");
        }
        ("list", flags) => {
            let records = conn.all_records()?;
            if flags.iter().any(|f| f == "--json") {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                for r in &records {
                    let marker = if r.status.is_eligible() { "*" } else { " " };
                    println!("{marker} {:>4}  {:<20} {:<16} {}", r.id, r.name, r.category, r.status);
                }
            }
        }
        ("select", ids) if !ids.is_empty() => {
            for id in ids {
                let id = parse_id(id)?;
                conn.update_status(id, ExerciseStatus::Calibrating)?;
                println!("{id} -> {}", ExerciseStatus::Calibrating);
            }
        }
        ("status", [id, code]) => {
            let id = parse_id(id)?;
            let status = parse_status(code)?;
            conn.update_status(id, status)?;
            println!("{id} -> {status}");
        }
        _ => bail!(USAGE),
    }
    Ok(())
}

fn main() -> Result<()> {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let config_path = match args.first().map(String::as_str) {
        Some("-c") if args.len() >= 2 => {
            let path = args.remove(1);
            args.remove(0);
            path
        }
        _ => "pose_server.toml".to_string(),
    };
    let config = Config::load_or_default(&config_path)?;

    let Some((command, rest)) = args.split_first() else {
        bail!(USAGE);
    };
    let store = SqliteStore::new(&config.exercise.database_path);
    let mut conn = store
        .connect()
        .with_context(|| format!("failed to open {}", store.path().display()))?;
    run(&mut conn, command, rest)
}
