//! Command-line surface of the `bakery-ops` binary.

use std::io::BufRead;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::{json, Value};

use crate::auth::{self, Registration};
use crate::calendar::{self, YearMonth};
use crate::checklist::{self, CheckOff};
use crate::config::{self, StoreConfig};
use crate::posts::{self, NewPost};
use crate::reservations::{self, NewReservation};
use crate::schedule::{self, NewShift};
use crate::store::Store;
use crate::tables::Role;

#[derive(Parser, Debug)]
#[command(name = "bakery-ops")]
#[command(about = "Shift, checklist and reservation records for a small bakery")]
#[command(version, long_about = None)]
pub struct Cli {
    /// Directory holding the table files
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Give up on a busy table after this many milliseconds (0 waits forever)
    #[arg(long, global = true)]
    pub lock_timeout_ms: Option<u64>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create missing table files and the default checklist
    Init,
    /// Sign up a staff account
    Register(RegisterArgs),
    /// Check a username and password
    Login(LoginArgs),
    /// List staff accounts
    Staff,
    /// Dump a table by name
    Table {
        name: String,
        /// Print spreadsheet-safe CSV instead of JSON
        #[arg(long)]
        csv: bool,
    },
    /// Shift schedule and pay totals
    Shift {
        #[command(subcommand)]
        command: ShiftCommand,
    },
    /// Daily open/close checklist
    Checklist {
        #[command(subcommand)]
        command: ChecklistCommand,
    },
    /// Pickup reservations
    Reservation {
        #[command(subcommand)]
        command: ReservationCommand,
    },
    /// Announcement board
    Post {
        #[command(subcommand)]
        command: PostCommand,
    },
    /// Rows of one month grouped by day
    Calendar {
        month: YearMonth,
        #[arg(long, value_enum, default_value_t = CalendarSource::Schedule)]
        source: CalendarSource,
    },
}

#[derive(Args, Debug)]
pub struct RegisterArgs {
    pub username: String,
    /// Display name
    #[arg(long)]
    pub name: String,
    /// Hourly wage in whole currency units
    #[arg(long, default_value_t = 0)]
    pub wage: u64,
    #[arg(long, default_value_t = Role::Staff)]
    pub role: Role,
    /// Read from stdin when omitted
    #[arg(long)]
    pub password: Option<String>,
}

#[derive(Args, Debug)]
pub struct LoginArgs {
    pub username: String,
    /// Read from stdin when omitted
    #[arg(long)]
    pub password: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum ShiftCommand {
    Add {
        date: String,
        user: String,
        start: String,
        end: String,
        #[arg(long, default_value = "")]
        color: String,
    },
    Remove {
        id: u64,
    },
    Month {
        month: YearMonth,
    },
    Day {
        date: String,
    },
    Totals {
        user: String,
        month: YearMonth,
    },
    Payroll {
        month: YearMonth,
    },
}

#[derive(Subcommand, Debug)]
pub enum ChecklistCommand {
    Show {
        date: String,
        /// `open` or `close`
        kind: String,
    },
    Done {
        date: String,
        kind: String,
        item: String,
        #[arg(long = "as")]
        actor: String,
        /// Defaults to the current local time
        #[arg(long)]
        time: Option<String>,
    },
    AddItem {
        kind: String,
        item: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ReservationCommand {
    Add {
        date: String,
        time: String,
        item: String,
        #[arg(long, default_value_t = 1)]
        count: u32,
        #[arg(long)]
        customer: String,
        #[arg(long, default_value = "")]
        phone: String,
        #[arg(long = "as")]
        actor: String,
    },
    Remove {
        id: u64,
    },
    Day {
        date: String,
    },
    Month {
        month: YearMonth,
    },
    Menu,
}

#[derive(Subcommand, Debug)]
pub enum PostCommand {
    Add {
        title: String,
        #[arg(long, default_value = "notice")]
        category: String,
        #[arg(long, default_value = "")]
        content: String,
        /// Defaults to today
        #[arg(long)]
        date: Option<String>,
        #[arg(long = "as")]
        actor: String,
    },
    Remove {
        id: u64,
    },
    List {
        #[arg(long)]
        category: Option<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CalendarSource {
    Schedule,
    Reservations,
}

/// What a command prints.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Json(Value),
    Text(String),
}

#[derive(Serialize)]
struct MonthGrid<T> {
    month: String,
    leading_blanks: u32,
    days: std::collections::BTreeMap<u32, Vec<T>>,
}

impl Cli {
    /// Store settings with the command-line overrides applied last.
    pub fn store_config(&self) -> Result<StoreConfig> {
        let mut config = StoreConfig::load(self.data_dir.as_deref())
            .context("failed to load configuration")?;
        if let Some(ms) = self.lock_timeout_ms {
            config.lock_timeout = config::timeout_from_ms(ms);
        }
        Ok(config)
    }
}

fn to_json<T: Serialize>(value: T) -> Result<Output> {
    Ok(Output::Json(serde_json::to_value(value)?))
}

fn password_or_stdin(password: Option<String>) -> Result<String> {
    if let Some(password) = password {
        return Ok(password);
    }
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read password from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

pub fn run(cli: Cli) -> Result<Output> {
    let store = Store::open(cli.store_config()?)?;
    match cli.command {
        Command::Init => {
            store.bootstrap()?;
            let seeded = checklist::seed_defaults(&store)?;
            to_json(json!({
                "data_dir": store.data_dir().display().to_string(),
                "seeded_checklist_items": seeded,
            }))
        }
        Command::Register(args) => {
            let password = password_or_stdin(args.password)?;
            let outcome = auth::register_as(
                &store,
                args.username.as_str(),
                password.as_str(),
                args.name.as_str(),
                args.wage,
                args.role,
            )?;
            if outcome == Registration::DuplicateUsername {
                anyhow::bail!("username `{}` is already taken", args.username);
            }
            to_json(json!({ "registration": outcome, "username": args.username }))
        }
        Command::Login(args) => {
            let password = password_or_stdin(args.password)?;
            let member = auth::verify(&store, args.username.as_str(), password.as_str())??;
            to_json(member)
        }
        Command::Staff => to_json(auth::list_staff(&store)?),
        Command::Table { name, csv } => {
            let view = store.read_table(name.as_str())?;
            if csv {
                Ok(Output::Text(view.to_csv()))
            } else {
                to_json(view)
            }
        }
        Command::Shift { command } => run_shift(&store, command),
        Command::Checklist { command } => run_checklist(&store, command),
        Command::Reservation { command } => run_reservation(&store, command),
        Command::Post { command } => run_post(&store, command),
        Command::Calendar { month, source } => {
            let leading_blanks = calendar::leading_blanks(month);
            match source {
                CalendarSource::Schedule => to_json(MonthGrid {
                    month: month.to_string(),
                    leading_blanks,
                    days: calendar::month_buckets(schedule::shifts_for_month(&store, month)?, month),
                }),
                CalendarSource::Reservations => to_json(MonthGrid {
                    month: month.to_string(),
                    leading_blanks,
                    days: calendar::month_buckets(reservations::for_month(&store, month)?, month),
                }),
            }
        }
    }
}

fn run_shift(store: &Store, command: ShiftCommand) -> Result<Output> {
    match command {
        ShiftCommand::Add {
            date,
            user,
            start,
            end,
            color,
        } => {
            let id = schedule::add_shift(
                store,
                NewShift {
                    date,
                    user,
                    start_time: start,
                    end_time: end,
                    color,
                },
            )?;
            to_json(json!({ "id": id }))
        }
        ShiftCommand::Remove { id } => {
            let result = schedule::remove_shift(store, id)?;
            to_json(json!({ "id": id, "result": result }))
        }
        ShiftCommand::Month { month } => to_json(schedule::shifts_for_month(store, month)?),
        ShiftCommand::Day { date } => to_json(schedule::shifts_for_day(store, date.as_str())?),
        ShiftCommand::Totals { user, month } => {
            to_json(schedule::monthly_totals(store, user.as_str(), month)?)
        }
        ShiftCommand::Payroll { month } => to_json(schedule::payroll(store, month)?),
    }
}

fn run_checklist(store: &Store, command: ChecklistCommand) -> Result<Output> {
    match command {
        ChecklistCommand::Show { date, kind } => {
            let items = checklist::completion_for(store, date.as_str(), kind.as_str())?;
            let progress = checklist::progress(store, date.as_str(), kind.as_str())?;
            to_json(json!({
                "date": date,
                "type": kind,
                "items": items,
                "completed": progress.completed,
                "total": progress.total,
                "ratio": progress.ratio(),
            }))
        }
        ChecklistCommand::Done {
            date,
            kind,
            item,
            actor,
            time,
        } => {
            let time = time.unwrap_or_else(|| Local::now().format("%H:%M").to_string());
            let outcome = checklist::mark_done(
                store,
                CheckOff {
                    date,
                    kind,
                    item,
                    user: actor,
                    time,
                },
            )?;
            to_json(json!({ "result": outcome }))
        }
        ChecklistCommand::AddItem { kind, item } => {
            let added = checklist::add_item(store, kind.as_str(), item.as_str())?;
            to_json(json!({ "added": added }))
        }
    }
}

fn run_reservation(store: &Store, command: ReservationCommand) -> Result<Output> {
    match command {
        ReservationCommand::Add {
            date,
            time,
            item,
            count,
            customer,
            phone,
            actor,
        } => {
            let id = reservations::add_reservation(
                store,
                NewReservation {
                    date,
                    time,
                    item,
                    count,
                    customer_name: customer,
                    customer_phone: phone,
                    created_by: actor,
                },
            )?;
            to_json(json!({ "id": id }))
        }
        ReservationCommand::Remove { id } => {
            let result = reservations::remove_reservation(store, id)?;
            to_json(json!({ "id": id, "result": result }))
        }
        ReservationCommand::Day { date } => to_json(reservations::for_date(store, date.as_str())?),
        ReservationCommand::Month { month } => to_json(reservations::for_month(store, month)?),
        ReservationCommand::Menu => to_json(reservations::menu(store)?),
    }
}

fn run_post(store: &Store, command: PostCommand) -> Result<Output> {
    match command {
        PostCommand::Add {
            title,
            category,
            content,
            date,
            actor,
        } => {
            let id = posts::add_post(
                store,
                NewPost {
                    category,
                    title,
                    content,
                    author: actor,
                    date: date.unwrap_or_else(today),
                },
            )?;
            to_json(json!({ "id": id }))
        }
        PostCommand::Remove { id } => {
            let result = posts::remove_post(store, id)?;
            to_json(json!({ "id": id, "result": result }))
        }
        PostCommand::List { category } => to_json(posts::list(store, category.as_deref())?),
    }
}
