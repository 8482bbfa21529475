//! Typed rows for every table the store knows about.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::csv;

pub const TABLE_ORDER: [&str; 7] = [
    User::TABLE,
    ChecklistItem::TABLE,
    ChecklistEntry::TABLE,
    Shift::TABLE,
    Reservation::TABLE,
    MenuItem::TABLE,
    Post::TABLE,
];
const USER_COLUMNS: [&str; 5] = ["username", "password_hash", "name", "role", "hourly_wage"];
const CHECKLIST_DEF_COLUMNS: [&str; 2] = ["type", "item"];
const CHECKLIST_LOG_COLUMNS: [&str; 5] = ["date", "type", "item", "user", "time"];
const SCHEDULE_COLUMNS: [&str; 6] = ["id", "date", "user", "start_time", "end_time", "role"];
const RESERVATION_COLUMNS: [&str; 8] = [
    "id",
    "date",
    "time",
    "item",
    "count",
    "customer_name",
    "customer_phone",
    "created_by",
];
const MENU_COLUMNS: [&str; 1] = ["item_name"];
const POST_COLUMNS: [&str; 6] = ["id", "category", "title", "content", "author", "date"];
const SENSITIVE_COLUMNS: [&str; 1] = ["password_hash"];
const REDACTED: &str = "[redacted]";

/// A row type bound to one table file. Field order follows `COLUMNS`.
pub trait Record: Sized {
    const TABLE: &'static str;
    const COLUMNS: &'static [&'static str];

    fn to_fields(&self) -> Vec<String>;

    /// `fields` always has exactly `COLUMNS.len()` entries.
    fn from_fields(fields: Vec<String>) -> Result<Self, String>;
}

/// Rows carrying an auto-incremented integer id.
pub trait Identified {
    fn id(&self) -> u64;
}

/// Rows that can be placed on a calendar day.
pub trait Dated {
    fn date(&self) -> &str;
}

/// `max(existing id) + 1`, or 1 for an empty table.
pub fn next_id<T: Identified>(rows: &[T]) -> u64 {
    rows.iter().map(Identified::id).max().unwrap_or(0) + 1
}

fn parse_number<N: FromStr>(column: &str, value: &str) -> Result<N, String> {
    value
        .trim()
        .parse::<N>()
        .map_err(|_| format!("column `{column}` expects a non-negative integer, got `{value}`"))
}

fn take_fields<const N: usize>(fields: Vec<String>) -> Result<[String; N], String> {
    let found = fields.len();
    fields
        .try_into()
        .map_err(|_| format!("expected {N} fields, found {found}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum Role {
    Manager,
    #[default]
    Staff,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Manager => "Manager",
            Role::Staff => "Staff",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "Manager" => Ok(Role::Manager),
            "Staff" => Ok(Role::Staff),
            other => Err(format!("unknown role `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub username: String,
    pub password_hash: String,
    pub name: String,
    pub role: Role,
    pub hourly_wage: u64,
}

impl Record for User {
    const TABLE: &'static str = "users";
    const COLUMNS: &'static [&'static str] = &USER_COLUMNS;

    fn to_fields(&self) -> Vec<String> {
        vec![
            self.username.clone(),
            self.password_hash.clone(),
            self.name.clone(),
            self.role.to_string(),
            self.hourly_wage.to_string(),
        ]
    }

    fn from_fields(fields: Vec<String>) -> Result<Self, String> {
        let [username, password_hash, name, role, hourly_wage] = take_fields(fields)?;
        Ok(User {
            username,
            password_hash,
            name,
            role: role.parse()?,
            hourly_wage: parse_number("hourly_wage", hourly_wage.as_str())?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChecklistItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub item: String,
}

impl Record for ChecklistItem {
    const TABLE: &'static str = "checklist_def";
    const COLUMNS: &'static [&'static str] = &CHECKLIST_DEF_COLUMNS;

    fn to_fields(&self) -> Vec<String> {
        vec![self.kind.clone(), self.item.clone()]
    }

    fn from_fields(fields: Vec<String>) -> Result<Self, String> {
        let [kind, item] = take_fields(fields)?;
        Ok(ChecklistItem { kind, item })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChecklistEntry {
    pub date: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub item: String,
    pub user: String,
    pub time: String,
}

impl ChecklistEntry {
    pub fn matches(&self, date: &str, kind: &str, item: &str) -> bool {
        self.date == date && self.kind == kind && self.item == item
    }
}

impl Record for ChecklistEntry {
    const TABLE: &'static str = "checklist_log";
    const COLUMNS: &'static [&'static str] = &CHECKLIST_LOG_COLUMNS;

    fn to_fields(&self) -> Vec<String> {
        vec![
            self.date.clone(),
            self.kind.clone(),
            self.item.clone(),
            self.user.clone(),
            self.time.clone(),
        ]
    }

    fn from_fields(fields: Vec<String>) -> Result<Self, String> {
        let [date, kind, item, user, time] = take_fields(fields)?;
        Ok(ChecklistEntry {
            date,
            kind,
            item,
            user,
            time,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Shift {
    pub id: u64,
    pub date: String,
    pub user: String,
    pub start_time: String,
    pub end_time: String,
    /// Colour tag shown on the schedule; stored in the `role` column.
    #[serde(rename = "role")]
    pub color: String,
}

impl Record for Shift {
    const TABLE: &'static str = "schedule";
    const COLUMNS: &'static [&'static str] = &SCHEDULE_COLUMNS;

    fn to_fields(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.date.clone(),
            self.user.clone(),
            self.start_time.clone(),
            self.end_time.clone(),
            self.color.clone(),
        ]
    }

    fn from_fields(fields: Vec<String>) -> Result<Self, String> {
        let [id, date, user, start_time, end_time, color] = take_fields(fields)?;
        Ok(Shift {
            id: parse_number("id", id.as_str())?,
            date,
            user,
            start_time,
            end_time,
            color,
        })
    }
}

impl Identified for Shift {
    fn id(&self) -> u64 {
        self.id
    }
}

impl Dated for Shift {
    fn date(&self) -> &str {
        self.date.as_str()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reservation {
    pub id: u64,
    pub date: String,
    pub time: String,
    pub item: String,
    pub count: u32,
    pub customer_name: String,
    pub customer_phone: String,
    pub created_by: String,
}

impl Record for Reservation {
    const TABLE: &'static str = "reservations";
    const COLUMNS: &'static [&'static str] = &RESERVATION_COLUMNS;

    fn to_fields(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.date.clone(),
            self.time.clone(),
            self.item.clone(),
            self.count.to_string(),
            self.customer_name.clone(),
            self.customer_phone.clone(),
            self.created_by.clone(),
        ]
    }

    fn from_fields(fields: Vec<String>) -> Result<Self, String> {
        let [id, date, time, item, count, customer_name, customer_phone, created_by] =
            take_fields(fields)?;
        Ok(Reservation {
            id: parse_number("id", id.as_str())?,
            date,
            time,
            item,
            count: parse_number("count", count.as_str())?,
            customer_name,
            customer_phone,
            created_by,
        })
    }
}

impl Identified for Reservation {
    fn id(&self) -> u64 {
        self.id
    }
}

impl Dated for Reservation {
    fn date(&self) -> &str {
        self.date.as_str()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuItem {
    pub item_name: String,
}

impl Record for MenuItem {
    const TABLE: &'static str = "reservation_menu";
    const COLUMNS: &'static [&'static str] = &MENU_COLUMNS;

    fn to_fields(&self) -> Vec<String> {
        vec![self.item_name.clone()]
    }

    fn from_fields(fields: Vec<String>) -> Result<Self, String> {
        let [item_name] = take_fields(fields)?;
        Ok(MenuItem { item_name })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Post {
    pub id: u64,
    pub category: String,
    pub title: String,
    pub content: String,
    pub author: String,
    pub date: String,
}

impl Record for Post {
    const TABLE: &'static str = "posts";
    const COLUMNS: &'static [&'static str] = &POST_COLUMNS;

    fn to_fields(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.category.clone(),
            self.title.clone(),
            self.content.clone(),
            self.author.clone(),
            self.date.clone(),
        ]
    }

    fn from_fields(fields: Vec<String>) -> Result<Self, String> {
        let [id, category, title, content, author, date] = take_fields(fields)?;
        Ok(Post {
            id: parse_number("id", id.as_str())?,
            category,
            title,
            content,
            author,
            date,
        })
    }
}

impl Identified for Post {
    fn id(&self) -> u64 {
        self.id
    }
}


pub fn table_display_name(table_id: &str) -> &'static str {
    match table_id {
        "users" => "Staff Accounts",
        "checklist_def" => "Checklist Items",
        "checklist_log" => "Checklist Log",
        "schedule" => "Shift Schedule",
        "reservations" => "Pickup Reservations",
        "reservation_menu" => "Reservation Menu",
        "posts" => "Announcements",
        _ => "Unknown",
    }
}

/// Untyped snapshot of a table for display or export. Sensitive columns are
/// redacted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableView {
    pub id: String,
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<BTreeMap<String, String>>,
}

impl TableView {
    pub fn from_records<T: Record>(records: &[T]) -> Self {
        let rows = records
            .iter()
            .map(|record| {
                T::COLUMNS
                    .iter()
                    .zip(record.to_fields())
                    .map(|(column, value)| {
                        let value = if SENSITIVE_COLUMNS.contains(column) {
                            REDACTED.to_string()
                        } else {
                            value
                        };
                        (column.to_string(), value)
                    })
                    .collect()
            })
            .collect();
        TableView {
            id: T::TABLE.to_string(),
            name: table_display_name(T::TABLE).to_string(),
            columns: T::COLUMNS.iter().map(|column| column.to_string()).collect(),
            rows,
        }
    }

    /// Spreadsheet-safe CSV with formula triggers neutralized.
    pub fn to_csv(&self) -> String {
        let mut lines: Vec<String> = Vec::with_capacity(self.rows.len() + 1);
        lines.push(csv::encode_line(self.columns.as_slice()));
        for row in &self.rows {
            let fields: Vec<String> = self
                .columns
                .iter()
                .map(|column| {
                    let value = row.get(column).map(String::as_str).unwrap_or_default();
                    csv::neutralize_formula(value).into_owned()
                })
                .collect();
            lines.push(csv::encode_line(fields.as_slice()));
        }
        lines.join("\n")
    }
}
