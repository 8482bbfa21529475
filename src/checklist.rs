//! Daily open/close checklist.

use serde::Serialize;
use tracing::info;

use crate::calendar::normalize_date;
use crate::error::{AppError, Result};
use crate::schedule::{format_clock, require_clock};
use crate::store::{Change, Store};
use crate::tables::{ChecklistEntry, ChecklistItem};

const DEFAULT_OPEN_ITEMS: [&str; 5] = [
    "Preheat ovens",
    "Check display case temperature",
    "Count opening cash drawer",
    "Set out today's bread",
    "Unlock front door",
];
const DEFAULT_CLOSE_ITEMS: [&str; 5] = [
    "Pull unsold items from display",
    "Clean ovens and trays",
    "Count closing cash drawer",
    "Take out trash",
    "Lock front door",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    Done,
    AlreadyDone,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemStatus {
    pub item: String,
    pub done: Option<ChecklistEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    /// `None` when no items are configured for the type.
    pub fn ratio(self) -> Option<f64> {
        (self.total > 0).then(|| self.completed as f64 / self.total as f64)
    }
}

#[derive(Debug, Clone)]
pub struct CheckOff {
    pub date: String,
    pub kind: String,
    pub item: String,
    pub user: String,
    pub time: String,
}

/// Item names configured for `kind`, in stored order.
pub fn items(store: &Store, kind: &str) -> Result<Vec<String>> {
    Ok(store
        .read::<ChecklistItem>()?
        .into_iter()
        .filter(|def| def.kind == kind)
        .map(|def| def.item)
        .collect())
}

/// Each configured item paired with its log entry for `date`, if any.
pub fn completion_for(store: &Store, date: &str, kind: &str) -> Result<Vec<ItemStatus>> {
    let date = normalize_date(date)?;
    let log: Vec<ChecklistEntry> = store
        .read::<ChecklistEntry>()?
        .into_iter()
        .filter(|entry| entry.date == date && entry.kind == kind)
        .collect();
    Ok(items(store, kind)?
        .into_iter()
        .map(|item| {
            let done = log.iter().find(|entry| entry.item == item).cloned();
            ItemStatus { item, done }
        })
        .collect())
}

/// Records that `item` was done. A second call for the same date, type and
/// item keeps the first record and returns [`Completion::AlreadyDone`].
pub fn mark_done(store: &Store, check: CheckOff) -> Result<Completion> {
    let date = normalize_date(check.date.as_str())?;
    let time = format_clock(require_clock("time", check.time.as_str())?);
    let user = check.user.trim().to_string();
    if user.is_empty() {
        return Err(AppError::invalid("checklist entries need the acting user"));
    }
    if !items(store, check.kind.as_str())?.contains(&check.item) {
        return Err(AppError::invalid(format!(
            "`{}` is not a {} checklist item",
            check.item, check.kind
        )));
    }

    let CheckOff { kind, item, .. } = check;
    let outcome = store.transact::<ChecklistEntry, _, _>(|log| {
        if log.iter().any(|entry| entry.matches(&date, &kind, &item)) {
            return Change::Keep(Completion::AlreadyDone);
        }
        log.push(ChecklistEntry {
            date: date.clone(),
            kind: kind.clone(),
            item: item.clone(),
            user,
            time,
        });
        Change::Commit(Completion::Done)
    })?;
    if outcome == Completion::Done {
        info!(date = %date, kind = %kind, item = %item, "checked off item");
    }
    Ok(outcome)
}

pub fn progress(store: &Store, date: &str, kind: &str) -> Result<Progress> {
    let statuses = completion_for(store, date, kind)?;
    Ok(Progress {
        completed: statuses.iter().filter(|status| status.done.is_some()).count(),
        total: statuses.len(),
    })
}

/// Adds `item` to the `kind` checklist. Returns `false` if it was already
/// configured.
pub fn add_item(store: &Store, kind: &str, item: &str) -> Result<bool> {
    let kind = kind.trim();
    let item = item.trim();
    if kind.is_empty() || item.is_empty() {
        return Err(AppError::invalid("checklist type and item are required"));
    }
    Ok(store.transact::<ChecklistItem, _, _>(|defs| {
        if defs.iter().any(|def| def.kind == kind && def.item == item) {
            return Change::Keep(false);
        }
        defs.push(ChecklistItem {
            kind: kind.to_string(),
            item: item.to_string(),
        });
        Change::Commit(true)
    })?)
}

/// Fills an empty `checklist_def` with the stock open and close lists.
/// Returns the number of items written.
pub fn seed_defaults(store: &Store) -> Result<usize> {
    Ok(store.transact::<ChecklistItem, _, _>(|defs| {
        if !defs.is_empty() {
            return Change::Keep(0);
        }
        let open = DEFAULT_OPEN_ITEMS.iter().map(|item| ("open", item));
        let close = DEFAULT_CLOSE_ITEMS.iter().map(|item| ("close", item));
        defs.extend(open.chain(close).map(|(kind, item)| ChecklistItem {
            kind: kind.to_string(),
            item: item.to_string(),
        }));
        Change::Commit(defs.len())
    })?)
}
