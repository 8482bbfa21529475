//! Pickup reservations.

use tracing::info;

use crate::calendar::{normalize_date, YearMonth};
use crate::error::{AppError, Result};
use crate::schedule::{format_clock, require_clock};
use crate::store::{Removed, Store};
use crate::tables::{MenuItem, Reservation};

pub type ReservationId = u64;

#[derive(Debug, Clone)]
pub struct NewReservation {
    pub date: String,
    pub time: String,
    pub item: String,
    pub count: u32,
    pub customer_name: String,
    pub customer_phone: String,
    pub created_by: String,
}

pub fn add_reservation(store: &Store, order: NewReservation) -> Result<ReservationId> {
    let date = normalize_date(order.date.as_str())?;
    let time = format_clock(require_clock("pickup time", order.time.as_str())?);
    if order.count == 0 {
        return Err(AppError::invalid("reservation count must be at least 1"));
    }
    let item = order.item.trim().to_string();
    let customer_name = order.customer_name.trim().to_string();
    if item.is_empty() || customer_name.is_empty() {
        return Err(AppError::invalid("reservation needs an item and a customer name"));
    }

    let id = store.insert_next::<Reservation, _>(|id| Reservation {
        id,
        date,
        time,
        item,
        count: order.count,
        customer_name,
        customer_phone: order.customer_phone.trim().to_string(),
        created_by: order.created_by.trim().to_string(),
    })?;
    info!(id, "added reservation");
    Ok(id)
}

pub fn remove_reservation(store: &Store, id: ReservationId) -> Result<Removed> {
    let removed = store.remove_id::<Reservation>(id)?;
    if removed == Removed::Deleted {
        info!(id, "removed reservation");
    }
    Ok(removed)
}

fn by_date_then_time(a: &Reservation, b: &Reservation) -> std::cmp::Ordering {
    (a.date.as_str(), a.time.as_str(), a.id).cmp(&(b.date.as_str(), b.time.as_str(), b.id))
}

/// Reservations for one day, earliest pickup first.
pub fn for_date(store: &Store, date: &str) -> Result<Vec<Reservation>> {
    let date = normalize_date(date)?;
    let mut rows: Vec<Reservation> = store
        .read::<Reservation>()?
        .into_iter()
        .filter(|row| row.date == date)
        .collect();
    rows.sort_by(by_date_then_time);
    Ok(rows)
}

pub fn for_month(store: &Store, month: YearMonth) -> Result<Vec<Reservation>> {
    let mut rows: Vec<Reservation> = store
        .read::<Reservation>()?
        .into_iter()
        .filter(|row| month.contains(row.date.as_str()))
        .collect();
    rows.sort_by(by_date_then_time);
    Ok(rows)
}

/// Item names customers can reserve.
pub fn menu(store: &Store) -> Result<Vec<String>> {
    Ok(store
        .read::<MenuItem>()?
        .into_iter()
        .map(|entry| entry.item_name)
        .collect())
}
