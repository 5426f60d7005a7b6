//! Maps raw `customers` / `appointments` rows into the in-memory domain model.
//!
//! Joins are by exact string equality because the remote schema has no
//! foreign keys: an appointment carries `service_name` and `customer_name`
//! only. Two services sharing a name resolve to the first one in catalog
//! order, and two customers sharing a name share a phone and visit count.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};

use crate::models::{
    AppointmentRow, Booking, BookingStatus, Customer, CustomerRow, Service, UNKNOWN_SERVICE_ID,
};

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciled {
    pub bookings: Vec<Booking>,
    pub customers: Vec<Customer>,
}

pub fn reconcile(
    services: &[Service],
    customer_rows: Vec<CustomerRow>,
    appointment_rows: Vec<AppointmentRow>,
    offset: &FixedOffset,
) -> Reconciled {
    let mut customers: Vec<Customer> = customer_rows.into_iter().map(to_customer).collect();
    let bookings: Vec<Booking> = appointment_rows
        .into_iter()
        .filter_map(|row| to_booking(row, services, &customers, offset))
        .collect();
    aggregate_visits(&mut customers, &bookings);
    Reconciled { bookings, customers }
}

pub fn to_customer(row: CustomerRow) -> Customer {
    Customer {
        id: row.id,
        name: row.full_name,
        phone: row.phone_number,
        email: None,
        total_visits: 0,
        last_visit: None,
    }
}

fn to_booking(
    row: AppointmentRow,
    services: &[Service],
    customers: &[Customer],
    offset: &FixedOffset,
) -> Option<Booking> {
    let Some((date, time)) = split_timestamp(&row.booking_time, offset) else {
        log::warn!(
            "Skipping appointment {}: unreadable booking_time '{}'",
            row.id,
            row.booking_time
        );
        return None;
    };

    let status = row.status.parse::<BookingStatus>().unwrap_or_else(|err| {
        log::warn!("Appointment {}: {err}, treating as pending", row.id);
        BookingStatus::Pending
    });

    Some(Booking {
        service_id: resolve_service_id(services, &row.service_name),
        customer_phone: resolve_phone(customers, &row.customer_name),
        customer_email: None,
        id: row.id,
        customer_name: row.customer_name,
        date,
        time,
        status,
        created_at: row.created_at,
    })
}

/// Splits a stored timestamp into a display date and `HH:MM`.
///
/// Offset-bearing values are shifted into `offset`; naive values are taken as
/// wall-clock time already.
pub fn split_timestamp(raw: &str, offset: &FixedOffset) -> Option<(NaiveDate, String)> {
    let raw = raw.trim();
    let local = match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => ts.with_timezone(offset).naive_local(),
        Err(_) => NAIVE_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())?,
    };
    Some((local.date(), local.format("%H:%M").to_string()))
}

/// Wall-clock timestamp with no zone tag.
pub fn join_timestamp(date: NaiveDate, time: &str) -> String {
    format!("{}T{}:00", date.format("%Y-%m-%d"), time)
}

pub fn resolve_service_id(services: &[Service], service_name: &str) -> String {
    services
        .iter()
        .find(|service| service.name == service_name)
        .map(|service| service.id.clone())
        .unwrap_or_else(|| UNKNOWN_SERVICE_ID.to_string())
}

pub fn resolve_phone(customers: &[Customer], customer_name: &str) -> String {
    customers
        .iter()
        .find(|customer| customer.name == customer_name)
        .map(|customer| customer.phone.clone())
        .unwrap_or_default()
}

/// Recomputes `total_visits` and `last_visit` from bookings with a matching name.
pub fn aggregate_visits(customers: &mut [Customer], bookings: &[Booking]) {
    for customer in customers.iter_mut() {
        let visits = bookings
            .iter()
            .filter(|booking| booking.customer_name == customer.name);
        let (count, last) = visits.fold((0u32, None::<NaiveDate>), |(count, last), booking| {
            (count + 1, last.max(Some(booking.date)))
        });
        customer.total_visits = count;
        customer.last_visit = last;
    }
}
