pub mod rest;
pub mod sqlite;

use async_trait::async_trait;

use crate::models::{AppointmentRow, BookingStatus, CustomerRow, NewAppointmentRow, NewCustomerRow};

pub use rest::RestStore;
pub use sqlite::SqliteStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("remote request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("remote store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unexpected response: {0}")]
    Malformed(String),
}

/// Data access over the `customers` and `appointments` tables.
///
/// Implementations return raw rows; mapping into the domain model is done by
/// [`crate::reconcile`].
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn select_customers(&self) -> Result<Vec<CustomerRow>, StoreError>;

    /// Appointments, most recent `booking_time` first.
    async fn select_appointments(&self) -> Result<Vec<AppointmentRow>, StoreError>;

    /// Exact match on `phone_number`; the first row wins if several match.
    async fn find_customer_by_phone(&self, phone: &str) -> Result<Option<CustomerRow>, StoreError>;

    async fn insert_customer(&self, customer: &NewCustomerRow) -> Result<CustomerRow, StoreError>;

    async fn insert_appointment(
        &self,
        appointment: &NewAppointmentRow,
    ) -> Result<AppointmentRow, StoreError>;

    async fn update_appointment_status(
        &self,
        id: &str,
        status: BookingStatus,
    ) -> Result<(), StoreError>;

    async fn delete_appointment(&self, id: &str) -> Result<(), StoreError>;

    fn backend_name(&self) -> &'static str;
}
