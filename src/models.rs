use std::{fmt, str::FromStr};

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

/// Service id given to bookings whose `service_name` matches no loaded service.
pub const UNKNOWN_SERVICE_ID: &str = "unknown";

pub const TABLE_CUSTOMERS: &str = "customers";
pub const TABLE_APPOINTMENTS: &str = "appointments";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 4] = [
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        BookingStatus::Cancelled,
        BookingStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "Awaiting review",
            BookingStatus::Confirmed => "Confirmed",
            BookingStatus::Cancelled => "Cancelled",
            BookingStatus::Completed => "Completed",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown booking status '{}'", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for BookingStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        BookingStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == value.trim())
            .ok_or_else(|| UnknownStatus(value.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub description: String,
    pub duration_minutes: u32,
    pub price: f64,
    pub image: String,
}

/// Editable fields of a service, as submitted from the admin catalog form.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceInput {
    pub name: String,
    pub description: String,
    pub duration_minutes: u32,
    pub price: f64,
    pub image: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Booking {
    pub id: String,
    pub service_id: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_email: Option<String>,
    pub date: NaiveDate,
    /// 24-hour `HH:MM` in the display timezone.
    pub time: String,
    pub status: BookingStatus,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub total_visits: u32,
    pub last_visit: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdminUser {
    pub username: String,
    pub is_authenticated: bool,
}

/// A customer submission coming out of the booking wizard.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBooking {
    pub service_id: String,
    pub customer_name: String,
    pub customer_phone: String,
    /// Not stored: the remote `customers` table has no email column.
    pub customer_email: Option<String>,
    pub date: NaiveDate,
    pub time: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, sqlx::FromRow)]
pub struct CustomerRow {
    #[serde(deserialize_with = "id_from_json")]
    pub id: String,
    pub full_name: String,
    pub phone_number: String,
    #[serde(default)]
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, sqlx::FromRow)]
pub struct AppointmentRow {
    #[serde(deserialize_with = "id_from_json")]
    pub id: String,
    pub customer_name: String,
    pub service_name: String,
    pub booking_time: String,
    pub status: String,
    #[serde(default)]
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewCustomerRow {
    pub full_name: String,
    pub phone_number: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewAppointmentRow {
    pub customer_name: String,
    pub service_name: String,
    pub booking_time: String,
    pub status: String,
}

// Hosted tables may use bigint or uuid keys; both end up as strings here.
fn id_from_json<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(value) => Ok(value),
        serde_json::Value::Number(value) => Ok(value.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

pub fn default_catalog() -> Vec<Service> {
    vec![
        Service {
            id: "1".to_string(),
            name: "Massage Thư Giãn".to_string(),
            description: "Gentle Swedish massage to ease stress and fatigue.".to_string(),
            duration_minutes: 60,
            price: 80.0,
            image: "https://picsum.photos/400/300?random=1".to_string(),
        },
        Service {
            id: "2".to_string(),
            name: "Trị Liệu Chuyên Sâu".to_string(),
            description: "Deep tissue work on the inner muscle layers for chronic pain.".to_string(),
            duration_minutes: 90,
            price: 120.0,
            image: "https://picsum.photos/400/300?random=2".to_string(),
        },
        Service {
            id: "3".to_string(),
            name: "Chăm Sóc Da Mặt Cấp Ẩm".to_string(),
            description: "Restores moisture and brightens skin with organic serums.".to_string(),
            duration_minutes: 45,
            price: 65.0,
            image: "https://picsum.photos/400/300?random=3".to_string(),
        },
        Service {
            id: "4".to_string(),
            name: "Tẩy Tế Bào Chết Toàn Thân".to_string(),
            description: "Full body exfoliation that removes dead cells and softens skin.".to_string(),
            duration_minutes: 60,
            price: 90.0,
            image: "https://picsum.photos/400/300?random=4".to_string(),
        },
    ]
}
