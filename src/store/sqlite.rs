use std::{fs, path::Path, str::FromStr};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};

use super::{RemoteStore, StoreError};
use crate::{
    auth::new_id,
    models::{AppointmentRow, BookingStatus, CustomerRow, NewAppointmentRow, NewCustomerRow},
};

/// Local stand-in for the hosted backend, same two tables.
#[derive(Clone)]
pub struct SqliteStore {
    db: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(db_url: &str) -> Result<Self, StoreError> {
        ensure_sqlite_dir(db_url)?;

        let connect_options = SqliteConnectOptions::from_str(db_url)?.create_if_missing(true);
        let mut pool_options = SqlitePoolOptions::new().max_connections(5);
        if is_memory(db_url) {
            // Every connection to :memory: is its own database.
            pool_options = pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let db = pool_options.connect_with(connect_options).await?;

        run_migrations(&db).await?;
        Ok(Self { db })
    }

    pub async fn in_memory() -> Result<Self, StoreError> {
        Self::connect("sqlite::memory:").await
    }
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

fn sqlite_path(db_url: &str) -> Option<&str> {
    let path = db_url
        .strip_prefix("sqlite://")
        .or_else(|| db_url.strip_prefix("sqlite:"))?;
    Some(path.split('?').next().unwrap_or(path))
}

fn is_memory(db_url: &str) -> bool {
    matches!(sqlite_path(db_url), Some(":memory:") | Some(""))
}

pub fn ensure_sqlite_dir(db_url: &str) -> std::io::Result<()> {
    let Some(path) = sqlite_path(db_url) else {
        return Ok(());
    };
    if path == ":memory:" || path.is_empty() {
        return Ok(());
    }

    let path = path.strip_prefix("file:").unwrap_or(path);
    if let Some(parent) = Path::new(path).parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[async_trait]
impl RemoteStore for SqliteStore {
    async fn select_customers(&self) -> Result<Vec<CustomerRow>, StoreError> {
        let rows = sqlx::query_as::<_, CustomerRow>(
            r#"SELECT id, full_name, phone_number, created_at
               FROM customers
               ORDER BY created_at ASC, rowid ASC"#,
        )
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn select_appointments(&self) -> Result<Vec<AppointmentRow>, StoreError> {
        let rows = sqlx::query_as::<_, AppointmentRow>(
            r#"SELECT id, customer_name, service_name, booking_time, status, created_at
               FROM appointments
               ORDER BY booking_time DESC, rowid ASC"#,
        )
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn find_customer_by_phone(&self, phone: &str) -> Result<Option<CustomerRow>, StoreError> {
        let row = sqlx::query_as::<_, CustomerRow>(
            r#"SELECT id, full_name, phone_number, created_at
               FROM customers
               WHERE phone_number = ?
               ORDER BY created_at ASC, rowid ASC
               LIMIT 1"#,
        )
        .bind(phone)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn insert_customer(&self, customer: &NewCustomerRow) -> Result<CustomerRow, StoreError> {
        let row = CustomerRow {
            id: new_id(),
            full_name: customer.full_name.clone(),
            phone_number: customer.phone_number.clone(),
            created_at: Utc::now().to_rfc3339(),
        };
        sqlx::query(
            r#"INSERT INTO customers (id, full_name, phone_number, created_at)
               VALUES (?, ?, ?, ?)"#,
        )
        .bind(&row.id)
        .bind(&row.full_name)
        .bind(&row.phone_number)
        .bind(&row.created_at)
        .execute(&self.db)
        .await?;
        Ok(row)
    }

    async fn insert_appointment(
        &self,
        appointment: &NewAppointmentRow,
    ) -> Result<AppointmentRow, StoreError> {
        let row = AppointmentRow {
            id: new_id(),
            customer_name: appointment.customer_name.clone(),
            service_name: appointment.service_name.clone(),
            booking_time: appointment.booking_time.clone(),
            status: appointment.status.clone(),
            created_at: Utc::now().to_rfc3339(),
        };
        sqlx::query(
            r#"INSERT INTO appointments (id, customer_name, service_name, booking_time, status, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&row.id)
        .bind(&row.customer_name)
        .bind(&row.service_name)
        .bind(&row.booking_time)
        .bind(&row.status)
        .bind(&row.created_at)
        .execute(&self.db)
        .await?;
        Ok(row)
    }

    async fn update_appointment_status(
        &self,
        id: &str,
        status: BookingStatus,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE appointments SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn delete_appointment(&self, id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM appointments WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn appointment(name: &str, at: &str) -> NewAppointmentRow {
        NewAppointmentRow {
            customer_name: name.to_string(),
            service_name: "Massage Thư Giãn".to_string(),
            booking_time: at.to_string(),
            status: BookingStatus::Pending.as_str().to_string(),
        }
    }

    #[test]
    fn memory_urls_are_detected() {
        assert!(is_memory("sqlite::memory:"));
        assert!(is_memory("sqlite://:memory:?cache=shared"));
        assert!(!is_memory("sqlite://./data/spa.db"));
        assert_eq!(sqlite_path("postgres://localhost/db"), None);
    }

    #[tokio::test]
    async fn customers_are_found_by_exact_phone() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .insert_customer(&NewCustomerRow {
                full_name: "Nguyễn Văn A".to_string(),
                phone_number: "0901234567".to_string(),
            })
            .await
            .unwrap();

        let hit = store.find_customer_by_phone("0901234567").await.unwrap();
        assert_eq!(hit.map(|row| row.full_name), Some("Nguyễn Văn A".to_string()));
        assert!(store.find_customer_by_phone("090123456").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn appointments_come_back_latest_first() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.insert_appointment(&appointment("A", "2024-01-10T10:00:00")).await.unwrap();
        store.insert_appointment(&appointment("B", "2024-02-05T14:00:00")).await.unwrap();

        let rows = store.select_appointments().await.unwrap();
        let names: Vec<_> = rows.iter().map(|row| row.customer_name.as_str()).collect();
        assert_eq!(names, vec!["B", "A"]);
    }

    #[tokio::test]
    async fn status_update_and_delete_target_one_row() {
        let store = SqliteStore::in_memory().await.unwrap();
        let first = store.insert_appointment(&appointment("A", "2024-01-10T10:00:00")).await.unwrap();
        let second = store.insert_appointment(&appointment("B", "2024-01-11T10:00:00")).await.unwrap();

        store
            .update_appointment_status(&first.id, BookingStatus::Confirmed)
            .await
            .unwrap();
        store.delete_appointment(&second.id).await.unwrap();

        let rows = store.select_appointments().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, first.id);
        assert_eq!(rows[0].status, "confirmed");
    }
}
