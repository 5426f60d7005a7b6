use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use tokio::sync::RwLock;

use crate::{
    auth::{new_id, AdminCredentials, SESSION_MAX_AGE_DAYS},
    models::{
        AdminUser, Booking, BookingStatus, Customer, NewAppointmentRow, NewBooking,
        NewCustomerRow, Service, ServiceInput,
    },
    reconcile::{self, aggregate_visits, join_timestamp},
    store::{RemoteStore, StoreError},
};

#[derive(Debug, thiserror::Error)]
pub enum SpaError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("service {0} does not exist")]
    UnknownService(String),
    #[error("booking {0} not found")]
    BookingNotFound(String),
    #[error("service {0} not found")]
    ServiceNotFound(String),
    #[error("invalid service: {0}")]
    InvalidService(String),
}

/// The three reconciled collections.
#[derive(Debug, Clone, Default)]
pub struct SpaData {
    pub services: Vec<Service>,
    pub bookings: Vec<Booking>,
    pub customers: Vec<Customer>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardStats {
    pub total_bookings: usize,
    pub pending_bookings: usize,
    pub revenue: f64,
    pub active_services: usize,
    pub by_status: Vec<(BookingStatus, usize)>,
}

/// Status filter of the admin booking list; `None` means all.
pub type StatusFilter = Option<BookingStatus>;

impl SpaData {
    pub fn service(&self, id: &str) -> Option<&Service> {
        self.services.iter().find(|service| service.id == id)
    }

    pub fn booking(&self, id: &str) -> Option<&Booking> {
        self.bookings.iter().find(|booking| booking.id == id)
    }

    pub fn stats(&self) -> DashboardStats {
        let count = |status: BookingStatus| {
            self.bookings
                .iter()
                .filter(|booking| booking.status == status)
                .count()
        };
        let revenue = self
            .bookings
            .iter()
            .filter(|booking| {
                matches!(booking.status, BookingStatus::Confirmed | BookingStatus::Completed)
            })
            .map(|booking| self.service(&booking.service_id).map_or(0.0, |s| s.price))
            .sum();

        DashboardStats {
            total_bookings: self.bookings.len(),
            pending_bookings: count(BookingStatus::Pending),
            revenue,
            active_services: self.services.len(),
            by_status: BookingStatus::ALL
                .into_iter()
                .map(|status| (status, count(status)))
                .collect(),
        }
    }

    /// Case-insensitive search over customer name and email.
    pub fn filter_bookings(&self, status: StatusFilter, search: &str) -> Vec<Booking> {
        let needle = search.trim().to_lowercase();
        self.bookings
            .iter()
            .filter(|booking| status.map_or(true, |wanted| booking.status == wanted))
            .filter(|booking| {
                needle.is_empty()
                    || booking.customer_name.to_lowercase().contains(&needle)
                    || booking
                        .customer_email
                        .as_deref()
                        .is_some_and(|email| email.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect()
    }
}

struct Session {
    admin: AdminUser,
    issued_at: DateTime<Utc>,
}

impl Session {
    fn expired(&self, now: DateTime<Utc>) -> bool {
        now - self.issued_at >= chrono::Duration::days(SESSION_MAX_AGE_DAYS)
    }
}

/// Application state shared by every handler through `web::Data`.
pub struct AppState {
    store: Arc<dyn RemoteStore>,
    data: RwLock<SpaData>,
    sessions: RwLock<HashMap<String, Session>>,
    credentials: AdminCredentials,
    display_offset: FixedOffset,
}

impl AppState {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        credentials: AdminCredentials,
        display_offset: FixedOffset,
        services: Vec<Service>,
    ) -> Self {
        Self {
            store,
            data: RwLock::new(SpaData {
                services,
                ..SpaData::default()
            }),
            sessions: RwLock::new(HashMap::new()),
            credentials,
            display_offset,
        }
    }

    pub fn display_offset(&self) -> FixedOffset {
        self.display_offset
    }

    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.display_offset).date_naive()
    }

    pub async fn snapshot(&self) -> SpaData {
        self.data.read().await.clone()
    }

    pub async fn services(&self) -> Vec<Service> {
        self.data.read().await.services.clone()
    }

    /// Reloads bookings and customers from the store. On failure the
    /// previous collections stay as they were.
    pub async fn refresh(&self) -> Result<(), SpaError> {
        let result = self.load().await;
        if let Err(err) = &result {
            log::error!("Refresh from {} store failed: {err}", self.store.backend_name());
        }
        result
    }

    async fn load(&self) -> Result<(), SpaError> {
        let customer_rows = self.store.select_customers().await?;
        let appointment_rows = self.store.select_appointments().await?;

        let mut data = self.data.write().await;
        let reconciled = reconcile::reconcile(
            &data.services,
            customer_rows,
            appointment_rows,
            &self.display_offset,
        );
        data.bookings = reconciled.bookings;
        data.customers = reconciled.customers;
        log::debug!(
            "Loaded {} bookings and {} customers",
            data.bookings.len(),
            data.customers.len()
        );
        Ok(())
    }

    /// Stores a customer submission as a `pending` appointment, registering
    /// the customer first when the phone number is new.
    pub async fn create_booking(&self, booking: NewBooking) -> Result<(), SpaError> {
        let service_name = self
            .data
            .read()
            .await
            .service(&booking.service_id)
            .map(|service| service.name.clone())
            .ok_or_else(|| SpaError::UnknownService(booking.service_id.clone()))?;

        let existing = self
            .store
            .find_customer_by_phone(&booking.customer_phone)
            .await?;
        if existing.is_none() {
            self.store
                .insert_customer(&NewCustomerRow {
                    full_name: booking.customer_name.clone(),
                    phone_number: booking.customer_phone.clone(),
                })
                .await?;
        }

        let row = self
            .store
            .insert_appointment(&NewAppointmentRow {
                customer_name: booking.customer_name.clone(),
                service_name,
                booking_time: join_timestamp(booking.date, &booking.time),
                status: BookingStatus::Pending.as_str().to_string(),
            })
            .await?;
        log::info!(
            "New booking {} for {} on {} {}",
            row.id,
            booking.customer_name,
            booking.date,
            booking.time
        );

        // The appointment is stored; a failed reload only delays the list.
        let _ = self.refresh().await;
        Ok(())
    }

    pub async fn update_booking_status(
        &self,
        id: &str,
        status: BookingStatus,
    ) -> Result<(), SpaError> {
        if self.data.read().await.booking(id).is_none() {
            return Err(SpaError::BookingNotFound(id.to_string()));
        }
        self.store.update_appointment_status(id, status).await?;

        let mut data = self.data.write().await;
        if let Some(booking) = data.bookings.iter_mut().find(|booking| booking.id == id) {
            booking.status = status;
        }
        let SpaData {
            bookings,
            customers,
            ..
        } = &mut *data;
        aggregate_visits(customers, bookings);
        Ok(())
    }

    /// Removes a booking permanently. Returns `Ok(false)` without touching
    /// anything when the admin declined the confirmation.
    pub async fn delete_booking(&self, id: &str, confirmed: bool) -> Result<bool, SpaError> {
        if !confirmed {
            return Ok(false);
        }
        if self.data.read().await.booking(id).is_none() {
            return Err(SpaError::BookingNotFound(id.to_string()));
        }
        self.store.delete_appointment(id).await?;

        let mut data = self.data.write().await;
        data.bookings.retain(|booking| booking.id != id);
        let SpaData {
            bookings,
            customers,
            ..
        } = &mut *data;
        aggregate_visits(customers, bookings);
        log::info!("Deleted booking {id}");
        Ok(true)
    }

    // The catalog lives in memory only; nothing below reaches the store.

    pub async fn add_service(&self, input: ServiceInput) -> Result<Service, SpaError> {
        validate_service(&input)?;
        let service = Service {
            id: new_id(),
            name: input.name.trim().to_string(),
            description: input.description.trim().to_string(),
            duration_minutes: input.duration_minutes,
            price: input.price,
            image: input.image.trim().to_string(),
        };
        self.data.write().await.services.push(service.clone());
        Ok(service)
    }

    pub async fn update_service(&self, id: &str, input: ServiceInput) -> Result<Service, SpaError> {
        validate_service(&input)?;
        let mut data = self.data.write().await;
        let service = data
            .services
            .iter_mut()
            .find(|service| service.id == id)
            .ok_or_else(|| SpaError::ServiceNotFound(id.to_string()))?;
        service.name = input.name.trim().to_string();
        service.description = input.description.trim().to_string();
        service.duration_minutes = input.duration_minutes;
        service.price = input.price;
        service.image = input.image.trim().to_string();
        Ok(service.clone())
    }

    pub async fn delete_service(&self, id: &str) -> Result<(), SpaError> {
        let mut data = self.data.write().await;
        let before = data.services.len();
        data.services.retain(|service| service.id != id);
        if data.services.len() == before {
            return Err(SpaError::ServiceNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Point lookup for booking-form autofill. Leaves state alone.
    pub async fn get_customer_by_phone(&self, phone: &str) -> Result<Option<Customer>, SpaError> {
        let Some(row) = self.store.find_customer_by_phone(phone).await? else {
            return Ok(None);
        };
        let mut customer = reconcile::to_customer(row);
        if let Some(known) = self
            .data
            .read()
            .await
            .customers
            .iter()
            .find(|known| known.id == customer.id)
        {
            customer.total_visits = known.total_visits;
            customer.last_visit = known.last_visit;
        }
        Ok(Some(customer))
    }

    /// Returns a new session id on a credential match.
    pub async fn login(&self, username: &str, password: &str) -> Option<String> {
        if !self.credentials.verify(username, password) {
            log::warn!("Rejected admin login attempt");
            return None;
        }
        let session_id = new_id();
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, session| !session.expired(now));
        sessions.insert(
            session_id.clone(),
            Session {
                admin: AdminUser {
                    username: self.credentials.username().to_string(),
                    is_authenticated: true,
                },
                issued_at: now,
            },
        );
        drop(sessions);
        log::info!("Admin {} logged in", self.credentials.username());
        Some(session_id)
    }

    pub async fn logout(&self, session_id: &str) {
        self.sessions.write().await.remove(session_id);
    }

    /// The signed-in admin for a live session. Sessions older than the
    /// cookie's max age are dropped here.
    pub async fn session(&self, session_id: &str) -> Option<AdminUser> {
        let mut sessions = self.sessions.write().await;
        if sessions
            .get(session_id)
            .is_some_and(|session| session.expired(Utc::now()))
        {
            sessions.remove(session_id);
            return None;
        }
        sessions
            .get(session_id)
            .map(|session| &session.admin)
            .filter(|admin| admin.is_authenticated)
            .cloned()
    }
}

fn validate_service(input: &ServiceInput) -> Result<(), SpaError> {
    if input.name.trim().is_empty() {
        return Err(SpaError::InvalidService("name is required".to_string()));
    }
    if input.duration_minutes == 0 {
        return Err(SpaError::InvalidService(
            "duration must be at least one minute".to_string(),
        ));
    }
    if !input.price.is_finite() || input.price < 0.0 {
        return Err(SpaError::InvalidService(
            "price must be zero or more".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::{
        models::{default_catalog, AppointmentRow, CustomerRow},
        store::SqliteStore,
    };

    /// Delegates to an in-memory sqlite store until `fail` is flipped.
    pub(crate) struct FlakyStore {
        inner: SqliteStore,
        fail: AtomicBool,
    }

    impl FlakyStore {
        pub(crate) async fn new() -> Self {
            Self {
                inner: SqliteStore::in_memory().await.unwrap(),
                fail: AtomicBool::new(false),
            }
        }

        pub(crate) fn set_failing(&self, failing: bool) {
            self.fail.store(failing, Ordering::SeqCst);
        }

        fn check(&self) -> Result<(), StoreError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(StoreError::Status {
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl RemoteStore for FlakyStore {
        async fn select_customers(&self) -> Result<Vec<CustomerRow>, StoreError> {
            self.check()?;
            self.inner.select_customers().await
        }

        async fn select_appointments(&self) -> Result<Vec<AppointmentRow>, StoreError> {
            self.check()?;
            self.inner.select_appointments().await
        }

        async fn find_customer_by_phone(
            &self,
            phone: &str,
        ) -> Result<Option<CustomerRow>, StoreError> {
            self.check()?;
            self.inner.find_customer_by_phone(phone).await
        }

        async fn insert_customer(&self, customer: &NewCustomerRow) -> Result<CustomerRow, StoreError> {
            self.check()?;
            self.inner.insert_customer(customer).await
        }

        async fn insert_appointment(
            &self,
            appointment: &NewAppointmentRow,
        ) -> Result<AppointmentRow, StoreError> {
            self.check()?;
            self.inner.insert_appointment(appointment).await
        }

        async fn update_appointment_status(
            &self,
            id: &str,
            status: BookingStatus,
        ) -> Result<(), StoreError> {
            self.check()?;
            self.inner.update_appointment_status(id, status).await
        }

        async fn delete_appointment(&self, id: &str) -> Result<(), StoreError> {
            self.check()?;
            self.inner.delete_appointment(id).await
        }

        fn backend_name(&self) -> &'static str {
            "flaky"
        }
    }

    pub(crate) async fn test_state() -> (AppState, Arc<FlakyStore>) {
        let store = Arc::new(FlakyStore::new().await);
        let credentials = AdminCredentials::new("admin", "correct horse").unwrap();
        let state = AppState::new(
            store.clone(),
            credentials,
            FixedOffset::east_opt(7 * 3600).unwrap(),
            default_catalog(),
        );
        (state, store)
    }

    fn submission(name: &str, phone: &str, day: &str, time: &str) -> NewBooking {
        NewBooking {
            service_id: "3".to_string(),
            customer_name: name.to_string(),
            customer_phone: phone.to_string(),
            customer_email: None,
            date: NaiveDate::parse_from_str(day, "%Y-%m-%d").unwrap(),
            time: time.to_string(),
        }
    }

    fn service_input(name: &str, duration: u32, price: f64) -> ServiceInput {
        ServiceInput {
            name: name.to_string(),
            description: "Warm basalt stones".to_string(),
            duration_minutes: duration,
            price,
            image: String::new(),
        }
    }

    #[tokio::test]
    async fn new_bookings_start_pending_and_register_the_customer_once() {
        let (state, store) = test_state().await;
        state
            .create_booking(submission("Trần Thị B", "0987654321", "2024-01-10", "10:00"))
            .await
            .unwrap();
        state
            .create_booking(submission("Trần Thị B", "0987654321", "2024-02-05", "14:00"))
            .await
            .unwrap();

        assert_eq!(store.inner.select_customers().await.unwrap().len(), 1);

        let data = state.snapshot().await;
        assert_eq!(data.bookings.len(), 2);
        assert!(data.bookings.iter().all(|b| b.status == BookingStatus::Pending));
        assert!(data.bookings.iter().all(|b| b.service_id == "3"));
        assert!(data.bookings.iter().all(|b| b.customer_phone == "0987654321"));

        let customer = &data.customers[0];
        assert_eq!(customer.total_visits, 2);
        assert_eq!(
            customer.last_visit,
            Some(NaiveDate::from_ymd_opt(2024, 2, 5).unwrap())
        );
    }

    #[tokio::test]
    async fn booking_an_unknown_service_is_rejected_before_any_write() {
        let (state, store) = test_state().await;
        let mut booking = submission("Lan", "0900000001", "2024-01-10", "10:00");
        booking.service_id = "missing".to_string();

        let err = state.create_booking(booking).await.unwrap_err();
        assert!(matches!(err, SpaError::UnknownService(_)));
        assert!(store.inner.select_customers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_booking_fails_when_the_store_is_down() {
        let (state, store) = test_state().await;
        store.fail.store(true, Ordering::SeqCst);
        let err = state
            .create_booking(submission("Lan", "0900000001", "2024-01-10", "10:00"))
            .await
            .unwrap_err();
        assert!(matches!(err, SpaError::Store(_)));
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_state() {
        let (state, store) = test_state().await;
        state
            .create_booking(submission("Lan", "0900000001", "2024-01-10", "10:00"))
            .await
            .unwrap();

        store.fail.store(true, Ordering::SeqCst);
        assert!(state.refresh().await.is_err());
        assert_eq!(state.snapshot().await.bookings.len(), 1);
    }

    #[tokio::test]
    async fn status_changes_are_applied_in_place() {
        let (state, store) = test_state().await;
        state
            .create_booking(submission("Lan", "0900000001", "2024-01-10", "10:00"))
            .await
            .unwrap();
        let id = state.snapshot().await.bookings[0].id.clone();

        state
            .update_booking_status(&id, BookingStatus::Confirmed)
            .await
            .unwrap();
        assert_eq!(state.snapshot().await.bookings[0].status, BookingStatus::Confirmed);
        assert_eq!(store.inner.select_appointments().await.unwrap()[0].status, "confirmed");

        let err = state
            .update_booking_status("nope", BookingStatus::Cancelled)
            .await
            .unwrap_err();
        assert!(matches!(err, SpaError::BookingNotFound(_)));
    }

    #[tokio::test]
    async fn failed_status_update_leaves_state_untouched() {
        let (state, store) = test_state().await;
        state
            .create_booking(submission("Lan", "0900000001", "2024-01-10", "10:00"))
            .await
            .unwrap();
        let id = state.snapshot().await.bookings[0].id.clone();

        store.fail.store(true, Ordering::SeqCst);
        assert!(state
            .update_booking_status(&id, BookingStatus::Cancelled)
            .await
            .is_err());
        assert_eq!(state.snapshot().await.bookings[0].status, BookingStatus::Pending);
    }

    #[tokio::test]
    async fn declined_delete_is_a_no_op_and_confirmed_delete_removes_one() {
        let (state, _store) = test_state().await;
        state
            .create_booking(submission("Lan", "0900000001", "2024-01-10", "10:00"))
            .await
            .unwrap();
        state
            .create_booking(submission("Lan", "0900000001", "2024-01-11", "11:00"))
            .await
            .unwrap();
        let before = state.snapshot().await.bookings;
        let target = before[0].id.clone();

        assert!(!state.delete_booking(&target, false).await.unwrap());
        assert_eq!(state.snapshot().await.bookings, before);

        assert!(state.delete_booking(&target, true).await.unwrap());
        let after = state.snapshot().await;
        assert_eq!(after.bookings.len(), 1);
        assert_eq!(after.bookings[0].id, before[1].id);
        assert_eq!(after.customers[0].total_visits, 1);
    }

    #[tokio::test]
    async fn catalog_edits_stay_in_memory_and_are_validated() {
        let (state, _store) = test_state().await;
        let added = state
            .add_service(service_input("Hot Stone", 75, 95.0))
            .await
            .unwrap();
        assert_eq!(state.services().await.len(), 5);

        let updated = state
            .update_service(&added.id, service_input("Hot Stone Deluxe", 90, 110.0))
            .await
            .unwrap();
        assert_eq!(updated.name, "Hot Stone Deluxe");

        assert!(matches!(
            state.add_service(service_input("Free", 30, 0.0)).await,
            Ok(_)
        ));
        assert!(matches!(
            state.add_service(service_input("Broken", 0, 10.0)).await,
            Err(SpaError::InvalidService(_))
        ));
        assert!(matches!(
            state.add_service(service_input("Broken", 30, -1.0)).await,
            Err(SpaError::InvalidService(_))
        ));
        assert!(matches!(
            state.add_service(service_input("  ", 30, 10.0)).await,
            Err(SpaError::InvalidService(_))
        ));

        state.delete_service(&added.id).await.unwrap();
        assert!(matches!(
            state.delete_service(&added.id).await,
            Err(SpaError::ServiceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn phone_lookup_hits_and_misses() {
        let (state, _store) = test_state().await;
        state
            .create_booking(submission("Nguyễn Văn A", "0901234567", "2024-01-10", "10:00"))
            .await
            .unwrap();

        let hit = state.get_customer_by_phone("0901234567").await.unwrap().unwrap();
        assert_eq!(hit.name, "Nguyễn Văn A");
        assert_eq!(hit.total_visits, 1);
        assert!(state.get_customer_by_phone("0999999999").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sessions_follow_login_and_logout() {
        let (state, _store) = test_state().await;
        assert!(state.login("admin", "wrong").await.is_none());

        let session = state.login("admin", "correct horse").await.unwrap();
        let admin = state.session(&session).await.unwrap();
        assert_eq!(admin.username, "admin");
        assert!(admin.is_authenticated);

        state.logout(&session).await;
        assert!(state.session(&session).await.is_none());
    }

    #[tokio::test]
    async fn sessions_expire_with_their_cookie() {
        let (state, _store) = test_state().await;
        let stale = state.login("admin", "correct horse").await.unwrap();
        state.sessions.write().await.get_mut(&stale).unwrap().issued_at =
            Utc::now() - chrono::Duration::days(SESSION_MAX_AGE_DAYS + 1);

        assert!(state.session(&stale).await.is_none());
        assert!(state.sessions.read().await.is_empty());

        let older = state.login("admin", "correct horse").await.unwrap();
        state.sessions.write().await.get_mut(&older).unwrap().issued_at =
            Utc::now() - chrono::Duration::days(SESSION_MAX_AGE_DAYS);
        let fresh = state.login("admin", "correct horse").await.unwrap();
        let sessions = state.sessions.read().await;
        assert_eq!(sessions.len(), 1);
        assert!(sessions.contains_key(&fresh));
    }

    #[tokio::test]
    async fn dashboard_revenue_counts_confirmed_and_completed_only() {
        let (state, _store) = test_state().await;
        for day in ["2024-01-10", "2024-01-11", "2024-01-12"] {
            state
                .create_booking(submission("Lan", "0900000001", day, "10:00"))
                .await
                .unwrap();
        }
        let ids: Vec<_> = state
            .snapshot()
            .await
            .bookings
            .iter()
            .map(|b| b.id.clone())
            .collect();
        state.update_booking_status(&ids[0], BookingStatus::Confirmed).await.unwrap();
        state.update_booking_status(&ids[1], BookingStatus::Completed).await.unwrap();

        let stats = state.snapshot().await.stats();
        assert_eq!(stats.total_bookings, 3);
        assert_eq!(stats.pending_bookings, 1);
        assert_eq!(stats.revenue, 130.0);
        assert_eq!(stats.active_services, 4);
        assert!(stats.by_status.contains(&(BookingStatus::Completed, 1)));
    }

    #[tokio::test]
    async fn booking_filter_combines_status_and_search() {
        let (state, _store) = test_state().await;
        state
            .create_booking(submission("Nguyễn Văn A", "0901234567", "2024-01-10", "10:00"))
            .await
            .unwrap();
        state
            .create_booking(submission("Trần Thị B", "0987654321", "2024-01-11", "10:00"))
            .await
            .unwrap();
        let data = state.snapshot().await;

        assert_eq!(data.filter_bookings(None, "").len(), 2);
        assert_eq!(data.filter_bookings(None, "trần").len(), 1);
        assert_eq!(data.filter_bookings(Some(BookingStatus::Confirmed), "").len(), 0);
        assert_eq!(data.filter_bookings(Some(BookingStatus::Pending), "văn a").len(), 1);
    }
}
