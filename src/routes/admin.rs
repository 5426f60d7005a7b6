use actix_web::{http::StatusCode, middleware::from_fn, web, HttpRequest, HttpResponse};
use askama::Template;
use serde::Deserialize;

use crate::{
    auth::{admin_guard, clear_session_cookie, session_cookie, session_id, LOGIN_PATH},
    models::{AdminUser, Booking, BookingStatus, Customer, Service, ServiceInput},
    state::{AppState, SpaData, SpaError},
    templates::{price_label, redirect, render_private, render_private_status},
};

const DASHBOARD_PATH: &str = "/admin/dashboard";
const BOOKINGS_PATH: &str = "/admin/bookings";
const SERVICES_PATH: &str = "/admin/services";
const RECENT_BOOKINGS: usize = 5;

#[derive(Clone, Debug)]
struct StatCard {
    label: &'static str,
    value: String,
}

#[derive(Clone, Debug)]
struct StatusBar {
    label: &'static str,
    css: &'static str,
    count: usize,
    percent: usize,
}

#[derive(Clone, Debug)]
struct BookingView {
    id: String,
    service: String,
    customer_name: String,
    customer_phone: String,
    email: String,
    has_email: bool,
    date: String,
    time: String,
    status: &'static str,
    status_label: &'static str,
    can_confirm: bool,
    can_cancel: bool,
    can_complete: bool,
}

#[derive(Clone, Debug)]
struct CustomerView {
    name: String,
    phone: String,
    email: String,
    has_email: bool,
    total_visits: u32,
    last_visit: String,
}

#[derive(Clone, Debug)]
struct ServiceView {
    id: String,
    name: String,
    description: String,
    duration: u32,
    price: String,
    image: String,
}

#[derive(Clone, Debug)]
struct FilterOption {
    value: &'static str,
    label: &'static str,
    selected: bool,
}

#[derive(Clone, Debug, Default)]
struct ServiceFormView {
    action: String,
    heading: &'static str,
    submit_label: &'static str,
    editing: bool,
    name: String,
    description: String,
    duration: String,
    price: String,
    image: String,
}

#[derive(Template)]
#[template(path = "admin_login.html")]
struct AdminLoginTemplate {
    username: String,
    error: String,
    has_error: bool,
}

#[derive(Template)]
#[template(path = "admin_dashboard.html")]
struct AdminDashboardTemplate {
    admin_name: String,
    stats: Vec<StatCard>,
    bars: Vec<StatusBar>,
    recent: Vec<BookingView>,
}

#[derive(Template)]
#[template(path = "admin_bookings.html")]
struct AdminBookingsTemplate {
    admin_name: String,
    bookings: Vec<BookingView>,
    filters: Vec<FilterOption>,
    search: String,
}

#[derive(Template)]
#[template(path = "admin_booking_delete.html")]
struct AdminBookingDeleteTemplate {
    admin_name: String,
    booking: BookingView,
}

#[derive(Template)]
#[template(path = "admin_customers.html")]
struct AdminCustomersTemplate {
    admin_name: String,
    customers: Vec<CustomerView>,
    search: String,
}

#[derive(Template)]
#[template(path = "admin_services.html")]
struct AdminServicesTemplate {
    admin_name: String,
    services: Vec<ServiceView>,
    form: ServiceFormView,
    errors: Vec<String>,
}

#[derive(Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct BookingFilter {
    status: String,
    q: String,
}

#[derive(Deserialize)]
struct StatusForm {
    status: String,
}

#[derive(Deserialize)]
struct DeleteForm {
    confirm: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct SearchQuery {
    q: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct EditQuery {
    edit: String,
}

#[derive(Deserialize, Default, Clone)]
#[serde(default)]
struct ServiceForm {
    name: String,
    description: String,
    duration: String,
    price: String,
    image: String,
}

impl ServiceForm {
    fn parse(&self) -> Result<ServiceInput, Vec<String>> {
        let mut errors = Vec::new();
        let duration_minutes = self.duration.trim().parse::<u32>().unwrap_or_else(|_| {
            errors.push("Duration must be a whole number of minutes.".to_string());
            0
        });
        let price = self.price.trim().parse::<f64>().unwrap_or_else(|_| {
            errors.push("Price must be a number.".to_string());
            0.0
        });
        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(ServiceInput {
            name: self.name.clone(),
            description: self.description.clone(),
            duration_minutes,
            price,
            image: self.image.clone(),
        })
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/admin/login")
            .route(web::get().to(login_page))
            .route(web::post().to(login)),
    )
    .service(
        web::resource("/admin/logout")
            .route(web::get().to(logout))
            .route(web::post().to(logout)),
    )
    .service(web::resource("/admin").route(web::get().to(index)))
    .service(web::resource("/admin/").route(web::get().to(index)))
    .service(
        web::scope("/admin")
            .wrap(from_fn(admin_guard))
            .service(web::resource("/dashboard").route(web::get().to(dashboard)))
            .service(web::resource("/bookings").route(web::get().to(list_bookings)))
            .service(web::resource("/bookings/{id}/status").route(web::post().to(update_status)))
            .service(
                web::resource("/bookings/{id}/delete")
                    .route(web::get().to(confirm_delete))
                    .route(web::post().to(delete_booking)),
            )
            .service(web::resource("/customers").route(web::get().to(list_customers)))
            .service(
                web::resource("/services")
                    .route(web::get().to(list_services))
                    .route(web::post().to(create_service)),
            )
            .service(web::resource("/services/{id}").route(web::post().to(update_service)))
            .service(web::resource("/services/{id}/delete").route(web::post().to(delete_service))),
    );
}

async fn index() -> HttpResponse {
    redirect(DASHBOARD_PATH)
}

async fn login_page(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    if let Some(id) = session_id(&req) {
        if state.session(&id).await.is_some() {
            return redirect(DASHBOARD_PATH);
        }
    }
    render_private(AdminLoginTemplate {
        username: String::new(),
        error: String::new(),
        has_error: false,
    })
}

async fn login(
    req: HttpRequest,
    state: web::Data<AppState>,
    form: web::Form<LoginForm>,
) -> HttpResponse {
    let form = form.into_inner();
    match state.login(&form.username, &form.password).await {
        Some(session) => {
            let mut response = redirect(DASHBOARD_PATH);
            if let Err(err) = response.add_cookie(&session_cookie(&req, &session)) {
                log::error!("Failed to set session cookie: {err}");
                return HttpResponse::InternalServerError().finish();
            }
            response
        }
        None => render_private_status(
            StatusCode::UNAUTHORIZED,
            AdminLoginTemplate {
                username: form.username,
                error: "Invalid username or password.".to_string(),
                has_error: true,
            },
        ),
    }
}

async fn logout(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    if let Some(id) = session_id(&req) {
        state.logout(&id).await;
    }
    let mut response = redirect(LOGIN_PATH);
    if let Err(err) = response.add_cookie(&clear_session_cookie(&req)) {
        log::warn!("Failed to clear session cookie: {err}");
    }
    response
}

async fn dashboard(state: web::Data<AppState>, admin: web::ReqData<AdminUser>) -> HttpResponse {
    // Picks up bookings other processes wrote. On failure the old view stays.
    let _ = state.refresh().await;
    let data = state.snapshot().await;
    let stats = data.stats();

    let cards = vec![
        StatCard {
            label: "Total bookings",
            value: stats.total_bookings.to_string(),
        },
        StatCard {
            label: "Awaiting review",
            value: stats.pending_bookings.to_string(),
        },
        StatCard {
            label: "Revenue",
            value: price_label(stats.revenue),
        },
        StatCard {
            label: "Active services",
            value: stats.active_services.to_string(),
        },
    ];

    let bars = stats
        .by_status
        .iter()
        .map(|(status, count)| StatusBar {
            label: status.label(),
            css: status.as_str(),
            count: *count,
            percent: percent_of(*count, stats.total_bookings),
        })
        .collect();

    let recent = data
        .bookings
        .iter()
        .take(RECENT_BOOKINGS)
        .map(|booking| to_view(booking, &data))
        .collect();

    render_private(AdminDashboardTemplate {
        admin_name: admin.username.clone(),
        stats: cards,
        bars,
        recent,
    })
}

async fn list_bookings(
    state: web::Data<AppState>,
    admin: web::ReqData<AdminUser>,
    query: web::Query<BookingFilter>,
) -> HttpResponse {
    let query = query.into_inner();
    let status = query.status.parse::<BookingStatus>().ok();
    let data = state.snapshot().await;
    let bookings = data
        .filter_bookings(status, &query.q)
        .iter()
        .map(|booking| to_view(booking, &data))
        .collect();

    let mut filters = vec![FilterOption {
        value: "all",
        label: "All statuses",
        selected: status.is_none(),
    }];
    filters.extend(BookingStatus::ALL.into_iter().map(|candidate| FilterOption {
        value: candidate.as_str(),
        label: candidate.label(),
        selected: status == Some(candidate),
    }));

    render_private(AdminBookingsTemplate {
        admin_name: admin.username.clone(),
        bookings,
        filters,
        search: query.q,
    })
}

async fn update_status(
    state: web::Data<AppState>,
    path: web::Path<String>,
    form: web::Form<StatusForm>,
) -> HttpResponse {
    let id = path.into_inner();
    let status = match form.status.parse::<BookingStatus>() {
        Ok(status) => status,
        Err(err) => return HttpResponse::BadRequest().body(err.to_string()),
    };
    // The list is redrawn from whatever state survived; failures only log.
    if let Err(err) = state.update_booking_status(&id, status).await {
        log::error!("Status update of booking {id} failed: {err}");
    }
    redirect(BOOKINGS_PATH)
}

async fn confirm_delete(
    state: web::Data<AppState>,
    admin: web::ReqData<AdminUser>,
    path: web::Path<String>,
) -> HttpResponse {
    let id = path.into_inner();
    let data = state.snapshot().await;
    let Some(booking) = data.booking(&id) else {
        return HttpResponse::NotFound().body("Booking not found");
    };
    render_private(AdminBookingDeleteTemplate {
        admin_name: admin.username.clone(),
        booking: to_view(booking, &data),
    })
}

async fn delete_booking(
    state: web::Data<AppState>,
    path: web::Path<String>,
    form: web::Form<DeleteForm>,
) -> HttpResponse {
    let id = path.into_inner();
    let confirmed = form.confirm == "yes";
    if let Err(err) = state.delete_booking(&id, confirmed).await {
        log::error!("Deleting booking {id} failed: {err}");
    }
    redirect(BOOKINGS_PATH)
}

async fn list_customers(
    state: web::Data<AppState>,
    admin: web::ReqData<AdminUser>,
    query: web::Query<SearchQuery>,
) -> HttpResponse {
    let search = query.into_inner().q;
    let needle = search.trim().to_lowercase();
    let customers = state
        .snapshot()
        .await
        .customers
        .iter()
        .filter(|customer| {
            needle.is_empty()
                || customer.name.to_lowercase().contains(&needle)
                || customer.phone.contains(&needle)
        })
        .map(customer_view)
        .collect();

    render_private(AdminCustomersTemplate {
        admin_name: admin.username.clone(),
        customers,
        search,
    })
}

async fn list_services(
    state: web::Data<AppState>,
    admin: web::ReqData<AdminUser>,
    query: web::Query<EditQuery>,
) -> HttpResponse {
    let services = state.services().await;
    let form = services
        .iter()
        .find(|service| service.id == query.edit)
        .map(edit_form)
        .unwrap_or_else(|| create_form(ServiceForm::default()));
    services_page(StatusCode::OK, &admin, &services, form, Vec::new())
}

async fn create_service(
    state: web::Data<AppState>,
    admin: web::ReqData<AdminUser>,
    form: web::Form<ServiceForm>,
) -> HttpResponse {
    let form = form.into_inner();
    let result = match form.parse() {
        Ok(input) => state.add_service(input).await.map_err(|err| vec![err.to_string()]),
        Err(errors) => Err(errors),
    };
    match result {
        Ok(service) => {
            log::info!("Added service {} ({})", service.name, service.id);
            redirect(SERVICES_PATH)
        }
        Err(errors) => {
            let services = state.services().await;
            services_page(
                StatusCode::BAD_REQUEST,
                &admin,
                &services,
                create_form(form),
                errors,
            )
        }
    }
}

async fn update_service(
    state: web::Data<AppState>,
    admin: web::ReqData<AdminUser>,
    path: web::Path<String>,
    form: web::Form<ServiceForm>,
) -> HttpResponse {
    let id = path.into_inner();
    let form = form.into_inner();
    let result = match form.parse() {
        Ok(input) => state.update_service(&id, input).await,
        Err(errors) => {
            let services = state.services().await;
            return services_page(
                StatusCode::BAD_REQUEST,
                &admin,
                &services,
                update_form(&id, form),
                errors,
            );
        }
    };
    match result {
        Ok(_) => redirect(SERVICES_PATH),
        Err(SpaError::ServiceNotFound(_)) => HttpResponse::NotFound().body("Service not found"),
        Err(err) => {
            let services = state.services().await;
            services_page(
                StatusCode::BAD_REQUEST,
                &admin,
                &services,
                update_form(&id, form),
                vec![err.to_string()],
            )
        }
    }
}

async fn delete_service(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let id = path.into_inner();
    match state.delete_service(&id).await {
        Ok(()) => redirect(SERVICES_PATH),
        Err(err) => {
            log::warn!("Deleting service {id} failed: {err}");
            HttpResponse::NotFound().body("Service not found")
        }
    }
}

fn services_page(
    status: StatusCode,
    admin: &AdminUser,
    services: &[Service],
    form: ServiceFormView,
    errors: Vec<String>,
) -> HttpResponse {
    render_private_status(
        status,
        AdminServicesTemplate {
            admin_name: admin.username.clone(),
            services: services.iter().map(service_view).collect(),
            form,
            errors,
        },
    )
}

fn create_form(form: ServiceForm) -> ServiceFormView {
    ServiceFormView {
        action: SERVICES_PATH.to_string(),
        heading: "Add a service",
        submit_label: "Add service",
        editing: false,
        name: form.name,
        description: form.description,
        duration: form.duration,
        price: form.price,
        image: form.image,
    }
}

fn update_form(id: &str, form: ServiceForm) -> ServiceFormView {
    ServiceFormView {
        action: format!("{SERVICES_PATH}/{id}"),
        heading: "Edit service",
        submit_label: "Save changes",
        editing: true,
        ..create_form(form)
    }
}

fn edit_form(service: &Service) -> ServiceFormView {
    update_form(
        &service.id,
        ServiceForm {
            name: service.name.clone(),
            description: service.description.clone(),
            duration: service.duration_minutes.to_string(),
            price: service.price.to_string(),
            image: service.image.clone(),
        },
    )
}

fn to_view(booking: &Booking, data: &SpaData) -> BookingView {
    let email = booking.customer_email.clone().unwrap_or_default();
    BookingView {
        id: booking.id.clone(),
        service: data
            .service(&booking.service_id)
            .map(|service| service.name.clone())
            .unwrap_or_else(|| "Unknown service".to_string()),
        customer_name: booking.customer_name.clone(),
        customer_phone: booking.customer_phone.clone(),
        has_email: !email.is_empty(),
        email,
        date: booking.date.format("%d/%m/%Y").to_string(),
        time: booking.time.clone(),
        status: booking.status.as_str(),
        status_label: booking.status.label(),
        can_confirm: booking.status == BookingStatus::Pending,
        can_cancel: matches!(booking.status, BookingStatus::Pending | BookingStatus::Confirmed),
        can_complete: booking.status == BookingStatus::Confirmed,
    }
}

fn customer_view(customer: &Customer) -> CustomerView {
    let email = customer.email.clone().unwrap_or_default();
    CustomerView {
        name: customer.name.clone(),
        phone: customer.phone.clone(),
        has_email: !email.is_empty(),
        email,
        total_visits: customer.total_visits,
        last_visit: customer
            .last_visit
            .map(|date| date.format("%d/%m/%Y").to_string())
            .unwrap_or_else(|| "Never".to_string()),
    }
}

fn service_view(service: &Service) -> ServiceView {
    ServiceView {
        id: service.id.clone(),
        name: service.name.clone(),
        description: service.description.clone(),
        duration: service.duration_minutes,
        price: price_label(service.price),
        image: service.image.clone(),
    }
}

fn percent_of(count: usize, total: usize) -> usize {
    if total == 0 {
        0
    } else {
        count * 100 / total
    }
}
