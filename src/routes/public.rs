use actix_web::{web, HttpResponse};
use askama::Template;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    models::Service,
    state::AppState,
    templates::{price_label, redirect, render},
    wizard::{should_lookup, BookingDraft, Wizard, WizardStep, TIME_SLOTS},
};

#[derive(Clone, Debug)]
struct ServiceCard {
    id: String,
    name: String,
    description: String,
    duration: u32,
    price: String,
    image: String,
    selected: bool,
}

impl ServiceCard {
    fn new(service: &Service, selected_id: &str) -> Self {
        Self {
            id: service.id.clone(),
            name: service.name.clone(),
            description: service.description.clone(),
            duration: service.duration_minutes,
            price: price_label(service.price),
            image: service.image.clone(),
            selected: service.id == selected_id,
        }
    }
}

#[derive(Clone, Debug)]
struct StepBadge {
    number: u8,
    title: &'static str,
    active: bool,
    completed: bool,
}

#[derive(Clone, Debug)]
struct SlotOption {
    value: &'static str,
    selected: bool,
}

#[derive(Template)]
#[template(path = "home.html")]
struct HomeTemplate {
    featured: Vec<ServiceCard>,
}

#[derive(Template)]
#[template(path = "booking.html")]
struct BookingTemplate {
    steps: Vec<StepBadge>,
    step_number: u8,
    on_service: bool,
    on_datetime: bool,
    on_contact: bool,
    on_confirm: bool,
    services: Vec<ServiceCard>,
    slots: Vec<SlotOption>,
    draft: BookingDraft,
    min_date: String,
    can_advance: bool,
    can_go_back: bool,
    summary_service: String,
    summary_price: String,
    has_email: bool,
    errors: Vec<String>,
}

#[derive(Template)]
#[template(path = "success.html")]
struct SuccessTemplate;

#[derive(Deserialize, Default)]
#[serde(default)]
struct WizardForm {
    step: u8,
    action: String,
    service_id: String,
    date: String,
    time: String,
    name: String,
    phone: String,
    email: String,
    found: bool,
    lookup_phone: String,
}

impl WizardForm {
    fn into_wizard(self) -> Wizard {
        let step = WizardStep::from_number(self.step).unwrap_or_default();
        Wizard::new(
            step,
            BookingDraft {
                service_id: self.service_id,
                date: self.date,
                time: self.time,
                name: self.name,
                phone: self.phone,
                email: self.email,
                found: self.found,
                lookup_phone: self.lookup_phone,
            },
        )
    }
}

#[derive(Deserialize)]
struct LookupQuery {
    phone: String,
}

#[derive(Serialize)]
struct LookupResponse {
    found: bool,
    name: String,
    email: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::get().to(home)))
        .service(
            web::resource("/booking")
                .route(web::get().to(show_booking))
                .route(web::post().to(booking_step)),
        )
        .service(web::resource("/booking/lookup").route(web::get().to(lookup)))
        .service(web::resource("/success").route(web::get().to(success)))
        .service(web::resource("/health").route(web::get().to(health)));
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("ok")
}

async fn home(state: web::Data<AppState>) -> HttpResponse {
    let featured = state
        .services()
        .await
        .iter()
        .take(3)
        .map(|service| ServiceCard::new(service, ""))
        .collect();
    render(HomeTemplate { featured })
}

async fn show_booking(state: web::Data<AppState>) -> HttpResponse {
    let services = state.services().await;
    render(booking_page(&Wizard::default(), &services, state.today(), Vec::new()))
}

async fn booking_step(state: web::Data<AppState>, form: web::Form<WizardForm>) -> HttpResponse {
    let form = form.into_inner();
    let action = form.action.clone();
    let mut wizard = form.into_wizard();
    let services = state.services().await;
    let today = state.today();
    let mut errors = Vec::new();

    match action.as_str() {
        "back" => {
            wizard.back();
        }
        "lookup" => lookup_customer(&state, &mut wizard.draft).await,
        "submit" => match wizard.submission(&services, today) {
            Some(booking) => match state.create_booking(booking).await {
                Ok(()) => return redirect("/success"),
                Err(err) => {
                    log::error!("Booking submission failed: {err}");
                    errors.push("We could not save your booking. Please try again.".to_string());
                }
            },
            None => {
                errors.push("Some details are missing. Please go back and complete every step.".to_string())
            }
        },
        _ => {
            if !wizard.advance(&services, today) && wizard.step != WizardStep::Confirm {
                errors.push(step_hint(wizard.step).to_string());
            }
        }
    }

    render(booking_page(&wizard, &services, today, errors))
}

async fn lookup(state: web::Data<AppState>, query: web::Query<LookupQuery>) -> HttpResponse {
    let mut draft = BookingDraft {
        phone: query.into_inner().phone,
        ..BookingDraft::default()
    };
    lookup_customer(&state, &mut draft).await;
    HttpResponse::Ok().json(LookupResponse {
        found: draft.found,
        name: draft.name,
        email: draft.email,
    })
}

async fn success() -> HttpResponse {
    render(SuccessTemplate)
}

async fn lookup_customer(state: &AppState, draft: &mut BookingDraft) {
    if !should_lookup(&draft.phone) {
        return;
    }
    match state.get_customer_by_phone(draft.phone.trim()).await {
        Ok(hit) => draft.apply_lookup(hit.as_ref()),
        Err(err) => {
            log::warn!("Customer lookup failed: {err}");
            draft.apply_lookup(None);
        }
    }
}

fn step_hint(step: WizardStep) -> &'static str {
    match step {
        WizardStep::Service => "Please choose a service.",
        WizardStep::DateTime => "Please pick a date from today on and one of the time slots.",
        WizardStep::ContactInfo => "Please enter your name and phone number.",
        WizardStep::Confirm => "",
    }
}

fn booking_page(
    wizard: &Wizard,
    services: &[Service],
    today: NaiveDate,
    errors: Vec<String>,
) -> BookingTemplate {
    let draft = wizard.draft.clone();
    let step = wizard.step;
    let chosen = services.iter().find(|service| service.id == draft.service_id);

    BookingTemplate {
        steps: WizardStep::ALL
            .into_iter()
            .map(|candidate| StepBadge {
                number: candidate.number(),
                title: candidate.title(),
                active: candidate == step,
                completed: candidate.number() < step.number(),
            })
            .collect(),
        step_number: step.number(),
        on_service: step == WizardStep::Service,
        on_datetime: step == WizardStep::DateTime,
        on_contact: step == WizardStep::ContactInfo,
        on_confirm: step == WizardStep::Confirm,
        services: services
            .iter()
            .map(|service| ServiceCard::new(service, &draft.service_id))
            .collect(),
        slots: TIME_SLOTS
            .into_iter()
            .map(|value| SlotOption {
                value,
                selected: draft.time == value,
            })
            .collect(),
        min_date: today.format("%Y-%m-%d").to_string(),
        can_advance: wizard.can_advance(services, today),
        can_go_back: step != WizardStep::Service,
        summary_service: chosen.map(|s| s.name.clone()).unwrap_or_default(),
        summary_price: chosen.map(|s| price_label(s.price)).unwrap_or_default(),
        has_email: !draft.email.trim().is_empty(),
        errors,
        draft,
    }
}
