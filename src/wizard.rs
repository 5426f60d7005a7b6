//! The four-step customer booking flow.
//!
//! The draft is carried in hidden form fields between requests, so the
//! server keeps nothing per visitor and a reload of `/booking` starts over.

use chrono::NaiveDate;

use crate::models::{Customer, NewBooking, Service};

pub const TIME_SLOTS: [&str; 8] = [
    "09:00", "10:00", "11:00", "13:00", "14:00", "15:00", "16:00", "17:00",
];

/// Phone numbers shorter than this many characters are not looked up.
const LOOKUP_MIN_PHONE_CHARS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WizardStep {
    #[default]
    Service,
    DateTime,
    ContactInfo,
    Confirm,
}

impl WizardStep {
    pub const ALL: [WizardStep; 4] = [
        WizardStep::Service,
        WizardStep::DateTime,
        WizardStep::ContactInfo,
        WizardStep::Confirm,
    ];

    pub fn number(self) -> u8 {
        match self {
            WizardStep::Service => 1,
            WizardStep::DateTime => 2,
            WizardStep::ContactInfo => 3,
            WizardStep::Confirm => 4,
        }
    }

    pub fn from_number(number: u8) -> Option<Self> {
        WizardStep::ALL.into_iter().find(|step| step.number() == number)
    }

    pub fn title(self) -> &'static str {
        match self {
            WizardStep::Service => "Service",
            WizardStep::DateTime => "Date & time",
            WizardStep::ContactInfo => "Your details",
            WizardStep::Confirm => "Confirm",
        }
    }

    fn next(self) -> Option<Self> {
        Self::from_number(self.number() + 1)
    }

    fn prev(self) -> Option<Self> {
        Self::from_number(self.number().checked_sub(1)?)
    }
}

/// Everything the visitor has entered so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingDraft {
    pub service_id: String,
    pub date: String,
    pub time: String,
    pub name: String,
    pub phone: String,
    pub email: String,
    /// "Found existing customer" indicator.
    pub found: bool,
    /// Phone number the indicator was earned with.
    pub lookup_phone: String,
}

impl BookingDraft {
    pub fn parsed_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(self.date.trim(), "%Y-%m-%d").ok()
    }

    fn service_chosen(&self, services: &[Service]) -> bool {
        let id = self.service_id.trim();
        !id.is_empty() && services.iter().any(|service| service.id == id)
    }

    fn date_time_chosen(&self, today: NaiveDate) -> bool {
        let date_ok = self.parsed_date().is_some_and(|date| date >= today);
        date_ok && TIME_SLOTS.contains(&self.time.as_str())
    }

    fn contact_given(&self) -> bool {
        !self.name.trim().is_empty() && !self.phone.trim().is_empty()
    }

    /// Clears the indicator once the phone no longer matches the one it was
    /// found with. Prefilled name and email stay.
    pub fn phone_edited(&mut self) {
        if self.found && self.phone.trim() != self.lookup_phone.trim() {
            self.found = false;
            self.lookup_phone.clear();
        }
    }

    pub fn apply_lookup(&mut self, hit: Option<&Customer>) {
        match hit {
            Some(customer) => {
                self.name = customer.name.clone();
                if let Some(email) = customer.email.as_deref().filter(|e| !e.trim().is_empty()) {
                    self.email = email.to_string();
                }
                self.found = true;
                self.lookup_phone = self.phone.trim().to_string();
            }
            None => {
                self.found = false;
                self.lookup_phone.clear();
            }
        }
    }

    pub fn to_new_booking(&self) -> Option<NewBooking> {
        let email = self.email.trim();
        Some(NewBooking {
            service_id: self.service_id.trim().to_string(),
            customer_name: self.name.trim().to_string(),
            customer_phone: self.phone.trim().to_string(),
            customer_email: (!email.is_empty()).then(|| email.to_string()),
            date: self.parsed_date()?,
            time: self.time.clone(),
        })
    }
}

pub fn should_lookup(phone: &str) -> bool {
    phone.trim().chars().count() >= LOOKUP_MIN_PHONE_CHARS
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Wizard {
    pub step: WizardStep,
    pub draft: BookingDraft,
}

impl Wizard {
    pub fn new(step: WizardStep, mut draft: BookingDraft) -> Self {
        draft.phone_edited();
        Self { step, draft }
    }

    /// Whether the current step's required fields are filled in.
    pub fn can_advance(&self, services: &[Service], today: NaiveDate) -> bool {
        match self.step {
            WizardStep::Service => self.draft.service_chosen(services),
            WizardStep::DateTime => self.draft.date_time_chosen(today),
            WizardStep::ContactInfo => self.draft.contact_given(),
            WizardStep::Confirm => true,
        }
    }

    /// Moves one step forward unless the guard blocks it or the flow is at
    /// its last step.
    pub fn advance(&mut self, services: &[Service], today: NaiveDate) -> bool {
        if !self.can_advance(services, today) {
            return false;
        }
        match self.step.next() {
            Some(next) => {
                self.step = next;
                true
            }
            None => false,
        }
    }

    pub fn back(&mut self) -> bool {
        match self.step.prev() {
            Some(prev) => {
                self.step = prev;
                true
            }
            None => false,
        }
    }

    /// A submittable booking, only from the confirm step with every earlier
    /// step still satisfied.
    pub fn submission(&self, services: &[Service], today: NaiveDate) -> Option<NewBooking> {
        if self.step != WizardStep::Confirm {
            return None;
        }
        let complete = self.draft.service_chosen(services)
            && self.draft.date_time_chosen(today)
            && self.draft.contact_given();
        if !complete {
            return None;
        }
        self.draft.to_new_booking()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::default_catalog;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 8).unwrap()
    }

    fn filled() -> BookingDraft {
        BookingDraft {
            service_id: "1".to_string(),
            date: "2024-01-10".to_string(),
            time: "10:00".to_string(),
            name: "Trần Thị B".to_string(),
            phone: "0987654321".to_string(),
            ..BookingDraft::default()
        }
    }

    fn customer(name: &str, email: Option<&str>) -> Customer {
        Customer {
            id: "c1".to_string(),
            name: name.to_string(),
            phone: "0987654321".to_string(),
            email: email.map(str::to_string),
            total_visits: 1,
            last_visit: None,
        }
    }

    #[test]
    fn continue_is_blocked_without_a_service() {
        let services = default_catalog();
        let mut wizard = Wizard::default();
        assert!(!wizard.can_advance(&services, today()));
        assert!(!wizard.advance(&services, today()));
        assert_eq!(wizard.step, WizardStep::Service);

        wizard.draft.service_id = "does-not-exist".to_string();
        assert!(!wizard.can_advance(&services, today()));

        wizard.draft.service_id = "2".to_string();
        assert!(wizard.advance(&services, today()));
        assert_eq!(wizard.step, WizardStep::DateTime);
    }

    #[test]
    fn date_and_time_are_both_required() {
        let services = default_catalog();
        let mut wizard = Wizard::new(
            WizardStep::DateTime,
            BookingDraft {
                date: "2024-01-10".to_string(),
                ..BookingDraft::default()
            },
        );
        assert!(!wizard.can_advance(&services, today()));
        wizard.draft.time = "12:00".to_string();
        assert!(!wizard.can_advance(&services, today()));
        wizard.draft.time = "13:00".to_string();
        assert!(wizard.can_advance(&services, today()));
        wizard.draft.date = "2024-01-07".to_string();
        assert!(!wizard.can_advance(&services, today()));
    }

    #[test]
    fn email_is_optional_but_name_and_phone_are_not() {
        let services = default_catalog();
        let mut draft = filled();
        draft.email.clear();
        let mut wizard = Wizard::new(WizardStep::ContactInfo, draft);
        assert!(wizard.can_advance(&services, today()));

        wizard.draft.name = "   ".to_string();
        assert!(!wizard.can_advance(&services, today()));
    }

    #[test]
    fn steps_move_linearly_both_ways() {
        let services = default_catalog();
        let mut wizard = Wizard::new(WizardStep::Service, filled());
        for expected in [WizardStep::DateTime, WizardStep::ContactInfo, WizardStep::Confirm] {
            assert!(wizard.advance(&services, today()));
            assert_eq!(wizard.step, expected);
        }
        assert!(!wizard.advance(&services, today()));
        assert!(wizard.back());
        assert_eq!(wizard.step, WizardStep::ContactInfo);

        let mut first = Wizard::default();
        assert!(!first.back());
    }

    #[test]
    fn lookup_hit_prefills_and_miss_leaves_fields() {
        let mut draft = BookingDraft {
            phone: "0987654321".to_string(),
            name: "typed".to_string(),
            email: "typed@example.com".to_string(),
            ..BookingDraft::default()
        };
        draft.apply_lookup(None);
        assert_eq!(draft.name, "typed");
        assert_eq!(draft.email, "typed@example.com");
        assert!(!draft.found);

        draft.apply_lookup(Some(&customer("Trần Thị B", None)));
        assert_eq!(draft.name, "Trần Thị B");
        assert_eq!(draft.email, "typed@example.com");
        assert!(draft.found);

        draft.apply_lookup(Some(&customer("Trần Thị B", Some("b@example.com"))));
        assert_eq!(draft.email, "b@example.com");
    }

    #[test]
    fn editing_the_phone_clears_only_the_indicator() {
        let mut draft = BookingDraft {
            phone: "0987654321".to_string(),
            ..BookingDraft::default()
        };
        draft.apply_lookup(Some(&customer("Trần Thị B", None)));

        draft.phone = "0987654322".to_string();
        let wizard = Wizard::new(WizardStep::ContactInfo, draft);
        assert!(!wizard.draft.found);
        assert_eq!(wizard.draft.name, "Trần Thị B");
    }

    #[test]
    fn lookup_needs_more_than_nine_characters() {
        assert!(!should_lookup("090123456"));
        assert!(should_lookup("0901234567"));
        assert!(!should_lookup("  09012345 "));
    }

    #[test]
    fn submission_only_from_confirm_with_complete_draft() {
        let services = default_catalog();
        let wizard = Wizard::new(WizardStep::ContactInfo, filled());
        assert!(wizard.submission(&services, today()).is_none());

        let wizard = Wizard::new(WizardStep::Confirm, filled());
        let booking = wizard.submission(&services, today()).unwrap();
        assert_eq!(booking.service_id, "1");
        assert_eq!(booking.customer_email, None);
        assert_eq!(booking.date, NaiveDate::from_ymd_opt(2024, 1, 10).unwrap());

        let mut incomplete = filled();
        incomplete.phone.clear();
        let wizard = Wizard::new(WizardStep::Confirm, incomplete);
        assert!(wizard.submission(&services, today()).is_none());
    }
}
