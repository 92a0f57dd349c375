//! Field-level validation for the raffle form and the reservation form.
//!
//! Validators collect every failing field in one pass so the caller can
//! show all messages next to their inputs at once.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::raffle::{GridPreset, Raffle};
use crate::ticket::Participant;

static PHONE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{7,15}$").expect("phone pattern compiles"));
static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\S+@\S+\.\S+").expect("email pattern compiles"));

pub mod field {
    pub const TITLE: &str = "title";
    pub const DESCRIPTION: &str = "description";
    pub const ITEM_IMAGE: &str = "itemImage";
    pub const TICKET_PRICE: &str = "ticketPrice";
    pub const RAFFLE_DATE: &str = "raffleDate";
    pub const LOTTERY_NAME: &str = "lotteryName";
    pub const NAME: &str = "name";
    pub const PHONE: &str = "phone";
    pub const EMAIL: &str = "email";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{} invalid field(s)", .errors.len())]
pub struct ValidationErrors {
    pub errors: BTreeMap<&'static str, String>,
}

impl ValidationErrors {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.errors.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    fn add(&mut self, field: &'static str, message: &str) {
        self.errors.insert(field, message.to_string());
    }

    fn into_result<T>(self, value: impl FnOnce() -> T) -> Result<T, ValidationErrors> {
        if self.is_empty() { Ok(value()) } else { Err(self) }
    }
}

// --- Raffle form ---

/// Raffle form input as typed by the administrator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaffleDraft {
    pub title: String,
    pub description: String,
    #[serde(default, rename = "itemImageBase64")]
    pub item_image: Option<String>,
    pub ticket_price: String,
    pub raffle_date: String,
    pub lottery_name: String,
    #[serde(default)]
    pub grid_size_preset: Option<GridPreset>,
}

impl RaffleDraft {
    /// Form prefilled with the values of an existing raffle.
    pub fn from_raffle(raffle: &Raffle) -> Self {
        Self {
            title: raffle.title.clone(),
            description: raffle.description.clone(),
            item_image: raffle.item_image.clone(),
            ticket_price: raffle.ticket_price.to_string(),
            raffle_date: raffle.raffle_date.format("%Y-%m-%d").to_string(),
            lottery_name: raffle.lottery_name.clone(),
            grid_size_preset: Some(raffle.grid_size_preset),
        }
    }
}

/// Descriptive raffle fields that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct RaffleDetails {
    pub title: String,
    pub description: String,
    pub item_image: String,
    pub ticket_price: f64,
    pub raffle_date: NaiveDate,
    pub lottery_name: String,
    pub grid_size_preset: Option<GridPreset>,
}

pub fn validate_raffle(
    draft: &RaffleDraft,
    now: DateTime<Utc>,
) -> Result<RaffleDetails, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    let title = draft.title.trim();
    if title.is_empty() {
        errors.add(field::TITLE, "El título es obligatorio.");
    }
    let description = draft.description.trim();
    if description.is_empty() {
        errors.add(field::DESCRIPTION, "La descripción es obligatoria.");
    }

    let price = draft.ticket_price.trim();
    let ticket_price = if price.is_empty() {
        errors.add(field::TICKET_PRICE, "El precio es obligatorio.");
        None
    } else {
        match price.parse::<f64>() {
            Ok(p) if p.is_finite() && p > 0.0 => Some(p),
            _ => {
                errors.add(field::TICKET_PRICE, "El precio debe ser un número positivo.");
                None
            }
        }
    };

    let date = draft.raffle_date.trim();
    let raffle_date = if date.is_empty() {
        errors.add(field::RAFFLE_DATE, "La fecha es obligatoria.");
        None
    } else {
        match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
            Ok(d) if draw_moment(d) > now => Some(d),
            Ok(_) => {
                errors.add(field::RAFFLE_DATE, "La fecha debe ser futura.");
                None
            }
            Err(_) => {
                errors.add(field::RAFFLE_DATE, "La fecha no es válida.");
                None
            }
        }
    };

    let lottery_name = draft.lottery_name.trim();
    if lottery_name.is_empty() {
        errors.add(field::LOTTERY_NAME, "El nombre de la lotería es obligatorio.");
    }

    let item_image = draft
        .item_image
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    if item_image.is_none() {
        errors.add(field::ITEM_IMAGE, "La imagen del artículo es obligatoria.");
    }

    match (ticket_price, raffle_date, item_image) {
        (Some(ticket_price), Some(raffle_date), Some(item_image)) => errors.into_result(|| RaffleDetails {
            title: title.to_string(),
            description: description.to_string(),
            item_image: item_image.to_string(),
            ticket_price,
            raffle_date,
            lottery_name: lottery_name.to_string(),
            grid_size_preset: draft.grid_size_preset,
        }),
        _ => Err(errors),
    }
}

/// A date-only draw date counts from midnight UTC.
fn draw_moment(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc()
}

// --- Reservation form ---

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantDraft {
    pub name: String,
    pub phone: String,
    pub email: String,
}

pub fn validate_participant(draft: &ParticipantDraft) -> Result<Participant, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    let name = draft.name.trim();
    if name.is_empty() {
        errors.add(field::NAME, "El nombre es obligatorio.");
    }

    let phone = draft.phone.trim();
    if phone.is_empty() {
        errors.add(field::PHONE, "El celular es obligatorio.");
    } else if !PHONE_PATTERN.is_match(phone) {
        errors.add(field::PHONE, "Número de celular inválido.");
    }

    let email = draft.email.trim();
    if email.is_empty() {
        errors.add(field::EMAIL, "El correo es obligatorio.");
    } else if !EMAIL_PATTERN.is_match(email) {
        errors.add(field::EMAIL, "Correo electrónico inválido.");
    }

    errors.into_result(|| Participant {
        name: name.to_string(),
        phone: phone.to_string(),
        email: email.to_string(),
    })
}
