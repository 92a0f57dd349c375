//! Persistence adapter for the active raffle.
//!
//! Loading is a validation pass: the stored record is decoded into a loose
//! shape first, then checked and repaired into a [`Raffle`]. Every repair is
//! reported back so the caller can log it.

use chrono::NaiveDate;
use rifas_models::{
    GridPreset, Participant, Raffle, TOTAL_TICKETS, Ticket, TicketState, TicketStatus,
    initial_tickets,
};
use serde::Deserialize;

use crate::{Storage, StoreError};

/// Storage key of the serialized active raffle.
pub const ACTIVE_RAFFLE_KEY: &str = "activeRaffle";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRaffle {
    id: String,
    title: String,
    description: String,
    #[serde(rename = "itemImageBase64", default)]
    item_image: Option<String>,
    ticket_price: f64,
    raffle_date: NaiveDate,
    lottery_name: String,
    #[serde(default)]
    tickets: Option<Vec<StoredTicket>>,
    #[serde(default)]
    grid_size_preset: Option<String>,
}

#[derive(Deserialize)]
struct StoredTicket {
    #[serde(default)]
    id: String,
    #[serde(default)]
    number: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    participant: Option<Participant>,
}

/// Why the whole ticket collection was replaced by fresh tickets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketReset {
    Missing,
    WrongCount(usize),
    UnknownStatus(String),
    Misnumbered(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Repair {
    #[error("no stored raffle, using the default raffle")]
    Missing,
    #[error("stored raffle is malformed ({reason}), using the default raffle")]
    Malformed { reason: String },
    #[error("stored tickets reset to fresh available tickets: {0:?}")]
    TicketsReset(TicketReset),
    #[error("ticket {number} was {status} without a participant, reset to AVAILABLE")]
    OrphanedStatus { number: String, status: TicketStatus },
    #[error("grid preset {found:?} not recognized, using compact")]
    GridPresetDefaulted { found: String },
}

/// Result of loading the active raffle.
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded {
    pub raffle: Raffle,
    pub repairs: Vec<Repair>,
}

impl Loaded {
    pub fn is_clean(&self) -> bool {
        self.repairs.is_empty()
    }

    fn fallback(repair: Repair) -> Self {
        Self {
            raffle: Raffle::default(),
            repairs: vec![repair],
        }
    }
}

pub fn load_raffle(storage: &dyn Storage) -> Result<Loaded, StoreError> {
    Ok(match storage.get(ACTIVE_RAFFLE_KEY)? {
        Some(text) => decode_raffle(&text),
        None => Loaded::fallback(Repair::Missing),
    })
}

pub fn save_raffle(storage: &dyn Storage, raffle: &Raffle) -> Result<(), StoreError> {
    let text = serde_json::to_string(raffle)?;
    storage.set(ACTIVE_RAFFLE_KEY, &text)
}

/// Decodes and repairs a stored raffle record. Never fails: unusable input
/// falls back to the default raffle.
pub fn decode_raffle(text: &str) -> Loaded {
    let stored: StoredRaffle = match serde_json::from_str(text) {
        Ok(stored) => stored,
        Err(e) => {
            return Loaded::fallback(Repair::Malformed {
                reason: e.to_string(),
            });
        }
    };

    let mut repairs = Vec::new();

    let grid_size_preset = match stored.grid_size_preset.as_deref() {
        None => GridPreset::default(),
        Some(key) => GridPreset::parse(key).unwrap_or_else(|| {
            repairs.push(Repair::GridPresetDefaulted {
                found: key.to_string(),
            });
            GridPreset::default()
        }),
    };

    let tickets = match check_tickets(stored.tickets.as_deref()) {
        Ok(()) => stored
            .tickets
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(index, t)| restore_ticket(index, t, &mut repairs))
            .collect(),
        Err(reason) => {
            repairs.push(Repair::TicketsReset(reason));
            initial_tickets()
        }
    };

    Loaded {
        raffle: Raffle {
            id: stored.id,
            title: stored.title,
            description: stored.description,
            item_image: stored.item_image,
            ticket_price: stored.ticket_price,
            raffle_date: stored.raffle_date,
            lottery_name: stored.lottery_name,
            tickets,
            grid_size_preset,
        },
        repairs,
    }
}

fn check_tickets(tickets: Option<&[StoredTicket]>) -> Result<(), TicketReset> {
    let tickets = tickets.ok_or(TicketReset::Missing)?;
    if tickets.len() != TOTAL_TICKETS {
        return Err(TicketReset::WrongCount(tickets.len()));
    }
    for (index, t) in tickets.iter().enumerate() {
        if TicketStatus::parse(&t.status).is_none() {
            return Err(TicketReset::UnknownStatus(t.status.clone()));
        }
        if t.number != format!("{index:02}") {
            return Err(TicketReset::Misnumbered(t.number.clone()));
        }
    }
    Ok(())
}

fn restore_ticket(index: usize, stored: StoredTicket, repairs: &mut Vec<Repair>) -> Ticket {
    let mut ticket = Ticket::available(index);
    if !stored.id.is_empty() {
        ticket.id = stored.id;
    }
    // Statuses were checked by `check_tickets`.
    let status = TicketStatus::parse(&stored.status).unwrap_or(TicketStatus::Available);
    ticket.state = match (status, stored.participant) {
        (TicketStatus::Available, _) => TicketState::Available,
        (TicketStatus::Reserved, Some(p)) => TicketState::Reserved(p),
        (TicketStatus::Paid, Some(p)) => TicketState::Paid(p),
        (status, None) => {
            repairs.push(Repair::OrphanedStatus {
                number: ticket.number.clone(),
                status,
            });
            TicketState::Available
        }
    };
    ticket
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStorage;
    use rifas_models::{RaffleAction, reduce};
    use serde_json::{Value, json};

    fn ana() -> Participant {
        Participant {
            name: "Ana".into(),
            phone: "3001234567".into(),
            email: "ana@example.com".into(),
        }
    }

    fn busy_raffle() -> Raffle {
        let raffle = Raffle {
            item_image: Some("data:image/png;base64,AAAA".into()),
            grid_size_preset: GridPreset::Large,
            ticket_price: 2.5,
            ..Raffle::default()
        };
        let raffle = reduce(
            &raffle,
            RaffleAction::Reserve { number: "07".into(), participant: ana() },
        )
        .unwrap();
        let raffle = reduce(
            &raffle,
            RaffleAction::Reserve { number: "42".into(), participant: ana() },
        )
        .unwrap();
        reduce(&raffle, RaffleAction::MarkPaid { number: "42".into() }).unwrap()
    }

    fn stored_json(raffle: &Raffle) -> Value {
        serde_json::to_value(raffle).unwrap()
    }

    #[test]
    fn persist_then_reload_is_identical() {
        let storage = MemoryStorage::new();
        let raffle = busy_raffle();
        save_raffle(&storage, &raffle).unwrap();

        let loaded = load_raffle(&storage).unwrap();
        assert!(loaded.is_clean(), "{:?}", loaded.repairs);
        assert_eq!(loaded.raffle, raffle);
    }

    #[test]
    fn missing_record_falls_back_to_default() {
        let loaded = load_raffle(&MemoryStorage::new()).unwrap();
        assert_eq!(loaded.raffle, Raffle::default());
        assert_eq!(loaded.repairs, vec![Repair::Missing]);
    }

    #[test]
    fn malformed_record_falls_back_to_default() {
        let loaded = decode_raffle("{not json");
        assert_eq!(loaded.raffle, Raffle::default());
        assert!(matches!(loaded.repairs[0], Repair::Malformed { .. }));

        let loaded = decode_raffle(r#"{"id":"x","title":"sin fecha"}"#);
        assert_eq!(loaded.raffle.id, Raffle::default().id);
    }

    #[test]
    fn short_ticket_list_is_replaced() {
        let mut value = stored_json(&busy_raffle());
        let tickets = value["tickets"].as_array_mut().unwrap();
        tickets.truncate(50);

        let loaded = decode_raffle(&value.to_string());
        assert_eq!(loaded.repairs, vec![Repair::TicketsReset(TicketReset::WrongCount(50))]);
        assert_eq!(loaded.raffle.tickets, initial_tickets());
        assert_eq!(loaded.raffle.title, busy_raffle().title);
    }

    #[test]
    fn unknown_status_resets_all_tickets() {
        let mut value = stored_json(&busy_raffle());
        value["tickets"][3]["status"] = json!("SELECTED");

        let loaded = decode_raffle(&value.to_string());
        assert_eq!(
            loaded.repairs,
            vec![Repair::TicketsReset(TicketReset::UnknownStatus("SELECTED".into()))]
        );
        assert_eq!(loaded.raffle.counts().available, TOTAL_TICKETS);
    }

    #[test]
    fn missing_tickets_are_initialized() {
        let mut value = stored_json(&busy_raffle());
        value.as_object_mut().unwrap().remove("tickets");
        let loaded = decode_raffle(&value.to_string());
        assert_eq!(loaded.repairs, vec![Repair::TicketsReset(TicketReset::Missing)]);
        assert_eq!(loaded.raffle.tickets.len(), TOTAL_TICKETS);
    }

    #[test]
    fn orphaned_status_is_forced_available() {
        let mut value = stored_json(&busy_raffle());
        value["tickets"][7].as_object_mut().unwrap().remove("participant");

        let loaded = decode_raffle(&value.to_string());
        assert_eq!(
            loaded.repairs,
            vec![Repair::OrphanedStatus {
                number: "07".into(),
                status: TicketStatus::Reserved
            }]
        );
        assert!(loaded.raffle.ticket("07").unwrap().is_available());
        assert_eq!(loaded.raffle.ticket("42").unwrap().status(), TicketStatus::Paid);
    }

    #[test]
    fn missing_grid_preset_defaults_to_compact() {
        let mut value = stored_json(&busy_raffle());
        value.as_object_mut().unwrap().remove("gridSizePreset");
        let loaded = decode_raffle(&value.to_string());
        assert!(loaded.is_clean());
        assert_eq!(loaded.raffle.grid_size_preset, GridPreset::Compact);

        value["gridSizePreset"] = json!("gigantic");
        let loaded = decode_raffle(&value.to_string());
        assert_eq!(
            loaded.repairs,
            vec![Repair::GridPresetDefaulted { found: "gigantic".into() }]
        );
    }
}
