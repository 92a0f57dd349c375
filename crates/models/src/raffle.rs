use chrono::{Locale, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::ticket::{Ticket, TicketStatus, initial_tickets};

/// Named sizing configuration for the ticket grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GridPreset {
    #[default]
    Compact,
    Regular,
    Large,
}

impl GridPreset {
    pub const ALL: [GridPreset; 3] = [Self::Compact, Self::Regular, Self::Large];

    pub const fn key(self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Regular => "regular",
            Self::Large => "large",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Compact => "Compacto",
            Self::Regular => "Regular",
            Self::Large => "Grande",
        }
    }

    /// Cell edge in CSS pixels.
    pub const fn cell_px(self) -> u32 {
        match self {
            Self::Compact => 44,
            Self::Regular => 56,
            Self::Large => 64,
        }
    }

    pub const fn font_px(self) -> u32 {
        match self {
            Self::Compact => 14,
            Self::Regular => 16,
            Self::Large => 18,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.key() == value.trim())
    }
}

/// The single active raffle, including all 100 tickets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Raffle {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Data URL of the prize image. The built-in default uses a remote URL.
    #[serde(rename = "itemImageBase64", default, skip_serializing_if = "Option::is_none")]
    pub item_image: Option<String>,
    pub ticket_price: f64,
    pub raffle_date: NaiveDate,
    pub lottery_name: String,
    pub tickets: Vec<Ticket>,
    #[serde(default)]
    pub grid_size_preset: GridPreset,
}

/// Ticket totals per status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatusCounts {
    pub available: usize,
    pub reserved: usize,
    pub paid: usize,
}

pub const DEFAULT_RAFFLE_ID: &str = "default-raffle-123";

impl Default for Raffle {
    fn default() -> Self {
        Self {
            id: DEFAULT_RAFFLE_ID.to_string(),
            title: "Gran Rifa Increíble".to_string(),
            description: "Participa para ganar un fabuloso premio. ¡No te quedes fuera!".to_string(),
            item_image: Some("https://picsum.photos/seed/raffleitem/600/400".to_string()),
            ticket_price: 5.0,
            raffle_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap_or_default(),
            lottery_name: "Lotería Nacional Nocturna".to_string(),
            tickets: initial_tickets(),
            grid_size_preset: GridPreset::default(),
        }
    }
}

impl Raffle {
    pub fn ticket(&self, number: &str) -> Option<&Ticket> {
        self.tickets.iter().find(|t| t.number == number)
    }

    pub fn count(&self, status: TicketStatus) -> usize {
        self.tickets.iter().filter(|t| t.status() == status).count()
    }

    pub fn counts(&self) -> StatusCounts {
        StatusCounts {
            available: self.count(TicketStatus::Available),
            reserved: self.count(TicketStatus::Reserved),
            paid: self.count(TicketStatus::Paid),
        }
    }

    /// Reserved and paid tickets in ticket-number order.
    pub fn participant_tickets(&self) -> Vec<&Ticket> {
        let mut tickets: Vec<&Ticket> = self
            .tickets
            .iter()
            .filter(|t| t.participant().is_some())
            .collect();
        tickets.sort_by(|a, b| a.number.cmp(&b.number));
        tickets
    }

    /// Draw date the way the app shows it: "31 de diciembre de 2024".
    pub fn formatted_date(&self) -> String {
        format_draw_date(self.raffle_date)
    }

    pub fn formatted_price(&self) -> String {
        format!("${}", self.ticket_price)
    }
}

pub fn format_draw_date(date: NaiveDate) -> String {
    let midnight = date.and_hms_opt(0, 0, 0).unwrap_or_default();
    Utc.from_utc_datetime(&midnight)
        .format_localized("%-d de %B de %Y", Locale::es_ES)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticket::Participant;

    #[test]
    fn default_raffle_has_fresh_tickets() {
        let raffle = Raffle::default();
        assert_eq!(raffle.id, DEFAULT_RAFFLE_ID);
        assert_eq!(raffle.tickets.len(), 100);
        assert_eq!(
            raffle.counts(),
            StatusCounts { available: 100, reserved: 0, paid: 0 }
        );
        assert_eq!(raffle.grid_size_preset, GridPreset::Compact);
    }

    #[test]
    fn date_and_price_formatting() {
        let raffle = Raffle::default();
        assert_eq!(raffle.formatted_date(), "31 de diciembre de 2024");
        assert_eq!(raffle.formatted_price(), "$5");

        let raffle = Raffle { ticket_price: 2.5, ..Raffle::default() };
        assert_eq!(raffle.formatted_price(), "$2.5");
    }

    #[test]
    fn participant_tickets_sorted_by_number() {
        let mut raffle = Raffle::default();
        let p = Participant {
            name: "Luis".into(),
            phone: "3001234567".into(),
            email: "luis@example.com".into(),
        };
        raffle.tickets[42] = raffle.tickets[42].reserve(p.clone()).unwrap();
        raffle.tickets[5] = raffle.tickets[5].reserve(p).unwrap();

        let numbers: Vec<&str> = raffle
            .participant_tickets()
            .iter()
            .map(|t| t.number.as_str())
            .collect();
        assert_eq!(numbers, vec!["05", "42"]);
    }

    #[test]
    fn grid_preset_parsing() {
        assert_eq!(GridPreset::parse("large"), Some(GridPreset::Large));
        assert_eq!(GridPreset::parse("huge"), None);
        let json = serde_json::to_string(&GridPreset::Regular).unwrap();
        assert_eq!(json, "\"regular\"");
    }

    #[test]
    fn grid_preset_labels() {
        let labels: Vec<&str> = GridPreset::ALL.iter().map(|p| p.label()).collect();
        assert_eq!(labels, vec!["Compacto", "Regular", "Grande"]);
    }
}
