use serde::{Deserialize, Serialize};
use std::fmt;

pub const TOTAL_TICKETS: usize = 100;

/// Contact record bound to a reserved or paid ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub name: String,
    pub phone: String,
    pub email: String,
}

/// Persisted ticket status. The UI-only "selected" highlight never reaches
/// this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Available,
    Reserved,
    Paid,
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 3] = [Self::Available, Self::Reserved, Self::Paid];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Available => "AVAILABLE",
            Self::Reserved => "RESERVED",
            Self::Paid => "PAID",
        }
    }

    /// Label shown to users.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Available => "Disponible",
            Self::Reserved => "Reservado",
            Self::Paid => "Pagado",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status and participant as one value: a participant exists exactly when
/// the ticket is reserved or paid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketState {
    Available,
    Reserved(Participant),
    Paid(Participant),
}

impl TicketState {
    pub fn status(&self) -> TicketStatus {
        match self {
            Self::Available => TicketStatus::Available,
            Self::Reserved(_) => TicketStatus::Reserved,
            Self::Paid(_) => TicketStatus::Paid,
        }
    }

    pub fn participant(&self) -> Option<&Participant> {
        match self {
            Self::Available => None,
            Self::Reserved(p) | Self::Paid(p) => Some(p),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "TicketRecord", try_from = "TicketRecord")]
pub struct Ticket {
    pub id: String,
    pub number: String,
    pub state: TicketState,
}

impl Ticket {
    /// Fresh AVAILABLE ticket for grid position `index` (0..100).
    pub fn available(index: usize) -> Self {
        let number = format!("{index:02}");
        Self {
            id: format!("ticket-{number}"),
            number,
            state: TicketState::Available,
        }
    }

    pub fn status(&self) -> TicketStatus {
        self.state.status()
    }

    pub fn participant(&self) -> Option<&Participant> {
        self.state.participant()
    }

    pub fn is_available(&self) -> bool {
        matches!(self.state, TicketState::Available)
    }

    /// AVAILABLE → RESERVED. `None` when the ticket is not available.
    pub fn reserve(&self, participant: Participant) -> Option<Ticket> {
        match self.state {
            TicketState::Available => Some(Ticket {
                state: TicketState::Reserved(participant),
                ..self.clone()
            }),
            _ => None,
        }
    }

    /// RESERVED → PAID, keeping the participant. `None` for any other state.
    pub fn mark_paid(&self) -> Option<Ticket> {
        match &self.state {
            TicketState::Reserved(p) => Some(Ticket {
                state: TicketState::Paid(p.clone()),
                ..self.clone()
            }),
            _ => None,
        }
    }
}

/// All 100 tickets, "00" through "99", AVAILABLE.
pub fn initial_tickets() -> Vec<Ticket> {
    (0..TOTAL_TICKETS).map(Ticket::available).collect()
}

/// Normalizes user input such as "7" or "07" to the two-digit ticket number.
pub fn parse_ticket_number(input: &str) -> Option<String> {
    let n: usize = input.trim().parse().ok()?;
    (n < TOTAL_TICKETS).then(|| format!("{n:02}"))
}

// --- Wire record ---

/// Flat shape used on the wire and in storage: `status` plus an optional
/// `participant`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketRecord {
    pub id: String,
    pub number: String,
    pub status: TicketStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant: Option<Participant>,
}

#[derive(Debug, thiserror::Error)]
#[error("ticket {number} is {status} but has no participant")]
pub struct MissingParticipant {
    pub number: String,
    pub status: TicketStatus,
}

impl From<Ticket> for TicketRecord {
    fn from(t: Ticket) -> Self {
        let status = t.status();
        let participant = match t.state {
            TicketState::Available => None,
            TicketState::Reserved(p) | TicketState::Paid(p) => Some(p),
        };
        TicketRecord {
            id: t.id,
            number: t.number,
            status,
            participant,
        }
    }
}

impl TryFrom<TicketRecord> for Ticket {
    type Error = MissingParticipant;

    fn try_from(r: TicketRecord) -> Result<Self, Self::Error> {
        let state = match (r.status, r.participant) {
            (TicketStatus::Available, _) => TicketState::Available,
            (TicketStatus::Reserved, Some(p)) => TicketState::Reserved(p),
            (TicketStatus::Paid, Some(p)) => TicketState::Paid(p),
            (status, None) => {
                return Err(MissingParticipant {
                    number: r.number,
                    status,
                });
            }
        };
        Ok(Ticket {
            id: r.id,
            number: r.number,
            state,
        })
    }
}
