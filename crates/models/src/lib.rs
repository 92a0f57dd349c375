mod action;
mod raffle;
mod ticket;
pub mod validation;

pub use action::{RaffleAction, reduce};
pub use raffle::{DEFAULT_RAFFLE_ID, GridPreset, Raffle, StatusCounts, format_draw_date};
pub use ticket::{
    MissingParticipant, Participant, TOTAL_TICKETS, Ticket, TicketRecord, TicketState,
    TicketStatus, initial_tickets, parse_ticket_number,
};
pub use validation::{
    ParticipantDraft, RaffleDetails, RaffleDraft, ValidationErrors, validate_participant,
    validate_raffle,
};

pub const APP_TITLE: &str = "Las rifas de Echeverry";
pub const GRID_COLS: usize = 10;
