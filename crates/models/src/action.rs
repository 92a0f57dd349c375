//! Pure raffle transitions. `reduce` never mutates its input: it returns the
//! next raffle value, or `None` when the action changes nothing.

use crate::raffle::Raffle;
use crate::ticket::{Participant, Ticket, initial_tickets};
use crate::validation::RaffleDetails;

#[derive(Debug, Clone, PartialEq)]
pub enum RaffleAction {
    /// Replace the active raffle with a brand new one.
    Create { id: String, details: RaffleDetails },
    /// Replace descriptive fields, keeping id and tickets.
    Update(RaffleDetails),
    Reserve { number: String, participant: Participant },
    MarkPaid { number: String },
}

pub fn reduce(current: &Raffle, action: RaffleAction) -> Option<Raffle> {
    match action {
        RaffleAction::Create { id, details } => Some(Raffle {
            id,
            title: details.title,
            description: details.description,
            item_image: Some(details.item_image),
            ticket_price: details.ticket_price,
            raffle_date: details.raffle_date,
            lottery_name: details.lottery_name,
            tickets: initial_tickets(),
            grid_size_preset: details.grid_size_preset.unwrap_or_default(),
        }),
        RaffleAction::Update(details) => Some(Raffle {
            title: details.title,
            description: details.description,
            item_image: Some(details.item_image),
            ticket_price: details.ticket_price,
            raffle_date: details.raffle_date,
            lottery_name: details.lottery_name,
            grid_size_preset: details
                .grid_size_preset
                .unwrap_or(current.grid_size_preset),
            ..current.clone()
        }),
        RaffleAction::Reserve { number, participant } => {
            replace_ticket(current, &number, |t| t.reserve(participant))
        }
        RaffleAction::MarkPaid { number } => replace_ticket(current, &number, Ticket::mark_paid),
    }
}

fn replace_ticket(
    current: &Raffle,
    number: &str,
    transition: impl FnOnce(&Ticket) -> Option<Ticket>,
) -> Option<Raffle> {
    let index = current.tickets.iter().position(|t| t.number == number)?;
    let next = transition(&current.tickets[index])?;
    let mut tickets = current.tickets.clone();
    tickets[index] = next;
    Some(Raffle {
        tickets,
        ..current.clone()
    })
}
