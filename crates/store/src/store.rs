use std::sync::Arc;

use chrono::{DateTime, Utc};
use rifas_models::{
    ParticipantDraft, Raffle, RaffleAction, RaffleDraft, reduce, validate_participant,
    validate_raffle,
};
use tracing::{info, warn};

use crate::persist::{load_raffle, save_raffle};
use crate::{Storage, StoreError};

/// Whether a store operation changed the active raffle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    Unchanged,
}

/// Owns the active raffle. Every accepted change is written to storage
/// before it becomes the current value.
pub struct RaffleStore {
    raffle: Raffle,
    storage: Arc<dyn Storage>,
}

impl RaffleStore {
    /// Loads the active raffle, repairing whatever the stored record needs.
    /// A repaired or defaulted raffle is written back right away.
    pub fn open(storage: Arc<dyn Storage>) -> Result<Self, StoreError> {
        let loaded = load_raffle(storage.as_ref())?;
        for repair in &loaded.repairs {
            warn!("{repair}");
        }
        if !loaded.is_clean() {
            save_raffle(storage.as_ref(), &loaded.raffle)?;
        }
        info!(
            "Active raffle \"{}\" loaded ({} available)",
            loaded.raffle.title,
            loaded.raffle.counts().available
        );
        Ok(Self {
            raffle: loaded.raffle,
            storage,
        })
    }

    pub fn raffle(&self) -> &Raffle {
        &self.raffle
    }

    /// Owned copy for work done outside the store, such as exports.
    pub fn snapshot(&self) -> Raffle {
        self.raffle.clone()
    }

    pub fn create(&mut self, draft: &RaffleDraft, now: DateTime<Utc>) -> Result<&Raffle, StoreError> {
        let details = validate_raffle(draft, now)?;
        let id = format!("raffle-{}", now.timestamp_millis());
        self.dispatch(RaffleAction::Create { id, details })?;
        info!("Raffle \"{}\" created (id={})", self.raffle.title, self.raffle.id);
        Ok(&self.raffle)
    }

    pub fn update(&mut self, draft: &RaffleDraft, now: DateTime<Utc>) -> Result<&Raffle, StoreError> {
        let details = validate_raffle(draft, now)?;
        self.dispatch(RaffleAction::Update(details))?;
        info!("Raffle \"{}\" updated (id={})", self.raffle.title, self.raffle.id);
        Ok(&self.raffle)
    }

    /// Reserves `number` for the participant. Tickets that are not available
    /// are left alone and reported as [`Outcome::Unchanged`].
    pub fn reserve(&mut self, number: &str, draft: &ParticipantDraft) -> Result<Outcome, StoreError> {
        let participant = validate_participant(draft)?;
        let outcome = self.dispatch(RaffleAction::Reserve {
            number: number.to_string(),
            participant,
        })?;
        match outcome {
            Outcome::Applied => info!("Ticket {number} reserved"),
            Outcome::Unchanged => warn!("Ticket {number} is not available, reservation ignored"),
        }
        Ok(outcome)
    }

    pub fn mark_paid(&mut self, number: &str) -> Result<Outcome, StoreError> {
        let outcome = self.dispatch(RaffleAction::MarkPaid {
            number: number.to_string(),
        })?;
        match outcome {
            Outcome::Applied => info!("Ticket {number} marked as paid"),
            Outcome::Unchanged => warn!("Ticket {number} is not reserved, payment ignored"),
        }
        Ok(outcome)
    }

    fn dispatch(&mut self, action: RaffleAction) -> Result<Outcome, StoreError> {
        let Some(next) = reduce(&self.raffle, action) else {
            return Ok(Outcome::Unchanged);
        };
        save_raffle(self.storage.as_ref(), &next)?;
        self.raffle = next;
        Ok(Outcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryStorage, persist::ACTIVE_RAFFLE_KEY};
    use chrono::{Duration, TimeZone};
    use rifas_models::{TOTAL_TICKETS, TicketStatus};
    use std::io;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Memory storage whose writes can be switched off.
    #[derive(Default)]
    struct FlakyStorage {
        inner: MemoryStorage,
        broken: AtomicBool,
    }

    impl Storage for FlakyStorage {
        fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
            if self.broken.load(Ordering::SeqCst) {
                return Err(StoreError::io(
                    Path::new(key),
                    io::Error::new(io::ErrorKind::Other, "disk full"),
                ));
            }
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<(), StoreError> {
            self.inner.remove(key)
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
    }

    fn draft() -> RaffleDraft {
        RaffleDraft {
            title: "Televisor 55 pulgadas".into(),
            description: "Smart TV nuevo en caja".into(),
            item_image: Some("data:image/png;base64,AAAA".into()),
            ticket_price: "5000".into(),
            raffle_date: (now().date_naive() + Duration::days(30)).to_string(),
            lottery_name: "Lotería de Boyacá".into(),
            grid_size_preset: None,
        }
    }

    fn ana() -> ParticipantDraft {
        ParticipantDraft {
            name: "Ana Gómez".into(),
            phone: "3001234567".into(),
            email: "ana@example.com".into(),
        }
    }

    #[test]
    fn open_writes_back_default_raffle() {
        let storage = Arc::new(MemoryStorage::new());
        let store = RaffleStore::open(storage.clone()).unwrap();
        assert_eq!(store.raffle(), &Raffle::default());
        assert!(storage.get(ACTIVE_RAFFLE_KEY).unwrap().is_some());
    }

    #[test]
    fn create_gives_fresh_raffle() {
        let storage = Arc::new(MemoryStorage::new());
        let mut store = RaffleStore::open(storage).unwrap();
        store.reserve("01", &ana()).unwrap();

        let raffle = store.create(&draft(), now()).unwrap();
        assert_eq!(raffle.id, format!("raffle-{}", now().timestamp_millis()));
        assert_eq!(raffle.tickets.len(), TOTAL_TICKETS);
        assert!(raffle.tickets.iter().all(|t| t.status() == TicketStatus::Available));
    }

    #[test]
    fn invalid_draft_changes_nothing() {
        let mut store = RaffleStore::open(Arc::new(MemoryStorage::new())).unwrap();
        let before = store.snapshot();
        let mut bad = draft();
        bad.raffle_date = now().date_naive().to_string();

        let err = store.create(&bad, now()).unwrap_err();
        assert!(err.validation().is_some());
        assert_eq!(store.raffle(), &before);
    }

    #[test]
    fn reserve_and_pay_flow() {
        let mut store = RaffleStore::open(Arc::new(MemoryStorage::new())).unwrap();
        store.create(&draft(), now()).unwrap();

        assert_eq!(store.reserve("07", &ana()).unwrap(), Outcome::Applied);
        let after_reserve = store.snapshot();
        let ticket = after_reserve.ticket("07").unwrap();
        assert_eq!(ticket.status(), TicketStatus::Reserved);
        assert_eq!(ticket.participant().unwrap().name, "Ana Gómez");

        assert_eq!(store.reserve("07", &ana()).unwrap(), Outcome::Unchanged);
        assert_eq!(store.raffle(), &after_reserve);

        assert_eq!(store.mark_paid("07").unwrap(), Outcome::Applied);
        let paid = store.raffle().ticket("07").unwrap();
        assert_eq!(paid.status(), TicketStatus::Paid);
        assert_eq!(paid.participant(), ticket.participant());
        assert_eq!(store.raffle().counts().available, TOTAL_TICKETS - 1);

        assert_eq!(store.mark_paid("07").unwrap(), Outcome::Unchanged);
        assert_eq!(store.mark_paid("08").unwrap(), Outcome::Unchanged);
    }

    #[test]
    fn invalid_participant_is_rejected_before_reserving() {
        let mut store = RaffleStore::open(Arc::new(MemoryStorage::new())).unwrap();
        let bad = ParticipantDraft {
            phone: "123".into(),
            ..ana()
        };
        let err = store.reserve("10", &bad).unwrap_err();
        assert!(err.validation().unwrap().get("phone").is_some());
        assert!(store.raffle().ticket("10").unwrap().is_available());
    }

    #[test]
    fn failed_write_keeps_previous_state() {
        let storage = Arc::new(FlakyStorage::default());
        let mut store = RaffleStore::open(storage.clone()).unwrap();
        let before = store.snapshot();

        storage.broken.store(true, Ordering::SeqCst);
        assert!(matches!(store.reserve("05", &ana()), Err(StoreError::Io { .. })));
        assert!(store.create(&draft(), now()).is_err());
        assert_eq!(store.raffle(), &before);

        storage.broken.store(false, Ordering::SeqCst);
        assert_eq!(store.reserve("05", &ana()).unwrap(), Outcome::Applied);
    }

    #[test]
    fn changes_survive_reopen() {
        let storage = Arc::new(MemoryStorage::new());
        let mut store = RaffleStore::open(storage.clone()).unwrap();
        store.create(&draft(), now()).unwrap();
        store.reserve("63", &ana()).unwrap();
        let expected = store.snapshot();

        let reopened = RaffleStore::open(storage).unwrap();
        assert_eq!(reopened.raffle(), &expected);
    }
}
