use std::collections::HashMap;
use std::sync::Mutex;

use super::domain::SessionId;

/// Atomic occupancy tracking per session.
///
/// `try_reserve` performs the capacity comparison and the increment as one
/// unit relative to other reservations on the same session; callers never
/// compare occupancy against capacity themselves. A denial by the entitlement
/// resolver happens before any call here, so a denied user cannot consume a
/// slot.
pub trait CapacityLedger: Send + Sync {
    /// Reserve one seat, returning the occupancy after the reservation.
    fn try_reserve(&self, session_id: &SessionId, capacity: u32) -> Result<u32, CapacityError>;

    /// Return a seat on cancellation. Releasing below zero is a caller bug
    /// and reported as such rather than saturated away.
    fn release(&self, session_id: &SessionId) -> Result<u32, CapacityError>;

    /// Current confirmed occupancy for a session.
    fn occupancy(&self, session_id: &SessionId) -> Result<u32, CapacityError>;
}

/// Error enumeration for ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapacityError {
    #[error("session is at capacity")]
    Exceeded,
    #[error("no reservation held for session")]
    NothingReserved,
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

/// Mutex-serialized ledger keyed by session. The check and increment happen
/// under one lock acquisition, which is the whole point: read-then-write
/// without that serialization is a capacity bug under concurrent enrolls.
///
/// A SQL-backed ledger must provide the same guarantee with a conditional
/// `UPDATE ... WHERE occupancy < capacity` or a row lock.
#[derive(Debug, Default)]
pub struct InMemoryCapacityLedger {
    occupancy: Mutex<HashMap<SessionId, u32>>,
}

impl InMemoryCapacityLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CapacityLedger for InMemoryCapacityLedger {
    fn try_reserve(&self, session_id: &SessionId, capacity: u32) -> Result<u32, CapacityError> {
        let mut occupancy = self
            .occupancy
            .lock()
            .map_err(|_| CapacityError::Unavailable("ledger mutex poisoned".to_string()))?;
        let seats = occupancy.entry(session_id.clone()).or_insert(0);
        if *seats >= capacity {
            return Err(CapacityError::Exceeded);
        }
        *seats += 1;
        Ok(*seats)
    }

    fn release(&self, session_id: &SessionId) -> Result<u32, CapacityError> {
        let mut occupancy = self
            .occupancy
            .lock()
            .map_err(|_| CapacityError::Unavailable("ledger mutex poisoned".to_string()))?;
        match occupancy.get_mut(session_id) {
            Some(seats) if *seats > 0 => {
                *seats -= 1;
                Ok(*seats)
            }
            _ => Err(CapacityError::NothingReserved),
        }
    }

    fn occupancy(&self, session_id: &SessionId) -> Result<u32, CapacityError> {
        let occupancy = self
            .occupancy
            .lock()
            .map_err(|_| CapacityError::Unavailable("ledger mutex poisoned".to_string()))?;
        Ok(occupancy.get(session_id).copied().unwrap_or(0))
    }
}
