//! # Kiosk State Machine Table
//!
//! States, events and the static transition table that drives the
//! customer-facing flow. The table is pure data: the controller's engine
//! owns the guards, timers and side effects.
//!
//! ## Happy Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   Idle ──Char──► SelectingItem ──Submit──► CheckingAvailability         │
//! │    ▲                  │ Cancel                 │            │           │
//! │    │                  ▼                StockAvailable   StockEmpty      │
//! │    │                 Idle                      ▼            ▼           │
//! │    │                                AwaitingConfirmation  OutOfStock    │
//! │    │                                   │Submit    │Cancel/Timeout       │
//! │    │                                   ▼          ▼                     │
//! │    │                               Dispensing   Cancelled               │
//! │    │                                   │DispenseAck                     │
//! │    │                                   ▼                                │
//! │    └────────────Timeout (dwell)──── ThankYou                            │
//! │                                                                         │
//! │   Any state ──ErrorOccurred──► Error ──Timeout──► Idle                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Totality
//! Every (state, event) pair has exactly one target. Pairs with no
//! meaningful transition map to the current state (a no-op), so
//! [`TransitionTable::next`] never fails.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

// =============================================================================
// States
// =============================================================================

/// Customer-facing kiosk state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    Idle,
    SelectingItem,
    CheckingAvailability,
    AwaitingConfirmation,
    Dispensing,
    ThankYou,
    OutOfStock,
    Cancelled,
    Error,
}

impl State {
    /// Number of states.
    pub const COUNT: usize = 9;

    /// Every state, in table order.
    pub const ALL: [State; State::COUNT] = [
        State::Idle,
        State::SelectingItem,
        State::CheckingAvailability,
        State::AwaitingConfirmation,
        State::Dispensing,
        State::ThankYou,
        State::OutOfStock,
        State::Cancelled,
        State::Error,
    ];

    /// Row index into the transition table.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Terminal screens that return to `Idle` after a dwell period.
    pub fn is_dwell(self) -> bool {
        matches!(
            self,
            State::ThankYou | State::OutOfStock | State::Cancelled | State::Error
        )
    }
}

// =============================================================================
// Events
// =============================================================================

/// Stimulus fed to the state machine.
///
/// `Char` carries no payload here; the engine appends the typed character
/// to the input buffer before dispatching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    Char,
    Submit,
    Cancel,
    SyncTimeout,
    ProductFound,
    ProductNotFound,
    StockAvailable,
    StockEmpty,
    DispenseAck,
    DispenseError,
    Timeout,
    ErrorOccurred,
}

impl Event {
    /// Number of events.
    pub const COUNT: usize = 12;

    /// Every event, in table order.
    pub const ALL: [Event; Event::COUNT] = [
        Event::Char,
        Event::Submit,
        Event::Cancel,
        Event::SyncTimeout,
        Event::ProductFound,
        Event::ProductNotFound,
        Event::StockAvailable,
        Event::StockEmpty,
        Event::DispenseAck,
        Event::DispenseError,
        Event::Timeout,
        Event::ErrorOccurred,
    ];

    /// Column index into the transition table.
    pub const fn index(self) -> usize {
        self as usize
    }
}

// =============================================================================
// Transition Table
// =============================================================================

/// Dense `(state, event) → state` lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionTable {
    rows: [[State; Event::COUNT]; State::COUNT],
}

impl TransitionTable {
    /// The kiosk's standard flow.
    pub fn standard() -> Self {
        let mut rows = [[State::Idle; Event::COUNT]; State::COUNT];
        for state in State::ALL {
            for event in Event::ALL {
                rows[state.index()][event.index()] = default_next(state, event);
            }
        }
        TransitionTable { rows }
    }

    /// Builds a table from an explicit entry list.
    ///
    /// ## Errors
    /// - `DuplicateTransition` if a pair is listed twice
    /// - `IncompleteTransitionTable` if any pair is missing
    pub fn from_entries(entries: &[(State, Event, State)]) -> CoreResult<Self> {
        let mut rows: [[Option<State>; Event::COUNT]; State::COUNT] =
            [[None; Event::COUNT]; State::COUNT];

        for &(state, event, target) in entries {
            let slot = &mut rows[state.index()][event.index()];
            if slot.is_some() {
                return Err(CoreError::DuplicateTransition { state, event });
            }
            *slot = Some(target);
        }

        let mut table = [[State::Idle; Event::COUNT]; State::COUNT];
        for state in State::ALL {
            for event in Event::ALL {
                table[state.index()][event.index()] = rows[state.index()][event.index()]
                    .ok_or(CoreError::IncompleteTransitionTable { state, event })?;
            }
        }

        Ok(TransitionTable { rows: table })
    }

    /// Target state for `event` in `state`.
    pub fn next(&self, state: State, event: Event) -> State {
        self.rows[state.index()][event.index()]
    }

    /// Every entry as `(state, event, target)`, row-major.
    pub fn entries(&self) -> Vec<(State, Event, State)> {
        State::ALL
            .iter()
            .flat_map(|&s| Event::ALL.iter().map(move |&e| (s, e, self.next(s, e))))
            .collect()
    }
}

impl Default for TransitionTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// Standard flow. Unlisted pairs stay put.
fn default_next(state: State, event: Event) -> State {
    use Event as E;
    use State as S;

    if event == E::ErrorOccurred {
        return S::Error;
    }

    match (state, event) {
        (S::Idle, E::Char) => S::SelectingItem,
        (S::Idle, E::Cancel) => S::Cancelled,

        (S::SelectingItem, E::Submit) => S::CheckingAvailability,
        (S::SelectingItem, E::ProductFound) => S::CheckingAvailability,
        (S::SelectingItem, E::ProductNotFound) => S::Error,
        (S::SelectingItem, E::Cancel) => S::Idle,

        (S::CheckingAvailability, E::StockAvailable) => S::AwaitingConfirmation,
        (S::CheckingAvailability, E::StockEmpty) => S::OutOfStock,

        (S::AwaitingConfirmation, E::Submit) => S::Dispensing,
        (S::AwaitingConfirmation, E::Cancel) => S::Cancelled,
        (S::AwaitingConfirmation, E::Timeout) => S::Cancelled,

        (S::Dispensing, E::DispenseAck) => S::ThankYou,
        (S::Dispensing, E::DispenseError) => S::Cancelled,
        (S::Dispensing, E::Cancel) => S::Cancelled,

        (S::ThankYou | S::OutOfStock | S::Cancelled | S::Error, E::Timeout) => S::Idle,

        (s, _) => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_happy_path() {
        let table = TransitionTable::standard();
        let mut state = State::Idle;
        for event in [
            Event::Char,
            Event::Submit,
            Event::StockAvailable,
            Event::Submit,
            Event::DispenseAck,
            Event::Timeout,
        ] {
            state = table.next(state, event);
        }
        assert_eq!(state, State::Idle);
    }

    #[test]
    fn test_selected_transitions() {
        let table = TransitionTable::standard();
        assert_eq!(table.next(State::SelectingItem, Event::Cancel), State::Idle);
        assert_eq!(table.next(State::SelectingItem, Event::ProductNotFound), State::Error);
        assert_eq!(table.next(State::CheckingAvailability, Event::StockEmpty), State::OutOfStock);
        assert_eq!(table.next(State::AwaitingConfirmation, Event::Timeout), State::Cancelled);
        assert_eq!(table.next(State::Dispensing, Event::DispenseError), State::Cancelled);
        assert_eq!(table.next(State::Error, Event::Timeout), State::Idle);
    }

    #[test]
    fn test_unlisted_pairs_are_noops() {
        let table = TransitionTable::standard();
        assert_eq!(table.next(State::Idle, Event::Submit), State::Idle);
        assert_eq!(table.next(State::Idle, Event::SyncTimeout), State::Idle);
        assert_eq!(table.next(State::Dispensing, Event::Char), State::Dispensing);
        assert_eq!(table.next(State::Error, Event::Char), State::Error);
    }

    #[test]
    fn test_from_entries_round_trips_standard() {
        let standard = TransitionTable::standard();
        let rebuilt = TransitionTable::from_entries(&standard.entries()).unwrap();
        assert_eq!(rebuilt, standard);
    }

    #[test]
    fn test_from_entries_rejects_missing_pair() {
        let mut entries = TransitionTable::standard().entries();
        entries.retain(|&(s, e, _)| !(s == State::Idle && e == Event::Submit));

        let err = TransitionTable::from_entries(&entries).unwrap_err();
        assert!(matches!(
            err,
            CoreError::IncompleteTransitionTable {
                state: State::Idle,
                event: Event::Submit
            }
        ));
    }

    #[test]
    fn test_from_entries_rejects_duplicate_pair() {
        let mut entries = TransitionTable::standard().entries();
        entries.push((State::Idle, Event::Char, State::Error));

        let err = TransitionTable::from_entries(&entries).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateTransition { .. }));
    }

    #[test]
    fn test_dwell_states() {
        let dwell: Vec<State> = State::ALL.into_iter().filter(|s| s.is_dwell()).collect();
        assert_eq!(
            dwell,
            vec![State::ThankYou, State::OutOfStock, State::Cancelled, State::Error]
        );
    }

    fn any_state() -> impl Strategy<Value = State> {
        (0..State::COUNT).prop_map(|i| State::ALL[i])
    }

    fn any_event() -> impl Strategy<Value = Event> {
        (0..Event::COUNT).prop_map(|i| Event::ALL[i])
    }

    proptest! {
        #[test]
        fn prop_error_occurred_always_reaches_error(state in any_state()) {
            let table = TransitionTable::standard();
            prop_assert_eq!(table.next(state, Event::ErrorOccurred), State::Error);
        }

        #[test]
        fn prop_dispensing_only_reached_by_confirming(state in any_state(), event in any_event()) {
            let table = TransitionTable::standard();
            if table.next(state, event) == State::Dispensing && state != State::Dispensing {
                prop_assert_eq!(state, State::AwaitingConfirmation);
                prop_assert_eq!(event, Event::Submit);
            }
        }

        #[test]
        fn prop_any_sequence_stays_in_table(events in proptest::collection::vec(any_event(), 0..64)) {
            let table = TransitionTable::standard();
            let mut state = State::Idle;
            for event in events {
                state = table.next(state, event);
                prop_assert!(State::ALL.contains(&state));
            }
        }
    }
}
