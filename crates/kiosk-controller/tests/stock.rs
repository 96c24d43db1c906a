//! Stock accounting across repeated purchases.

mod common;

use std::time::Duration;

use common::kiosk;
use kiosk_bus::Command;
use kiosk_core::State;
use proptest::prelude::*;

/// Runs one purchase attempt and waits for the kiosk to return to `Idle`.
fn attempt_purchase(k: &mut common::Kiosk) -> bool {
    k.press("A1#");
    let dispensed = match k.engine.state() {
        State::AwaitingConfirmation => {
            k.press("#");
            k.engine.state() == State::ThankYou
        }
        _ => false,
    };
    k.wait(Duration::from_millis(3001));
    assert_eq!(k.engine.state(), State::Idle);
    dispensed
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_stock_never_goes_negative(initial in 0u32..6, attempts in 0usize..9) {
        let mut k = kiosk(initial);

        let successes = (0..attempts).filter(|_| attempt_purchase(&mut k)).count() as u32;
        let expected = initial.saturating_sub(attempts as u32);

        prop_assert_eq!(successes, initial.min(attempts as u32));
        prop_assert_eq!(k.product_stock("A1"), expected);
        prop_assert_eq!(k.cached_stock(0x10), expected);
        prop_assert_eq!(k.ledger.stock_of("A1"), Some(expected));
        prop_assert_eq!(k.ledger.transactions().len() as u32, successes);
        prop_assert_eq!(k.bus.count(0x10, Command::Dispense) as u32, successes);
    }
}
