//! # Customer Display
//!
//! What the 20x4 character display shows in each state. The engine builds
//! a [`Screen`] on every state entry and hands it to a [`DisplaySink`];
//! the physical driver lives outside this crate.
//!
//! ```text
//! ┌────────────────────┐   ┌────────────────────┐   ┌────────────────────┐
//! │VENDING SYSTEM      │   │Ready: Soda         │   │ERROR:8             │
//! │Enter Product Code  │   │# Confirm  * Cancel │   │Code not found      │
//! └────────────────────┘   └────────────────────┘   └────────────────────┘
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use kiosk_core::ErrorKind;

/// Characters per display line.
pub const DISPLAY_WIDTH: usize = 20;

/// Two lines of display text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screen {
    pub title: String,
    pub detail: String,
}

impl Screen {
    fn new(title: impl Into<String>, detail: impl Into<String>) -> Self {
        Screen {
            title: fit(title.into()),
            detail: fit(detail.into()),
        }
    }

    pub fn welcome() -> Self {
        Screen::new("VENDING SYSTEM", "Enter Product Code")
    }

    pub fn code_entry(input: &str) -> Self {
        Screen::new("Product Code:", input)
    }

    pub fn checking() -> Self {
        Screen::new("Checking stock...", "")
    }

    pub fn ready(name: &str) -> Self {
        Screen::new(format!("Ready: {}", name), "# Confirm  * Cancel")
    }

    pub fn dispensing() -> Self {
        Screen::new("Dispensing...", "")
    }

    pub fn thank_you() -> Self {
        Screen::new("Thank You!", "Item dispensed")
    }

    pub fn out_of_stock() -> Self {
        Screen::new("Out of Stock", "")
    }

    pub fn cancelled() -> Self {
        Screen::new("Transaction", "Cancelled")
    }

    pub fn error(kind: ErrorKind, message: &str) -> Self {
        Screen::new(format!("ERROR:{}", kind.code()), message)
    }
}

impl std::fmt::Display for Screen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} | {}", self.title, self.detail)
    }
}

/// Cuts a line to the display width.
fn fit(line: String) -> String {
    if line.chars().count() <= DISPLAY_WIDTH {
        line
    } else {
        line.chars().take(DISPLAY_WIDTH).collect()
    }
}

// =============================================================================
// Sinks
// =============================================================================

/// Something that can show a screen.
pub trait DisplaySink: Send + Sync {
    fn show(&self, screen: &Screen);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpDisplay;

impl DisplaySink for NoOpDisplay {
    fn show(&self, _screen: &Screen) {}
}

/// Keeps every screen shown, for assertions.
#[derive(Debug, Clone, Default)]
pub struct MemoryDisplay {
    screens: Arc<Mutex<Vec<Screen>>>,
}

impl MemoryDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn screens(&self) -> Vec<Screen> {
        self.screens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last(&self) -> Option<Screen> {
        self.screens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

impl DisplaySink for MemoryDisplay {
    fn show(&self, screen: &Screen) {
        self.screens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(screen.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_screen_shows_code() {
        let screen = Screen::error(ErrorKind::InvalidProduct, "Code not found");
        assert_eq!(screen.title, "ERROR:8");
        assert_eq!(screen.detail, "Code not found");
    }

    #[test]
    fn test_lines_fit_display() {
        let screen = Screen::ready("Extra Large Sparkling Water");
        assert_eq!(screen.title.chars().count(), DISPLAY_WIDTH);
        assert_eq!(screen.title, "Ready: Extra Large S");
    }

    #[test]
    fn test_memory_display_records() {
        let display = MemoryDisplay::new();
        display.show(&Screen::welcome());
        display.show(&Screen::checking());

        assert_eq!(display.screens().len(), 2);
        assert_eq!(display.last(), Some(Screen::checking()));
    }
}
