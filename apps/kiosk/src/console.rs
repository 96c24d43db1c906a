//! Renders the customer display to the terminal.

use std::io::Write;

use kiosk_controller::display::DISPLAY_WIDTH;
use kiosk_controller::{DisplaySink, Screen};

#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleDisplay;

impl ConsoleDisplay {
    pub fn render(screen: &Screen) -> String {
        let border = "─".repeat(DISPLAY_WIDTH);
        format!(
            "┌{border}┐\n│{:<width$}│\n│{:<width$}│\n└{border}┘",
            screen.title,
            screen.detail,
            width = DISPLAY_WIDTH,
        )
    }
}

impl DisplaySink for ConsoleDisplay {
    fn show(&self, screen: &Screen) {
        let mut out = std::io::stdout().lock();
        // Best effort.
        let _ = writeln!(out, "{}", Self::render(screen));
        let _ = out.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_pads_lines() {
        let rendered = ConsoleDisplay::render(&Screen::welcome());
        let lines: Vec<&str> = rendered.lines().collect();

        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1], "│VENDING SYSTEM      │");
        assert_eq!(lines[2], "│Enter Product Code  │");
    }
}
