//! # Keypad Mapping
//!
//! Reduces raw key characters to the three inputs the engine understands.

use kiosk_core::validation::is_code_char;

use crate::config::KeypadSettings;

/// A semantic keypad input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Char(char),
    Submit,
    Cancel,
}

/// Raw key → [`Input`] mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keymap {
    submit: char,
    cancel: char,
}

impl Keymap {
    pub fn new(settings: &KeypadSettings) -> Self {
        Keymap {
            submit: settings.submit_key,
            cancel: settings.cancel_key,
        }
    }

    /// Maps one key. Lowercase `a`..`d` are accepted for console use;
    /// anything the keypad cannot produce is dropped.
    pub fn map(&self, key: char) -> Option<Input> {
        if key == self.submit {
            return Some(Input::Submit);
        }
        if key == self.cancel {
            return Some(Input::Cancel);
        }

        let key = key.to_ascii_uppercase();
        is_code_char(key).then_some(Input::Char(key))
    }
}

impl Default for Keymap {
    fn default() -> Self {
        Keymap::new(&KeypadSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mapping() {
        let keymap = Keymap::default();
        assert_eq!(keymap.map('#'), Some(Input::Submit));
        assert_eq!(keymap.map('*'), Some(Input::Cancel));
        assert_eq!(keymap.map('7'), Some(Input::Char('7')));
        assert_eq!(keymap.map('b'), Some(Input::Char('B')));
        assert_eq!(keymap.map('E'), None);
        assert_eq!(keymap.map('\n'), None);
    }

    #[test]
    fn test_custom_keys() {
        let keymap = Keymap::new(&KeypadSettings {
            submit_key: 'D',
            cancel_key: 'C',
            max_code_len: 20,
        });
        assert_eq!(keymap.map('D'), Some(Input::Submit));
        assert_eq!(keymap.map('C'), Some(Input::Cancel));
        assert_eq!(keymap.map('#'), None);
    }
}
