//! Scanner input adapter.
//!
//! Barcode scanners behave like a very fast keyboard. Keys typed into a focused field follow
//! normal editing; keys arriving with no field focused are buffered while they keep coming
//! faster than [`SCAN_KEY_GAP`]. Both paths end in the same `on_code_submitted` callback, so the
//! reconciliation session never sees focus state.

use crate::constants::SCAN_KEY_GAP;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Enter,
    Backspace,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    pub at: Instant,
}

impl KeyEvent {
    pub fn new(key: Key, at: Instant) -> Self {
        Self { key, at }
    }
}

/// A text field with keyboard focus.
#[derive(Clone, Debug, Default)]
pub struct FocusedField {
    text: String,
}

impl FocusedField {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Apply one key. Returns the trimmed text on Enter when it is not blank.
    pub fn handle(&mut self, key: Key) -> Option<String> {
        match key {
            Key::Char(c) => {
                self.text.push(c);
                None
            }
            Key::Backspace => {
                self.text.pop();
                None
            }
            Key::Enter => {
                let submitted = self.text.trim().to_string();
                self.text.clear();
                (!submitted.is_empty()).then_some(submitted)
            }
        }
    }
}

/// Global capture of rapid keystrokes.
#[derive(Clone, Debug)]
pub struct KeystrokeBuffer {
    buffer: String,
    last: Option<Instant>,
    gap: Duration,
}

impl Default for KeystrokeBuffer {
    fn default() -> Self {
        Self::new(SCAN_KEY_GAP)
    }
}

impl KeystrokeBuffer {
    pub fn new(gap: Duration) -> Self {
        Self {
            buffer: String::new(),
            last: None,
            gap,
        }
    }

    pub fn pending(&self) -> &str {
        &self.buffer
    }

    fn is_stale(&self, at: Instant) -> bool {
        self.last
            .is_some_and(|last| at.saturating_duration_since(last) >= self.gap)
    }

    /// Apply one key event.
    ///
    /// A key arriving `gap` or later after the previous one restarts the buffer. Enter submits
    /// the buffer if it is not blank and not stale.
    pub fn handle(&mut self, event: KeyEvent) -> Option<String> {
        if self.is_stale(event.at) {
            self.buffer.clear();
        }
        self.last = Some(event.at);

        match event.key {
            Key::Char(c) => {
                self.buffer.push(c);
                None
            }
            // Scanners never send backspace.
            Key::Backspace => {
                self.buffer.clear();
                None
            }
            Key::Enter => {
                let submitted = self.buffer.trim().to_string();
                self.buffer.clear();
                self.last = None;
                (!submitted.is_empty()).then_some(submitted)
            }
        }
    }
}

/// Routes key events to the focused field or the keystroke buffer.
pub struct ScannerInput<F: FnMut(String)> {
    field: Option<FocusedField>,
    buffer: KeystrokeBuffer,
    on_code_submitted: F,
}

impl<F: FnMut(String)> ScannerInput<F> {
    pub fn new(on_code_submitted: F) -> Self {
        Self::with_buffer(KeystrokeBuffer::default(), on_code_submitted)
    }

    pub fn with_buffer(buffer: KeystrokeBuffer, on_code_submitted: F) -> Self {
        Self {
            field: None,
            buffer,
            on_code_submitted,
        }
    }

    /// Give focus to a fresh text field.
    pub fn focus(&mut self) {
        self.field = Some(FocusedField::new());
    }

    /// Drop focus, discarding unsubmitted field text.
    pub fn blur(&mut self) {
        self.field = None;
    }

    pub fn is_focused(&self) -> bool {
        self.field.is_some()
    }

    pub fn field_text(&self) -> Option<&str> {
        self.field.as_ref().map(FocusedField::text)
    }

    pub fn handle(&mut self, event: KeyEvent) {
        let submitted = match self.field.as_mut() {
            Some(field) => field.handle(event.key),
            None => self.buffer.handle(event),
        };
        if let Some(code) = submitted {
            tracing::debug!(code = %code, focused = self.field.is_some(), "code submitted");
            (self.on_code_submitted)(code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn type_str(input: &mut ScannerInput<impl FnMut(String)>, text: &str, start: Instant, step: Duration) -> Instant {
        let mut at = start;
        for c in text.chars() {
            input.handle(KeyEvent::new(Key::Char(c), at));
            at += step;
        }
        input.handle(KeyEvent::new(Key::Enter, at));
        at
    }

    fn collector() -> (Rc<RefCell<Vec<String>>>, impl FnMut(String)) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        (seen, move |code| sink.borrow_mut().push(code))
    }

    #[test]
    fn fast_keystrokes_are_submitted_as_one_code() {
        let (seen, sink) = collector();
        let mut input = ScannerInput::new(sink);

        type_str(&mut input, "SP2024-01-001", Instant::now(), Duration::from_millis(5));

        assert_eq!(seen.borrow().as_slice(), &["SP2024-01-001".to_string()]);
    }

    #[test]
    fn slow_keystrokes_restart_the_buffer() {
        let mut buffer = KeystrokeBuffer::default();
        let t0 = Instant::now();

        buffer.handle(KeyEvent::new(Key::Char('x'), t0));
        buffer.handle(KeyEvent::new(Key::Char('A'), t0 + Duration::from_millis(500)));
        buffer.handle(KeyEvent::new(Key::Char('B'), t0 + Duration::from_millis(510)));
        assert_eq!(buffer.pending(), "AB");

        let late_enter = KeyEvent::new(Key::Enter, t0 + Duration::from_millis(900));
        assert_eq!(buffer.handle(late_enter), None);
    }

    #[test]
    fn gap_boundary_restarts_only_at_the_full_gap() {
        let mut buffer = KeystrokeBuffer::default();
        let t0 = Instant::now();
        let just_under = SCAN_KEY_GAP - Duration::from_millis(1);

        buffer.handle(KeyEvent::new(Key::Char('A'), t0));
        buffer.handle(KeyEvent::new(Key::Char('B'), t0 + just_under));
        assert_eq!(buffer.pending(), "AB");

        let t1 = t0 + just_under;
        buffer.handle(KeyEvent::new(Key::Char('C'), t1 + SCAN_KEY_GAP));
        assert_eq!(buffer.pending(), "C");
        let enter = KeyEvent::new(Key::Enter, t1 + SCAN_KEY_GAP + Duration::from_millis(1));
        assert_eq!(buffer.handle(enter), Some("C".to_string()));

        buffer.handle(KeyEvent::new(Key::Char('D'), t0));
        let enter_at_gap = KeyEvent::new(Key::Enter, t0 + SCAN_KEY_GAP);
        assert_eq!(buffer.handle(enter_at_gap), None);
    }

    #[test]
    fn focused_field_uses_normal_editing() {
        let (seen, sink) = collector();
        let mut input = ScannerInput::new(sink);
        input.focus();

        let t0 = Instant::now();
        let slow = Duration::from_secs(1);
        for (i, key) in [Key::Char('A'), Key::Char('X'), Key::Backspace, Key::Char('B')]
            .into_iter()
            .enumerate()
        {
            input.handle(KeyEvent::new(key, t0 + slow * i as u32));
        }
        assert_eq!(input.field_text(), Some("AB"));

        input.handle(KeyEvent::new(Key::Enter, t0 + slow * 10));
        assert_eq!(seen.borrow().as_slice(), &["AB".to_string()]);
        assert_eq!(input.field_text(), Some(""));
    }

    #[test]
    fn blank_submissions_are_ignored() {
        let (seen, sink) = collector();
        let mut input = ScannerInput::new(sink);
        let t0 = Instant::now();
        input.handle(KeyEvent::new(Key::Enter, t0));
        input.handle(KeyEvent::new(Key::Char(' '), t0));
        input.handle(KeyEvent::new(Key::Enter, t0 + Duration::from_millis(1)));
        assert!(seen.borrow().is_empty());
    }
}
