// src/hardware/frontpanel.rs - Button byte decoding for the UI board
use super::ERROR_STATUS;

pub const BTN1_PRESS: u8 = 0x01;
pub const BTN1_HOLD: u8 = 0x02;
pub const BTN2_PRESS: u8 = 0x04;
pub const BTN2_HOLD: u8 = 0x08;
pub const BTNS_1_AND_2_PRESS: u8 = BTN1_PRESS | BTN2_PRESS;

const BUTTON_MASK: u8 = 0x0F;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    Left,
    Right,
    RightHold,
    LeftAndRight,
}

/// What one status byte from the UI board means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelInput {
    Button(ButtonEvent),
    /// The board reported a front-panel fault (whole-byte error status).
    PanelError,
    /// Low nibble clear: not a button event, silently ignored.
    Ignored,
    /// A button pattern this firmware does not use.
    Unknown(u8),
}

/// Decode a raw UI-board status byte. The error check uses the unmasked
/// value; button patterns live in the low nibble.
pub fn decode(status: u8) -> PanelInput {
    let masked = status & BUTTON_MASK;
    if masked == 0 {
        return PanelInput::Ignored;
    }
    if status == ERROR_STATUS {
        return PanelInput::PanelError;
    }
    match masked {
        BTN1_PRESS => PanelInput::Button(ButtonEvent::Left),
        BTN2_PRESS => PanelInput::Button(ButtonEvent::Right),
        BTN2_HOLD => PanelInput::Button(ButtonEvent::RightHold),
        BTNS_1_AND_2_PRESS => PanelInput::Button(ButtonEvent::LeftAndRight),
        // holding button 1 long enough triggers a hardware shutdown instead
        BTN1_HOLD => PanelInput::Ignored,
        other => PanelInput::Unknown(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_each_button_pattern() {
        assert_eq!(decode(BTN1_PRESS), PanelInput::Button(ButtonEvent::Left));
        assert_eq!(decode(BTN2_PRESS), PanelInput::Button(ButtonEvent::Right));
        assert_eq!(
            decode(BTN2_HOLD),
            PanelInput::Button(ButtonEvent::RightHold)
        );
        assert_eq!(
            decode(BTNS_1_AND_2_PRESS),
            PanelInput::Button(ButtonEvent::LeftAndRight)
        );
    }

    #[test]
    fn zero_low_nibble_is_ignored_even_with_high_bits() {
        assert_eq!(decode(0x00), PanelInput::Ignored);
        assert_eq!(decode(0xF0), PanelInput::Ignored);
    }

    #[test]
    fn error_status_beats_button_decoding() {
        assert_eq!(decode(ERROR_STATUS), PanelInput::PanelError);
    }

    #[test]
    fn button_one_hold_is_reserved_for_hardware_shutdown() {
        assert_eq!(decode(BTN1_HOLD), PanelInput::Ignored);
    }

    #[test]
    fn unused_patterns_are_reported_with_their_bits() {
        assert_eq!(decode(0x0C), PanelInput::Unknown(0x0C));
    }
}
