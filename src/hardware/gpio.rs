// src/hardware/gpio.rs - Interrupt lines and the door switch
use super::HardwareError;
use crate::config::PrinterSettings;
use rppal::gpio::{Gpio, InputPin, Level, Trigger};
use tokio::sync::mpsc;

/// Sender halves of the interrupt channels. In hardware mode these are
/// driven by the rppal watcher threads; in bench mode tests and simulators
/// feed them directly.
#[derive(Clone)]
pub struct EventSources {
    /// Raw door level as the ASCII character the switch line reads.
    pub door: mpsc::UnboundedSender<char>,
    pub motor: mpsc::UnboundedSender<()>,
    pub button: mpsc::UnboundedSender<()>,
}

/// Receiver halves, owned by the engine's readiness loop.
pub struct EventStreams {
    pub door: mpsc::UnboundedReceiver<char>,
    pub motor: mpsc::UnboundedReceiver<()>,
    pub button: mpsc::UnboundedReceiver<()>,
}

pub fn channels() -> (EventSources, EventStreams) {
    let (door_tx, door_rx) = mpsc::unbounded_channel();
    let (motor_tx, motor_rx) = mpsc::unbounded_channel();
    let (button_tx, button_rx) = mpsc::unbounded_channel();
    (
        EventSources {
            door: door_tx,
            motor: motor_tx,
            button: button_tx,
        },
        EventStreams {
            door: door_rx,
            motor: motor_rx,
            button: button_rx,
        },
    )
}

/// Whether a raw door-line character means "closed", honoring the rev-0
/// boards whose switch is wired inverted. Both the interrupt path and the
/// direct probe funnel through here.
pub fn door_closed(raw: char, invert: bool) -> bool {
    raw == if invert { '1' } else { '0' }
}

/// The door switch line, probeable directly. Interrupt delivery still goes
/// through the channel; the probe exists for the startup check, before any
/// edge has fired.
pub struct DoorSwitch {
    pin: Option<InputPin>,
    invert: bool,
}

impl DoorSwitch {
    pub fn disconnected(invert: bool) -> Self {
        Self { pin: None, invert }
    }

    pub fn is_open(&self) -> bool {
        match &self.pin {
            // without hardware the door is considered closed
            None => false,
            Some(pin) => {
                let raw = level_char(pin.read());
                !door_closed(raw, self.invert)
            }
        }
    }
}

fn level_char(level: Level) -> char {
    match level {
        Level::High => '1',
        Level::Low => '0',
    }
}

/// Keeps the motor and button interrupt registrations alive; dropping this
/// stops edge delivery.
pub struct InterruptGuard {
    _motor: InputPin,
    _button: InputPin,
}

/// Claim the three GPIO lines and start forwarding their edges into the
/// channels. The watcher callbacks only signal readiness; every I²C status
/// read happens on the engine task, which stays the bus's only user.
pub fn attach(
    settings: &PrinterSettings,
    sources: &EventSources,
) -> Result<(DoorSwitch, InterruptGuard), HardwareError> {
    let gpio = Gpio::new()?;
    let invert = settings.hardware_rev == 0;

    let mut door_pin = gpio.get(settings.door_pin)?.into_input_pullup();
    let door_tx = sources.door.clone();
    door_pin.set_async_interrupt(Trigger::Both, move |level| {
        let _ = door_tx.send(level_char(level));
    })?;

    let mut motor_pin = gpio.get(settings.motor_interrupt_pin)?.into_input_pullup();
    let motor_tx = sources.motor.clone();
    motor_pin.set_async_interrupt(Trigger::FallingEdge, move |_| {
        let _ = motor_tx.send(());
    })?;

    let mut button_pin = gpio.get(settings.button_interrupt_pin)?.into_input_pullup();
    let button_tx = sources.button.clone();
    button_pin.set_async_interrupt(Trigger::FallingEdge, move |_| {
        let _ = button_tx.send(());
    })?;

    Ok((
        DoorSwitch {
            pin: Some(door_pin),
            invert,
        },
        InterruptGuard {
            _motor: motor_pin,
            _button: button_pin,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn door_polarity_follows_hardware_rev() {
        // rev 1 and later: '0' on the line means closed
        assert!(door_closed('0', false));
        assert!(!door_closed('1', false));
        // rev 0 boards are wired the other way around
        assert!(door_closed('1', true));
        assert!(!door_closed('0', true));
    }

    #[test]
    fn disconnected_door_reads_closed() {
        assert!(!DoorSwitch::disconnected(false).is_open());
        assert!(!DoorSwitch::disconnected(true).is_open());
    }

    #[tokio::test]
    async fn channels_deliver_in_order() {
        let (sources, mut streams) = channels();
        sources.door.send('1').unwrap();
        sources.door.send('0').unwrap();
        assert_eq!(streams.door.recv().await, Some('1'));
        assert_eq!(streams.door.recv().await, Some('0'));
    }
}
