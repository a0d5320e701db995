// src/engine/state_machine.rs - The printer's finite-state controller
use crate::error::ErrorCode;

/// Phases of an active print, published as their own coarse states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintingState {
    /// Pressing the build head onto the PDMS: the motor-settings handshake
    /// runs here, then the move to the start position.
    PressingButton,
    Exposing,
    Separating,
    Approaching,
    PausedByUser,
    Inspecting,
    ConfirmingResume,
}

/// Every state the controller can publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrinterState {
    Initializing,
    /// Powered but not homed; a home request leads to `Home`.
    Idle,
    Home,
    Registering,
    ConfirmingCancel,
    Printing(PrintingState),
    AwaitingCancelation,
    ShowingVersion,
    Calibrating,
    DoorOpen,
    Error,
}

impl PrinterState {
    pub fn is_printing(&self) -> bool {
        matches!(self, PrinterState::Printing(_))
    }

    /// Wire code used in the status record.
    pub fn code(&self) -> u8 {
        use PrinterState::*;
        use PrintingState::*;
        match self {
            Initializing => 0,
            Idle => 1,
            Home => 2,
            Registering => 3,
            ConfirmingCancel => 4,
            Printing(PressingButton) => 5,
            Printing(Exposing) => 6,
            Printing(Separating) => 7,
            Printing(Approaching) => 8,
            Printing(PausedByUser) => 9,
            Printing(Inspecting) => 10,
            Printing(ConfirmingResume) => 11,
            AwaitingCancelation => 12,
            ShowingVersion => 13,
            Calibrating => 14,
            DoorOpen => 15,
            Error => 16,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        use PrinterState::*;
        use PrintingState::*;
        Some(match code {
            0 => Initializing,
            1 => Idle,
            2 => Home,
            3 => Registering,
            4 => ConfirmingCancel,
            5 => Printing(PressingButton),
            6 => Printing(Exposing),
            7 => Printing(Separating),
            8 => Printing(Approaching),
            9 => Printing(PausedByUser),
            10 => Printing(Inspecting),
            11 => Printing(ConfirmingResume),
            12 => AwaitingCancelation,
            13 => ShowingVersion,
            14 => Calibrating,
            15 => DoorOpen,
            16 => Error,
            _ => return None,
        })
    }
}

/// Refinement shown on the front panel while in `Home`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UiSubState {
    #[default]
    None,
    Downloading,
    Downloaded,
    DownloadFailed,
}

impl UiSubState {
    pub fn code(&self) -> u8 {
        match self {
            UiSubState::None => 0,
            UiSubState::Downloading => 1,
            UiSubState::Downloaded => 2,
            UiSubState::DownloadFailed => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => UiSubState::None,
            1 => UiSubState::Downloading,
            2 => UiSubState::Downloaded,
            3 => UiSubState::DownloadFailed,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StateChange {
    #[default]
    NoChange,
    Entering,
    Leaving,
}

impl StateChange {
    pub fn code(&self) -> u8 {
        match self {
            StateChange::NoChange => 0,
            StateChange::Entering => 1,
            StateChange::Leaving => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => StateChange::NoChange,
            1 => StateChange::Entering,
            2 => StateChange::Leaving,
            _ => return None,
        })
    }
}

/// Everything that can happen to the controller, already translated from
/// raw interrupt payloads by the event router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    StartPrint,
    Cancel,
    Pause,
    Resume,
    Reset,
    LeftButton,
    RightButton,
    RightButtonHold,
    LeftAndRightButton,
    DoorOpened,
    DoorClosed,
    /// The exposure timer fired.
    Exposed,
    /// The motor board finished (or failed) an interrupt-terminated batch.
    MotionCompleted(bool),
    /// The motor board acked a settings-only write.
    GotSetting,
    Connected,
    Registered,
    /// A fatal error was raised; accepted in every non-terminal state.
    Fault,
}

/// Narrow capability surface the state machine drives. The engine implements
/// it on its context; tests implement it on a recording mock.
///
/// Motor operations arm the timeout watchdog themselves whenever the batch
/// they transmit requests an interrupt, and raise errors on bus failures, so
/// the state machine never sees a `Result` from them.
pub trait EngineOps {
    fn arm_exposure_timer(&mut self, seconds: f64);
    fn clear_exposure_timer(&mut self);
    fn arm_motor_timeout(&mut self);
    fn clear_motor_timeout(&mut self);
    /// Whether an interrupt-terminated batch is outstanding.
    fn motion_in_flight(&self) -> bool;

    fn motor_home(&mut self);
    fn motor_start_position(&mut self);
    fn motor_separate(&mut self);
    fn motor_approach(&mut self, un_jam_first: bool);
    fn motor_pause_and_inspect(&mut self);
    fn motor_resume_from_inspect(&mut self);
    fn motor_pause(&mut self);
    fn motor_resume(&mut self);
    /// Immediate halt plus watchdog disarm.
    fn stop_motor(&mut self);

    /// Validate print data, latch the layer count, queue the motor settings
    /// handshake. False (with the error already reported) when no print can
    /// start.
    fn try_start_print(&mut self) -> bool;
    /// Transmit the next queued motor setting; true once the queue is empty
    /// and nothing was sent.
    fn send_next_setting(&mut self) -> bool;
    /// Take the latched jam-recovery request for the next approach.
    fn take_unjam_request(&mut self) -> bool;

    /// Compute the current layer's exposure, show its image, arm the timer.
    fn begin_exposure(&mut self);
    fn show_black(&mut self);
    fn power_projector(&mut self, on: bool);

    /// Advance to the next layer and refresh the time estimate; false (with
    /// a fatal error already raised) when its image is missing.
    fn advance_layer(&mut self) -> bool;
    fn no_more_layers(&self) -> bool;
    /// Clear the layer counters and estimate at the end of a print.
    fn finish_print(&mut self);
    /// Stop motion and drop all print progress after a fatal error.
    fn cancel_print(&mut self);

    fn door_is_open(&self) -> bool;
    /// Reset counters, estimate and any latched error on (re)initialization.
    fn prepare_initializing(&mut self);

    fn publish(&mut self, state: PrinterState, change: StateChange);
    fn raise_error(&mut self, code: ErrorCode, fatal: bool);
}

/// The controller itself: current state plus the handful of latches that
/// make its transitions deterministic.
pub struct StateMachine {
    state: PrinterState,
    /// State to restore when the door closes again.
    door_return: Option<PrinterState>,
    door_resume_motion: bool,
    /// State to restore when a confirm-cancel dialog is dismissed.
    confirm_return: Option<PrinterState>,
    confirm_resume_motion: bool,
    version_return: Option<PrinterState>,
    /// A pause was requested and takes effect at the next separation.
    pause_requested: bool,
    /// The final separation is done and the end-of-print homing is running.
    homing_to_finish: bool,
    /// The resume-from-inspect motion is running.
    resuming: bool,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: PrinterState::Initializing,
            door_return: None,
            door_resume_motion: false,
            confirm_return: None,
            confirm_resume_motion: false,
            version_return: None,
            pause_requested: false,
            homing_to_finish: false,
            resuming: false,
        }
    }

    pub fn state(&self) -> PrinterState {
        self.state
    }

    /// Start the machine. Called once, after the motor board has been
    /// initialized and event subscriptions are in place.
    pub fn begin(&mut self, ops: &mut dyn EngineOps) {
        ops.publish(PrinterState::Initializing, StateChange::Entering);
        self.enter_initializing(ops);
    }

    pub fn handle(&mut self, event: Event, ops: &mut dyn EngineOps) {
        tracing::debug!(?event, state = ?self.state, "event");
        match event {
            Event::Fault => self.on_fault(ops),
            Event::Reset => self.on_reset(ops),
            Event::DoorOpened => self.on_door_opened(ops),
            Event::DoorClosed => self.on_door_closed(ops),
            Event::MotionCompleted(ok) => self.on_motion_completed(ok, ops),
            Event::Exposed => self.on_exposed(ops),
            Event::GotSetting => self.on_got_setting(ops),
            Event::StartPrint => self.on_start_print(ops),
            Event::Cancel => self.on_cancel(ops),
            Event::Pause => self.on_pause(ops),
            Event::Resume => self.on_resume(ops),
            Event::LeftButton => self.on_left_button(ops),
            Event::RightButton => self.on_right_button(ops),
            Event::RightButtonHold => self.on_right_button_hold(ops),
            Event::LeftAndRightButton => self.on_left_and_right_button(ops),
            Event::Connected => self.on_connected(ops),
            Event::Registered => self.on_registered(ops),
        }
    }

    fn goto(&mut self, ops: &mut dyn EngineOps, next: PrinterState) {
        ops.publish(self.state, StateChange::Leaving);
        self.state = next;
        ops.publish(next, StateChange::Entering);
    }

    fn clear_latches(&mut self) {
        self.door_return = None;
        self.door_resume_motion = false;
        self.confirm_return = None;
        self.confirm_resume_motion = false;
        self.version_return = None;
        self.pause_requested = false;
        self.homing_to_finish = false;
        self.resuming = false;
    }

    fn enter_initializing(&mut self, ops: &mut dyn EngineOps) {
        self.clear_latches();
        ops.prepare_initializing();
        if ops.door_is_open() {
            self.door_return = Some(PrinterState::Idle);
            self.goto(ops, PrinterState::DoorOpen);
        } else {
            ops.motor_home();
        }
    }

    fn on_fault(&mut self, ops: &mut dyn EngineOps) {
        if self.state == PrinterState::Error {
            return;
        }
        ops.stop_motor();
        if self.state == PrinterState::Printing(PrintingState::Exposing) {
            ops.show_black();
        }
        ops.cancel_print();
        self.clear_latches();
        self.goto(ops, PrinterState::Error);
    }

    fn on_reset(&mut self, ops: &mut dyn EngineOps) {
        self.clear_latches();
        self.goto(ops, PrinterState::Initializing);
        self.enter_initializing(ops);
    }

    fn on_door_opened(&mut self, ops: &mut dyn EngineOps) {
        match self.state {
            PrinterState::DoorOpen | PrinterState::Error => {}
            current => {
                // nothing may cure and nothing may move while the door is open
                self.door_resume_motion = ops.motion_in_flight();
                ops.clear_exposure_timer();
                ops.show_black();
                ops.power_projector(false);
                if self.door_resume_motion {
                    ops.motor_pause();
                    ops.clear_motor_timeout();
                }
                self.door_return = Some(current);
                self.goto(ops, PrinterState::DoorOpen);
            }
        }
    }

    fn on_door_closed(&mut self, ops: &mut dyn EngineOps) {
        if self.state != PrinterState::DoorOpen {
            return;
        }
        let target = self.door_return.take().unwrap_or(PrinterState::Home);
        if self.door_resume_motion {
            ops.motor_resume();
            ops.arm_motor_timeout();
        }
        self.door_resume_motion = false;
        self.goto(ops, target);
        if target.is_printing() {
            ops.power_projector(true);
        }
        if target == PrinterState::Printing(PrintingState::Exposing) {
            // the interrupted exposure is aborted, not resumed
            ops.begin_exposure();
        }
    }

    fn on_motion_completed(&mut self, ok: bool, ops: &mut dyn EngineOps) {
        use PrinterState::*;
        use PrintingState::*;

        ops.clear_motor_timeout();

        if !ok {
            match self.state {
                Error | DoorOpen | Idle | Home | Registering | ShowingVersion => {}
                AwaitingCancelation => {
                    // the cancel homing itself failed; motors are stopped,
                    // but the head is nowhere known
                    ops.finish_print();
                    self.goto(ops, PrinterState::Idle);
                }
                _ => self.start_cancel(ops),
            }
            return;
        }

        match self.state {
            Initializing => self.goto(ops, Home),
            Idle => self.goto(ops, Home),
            Printing(PressingButton) => self.begin_next_layer(ops),
            Printing(Approaching) => {
                self.goto(ops, Printing(Exposing));
                ops.begin_exposure();
            }
            Printing(Separating) => {
                if self.homing_to_finish {
                    self.homing_to_finish = false;
                    ops.finish_print();
                    self.goto(ops, Home);
                } else if self.pause_requested {
                    self.pause_requested = false;
                    ops.motor_pause_and_inspect();
                    self.goto(ops, Printing(PausedByUser));
                } else if ops.no_more_layers() {
                    self.homing_to_finish = true;
                    ops.motor_home();
                } else {
                    self.begin_next_layer(ops);
                }
            }
            Printing(PausedByUser) => self.goto(ops, Printing(Inspecting)),
            Printing(ConfirmingResume) if self.resuming => {
                self.resuming = false;
                self.begin_next_layer(ops);
            }
            Calibrating => ops.publish(self.state, StateChange::NoChange),
            AwaitingCancelation => {
                ops.finish_print();
                self.goto(ops, Home);
            }
            _ => {}
        }
    }

    /// Advance the layer counter and issue the approach for it.
    fn begin_next_layer(&mut self, ops: &mut dyn EngineOps) {
        if !ops.advance_layer() {
            // no image for the layer; the fatal error is already in flight
            return;
        }
        let un_jam = ops.take_unjam_request();
        ops.motor_approach(un_jam);
        self.goto(ops, PrinterState::Printing(PrintingState::Approaching));
    }

    fn on_exposed(&mut self, ops: &mut dyn EngineOps) {
        if self.state != PrinterState::Printing(PrintingState::Exposing) {
            return;
        }
        ops.show_black();
        ops.motor_separate();
        self.goto(ops, PrinterState::Printing(PrintingState::Separating));
    }

    fn on_got_setting(&mut self, ops: &mut dyn EngineOps) {
        if self.state == PrinterState::Printing(PrintingState::PressingButton)
            && ops.send_next_setting()
        {
            ops.motor_start_position();
        }
    }

    fn on_start_print(&mut self, ops: &mut dyn EngineOps) {
        match self.state {
            PrinterState::Home => {
                if ops.try_start_print() {
                    self.goto(
                        ops,
                        PrinterState::Printing(PrintingState::PressingButton),
                    );
                    if ops.send_next_setting() {
                        ops.motor_start_position();
                    }
                }
            }
            // not homed yet; home first and let the user retry
            PrinterState::Idle => ops.motor_home(),
            _ => {}
        }
    }

    fn on_cancel(&mut self, ops: &mut dyn EngineOps) {
        use PrinterState::*;
        match self.state {
            // absorbing where there is nothing to cancel
            Idle | Home | Error | AwaitingCancelation | DoorOpen | Initializing => {}
            Registering | ShowingVersion => self.goto(ops, Home),
            ConfirmingCancel | Calibrating | Printing(_) => self.start_cancel(ops),
        }
    }

    /// Roll back to `Home` through `AwaitingCancelation`: stop, then home,
    /// then (on the homing interrupt) enter `Home`.
    fn start_cancel(&mut self, ops: &mut dyn EngineOps) {
        self.clear_latches();
        ops.clear_exposure_timer();
        ops.show_black();
        ops.stop_motor();
        self.goto(ops, PrinterState::AwaitingCancelation);
        ops.motor_home();
    }

    fn on_pause(&mut self, ops: &mut dyn EngineOps) {
        use PrintingState::*;
        if let PrinterState::Printing(PressingButton | Exposing | Separating | Approaching) =
            self.state
        {
            // takes effect at the next separation boundary
            self.pause_requested = true;
            ops.publish(self.state, StateChange::NoChange);
        }
    }

    fn on_resume(&mut self, ops: &mut dyn EngineOps) {
        match self.state {
            PrinterState::Printing(PrintingState::Inspecting) => {
                self.goto(ops, PrinterState::Printing(PrintingState::ConfirmingResume));
            }
            PrinterState::Printing(PrintingState::ConfirmingResume) if !self.resuming => {
                self.resuming = true;
                ops.motor_resume_from_inspect();
            }
            _ => {}
        }
    }

    fn on_left_button(&mut self, ops: &mut dyn EngineOps) {
        match self.state {
            PrinterState::ShowingVersion => {
                let target = self.version_return.take().unwrap_or(PrinterState::Home);
                self.goto(ops, target);
            }
            PrinterState::ConfirmingCancel => self.dismiss_cancel(ops),
            PrinterState::Printing(PrintingState::ConfirmingResume) if !self.resuming => {
                self.goto(ops, PrinterState::Printing(PrintingState::Inspecting));
            }
            _ => {}
        }
    }

    fn on_right_button(&mut self, ops: &mut dyn EngineOps) {
        use PrintingState::*;
        match self.state {
            PrinterState::Idle => ops.motor_home(),
            PrinterState::Home => self.on_start_print(ops),
            PrinterState::ShowingVersion => {
                let target = self.version_return.take().unwrap_or(PrinterState::Home);
                self.goto(ops, target);
            }
            PrinterState::Printing(PressingButton | Exposing | Separating | Approaching) => {
                self.pause_requested = true;
                ops.publish(self.state, StateChange::NoChange);
            }
            PrinterState::Printing(Inspecting) => {
                self.goto(ops, PrinterState::Printing(ConfirmingResume));
            }
            PrinterState::Printing(ConfirmingResume) if !self.resuming => {
                self.resuming = true;
                ops.motor_resume_from_inspect();
            }
            PrinterState::ConfirmingCancel => self.start_cancel(ops),
            PrinterState::Calibrating => self.start_cancel(ops),
            _ => {}
        }
    }

    fn on_right_button_hold(&mut self, ops: &mut dyn EngineOps) {
        if self.state == PrinterState::Home {
            self.goto(ops, PrinterState::Calibrating);
            ops.motor_start_position();
        }
    }

    fn on_left_and_right_button(&mut self, ops: &mut dyn EngineOps) {
        use PrintingState::*;
        match self.state {
            PrinterState::Home => {
                self.version_return = Some(PrinterState::Home);
                self.goto(ops, PrinterState::ShowingVersion);
            }
            PrinterState::ShowingVersion => {
                let target = self.version_return.take().unwrap_or(PrinterState::Home);
                self.goto(ops, target);
            }
            PrinterState::Printing(
                PressingButton | Exposing | Separating | Approaching | PausedByUser | Inspecting,
            ) => self.open_confirm_cancel(ops),
            _ => {}
        }
    }

    /// Hold everything while the operator decides whether to cancel.
    fn open_confirm_cancel(&mut self, ops: &mut dyn EngineOps) {
        self.confirm_return = Some(self.state);
        self.confirm_resume_motion = ops.motion_in_flight();
        if self.confirm_resume_motion {
            ops.motor_pause();
            ops.clear_motor_timeout();
        }
        if self.state == PrinterState::Printing(PrintingState::Exposing) {
            ops.clear_exposure_timer();
            ops.show_black();
        }
        self.goto(ops, PrinterState::ConfirmingCancel);
    }

    fn dismiss_cancel(&mut self, ops: &mut dyn EngineOps) {
        let target = self.confirm_return.take().unwrap_or(PrinterState::Home);
        if self.confirm_resume_motion {
            ops.motor_resume();
            ops.arm_motor_timeout();
        }
        self.confirm_resume_motion = false;
        self.goto(ops, target);
        if target == PrinterState::Printing(PrintingState::Exposing) {
            // restart the aborted exposure from zero
            ops.begin_exposure();
        }
    }

    fn on_connected(&mut self, ops: &mut dyn EngineOps) {
        if matches!(self.state, PrinterState::Home | PrinterState::Idle) {
            self.goto(ops, PrinterState::Registering);
        }
    }

    fn on_registered(&mut self, ops: &mut dyn EngineOps) {
        if self.state == PrinterState::Registering {
            self.goto(ops, PrinterState::Home);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_codes_round_trip() {
        for code in 0..=16u8 {
            let state = PrinterState::from_code(code).unwrap();
            assert_eq!(state.code(), code);
        }
        assert_eq!(PrinterState::from_code(17), None);
    }

    #[test]
    fn printing_predicate_covers_all_substates() {
        assert!(PrinterState::Printing(PrintingState::Exposing).is_printing());
        assert!(PrinterState::Printing(PrintingState::PausedByUser).is_printing());
        assert!(!PrinterState::Home.is_printing());
        assert!(!PrinterState::DoorOpen.is_printing());
    }

    #[test]
    fn substate_and_change_codes_round_trip() {
        for code in 0..=3u8 {
            assert_eq!(UiSubState::from_code(code).unwrap().code(), code);
        }
        for code in 0..=2u8 {
            assert_eq!(StateChange::from_code(code).unwrap().code(), code);
        }
    }
}
