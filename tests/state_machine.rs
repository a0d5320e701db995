// Behavioral tests for the printer state machine, driven through a
// recording EngineOps mock.

use lithos::engine::state_machine::{
    EngineOps, Event, PrinterState, PrintingState, StateChange, StateMachine,
};
use lithos::error::ErrorCode;

/// Records every capability call the state machine makes, and simulates
/// just enough engine behavior (layer counter, settings queue, timers as
/// booleans) to keep transitions honest.
#[derive(Default)]
struct MockOps {
    actions: Vec<String>,
    statuses: Vec<(PrinterState, StateChange)>,
    errors: Vec<(ErrorCode, bool)>,
    current_layer: u32,
    num_layers: u32,
    data_layers: u32,
    pending_settings: u32,
    exposure_armed: bool,
    watchdog_armed: bool,
    door_open: bool,
    unjam: bool,
    image_missing_at: Option<u32>,
}

impl MockOps {
    fn with_print(layers: u32) -> Self {
        Self {
            data_layers: layers,
            ..Self::default()
        }
    }

    fn act(&mut self, action: impl Into<String>) {
        self.actions.push(action.into());
    }

    fn took(&self, action: &str) -> bool {
        self.actions.iter().any(|a| a == action)
    }

    fn entered(&self) -> Vec<PrinterState> {
        self.statuses
            .iter()
            .filter(|(_, change)| *change == StateChange::Entering)
            .map(|(state, _)| *state)
            .collect()
    }
}

impl EngineOps for MockOps {
    fn arm_exposure_timer(&mut self, _seconds: f64) {
        self.exposure_armed = true;
    }
    fn clear_exposure_timer(&mut self) {
        self.exposure_armed = false;
    }
    fn arm_motor_timeout(&mut self) {
        self.watchdog_armed = true;
    }
    fn clear_motor_timeout(&mut self) {
        self.watchdog_armed = false;
    }
    fn motion_in_flight(&self) -> bool {
        self.watchdog_armed
    }

    fn motor_home(&mut self) {
        self.act("home");
        self.watchdog_armed = true;
    }
    fn motor_start_position(&mut self) {
        self.act("start_position");
        self.watchdog_armed = true;
    }
    fn motor_separate(&mut self) {
        self.act(format!("separate layer={}", self.current_layer));
        self.watchdog_armed = true;
    }
    fn motor_approach(&mut self, un_jam_first: bool) {
        self.act(format!(
            "approach layer={} unjam={un_jam_first}",
            self.current_layer
        ));
        self.watchdog_armed = true;
    }
    fn motor_pause_and_inspect(&mut self) {
        self.act("pause_and_inspect");
        self.watchdog_armed = true;
    }
    fn motor_resume_from_inspect(&mut self) {
        self.act("resume_from_inspect");
        self.watchdog_armed = true;
    }
    fn motor_pause(&mut self) {
        self.act("motor_pause");
    }
    fn motor_resume(&mut self) {
        self.act("motor_resume");
    }
    fn stop_motor(&mut self) {
        self.act("stop");
        self.watchdog_armed = false;
    }

    fn try_start_print(&mut self) -> bool {
        self.num_layers = self.data_layers;
        self.current_layer = 0;
        if self.num_layers == 0 {
            self.errors.push((ErrorCode::NoPrintDataAvailable, false));
            return false;
        }
        self.pending_settings = 2;
        true
    }
    fn send_next_setting(&mut self) -> bool {
        if self.pending_settings > 0 {
            self.pending_settings -= 1;
            self.act("send_setting");
            false
        } else {
            true
        }
    }
    fn take_unjam_request(&mut self) -> bool {
        std::mem::take(&mut self.unjam)
    }

    fn begin_exposure(&mut self) {
        self.act(format!("expose layer={}", self.current_layer));
        self.exposure_armed = true;
    }
    fn show_black(&mut self) {
        self.act("show_black");
    }
    fn power_projector(&mut self, on: bool) {
        self.act(format!("projector_power {on}"));
    }

    fn advance_layer(&mut self) -> bool {
        self.current_layer += 1;
        if self.image_missing_at == Some(self.current_layer) {
            self.errors.push((ErrorCode::NoImageForLayer, true));
            self.cancel_print();
            return false;
        }
        true
    }
    fn no_more_layers(&self) -> bool {
        self.current_layer >= self.num_layers
    }
    fn finish_print(&mut self) {
        self.num_layers = 0;
        self.current_layer = 0;
    }
    fn cancel_print(&mut self) {
        self.finish_print();
        self.exposure_armed = false;
    }

    fn door_is_open(&self) -> bool {
        self.door_open
    }
    fn prepare_initializing(&mut self) {
        self.current_layer = 0;
        self.num_layers = 0;
        self.watchdog_armed = false;
        self.exposure_armed = false;
    }

    fn publish(&mut self, state: PrinterState, change: StateChange) {
        self.statuses.push((state, change));
    }
    fn raise_error(&mut self, code: ErrorCode, fatal: bool) {
        self.errors.push((code, fatal));
    }
}

/// Boot the machine and complete the startup homing.
fn to_home(sm: &mut StateMachine, ops: &mut MockOps) {
    sm.begin(ops);
    assert_eq!(sm.state(), PrinterState::Initializing);
    sm.handle(Event::MotionCompleted(true), ops);
    assert_eq!(sm.state(), PrinterState::Home);
}

/// Run the settings handshake and reach the approach of layer 1.
fn to_first_approach(sm: &mut StateMachine, ops: &mut MockOps) {
    sm.handle(Event::StartPrint, ops);
    assert_eq!(
        sm.state(),
        PrinterState::Printing(PrintingState::PressingButton)
    );
    sm.handle(Event::GotSetting, ops);
    sm.handle(Event::GotSetting, ops);
    assert!(ops.took("start_position"));
    sm.handle(Event::MotionCompleted(true), ops);
    assert_eq!(
        sm.state(),
        PrinterState::Printing(PrintingState::Approaching)
    );
    assert_eq!(ops.current_layer, 1);
}

/// Drive to the exposure of the given layer (which must be the next one).
fn expose_layer(sm: &mut StateMachine, ops: &mut MockOps, layer: u32) {
    sm.handle(Event::MotionCompleted(true), ops);
    assert_eq!(sm.state(), PrinterState::Printing(PrintingState::Exposing));
    assert_eq!(ops.current_layer, layer);
    assert!(ops.exposure_armed);
}

#[test]
fn start_without_data_reports_and_stays_home() {
    let mut sm = StateMachine::new();
    let mut ops = MockOps::default();
    to_home(&mut sm, &mut ops);

    sm.handle(Event::StartPrint, &mut ops);

    assert_eq!(sm.state(), PrinterState::Home);
    assert_eq!(ops.errors, vec![(ErrorCode::NoPrintDataAvailable, false)]);
    assert!(!ops.took("start_position"));
}

#[test]
fn happy_three_layer_print() {
    let mut sm = StateMachine::new();
    let mut ops = MockOps::with_print(3);
    to_home(&mut sm, &mut ops);
    to_first_approach(&mut sm, &mut ops);

    for layer in 1..=3u32 {
        expose_layer(&mut sm, &mut ops, layer);
        sm.handle(Event::Exposed, &mut ops);
        assert_eq!(
            sm.state(),
            PrinterState::Printing(PrintingState::Separating)
        );
        assert!(ops.took(&format!("separate layer={layer}")));
        sm.handle(Event::MotionCompleted(true), &mut ops);
        if layer < 3 {
            assert_eq!(
                sm.state(),
                PrinterState::Printing(PrintingState::Approaching)
            );
        }
    }

    // the final separation kicked off the end-of-print homing
    assert_eq!(
        sm.state(),
        PrinterState::Printing(PrintingState::Separating)
    );
    assert!(ops.took("home"));
    sm.handle(Event::MotionCompleted(true), &mut ops);
    assert_eq!(sm.state(), PrinterState::Home);
    assert_eq!(ops.current_layer, 0);
    assert_eq!(ops.num_layers, 0);

    // every layer got exactly one approach, exposure, and separation
    for layer in 1..=3u32 {
        for op in ["approach", "expose", "separate"] {
            let count = ops
                .actions
                .iter()
                .filter(|a| a.starts_with(&format!("{op} layer={layer}")))
                .count();
            assert_eq!(count, 1, "{op} of layer {layer}");
        }
    }
}

#[test]
fn entries_are_published_after_leaves() {
    let mut sm = StateMachine::new();
    let mut ops = MockOps::with_print(1);
    to_home(&mut sm, &mut ops);
    to_first_approach(&mut sm, &mut ops);

    // scan for Leave(X) immediately followed by Enter(Y) pairs
    let mut transitions = 0;
    for pair in ops.statuses.windows(2) {
        if pair[0].1 == StateChange::Leaving {
            assert_eq!(pair[1].1, StateChange::Entering);
            transitions += 1;
        }
    }
    assert!(transitions >= 3);
}

#[test]
fn motor_timeout_mid_separation_is_fatal() {
    let mut sm = StateMachine::new();
    let mut ops = MockOps::with_print(3);
    to_home(&mut sm, &mut ops);
    to_first_approach(&mut sm, &mut ops);
    expose_layer(&mut sm, &mut ops, 1);
    sm.handle(Event::Exposed, &mut ops);

    // the router raises the fatal timeout, then synthesizes the failure
    sm.handle(Event::Fault, &mut ops);
    assert_eq!(sm.state(), PrinterState::Error);
    assert!(ops.took("stop"));
    assert_eq!(ops.num_layers, 0);
    sm.handle(Event::MotionCompleted(false), &mut ops);
    assert_eq!(sm.state(), PrinterState::Error);

    // only a reset leaves the error state
    sm.handle(Event::StartPrint, &mut ops);
    sm.handle(Event::Cancel, &mut ops);
    assert_eq!(sm.state(), PrinterState::Error);
    sm.handle(Event::Reset, &mut ops);
    assert_eq!(sm.state(), PrinterState::Initializing);
}

#[test]
fn door_open_mid_exposure_blacks_out_and_returns() {
    let mut sm = StateMachine::new();
    let mut ops = MockOps::with_print(3);
    to_home(&mut sm, &mut ops);
    to_first_approach(&mut sm, &mut ops);
    expose_layer(&mut sm, &mut ops, 1);

    // second layer
    sm.handle(Event::Exposed, &mut ops);
    sm.handle(Event::MotionCompleted(true), &mut ops);
    expose_layer(&mut sm, &mut ops, 2);
    ops.actions.clear();

    sm.handle(Event::DoorOpened, &mut ops);
    assert_eq!(sm.state(), PrinterState::DoorOpen);
    assert!(!ops.exposure_armed);
    assert!(ops.took("show_black"));
    assert!(ops.took("projector_power false"));

    sm.handle(Event::DoorClosed, &mut ops);
    assert_eq!(sm.state(), PrinterState::Printing(PrintingState::Exposing));
    // no layer was skipped; the exposure restarted from zero
    assert_eq!(ops.current_layer, 2);
    assert!(ops.took("projector_power true"));
    assert!(ops.took("expose layer=2"));
    assert!(ops.exposure_armed);
}

#[test]
fn door_open_during_motion_pauses_and_resumes_it() {
    let mut sm = StateMachine::new();
    let mut ops = MockOps::with_print(2);
    to_home(&mut sm, &mut ops);
    to_first_approach(&mut sm, &mut ops);
    expose_layer(&mut sm, &mut ops, 1);
    sm.handle(Event::Exposed, &mut ops);
    assert!(ops.watchdog_armed);
    ops.actions.clear();

    sm.handle(Event::DoorOpened, &mut ops);
    assert!(ops.took("motor_pause"));
    assert!(!ops.watchdog_armed);

    sm.handle(Event::DoorClosed, &mut ops);
    assert_eq!(
        sm.state(),
        PrinterState::Printing(PrintingState::Separating)
    );
    assert!(ops.took("motor_resume"));
    assert!(ops.watchdog_armed);
}

#[test]
fn door_open_at_startup_parks_until_closed() {
    let mut sm = StateMachine::new();
    let mut ops = MockOps::default();
    ops.door_open = true;

    sm.begin(&mut ops);
    assert_eq!(sm.state(), PrinterState::DoorOpen);

    ops.door_open = false;
    sm.handle(Event::DoorClosed, &mut ops);
    assert_eq!(sm.state(), PrinterState::Idle);

    // homing from idle leads home
    sm.handle(Event::RightButton, &mut ops);
    assert!(ops.took("home"));
    sm.handle(Event::MotionCompleted(true), &mut ops);
    assert_eq!(sm.state(), PrinterState::Home);
}

#[test]
fn jam_recovery_prefixes_the_next_approach() {
    let mut sm = StateMachine::new();
    let mut ops = MockOps::with_print(3);
    to_home(&mut sm, &mut ops);
    to_first_approach(&mut sm, &mut ops);
    expose_layer(&mut sm, &mut ops, 1);
    sm.handle(Event::Exposed, &mut ops);

    ops.unjam = true;
    sm.handle(Event::MotionCompleted(true), &mut ops);
    assert!(ops.took("approach layer=2 unjam=true"));

    // the request was consumed; later approaches are plain again
    sm.handle(Event::MotionCompleted(true), &mut ops);
    sm.handle(Event::Exposed, &mut ops);
    sm.handle(Event::MotionCompleted(true), &mut ops);
    assert!(ops.took("approach layer=3 unjam=false"));
}

#[test]
fn cancel_is_absorbing_at_home_and_converges_from_printing() {
    let mut sm = StateMachine::new();
    let mut ops = MockOps::with_print(3);
    to_home(&mut sm, &mut ops);

    sm.handle(Event::Cancel, &mut ops);
    assert_eq!(sm.state(), PrinterState::Home);

    to_first_approach(&mut sm, &mut ops);
    expose_layer(&mut sm, &mut ops, 1);
    ops.actions.clear();

    sm.handle(Event::Cancel, &mut ops);
    assert_eq!(sm.state(), PrinterState::AwaitingCancelation);
    let stop_at = ops.actions.iter().position(|a| a == "stop").unwrap();
    let home_at = ops.actions.iter().position(|a| a == "home").unwrap();
    assert!(stop_at < home_at);

    sm.handle(Event::MotionCompleted(true), &mut ops);
    assert_eq!(sm.state(), PrinterState::Home);
    assert_eq!(ops.current_layer, 0);
}

#[test]
fn failed_motion_cancels_like_a_motor_error() {
    let mut sm = StateMachine::new();
    let mut ops = MockOps::with_print(2);
    to_home(&mut sm, &mut ops);
    to_first_approach(&mut sm, &mut ops);

    sm.handle(Event::MotionCompleted(false), &mut ops);
    assert_eq!(sm.state(), PrinterState::AwaitingCancelation);
    sm.handle(Event::MotionCompleted(true), &mut ops);
    assert_eq!(sm.state(), PrinterState::Home);
}

#[test]
fn pause_takes_effect_at_the_separation_boundary() {
    let mut sm = StateMachine::new();
    let mut ops = MockOps::with_print(3);
    to_home(&mut sm, &mut ops);
    to_first_approach(&mut sm, &mut ops);
    expose_layer(&mut sm, &mut ops, 1);

    sm.handle(Event::Pause, &mut ops);
    // still exposing; nothing moved yet
    assert_eq!(sm.state(), PrinterState::Printing(PrintingState::Exposing));

    sm.handle(Event::Exposed, &mut ops);
    sm.handle(Event::MotionCompleted(true), &mut ops);
    assert_eq!(
        sm.state(),
        PrinterState::Printing(PrintingState::PausedByUser)
    );
    assert!(ops.took("pause_and_inspect"));

    // arrival at the inspection position
    sm.handle(Event::MotionCompleted(true), &mut ops);
    assert_eq!(
        sm.state(),
        PrinterState::Printing(PrintingState::Inspecting)
    );

    // resume is confirmed, then the tray returns and the print continues
    sm.handle(Event::Resume, &mut ops);
    assert_eq!(
        sm.state(),
        PrinterState::Printing(PrintingState::ConfirmingResume)
    );
    sm.handle(Event::Resume, &mut ops);
    assert!(ops.took("resume_from_inspect"));
    sm.handle(Event::MotionCompleted(true), &mut ops);
    assert_eq!(
        sm.state(),
        PrinterState::Printing(PrintingState::Approaching)
    );
    assert_eq!(ops.current_layer, 2);
}

#[test]
fn confirm_cancel_dialog_can_be_dismissed() {
    let mut sm = StateMachine::new();
    let mut ops = MockOps::with_print(3);
    to_home(&mut sm, &mut ops);
    to_first_approach(&mut sm, &mut ops);
    expose_layer(&mut sm, &mut ops, 1);
    ops.actions.clear();

    sm.handle(Event::LeftAndRightButton, &mut ops);
    assert_eq!(sm.state(), PrinterState::ConfirmingCancel);
    // the exposure was aborted while the dialog is up
    assert!(!ops.exposure_armed);
    assert!(ops.took("show_black"));

    sm.handle(Event::LeftButton, &mut ops);
    assert_eq!(sm.state(), PrinterState::Printing(PrintingState::Exposing));
    assert!(ops.took("expose layer=1"));

    // confirming instead goes through the cancelation path
    sm.handle(Event::LeftAndRightButton, &mut ops);
    sm.handle(Event::RightButton, &mut ops);
    assert_eq!(sm.state(), PrinterState::AwaitingCancelation);
}

#[test]
fn missing_layer_image_aborts_the_print() {
    let mut sm = StateMachine::new();
    let mut ops = MockOps::with_print(3);
    ops.image_missing_at = Some(2);
    to_home(&mut sm, &mut ops);
    to_first_approach(&mut sm, &mut ops);
    expose_layer(&mut sm, &mut ops, 1);
    sm.handle(Event::Exposed, &mut ops);

    sm.handle(Event::MotionCompleted(true), &mut ops);
    assert!(ops.errors.contains(&(ErrorCode::NoImageForLayer, true)));
    // the machine waits for the queued fault rather than advancing
    assert_eq!(
        sm.state(),
        PrinterState::Printing(PrintingState::Separating)
    );
    sm.handle(Event::Fault, &mut ops);
    assert_eq!(sm.state(), PrinterState::Error);
}

#[test]
fn registration_and_version_round_trips() {
    let mut sm = StateMachine::new();
    let mut ops = MockOps::default();
    to_home(&mut sm, &mut ops);

    sm.handle(Event::Connected, &mut ops);
    assert_eq!(sm.state(), PrinterState::Registering);
    sm.handle(Event::Registered, &mut ops);
    assert_eq!(sm.state(), PrinterState::Home);

    sm.handle(Event::LeftAndRightButton, &mut ops);
    assert_eq!(sm.state(), PrinterState::ShowingVersion);
    sm.handle(Event::RightButton, &mut ops);
    assert_eq!(sm.state(), PrinterState::Home);
}

#[test]
fn calibration_returns_home_through_cancelation() {
    let mut sm = StateMachine::new();
    let mut ops = MockOps::default();
    to_home(&mut sm, &mut ops);

    sm.handle(Event::RightButtonHold, &mut ops);
    assert_eq!(sm.state(), PrinterState::Calibrating);
    assert!(ops.took("start_position"));
    sm.handle(Event::MotionCompleted(true), &mut ops);
    assert_eq!(sm.state(), PrinterState::Calibrating);

    sm.handle(Event::RightButton, &mut ops);
    assert_eq!(sm.state(), PrinterState::AwaitingCancelation);
    sm.handle(Event::MotionCompleted(true), &mut ops);
    assert_eq!(sm.state(), PrinterState::Home);
    let entered = ops.entered();
    assert_eq!(entered.last(), Some(&PrinterState::Home));
}
