// src/engine/mod.rs - The print engine: owns the hardware, routes events
pub mod state_machine;

use crate::commands::Command;
use crate::config::Settings;
use crate::error::{EngineError, ErrorCode};
use crate::hardware::gpio::{self, DoorSwitch, EventSources, EventStreams, InterruptGuard};
use crate::hardware::i2c::{I2cPort, NullPort, RppalPort};
use crate::hardware::motor::{Motor, MotorSettingKey, SUCCESS};
use crate::hardware::{frontpanel, ERROR_STATUS};
use crate::layers::{classify, estimate_remaining_secs, LayerSettings};
use crate::print_data::{self, LayerOverrides, PrintData};
use crate::projector::ProjectorPort;
use crate::status::{PrinterStatus, StatusChannel};
use crate::timer::OneShotTimer;
use state_machine::{
    EngineOps, Event, PrinterState, PrintingState, StateChange, StateMachine, UiSubState,
};
use std::collections::VecDeque;
use tokio::sync::mpsc;

/// Everything the state machine operates on: hardware handles, timers, the
/// status record, and the in-flight print bookkeeping. Split from the state
/// machine itself so `handle(event, ops)` borrows cleanly and tests can
/// substitute a recording mock.
pub struct EngineContext {
    settings: Settings,
    status: PrinterStatus,
    channel: StatusChannel,
    motor: Motor,
    frontpanel: Box<dyn I2cPort>,
    projector: Box<dyn ProjectorPort>,
    print_data: PrintData,
    overrides: LayerOverrides,
    exposure_timer: OneShotTimer,
    motor_timeout: OneShotTimer,
    door: DoorSwitch,
    pending_settings: VecDeque<MotorSettingKey>,
    awaiting_setting_ack: bool,
    pending_fault: bool,
    unjam_requested: bool,
}

impl EngineContext {
    pub fn new(
        settings: Settings,
        motor_port: Box<dyn I2cPort>,
        frontpanel_port: Box<dyn I2cPort>,
        projector: Box<dyn ProjectorPort>,
        door: DoorSwitch,
    ) -> Result<Self, EngineError> {
        let channel =
            StatusChannel::open(&settings.paths.status_pipe).map_err(EngineError::StatusPipe)?;
        let print_data = PrintData::new(
            &settings.paths.print_data_dir,
            &settings.paths.staging_dir,
            &settings.paths.download_dir,
        );
        Ok(Self {
            settings,
            status: PrinterStatus::default(),
            channel,
            motor: Motor::new(motor_port),
            frontpanel: frontpanel_port,
            projector,
            print_data,
            overrides: LayerOverrides::default(),
            exposure_timer: OneShotTimer::new(),
            motor_timeout: OneShotTimer::new(),
            door,
            pending_settings: VecDeque::new(),
            awaiting_setting_ack: false,
            pending_fault: false,
            unjam_requested: false,
        })
    }

    /// Latch a jam-recovery request; the next approach will re-home the
    /// tray first. Driven by the maintenance layer (the jam sensor itself
    /// lives outside this engine).
    pub fn request_unjam(&mut self) {
        self.unjam_requested = true;
    }

    pub fn status(&self) -> &PrinterStatus {
        &self.status
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Drain one record from the in-process end of the status pipe.
    pub fn try_read_status(&mut self) -> Option<PrinterStatus> {
        self.channel.try_read_record()
    }

    fn take_fault(&mut self) -> bool {
        std::mem::take(&mut self.pending_fault)
    }

    fn exposure_remaining_secs(&self) -> u32 {
        self.exposure_timer.remaining_secs()
    }

    fn clear_error(&mut self) {
        self.status.error_code = ErrorCode::Success;
        self.status.errno = 0;
        self.status.is_error = false;
    }

    /// Classify, log, and publish an error. Exactly one status record goes
    /// out with `is_error` set; a fatal error additionally queues the fault
    /// event the state machine consumes before anything else.
    pub fn raise_error_detail(
        &mut self,
        code: ErrorCode,
        fatal: bool,
        detail: Option<&str>,
        value: Option<i32>,
    ) {
        let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
        if fatal {
            tracing::error!(errno, ?detail, ?value, "{code}");
        } else {
            tracing::warn!(errno, ?detail, ?value, "{code}");
        }
        self.status.error_code = code;
        self.status.errno = errno;
        self.status.is_error = true;
        self.status.change = StateChange::NoChange;
        self.channel.publish(&self.status);
        self.status.is_error = false;
        if fatal {
            self.pending_fault = true;
        }
    }

    fn set_download_status(&mut self, substate: UiSubState) {
        self.status.ui_substate = substate;
        self.status.change = StateChange::NoChange;
        self.channel.publish(&self.status);
    }

    /// Shared tail of every motor operation: a failed transmission clears
    /// the watchdog (no interrupt will come) and raises a fatal motor
    /// error; a batch that did not request an interrupt owes nothing.
    fn after_motor_send(&mut self, result: Result<(), crate::hardware::HardwareError>) {
        match result {
            Ok(()) => {
                if !self.motor.interrupt_expected() {
                    self.motor_timeout.disarm();
                }
            }
            Err(e) => {
                self.motor_timeout.disarm();
                tracing::error!("motor transmission failed: {e}");
                self.raise_error_detail(ErrorCode::MotorError, true, None, None);
            }
        }
    }
}

impl EngineOps for EngineContext {
    fn arm_exposure_timer(&mut self, seconds: f64) {
        self.exposure_timer.arm(seconds);
    }

    fn clear_exposure_timer(&mut self) {
        self.exposure_timer.disarm();
    }

    fn arm_motor_timeout(&mut self) {
        self.motor_timeout.arm(self.settings.motor.timeout_sec);
    }

    fn clear_motor_timeout(&mut self) {
        self.motor_timeout.disarm();
    }

    fn motion_in_flight(&self) -> bool {
        self.motor_timeout.is_armed()
    }

    fn motor_home(&mut self) {
        self.arm_motor_timeout();
        let result = self.motor.go_home(&self.settings.motor, true);
        self.after_motor_send(result);
    }

    fn motor_start_position(&mut self) {
        self.arm_motor_timeout();
        let result = self.motor.go_to_start_position(&self.settings.motor);
        self.after_motor_send(result);
    }

    fn motor_separate(&mut self) {
        self.arm_motor_timeout();
        let layer = self.status.current_layer;
        let layer_type = classify(layer, self.settings.exposure.burn_in_layers);
        let result = {
            let ls = LayerSettings::new(&self.settings, &self.overrides);
            self.motor.separate(layer_type, layer, &ls)
        };
        self.after_motor_send(result);
    }

    fn motor_approach(&mut self, un_jam_first: bool) {
        self.arm_motor_timeout();
        let layer = self.status.current_layer;
        let layer_type = classify(layer, self.settings.exposure.burn_in_layers);
        let result = {
            let ls = LayerSettings::new(&self.settings, &self.overrides);
            self.motor.approach(layer_type, layer, &ls, un_jam_first)
        };
        self.after_motor_send(result);
    }

    fn motor_pause_and_inspect(&mut self) {
        self.arm_motor_timeout();
        let layer = self.status.current_layer;
        let layer_type = classify(layer, self.settings.exposure.burn_in_layers);
        let rotation = LayerSettings::new(&self.settings, &self.overrides)
            .motion(layer_type, layer)
            .rotation_millidegrees;
        let result = self.motor.pause_and_inspect(&self.settings.motor, rotation);
        self.after_motor_send(result);
    }

    fn motor_resume_from_inspect(&mut self) {
        self.arm_motor_timeout();
        let layer = self.status.current_layer;
        let layer_type = classify(layer, self.settings.exposure.burn_in_layers);
        let rotation = LayerSettings::new(&self.settings, &self.overrides)
            .motion(layer_type, layer)
            .rotation_millidegrees;
        let result = self.motor.resume_from_inspect(&self.settings.motor, rotation);
        self.after_motor_send(result);
    }

    fn motor_pause(&mut self) {
        if let Err(e) = self.motor.pause() {
            tracing::error!("motor pause failed: {e}");
            self.raise_error_detail(ErrorCode::MotorError, true, None, None);
        }
    }

    fn motor_resume(&mut self) {
        if let Err(e) = self.motor.resume() {
            tracing::error!("motor resume failed: {e}");
            self.raise_error_detail(ErrorCode::MotorError, true, None, None);
        }
    }

    fn stop_motor(&mut self) {
        if let Err(e) = self.motor.stop() {
            // already stopping because something went wrong; log and move on
            tracing::warn!("motor stop failed: {e}");
        }
        self.motor_timeout.disarm();
    }

    fn try_start_print(&mut self) -> bool {
        self.clear_error();
        let num_layers = self.print_data.layer_count();
        self.status.num_layers = num_layers;
        self.status.current_layer = 0;
        if num_layers == 0 {
            self.raise_error_detail(ErrorCode::NoPrintDataAvailable, false, None, None);
            return false;
        }
        self.overrides = match self.print_data.overrides() {
            Ok(overrides) => overrides,
            Err(e) => {
                tracing::warn!("layer override table unreadable, using profiles: {e}");
                LayerOverrides::default()
            }
        };

        tracing::info!(settings = %self.settings.as_json(), "starting print");

        self.pending_settings = VecDeque::from([
            MotorSettingKey::LayerThickness,
            MotorSettingKey::SeparationRpm,
        ]);
        self.awaiting_setting_ack = false;
        self.status.ui_substate = UiSubState::None;
        true
    }

    fn send_next_setting(&mut self) -> bool {
        while let Some(key) = self.pending_settings.pop_front() {
            let value = match key {
                MotorSettingKey::LayerThickness => self.settings.motor.layer_thickness,
                MotorSettingKey::SeparationRpm => self.settings.motor.separation_rpm,
            };
            if key == MotorSettingKey::SeparationRpm && !(0..=9).contains(&value) {
                // skip the bad value but keep the handshake moving
                self.raise_error_detail(
                    ErrorCode::SeparationRpmOutOfRange,
                    false,
                    None,
                    Some(value),
                );
                continue;
            }
            match self.motor.send_setting(key, value) {
                Ok(()) => {
                    self.awaiting_setting_ack = true;
                    return false;
                }
                Err(e) => {
                    tracing::error!("settings write failed: {e}");
                    self.raise_error_detail(ErrorCode::MotorError, true, None, None);
                    return false;
                }
            }
        }
        true
    }

    fn take_unjam_request(&mut self) -> bool {
        std::mem::take(&mut self.unjam_requested)
    }

    fn begin_exposure(&mut self) {
        let layer = self.status.current_layer;
        let seconds =
            LayerSettings::new(&self.settings, &self.overrides).timer_exposure_sec(layer);
        match self.projector.show_layer(layer) {
            Ok(()) => self.exposure_timer.arm(seconds),
            Err(e) => {
                tracing::error!("cannot show layer {layer}: {e}");
                self.raise_error_detail(ErrorCode::CantShowImage, true, None, Some(layer as i32));
                self.cancel_print();
            }
        }
    }

    fn show_black(&mut self) {
        if let Err(e) = self.projector.show_black() {
            tracing::error!("cannot show black: {e}");
            self.raise_error_detail(ErrorCode::CantShowBlack, true, None, None);
            self.projector.set_powered(false);
            self.cancel_print();
        }
    }

    fn power_projector(&mut self, on: bool) {
        self.projector.set_powered(on);
    }

    fn advance_layer(&mut self) -> bool {
        self.status.current_layer += 1;
        let layer = self.status.current_layer;
        if !self.print_data.layer_image_path(layer).exists() {
            // without an image there is no point in proceeding
            self.raise_error_detail(ErrorCode::NoImageForLayer, true, None, Some(layer as i32));
            self.cancel_print();
            return false;
        }
        self.status.estimated_seconds_remaining =
            estimate_remaining_secs(&self.settings, layer, self.status.num_layers);
        true
    }

    fn no_more_layers(&self) -> bool {
        self.status.current_layer >= self.status.num_layers
    }

    fn finish_print(&mut self) {
        self.status.num_layers = 0;
        self.status.current_layer = 0;
        self.status.estimated_seconds_remaining = 0;
    }

    fn cancel_print(&mut self) {
        self.finish_print();
        self.exposure_timer.disarm();
        self.pending_settings.clear();
        self.awaiting_setting_ack = false;
    }

    fn door_is_open(&self) -> bool {
        self.door.is_open()
    }

    fn prepare_initializing(&mut self) {
        self.motor_timeout.disarm();
        self.exposure_timer.disarm();
        self.status.current_layer = 0;
        self.status.num_layers = 0;
        self.status.estimated_seconds_remaining = 0;
        self.status.ui_substate = UiSubState::None;
        self.pending_settings.clear();
        self.awaiting_setting_ack = false;
        self.unjam_requested = false;
        self.clear_error();
    }

    fn publish(&mut self, state: PrinterState, change: StateChange) {
        self.status.state = state;
        self.status.change = change;
        self.channel.publish(&self.status);
    }

    fn raise_error(&mut self, code: ErrorCode, fatal: bool) {
        self.raise_error_detail(code, fatal, None, None);
    }
}

/// What one pass of the readiness wait produced. The variant order mirrors
/// the `biased` select below, which is the whole scheduling policy.
enum Wake {
    MotorTimeout,
    Door(char),
    MotorInterrupt,
    ExposureDone,
    ButtonInterrupt,
    Command(Option<Command>),
}

/// The engine proper: the state machine, its context, and the readiness
/// loop that feeds it. Single-task by construction; every handler runs to
/// completion before the next event is dequeued.
pub struct PrintEngine {
    ctx: EngineContext,
    sm: StateMachine,
    streams: EventStreams,
    commands: mpsc::UnboundedReceiver<Command>,
    _gpio: Option<InterruptGuard>,
}

impl PrintEngine {
    /// Bring up the engine against real boards, or the no-hardware stand-ins
    /// when configured for bench use (debug builds only).
    pub fn new(
        settings: Settings,
        projector: Box<dyn ProjectorPort>,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> Result<(Self, EventSources), EngineError> {
        if !settings.printer.have_hardware && !cfg!(debug_assertions) {
            return Err(EngineError::HardwareNeeded);
        }
        let (sources, streams) = gpio::channels();
        let invert = settings.printer.hardware_rev == 0;

        let (motor_port, frontpanel_port, door, guard): (
            Box<dyn I2cPort>,
            Box<dyn I2cPort>,
            DoorSwitch,
            Option<InterruptGuard>,
        ) = if settings.printer.have_hardware {
            let bus = settings.printer.i2c_bus;
            let motor = RppalPort::open(bus, settings.printer.motor_slave_address)?;
            let panel = RppalPort::open(bus, settings.printer.frontpanel_slave_address)?;
            let (door, guard) = gpio::attach(&settings.printer, &sources)?;
            (Box::new(motor), Box::new(panel), door, Some(guard))
        } else {
            (
                Box::new(NullPort),
                Box::new(NullPort),
                DoorSwitch::disconnected(invert),
                None,
            )
        };

        let engine = Self::with_ports(
            settings,
            motor_port,
            frontpanel_port,
            projector,
            door,
            streams,
            commands,
            guard,
        )?;
        Ok((engine, sources))
    }

    /// Assemble an engine from explicit ports; the seam simulators and
    /// integration tests build on.
    #[allow(clippy::too_many_arguments)]
    pub fn with_ports(
        settings: Settings,
        motor_port: Box<dyn I2cPort>,
        frontpanel_port: Box<dyn I2cPort>,
        projector: Box<dyn ProjectorPort>,
        door: DoorSwitch,
        streams: EventStreams,
        commands: mpsc::UnboundedReceiver<Command>,
        gpio: Option<InterruptGuard>,
    ) -> Result<Self, EngineError> {
        let ctx = EngineContext::new(settings, motor_port, frontpanel_port, projector, door)?;
        Ok(Self {
            ctx,
            sm: StateMachine::new(),
            streams,
            commands,
            _gpio: gpio,
        })
    }

    pub fn state(&self) -> PrinterState {
        self.sm.state()
    }

    pub fn context_mut(&mut self) -> &mut EngineContext {
        &mut self.ctx
    }

    /// Initialize the motor board and start the state machine. Blocks for
    /// the board's post-reset window; call before entering `run`.
    pub async fn begin(&mut self) {
        if let Err(e) = self.ctx.motor.initialize(&self.ctx.settings.motor).await {
            tracing::error!("motor board initialization failed: {e}");
            self.ctx
                .raise_error_detail(ErrorCode::MotorError, true, None, None);
        }
        self.sm.begin(&mut self.ctx);
        self.drain_faults();
    }

    /// The readiness loop. Runs until an `Exit` command (or a closed
    /// command channel), then shuts the hardware down.
    pub async fn run(&mut self) {
        loop {
            let wake = tokio::select! {
                biased;
                _ = self.ctx.motor_timeout.expired() => Wake::MotorTimeout,
                Some(raw) = self.streams.door.recv() => Wake::Door(raw),
                Some(()) = self.streams.motor.recv() => Wake::MotorInterrupt,
                _ = self.ctx.exposure_timer.expired() => Wake::ExposureDone,
                Some(()) = self.streams.button.recv() => Wake::ButtonInterrupt,
                command = self.commands.recv() => Wake::Command(command),
            };
            match wake {
                Wake::MotorTimeout => {
                    self.ctx
                        .raise_error_detail(ErrorCode::MotorTimeoutError, true, None, None);
                    self.pump(Event::MotionCompleted(false));
                }
                Wake::Door(raw) => self.on_door(raw),
                Wake::MotorInterrupt => self.on_motor_interrupt(),
                Wake::ExposureDone => self.pump(Event::Exposed),
                Wake::ButtonInterrupt => self.on_button_interrupt(),
                Wake::Command(None) => break,
                Wake::Command(Some(command)) => {
                    if self.handle_command(command).await {
                        break;
                    }
                }
            }
        }
        self.shutdown();
    }

    /// Feed one event through the state machine, consuming any queued fatal
    /// fault first and any the handler itself raised afterwards.
    pub fn pump(&mut self, event: Event) {
        self.drain_faults();
        self.sm.handle(event, &mut self.ctx);
        self.drain_faults();
    }

    fn drain_faults(&mut self) {
        while self.ctx.take_fault() {
            self.sm.handle(Event::Fault, &mut self.ctx);
        }
    }

    /// Door-line edges arrive as the raw ASCII level; the hardware-rev
    /// polarity is applied here, in one place.
    pub fn on_door(&mut self, raw: char) {
        if self.sm.state() == PrinterState::Printing(PrintingState::Exposing) {
            tracing::info!(
                remaining_sec = self.ctx.exposure_remaining_secs(),
                "door event during exposure"
            );
        }
        let invert = self.ctx.settings.printer.hardware_rev == 0;
        if gpio::door_closed(raw, invert) {
            self.pump(Event::DoorClosed);
        } else {
            self.pump(Event::DoorOpened);
        }
    }

    /// The motor interrupt line fired: read the status byte and translate.
    pub fn on_motor_interrupt(&mut self) {
        let status = match self.ctx.motor.read_status() {
            Ok(byte) => byte,
            Err(e) => {
                // lost the completion; the watchdog will catch the stall
                tracing::warn!("motor status read failed: {e}");
                return;
            }
        };
        match status {
            ERROR_STATUS => {
                self.ctx
                    .raise_error_detail(ErrorCode::MotorError, true, None, None);
                self.pump(Event::MotionCompleted(false));
            }
            SUCCESS => {
                if std::mem::take(&mut self.ctx.awaiting_setting_ack) {
                    self.pump(Event::GotSetting);
                } else {
                    self.pump(Event::MotionCompleted(true));
                }
            }
            other => self.ctx.raise_error_detail(
                ErrorCode::UnknownMotorStatus,
                false,
                None,
                Some(other as i32),
            ),
        }
    }

    /// The button interrupt line fired: read the UI board's byte and
    /// translate. A combined press arrives as its own pattern, so it always
    /// wins over the single-button readings of the same cycle.
    pub fn on_button_interrupt(&mut self) {
        let status = match self.ctx.frontpanel.read_byte() {
            Ok(byte) => byte,
            Err(e) => {
                tracing::warn!("front panel read failed: {e}");
                return;
            }
        };
        match frontpanel::decode(status) {
            frontpanel::PanelInput::Button(button) => {
                let event = match button {
                    frontpanel::ButtonEvent::Left => Event::LeftButton,
                    frontpanel::ButtonEvent::Right => Event::RightButton,
                    frontpanel::ButtonEvent::RightHold => Event::RightButtonHold,
                    frontpanel::ButtonEvent::LeftAndRight => Event::LeftAndRightButton,
                };
                self.pump(event);
            }
            frontpanel::PanelInput::PanelError => {
                self.ctx
                    .raise_error_detail(ErrorCode::FrontPanelError, false, None, None);
            }
            frontpanel::PanelInput::Unknown(value) => self.ctx.raise_error_detail(
                ErrorCode::UnknownFrontPanelStatus,
                false,
                None,
                Some(value as i32),
            ),
            frontpanel::PanelInput::Ignored => {}
        }
    }

    /// Dispatch one parsed command; true means exit was requested.
    pub async fn handle_command(&mut self, command: Command) -> bool {
        tracing::debug!(?command, "command");
        match command {
            Command::Start => self.pump(Event::StartPrint),
            Command::Cancel => self.pump(Event::Cancel),
            Command::Pause => self.pump(Event::Pause),
            Command::Resume => self.pump(Event::Resume),
            Command::Reset => {
                // the board reset must finish before the machine re-homes
                if let Err(e) = self.ctx.motor.initialize(&self.ctx.settings.motor).await {
                    tracing::error!("motor board re-initialization failed: {e}");
                    self.ctx
                        .raise_error_detail(ErrorCode::MotorError, true, None, None);
                }
                self.pump(Event::Reset);
            }
            Command::Test => {
                // setup aid; bypasses the state machine entirely
                if let Err(e) = self.ctx.projector.show_test_pattern() {
                    tracing::warn!("test pattern failed: {e}");
                }
            }
            Command::RefreshSettings => {
                if let Err(e) = self.ctx.settings.reload() {
                    tracing::warn!("settings reload failed: {e}");
                }
            }
            Command::ApplyPrintSettings => self.apply_print_settings(),
            Command::StartPrintDataLoad => self.show_loading(),
            Command::ProcessPrintData => self.process_print_data(),
            Command::StartRegistering => self.pump(Event::Connected),
            Command::RegistrationSucceeded => self.pump(Event::Registered),
            // answered by other layers
            Command::GetStatus
            | Command::GetSetting
            | Command::SetSetting
            | Command::RestoreSetting
            | Command::GetLogs
            | Command::SetFirmware
            | Command::GetFwVersion
            | Command::GetBoardNum => {}
            Command::Exit => return true,
            Command::Unknown(input) => {
                self.ctx.raise_error_detail(
                    ErrorCode::UnknownCommandInput,
                    false,
                    Some(&input),
                    None,
                );
            }
        }
        false
    }

    fn apply_print_settings(&mut self) {
        let path = self.ctx.settings.paths.print_settings_file.clone();
        match print_data::load_settings_file(&path) {
            Ok(overrides) => self.ctx.settings.apply_print_file(&overrides),
            Err(e) => {
                tracing::error!("print settings file unreadable: {e}");
                self.ctx.raise_error_detail(
                    ErrorCode::CantLoadPrintSettingsFile,
                    true,
                    path.to_str(),
                    None,
                );
            }
        }
    }

    /// A print file can only be loaded while sitting in `Home`.
    fn show_loading(&mut self) {
        if self.sm.state() != PrinterState::Home {
            self.ctx.raise_error_detail(
                ErrorCode::IllegalStateForPrintData,
                false,
                Some(&format!("{:?}", self.sm.state())),
                None,
            );
            return;
        }
        self.ctx.set_download_status(UiSubState::Downloading);
    }

    /// Stage, validate, and promote an incoming bundle. Any failing step
    /// reports its error, shows the download-failed screen, and leaves the
    /// previous print data alone (it is only cleared once the new bundle is
    /// known sound).
    fn process_print_data(&mut self) {
        let data = self.ctx.print_data.clone();

        if let Err(e) = data.stage() {
            tracing::warn!("staging failed: {e}");
            self.download_failed(ErrorCode::PrintDataStageError, None);
            return;
        }
        let job_name = data.staged_job_name();
        if let Err(e) = data.validate() {
            tracing::warn!("validation failed: {e}");
            self.download_failed(ErrorCode::InvalidPrintData, Some(&job_name));
            return;
        }
        match data.staged_settings() {
            Ok(Some(overrides)) => self.ctx.settings.apply_print_file(&overrides),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("print settings in bundle unreadable: {e}");
                self.download_failed(ErrorCode::PrintDataSettings, Some(&job_name));
                return;
            }
        }
        if let Err(e) = data.clear() {
            tracing::warn!("could not remove previous print data: {e}");
            self.download_failed(ErrorCode::PrintDataRemove, None);
            return;
        }
        if let Err(e) = data.promote() {
            tracing::warn!("could not move print data into place: {e}");
            self.download_failed(ErrorCode::PrintDataMove, Some(&job_name));
            return;
        }

        self.ctx.set_download_status(UiSubState::Downloaded);
    }

    fn download_failed(&mut self, code: ErrorCode, job_name: Option<&str>) {
        self.ctx.raise_error_detail(code, false, job_name, None);
        self.ctx.set_download_status(UiSubState::DownloadFailed);
    }

    /// Clean exit: motors disengaged, projector dark and unpowered; the
    /// status pipe is removed when the channel drops.
    fn shutdown(&mut self) {
        tracing::info!("shutting down");
        if let Err(e) = self.ctx.motor.disable() {
            tracing::warn!("motor disable failed: {e}");
        }
        let _ = self.ctx.projector.show_black();
        self.ctx.projector.set_powered(false);
    }
}
