// src/hardware/motor.rs - Register-addressed command protocol for the motor board
use super::i2c::I2cPort;
use super::HardwareError;
use crate::config::MotorSettings;
use crate::layers::{LayerSettings, LayerType};
use tokio::time::Duration;

/// Status byte the board puts on the bus when an interrupt-terminated batch
/// (or a settings write) has completed.
pub const SUCCESS: u8 = 0x30;

/// Rotations travel on the wire in millidegrees divided by this factor.
pub const R_SCALE_FACTOR: i32 = 10;
/// Rotation speeds are configured in RPM and scaled up for the board.
pub const R_SPEED_FACTOR: i32 = 10;
/// Z speeds are configured in microns/s and scaled up for the board.
pub const Z_SPEED_FACTOR: i32 = 10;
/// One full tray revolution in wire units, used as the rotary homing limit.
pub const UNITS_PER_REVOLUTION: i32 = 360_000 / R_SCALE_FACTOR;

const DELAY_AFTER_RESET: Duration = Duration::from_millis(500);

/// Command registers on the board. General commands affect both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Register {
    General = 0x20,
    RotSettings = 0x21,
    RotAction = 0x22,
    ZSettings = 0x23,
    ZAction = 0x24,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Action {
    Enable = 0x01,
    Disable = 0x02,
    Pause = 0x03,
    Resume = 0x04,
    Clear = 0x05,
    Reset = 0x06,
    /// Sentinel closing a batch; the board raises its interrupt line once
    /// every action before it has completed.
    Interrupt = 0x07,
    Home = 0x08,
    Move = 0x09,
    StepAngle = 0x0A,
    UnitsPerRev = 0x0B,
    Microstepping = 0x0C,
    Jerk = 0x0D,
    Speed = 0x0E,
    /// Immediate halt, flushing anything pending.
    Stop = 0x0F,
    LayerThickness = 0x10,
    SeparationRpm = 0x11,
}

/// Per-print settings transmitted during the start handshake, each acked by
/// one `SUCCESS` on the interrupt line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorSettingKey {
    LayerThickness,
    SeparationRpm,
}

/// One register-addressed command, with its optional 32-bit parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotorCommand {
    register: Register,
    action: Action,
    param: Option<i32>,
}

impl MotorCommand {
    pub fn new(register: Register, action: Action) -> Self {
        Self {
            register,
            action,
            param: None,
        }
    }

    pub fn with_param(register: Register, action: Action, param: i32) -> Self {
        Self {
            register,
            action,
            param: Some(param),
        }
    }

    /// Wire form: register, action, then the parameter little-endian when
    /// present.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = vec![self.register as u8, self.action as u8];
        if let Some(param) = self.param {
            bytes.extend_from_slice(&param.to_le_bytes());
        }
        bytes
    }
}

/// The motor board: builds command batches and transmits them eagerly, one
/// command per bus write. A batch either lands completely or fails on the
/// first bad write, in which case no interrupt is expected.
pub struct Motor {
    port: Box<dyn I2cPort>,
    interrupt_expected: bool,
}

impl Motor {
    pub fn new(port: Box<dyn I2cPort>) -> Self {
        Self {
            port,
            interrupt_expected: false,
        }
    }

    /// Whether the last successfully transmitted batch ended in an
    /// `Interrupt` sentinel, i.e. a completion signal is still owed.
    pub fn interrupt_expected(&self) -> bool {
        self.interrupt_expected
    }

    /// Single-byte status read after the interrupt line fires.
    pub fn read_status(&mut self) -> Result<u8, HardwareError> {
        self.interrupt_expected = false;
        self.port.read_byte()
    }

    fn send(&mut self, command: &MotorCommand) -> Result<(), HardwareError> {
        self.port.write(&command.encode())
    }

    fn send_batch(&mut self, commands: &[MotorCommand]) -> Result<(), HardwareError> {
        self.interrupt_expected = false;
        for command in commands {
            self.send(command)?;
        }
        self.interrupt_expected = commands
            .last()
            .map(|c| c.action == Action::Interrupt)
            .unwrap_or(false);
        Ok(())
    }

    pub fn enable(&mut self) -> Result<(), HardwareError> {
        self.send(&MotorCommand::new(Register::General, Action::Enable))
    }

    pub fn disable(&mut self) -> Result<(), HardwareError> {
        self.send(&MotorCommand::new(Register::General, Action::Disable))
    }

    pub fn pause(&mut self) -> Result<(), HardwareError> {
        self.send(&MotorCommand::new(Register::General, Action::Pause))
    }

    pub fn resume(&mut self) -> Result<(), HardwareError> {
        self.send(&MotorCommand::new(Register::General, Action::Resume))
    }

    pub fn clear_pending(&mut self) -> Result<(), HardwareError> {
        self.send(&MotorCommand::new(Register::General, Action::Clear))
    }

    /// Immediate halt. Also cancels any owed completion signal.
    pub fn stop(&mut self) -> Result<(), HardwareError> {
        self.interrupt_expected = false;
        self.send(&MotorCommand::new(Register::General, Action::Stop))
    }

    /// Software-reset the board, wait for it to come back, then program the
    /// per-axis geometry and engage the motors. No motion is requested, so
    /// no interrupt is either.
    pub async fn initialize(&mut self, s: &MotorSettings) -> Result<(), HardwareError> {
        self.send(&MotorCommand::new(Register::General, Action::Reset))?;

        // commands sent during the reset window would be erased by it
        tokio::time::sleep(DELAY_AFTER_RESET).await;

        self.send_batch(&[
            MotorCommand::with_param(Register::ZSettings, Action::StepAngle, s.z_step_angle),
            MotorCommand::with_param(Register::ZSettings, Action::UnitsPerRev, s.z_microns_per_rev),
            MotorCommand::with_param(Register::ZSettings, Action::Microstepping, s.z_micro_step),
            MotorCommand::with_param(Register::RotSettings, Action::StepAngle, s.r_step_angle),
            MotorCommand::with_param(
                Register::RotSettings,
                Action::UnitsPerRev,
                s.r_millidegrees_per_rev / R_SCALE_FACTOR,
            ),
            MotorCommand::with_param(Register::RotSettings, Action::Microstepping, s.r_micro_step),
            MotorCommand::new(Register::General, Action::Enable),
        ])
    }

    /// Rotate the tray to its home position (at most one revolution, then
    /// the configured backoff) and raise Z to its home stop. Optionally
    /// without an interrupt so it can be chained into a longer batch.
    pub fn go_home(&mut self, s: &MotorSettings, with_interrupt: bool) -> Result<(), HardwareError> {
        let mut commands = vec![
            MotorCommand::with_param(Register::RotSettings, Action::Jerk, s.r_homing_jerk),
            MotorCommand::with_param(
                Register::RotSettings,
                Action::Speed,
                R_SPEED_FACTOR * s.r_homing_speed,
            ),
            MotorCommand::with_param(Register::RotAction, Action::Home, UNITS_PER_REVOLUTION),
        ];
        let home_angle = s.r_homing_angle / R_SCALE_FACTOR;
        if home_angle != 0 {
            commands.push(MotorCommand::with_param(
                Register::RotAction,
                Action::Move,
                home_angle,
            ));
        }
        commands.push(MotorCommand::with_param(
            Register::ZSettings,
            Action::Jerk,
            s.z_homing_jerk,
        ));
        commands.push(MotorCommand::with_param(
            Register::ZSettings,
            Action::Speed,
            Z_SPEED_FACTOR * s.z_homing_speed,
        ));
        // travel limit of twice the start-position depth
        commands.push(MotorCommand::with_param(
            Register::ZAction,
            Action::Home,
            -2 * s.z_start_print_position,
        ));
        if with_interrupt {
            commands.push(MotorCommand::new(Register::General, Action::Interrupt));
        }
        self.send_batch(&commands)
    }

    /// Home, then lower the build head onto the PDMS to calibrate or start a
    /// print. One interrupt terminates the whole chain.
    pub fn go_to_start_position(&mut self, s: &MotorSettings) -> Result<(), HardwareError> {
        self.go_home(s, false)?;

        let mut commands = vec![
            MotorCommand::with_param(Register::RotSettings, Action::Jerk, s.r_start_print_jerk),
            MotorCommand::with_param(
                Register::RotSettings,
                Action::Speed,
                R_SPEED_FACTOR * s.r_start_print_speed,
            ),
        ];
        let start_angle = s.r_start_print_angle / R_SCALE_FACTOR;
        if start_angle != 0 {
            commands.push(MotorCommand::with_param(
                Register::RotAction,
                Action::Move,
                start_angle,
            ));
        }
        commands.push(MotorCommand::with_param(
            Register::ZSettings,
            Action::Jerk,
            s.z_start_print_jerk,
        ));
        commands.push(MotorCommand::with_param(
            Register::ZSettings,
            Action::Speed,
            Z_SPEED_FACTOR * s.z_start_print_speed,
        ));
        commands.push(MotorCommand::with_param(
            Register::ZAction,
            Action::Move,
            s.z_start_print_position,
        ));
        commands.push(MotorCommand::new(Register::General, Action::Interrupt));
        self.send_batch(&commands)
    }

    /// Rotate the tray away from the hardened layer and lift the build head.
    pub fn separate(
        &mut self,
        layer_type: LayerType,
        layer: u32,
        ls: &LayerSettings,
    ) -> Result<(), HardwareError> {
        let m = ls.motion(layer_type, layer);
        let rotation = m.rotation_millidegrees / R_SCALE_FACTOR;

        let mut commands = vec![
            MotorCommand::with_param(Register::RotSettings, Action::Jerk, m.separation_r_jerk),
            MotorCommand::with_param(
                Register::RotSettings,
                Action::Speed,
                R_SPEED_FACTOR * m.separation_r_speed,
            ),
        ];
        if rotation != 0 {
            commands.push(MotorCommand::with_param(
                Register::RotAction,
                Action::Move,
                -rotation,
            ));
        }
        commands.push(MotorCommand::with_param(
            Register::ZSettings,
            Action::Jerk,
            m.separation_z_jerk,
        ));
        commands.push(MotorCommand::with_param(
            Register::ZSettings,
            Action::Speed,
            Z_SPEED_FACTOR * m.separation_z_speed,
        ));
        if m.z_lift_microns != 0 {
            commands.push(MotorCommand::with_param(
                Register::ZAction,
                Action::Move,
                m.z_lift_microns,
            ));
        }
        commands.push(MotorCommand::new(Register::General, Action::Interrupt));
        self.send_batch(&commands)
    }

    /// Rotate the tray back under the build head and descend to the next
    /// layer's exposure position. With `un_jam_first`, the recovery motion
    /// is chained ahead of the approach so the combined issuance still
    /// completes with a single interrupt.
    pub fn approach(
        &mut self,
        layer_type: LayerType,
        layer: u32,
        ls: &LayerSettings,
        un_jam_first: bool,
    ) -> Result<(), HardwareError> {
        if un_jam_first {
            self.un_jam(layer_type, layer, ls, false)?;
        }

        let m = ls.motion(layer_type, layer);
        let rotation = m.rotation_millidegrees / R_SCALE_FACTOR;

        let mut commands = vec![
            MotorCommand::with_param(Register::RotSettings, Action::Jerk, m.approach_r_jerk),
            MotorCommand::with_param(
                Register::RotSettings,
                Action::Speed,
                R_SPEED_FACTOR * m.approach_r_speed,
            ),
        ];
        if rotation != 0 {
            commands.push(MotorCommand::with_param(
                Register::RotAction,
                Action::Move,
                rotation,
            ));
        }
        commands.push(MotorCommand::with_param(
            Register::ZSettings,
            Action::Jerk,
            m.approach_z_jerk,
        ));
        commands.push(MotorCommand::with_param(
            Register::ZSettings,
            Action::Speed,
            Z_SPEED_FACTOR * m.approach_z_speed,
        ));
        if m.thickness_microns != m.z_lift_microns {
            commands.push(MotorCommand::with_param(
                Register::ZAction,
                Action::Move,
                m.thickness_microns - m.z_lift_microns,
            ));
        }
        commands.push(MotorCommand::new(Register::General, Action::Interrupt));
        self.send_batch(&commands)
    }

    /// Re-home the rotary axis and rotate back out to the separation angle.
    /// Speeds and jerks are assumed already programmed for the current layer
    /// class. Chained without an interrupt when used for jam recovery ahead
    /// of an approach.
    pub fn un_jam(
        &mut self,
        layer_type: LayerType,
        layer: u32,
        ls: &LayerSettings,
        with_interrupt: bool,
    ) -> Result<(), HardwareError> {
        let rotation = ls.motion(layer_type, layer).rotation_millidegrees / R_SCALE_FACTOR;

        let mut commands = vec![MotorCommand::with_param(
            Register::RotAction,
            Action::Home,
            UNITS_PER_REVOLUTION,
        )];
        if rotation != 0 {
            commands.push(MotorCommand::with_param(
                Register::RotAction,
                Action::Move,
                -rotation,
            ));
        }
        if with_interrupt {
            commands.push(MotorCommand::new(Register::General, Action::Interrupt));
        }
        self.send_batch(&commands)
    }

    /// Rotate the tray over the projector window and lift the build head so
    /// the print can be inspected. Homing profiles apply, the head being
    /// already separated.
    pub fn pause_and_inspect(
        &mut self,
        s: &MotorSettings,
        rotation_millidegrees: i32,
    ) -> Result<(), HardwareError> {
        let rotation = rotation_millidegrees / R_SCALE_FACTOR;

        let mut commands = vec![
            MotorCommand::with_param(Register::RotSettings, Action::Jerk, s.r_homing_jerk),
            MotorCommand::with_param(
                Register::RotSettings,
                Action::Speed,
                R_SPEED_FACTOR * s.r_homing_speed,
            ),
            MotorCommand::with_param(Register::ZSettings, Action::Jerk, s.z_homing_jerk),
            MotorCommand::with_param(
                Register::ZSettings,
                Action::Speed,
                Z_SPEED_FACTOR * s.z_homing_speed,
            ),
        ];
        if rotation != 0 {
            commands.push(MotorCommand::with_param(
                Register::RotAction,
                Action::Move,
                -rotation,
            ));
        }
        if s.inspection_height != 0 {
            commands.push(MotorCommand::with_param(
                Register::ZAction,
                Action::Move,
                s.inspection_height,
            ));
        }
        commands.push(MotorCommand::new(Register::General, Action::Interrupt));
        self.send_batch(&commands)
    }

    /// Reverse of `pause_and_inspect`: rotate back into exposing position
    /// and lower the build head. Start-print profiles apply, the machine
    /// being already calibrated.
    pub fn resume_from_inspect(
        &mut self,
        s: &MotorSettings,
        rotation_millidegrees: i32,
    ) -> Result<(), HardwareError> {
        let rotation = rotation_millidegrees / R_SCALE_FACTOR;

        let mut commands = vec![
            MotorCommand::with_param(Register::RotSettings, Action::Jerk, s.r_start_print_jerk),
            MotorCommand::with_param(
                Register::RotSettings,
                Action::Speed,
                R_SPEED_FACTOR * s.r_start_print_speed,
            ),
            MotorCommand::with_param(Register::ZSettings, Action::Jerk, s.z_start_print_jerk),
            MotorCommand::with_param(
                Register::ZSettings,
                Action::Speed,
                Z_SPEED_FACTOR * s.z_start_print_speed,
            ),
        ];
        if rotation != 0 {
            commands.push(MotorCommand::with_param(
                Register::RotAction,
                Action::Move,
                rotation,
            ));
        }
        if s.inspection_height != 0 {
            commands.push(MotorCommand::with_param(
                Register::ZAction,
                Action::Move,
                -s.inspection_height,
            ));
        }
        commands.push(MotorCommand::new(Register::General, Action::Interrupt));
        self.send_batch(&commands)
    }

    /// Transmit one per-print setting; the board acks it with `SUCCESS` on
    /// the interrupt line without any motion.
    pub fn send_setting(&mut self, key: MotorSettingKey, value: i32) -> Result<(), HardwareError> {
        let command = match key {
            MotorSettingKey::LayerThickness => {
                MotorCommand::with_param(Register::ZSettings, Action::LayerThickness, value)
            }
            MotorSettingKey::SeparationRpm => {
                MotorCommand::with_param(Register::RotSettings, Action::SeparationRpm, value)
            }
        };
        self.send(&command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::hardware::i2c::RecordingPort;
    use crate::print_data::LayerOverrides;

    fn motor_with_port() -> (Motor, RecordingPort) {
        let port = RecordingPort::new();
        (Motor::new(Box::new(port.clone())), port)
    }

    #[test]
    fn commands_encode_register_action_then_le_param() {
        let plain = MotorCommand::new(Register::General, Action::Enable);
        assert_eq!(plain.encode(), vec![0x20, 0x01]);
        let with_param = MotorCommand::with_param(Register::ZAction, Action::Move, -2000);
        assert_eq!(
            with_param.encode(),
            vec![0x24, 0x09, 0x30, 0xF8, 0xFF, 0xFF]
        );
    }

    #[test]
    fn separate_rotates_away_then_lifts_and_requests_interrupt() {
        let settings = Settings::default();
        let overrides = LayerOverrides::default();
        let ls = LayerSettings::new(&settings, &overrides);
        let (mut motor, port) = motor_with_port();

        motor.separate(LayerType::Model, 7, &ls).unwrap();

        let writes = port.writes();
        let rotation = settings.model_layer.rotation_millidegrees / R_SCALE_FACTOR;
        // rot jerk, rot speed, -rotation, z jerk, z speed, lift, interrupt
        assert_eq!(writes.len(), 7);
        assert_eq!(
            writes[2],
            MotorCommand::with_param(Register::RotAction, Action::Move, -rotation).encode()
        );
        assert_eq!(
            writes[5],
            MotorCommand::with_param(
                Register::ZAction,
                Action::Move,
                settings.model_layer.z_lift_microns
            )
            .encode()
        );
        assert_eq!(
            writes[6],
            MotorCommand::new(Register::General, Action::Interrupt).encode()
        );
        assert!(motor.interrupt_expected());
    }

    #[test]
    fn zero_valued_moves_are_omitted_not_sent() {
        let mut settings = Settings::default();
        settings.model_layer.rotation_millidegrees = 0;
        settings.model_layer.z_lift_microns = 0;
        let overrides = LayerOverrides::default();
        let ls = LayerSettings::new(&settings, &overrides);
        let (mut motor, port) = motor_with_port();

        motor.separate(LayerType::Model, 3, &ls).unwrap();

        // only the four profile writes and the interrupt remain
        let writes = port.writes();
        assert_eq!(writes.len(), 5);
        assert!(writes
            .iter()
            .all(|w| w[1] != Action::Move as u8 && w[1] != Action::Home as u8));
    }

    #[test]
    fn approach_descends_by_thickness_minus_lift() {
        let mut settings = Settings::default();
        settings.motor.layer_thickness = 25;
        settings.model_layer.z_lift_microns = 2000;
        let overrides = LayerOverrides::default();
        let ls = LayerSettings::new(&settings, &overrides);
        let (mut motor, port) = motor_with_port();

        motor.approach(LayerType::Model, 9, &ls, false).unwrap();

        let descent = MotorCommand::with_param(Register::ZAction, Action::Move, 25 - 2000);
        assert!(port.writes().contains(&descent.encode()));
    }

    #[test]
    fn approach_with_unjam_chains_one_interrupt_total() {
        let settings = Settings::default();
        let overrides = LayerOverrides::default();
        let ls = LayerSettings::new(&settings, &overrides);
        let (mut motor, port) = motor_with_port();

        motor.approach(LayerType::Model, 4, &ls, true).unwrap();

        let writes = port.writes();
        // the recovery re-home comes first
        assert_eq!(
            writes[0],
            MotorCommand::with_param(Register::RotAction, Action::Home, UNITS_PER_REVOLUTION)
                .encode()
        );
        let interrupts = writes
            .iter()
            .filter(|w| w[1] == Action::Interrupt as u8)
            .count();
        assert_eq!(interrupts, 1);
        assert_eq!(
            writes.last().unwrap(),
            &MotorCommand::new(Register::General, Action::Interrupt).encode()
        );
    }

    #[test]
    fn go_home_without_interrupt_owes_no_completion() {
        let settings = Settings::default();
        let (mut motor, port) = motor_with_port();

        motor.go_home(&settings.motor, false).unwrap();
        assert!(!motor.interrupt_expected());

        port.clear_writes();
        motor.go_home(&settings.motor, true).unwrap();
        assert!(motor.interrupt_expected());
        assert_eq!(
            port.writes().last().unwrap(),
            &MotorCommand::new(Register::General, Action::Interrupt).encode()
        );
    }

    #[test]
    fn start_position_chains_home_first() {
        let settings = Settings::default();
        let (mut motor, port) = motor_with_port();

        motor.go_to_start_position(&settings.motor).unwrap();

        let writes = port.writes();
        let rot_home =
            MotorCommand::with_param(Register::RotAction, Action::Home, UNITS_PER_REVOLUTION)
                .encode();
        let z_descent = MotorCommand::with_param(
            Register::ZAction,
            Action::Move,
            settings.motor.z_start_print_position,
        )
        .encode();
        let home_at = writes.iter().position(|w| *w == rot_home).unwrap();
        let descent_at = writes.iter().position(|w| *w == z_descent).unwrap();
        assert!(home_at < descent_at);
        assert!(motor.interrupt_expected());
    }

    #[test]
    fn failed_write_aborts_the_batch_and_expects_nothing() {
        let settings = Settings::default();
        let (mut motor, port) = motor_with_port();
        port.fail_writes(true);

        assert!(motor.go_home(&settings.motor, true).is_err());
        assert!(!motor.interrupt_expected());
    }

    #[tokio::test(start_paused = true)]
    async fn initialize_resets_programs_axes_and_enables() {
        let settings = Settings::default();
        let (mut motor, port) = motor_with_port();

        motor.initialize(&settings.motor).await.unwrap();

        let writes = port.writes();
        assert_eq!(
            writes[0],
            MotorCommand::new(Register::General, Action::Reset).encode()
        );
        assert_eq!(
            writes.last().unwrap(),
            &MotorCommand::new(Register::General, Action::Enable).encode()
        );
        let scaled_rev = MotorCommand::with_param(
            Register::RotSettings,
            Action::UnitsPerRev,
            settings.motor.r_millidegrees_per_rev / R_SCALE_FACTOR,
        );
        assert!(writes.contains(&scaled_rev.encode()));
        assert!(!motor.interrupt_expected());
    }

    #[test]
    fn settings_writes_use_their_own_opcodes() {
        let (mut motor, port) = motor_with_port();
        motor
            .send_setting(MotorSettingKey::SeparationRpm, 6)
            .unwrap();
        assert_eq!(
            port.writes()[0],
            MotorCommand::with_param(Register::RotSettings, Action::SeparationRpm, 6).encode()
        );
    }
}
