// src/error.rs - Error taxonomy shared by the engine and the status record
use thiserror::Error;

/// Every condition the engine can report, with its wire code.
///
/// The numeric value is what goes out in the status record, so variants must
/// never be renumbered once a UI build has shipped against them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[repr(u16)]
pub enum ErrorCode {
    #[error("no error")]
    Success = 0,
    #[error("motor board reported an error or the bus write failed")]
    MotorError = 1,
    #[error("motor board did not complete a command in time")]
    MotorTimeoutError = 2,
    #[error("unrecognized status byte from the motor board")]
    UnknownMotorStatus = 3,
    #[error("front panel reported an error")]
    FrontPanelError = 4,
    #[error("unrecognized status byte from the front panel")]
    UnknownFrontPanelStatus = 5,
    #[error("could not arm or disarm the exposure timer")]
    ExposureTimer = 6,
    #[error("could not arm or disarm the motor timeout timer")]
    MotorTimeoutTimer = 7,
    #[error("could not read remaining exposure time")]
    RemainingExposure = 8,
    #[error("could not create the status pipe")]
    StatusPipeCreation = 9,
    #[error("could not read a GPIO input")]
    GpioInput = 10,
    #[error("no image available for the layer")]
    NoImageForLayer = 11,
    #[error("projector could not show the layer image")]
    CantShowImage = 12,
    #[error("projector could not show black")]
    CantShowBlack = 13,
    #[error("no print data available")]
    NoPrintDataAvailable = 14,
    #[error("print data failed validation")]
    InvalidPrintData = 15,
    #[error("could not stage incoming print data")]
    PrintDataStageError = 16,
    #[error("could not load settings from print data")]
    PrintDataSettings = 17,
    #[error("could not move print data into place")]
    PrintDataMove = 18,
    #[error("could not remove print data")]
    PrintDataRemove = 19,
    #[error("could not load the print settings file")]
    CantLoadPrintSettingsFile = 20,
    #[error("print data operations are not legal in the current state")]
    IllegalStateForPrintData = 21,
    #[error("separation RPM setting is out of range")]
    SeparationRpmOutOfRange = 22,
    #[error("unrecognized command input")]
    UnknownCommandInput = 23,
    #[error("real hardware is required in release builds")]
    HardwareNeeded = 24,
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Inverse of `as_u16`, for status-record decoding.
    pub fn from_u16(code: u16) -> Option<Self> {
        use ErrorCode::*;
        Some(match code {
            0 => Success,
            1 => MotorError,
            2 => MotorTimeoutError,
            3 => UnknownMotorStatus,
            4 => FrontPanelError,
            5 => UnknownFrontPanelStatus,
            6 => ExposureTimer,
            7 => MotorTimeoutTimer,
            8 => RemainingExposure,
            9 => StatusPipeCreation,
            10 => GpioInput,
            11 => NoImageForLayer,
            12 => CantShowImage,
            13 => CantShowBlack,
            14 => NoPrintDataAvailable,
            15 => InvalidPrintData,
            16 => PrintDataStageError,
            17 => PrintDataSettings,
            18 => PrintDataMove,
            19 => PrintDataRemove,
            20 => CantLoadPrintSettingsFile,
            21 => IllegalStateForPrintData,
            22 => SeparationRpmOutOfRange,
            23 => UnknownCommandInput,
            24 => HardwareNeeded,
            _ => return None,
        })
    }
}

/// Failures during engine bring-up. These are unrecoverable: `main` logs them
/// and exits, since the engine cannot run without its timers, status pipe,
/// or (in release builds) real hardware.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("status pipe: {0}")]
    StatusPipe(#[source] std::io::Error),
    #[error("hardware: {0}")]
    Hardware(#[from] crate::hardware::HardwareError),
    #[error("real hardware is required in release builds")]
    HardwareNeeded,
}
