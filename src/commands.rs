// src/commands.rs - Commands consumed from the upstream UI/network parser
use std::str::FromStr;

/// Everything the upstream layers can ask of the engine. Commands the state
/// machine does not consume directly (status/settings/log queries, firmware
/// updates) are answered by other layers and are no-ops here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Cancel,
    Pause,
    Resume,
    Reset,
    Test,
    RefreshSettings,
    ApplyPrintSettings,
    StartPrintDataLoad,
    ProcessPrintData,
    StartRegistering,
    RegistrationSucceeded,
    GetStatus,
    GetSetting,
    SetSetting,
    RestoreSetting,
    GetLogs,
    SetFirmware,
    GetFwVersion,
    GetBoardNum,
    Exit,
    /// Anything the parser did not recognize; reported as a non-fatal
    /// `UnknownCommandInput` so the sender gets feedback via status.
    Unknown(String),
}

impl FromStr for Command {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use Command::*;
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "start" => Start,
            "cancel" => Cancel,
            "pause" => Pause,
            "resume" => Resume,
            "reset" => Reset,
            "test" => Test,
            "refreshsettings" => RefreshSettings,
            "applyprintsettings" => ApplyPrintSettings,
            "startprintdataload" => StartPrintDataLoad,
            "processprintdata" => ProcessPrintData,
            "startregistering" => StartRegistering,
            "registrationsucceeded" => RegistrationSucceeded,
            "getstatus" => GetStatus,
            "getsetting" => GetSetting,
            "setsetting" => SetSetting,
            "restoresetting" => RestoreSetting,
            "getlogs" => GetLogs,
            "setfirmware" => SetFirmware,
            "getfwversion" => GetFwVersion,
            "getboardnum" => GetBoardNum,
            "exit" => Exit,
            other => Unknown(other.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_commands() {
        assert_eq!("start".parse::<Command>().unwrap(), Command::Start);
        assert_eq!(" Cancel ".parse::<Command>().unwrap(), Command::Cancel);
        assert_eq!(
            "PROCESSPRINTDATA".parse::<Command>().unwrap(),
            Command::ProcessPrintData
        );
        assert_eq!("exit".parse::<Command>().unwrap(), Command::Exit);
    }

    #[test]
    fn unknown_input_is_preserved() {
        assert_eq!(
            "frobnicate".parse::<Command>().unwrap(),
            Command::Unknown("frobnicate".to_string())
        );
    }
}
