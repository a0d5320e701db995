// src/status.rs - The published status record and its named-pipe channel
use crate::engine::state_machine::{PrinterState, StateChange, UiSubState};
use crate::error::ErrorCode;
use nix::sys::stat::Mode;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

/// Size of one status record on the wire. Fixed so consumers can read whole
/// records; the spare tail leaves room to grow without breaking them.
pub const STATUS_RECORD_SIZE: usize = 34;

const SPARE_BYTES: usize = 12;

/// The one record the engine publishes. Fields go out in declaration order,
/// little-endian.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrinterStatus {
    pub state: PrinterState,
    pub ui_substate: UiSubState,
    pub change: StateChange,
    /// True only in the single record reporting a freshly raised error.
    pub is_error: bool,
    /// Zero when no print is in progress, 1-indexed once printing.
    pub current_layer: u32,
    /// Zero when no print is loaded.
    pub num_layers: u32,
    pub estimated_seconds_remaining: u32,
    pub error_code: ErrorCode,
    pub errno: i32,
}

impl Default for PrinterStatus {
    fn default() -> Self {
        Self {
            state: PrinterState::Initializing,
            ui_substate: UiSubState::None,
            change: StateChange::NoChange,
            is_error: false,
            current_layer: 0,
            num_layers: 0,
            estimated_seconds_remaining: 0,
            error_code: ErrorCode::Success,
            errno: 0,
        }
    }
}

impl PrinterStatus {
    pub fn encode(&self) -> [u8; STATUS_RECORD_SIZE] {
        let mut record = [0u8; STATUS_RECORD_SIZE];
        record[0] = self.state.code();
        record[1] = self.ui_substate.code();
        record[2] = self.change.code();
        record[3] = self.is_error as u8;
        record[4..8].copy_from_slice(&self.current_layer.to_le_bytes());
        record[8..12].copy_from_slice(&self.num_layers.to_le_bytes());
        record[12..16].copy_from_slice(&self.estimated_seconds_remaining.to_le_bytes());
        record[16..18].copy_from_slice(&self.error_code.as_u16().to_le_bytes());
        record[18..22].copy_from_slice(&self.errno.to_le_bytes());
        record
    }

    pub fn decode(record: &[u8]) -> Option<Self> {
        if record.len() != STATUS_RECORD_SIZE {
            return None;
        }
        Some(Self {
            state: PrinterState::from_code(record[0])?,
            ui_substate: UiSubState::from_code(record[1])?,
            change: StateChange::from_code(record[2])?,
            is_error: record[3] != 0,
            current_layer: u32::from_le_bytes(record[4..8].try_into().ok()?),
            num_layers: u32::from_le_bytes(record[8..12].try_into().ok()?),
            estimated_seconds_remaining: u32::from_le_bytes(record[12..16].try_into().ok()?),
            error_code: ErrorCode::from_u16(u16::from_le_bytes(record[16..18].try_into().ok()?))?,
            errno: i32::from_le_bytes(record[18..22].try_into().ok()?),
        })
    }
}

/// One-writer byte channel to the UI/network layer: a named FIFO, created
/// 0666 if absent. Both ends are opened non-blocking within this process so
/// publishing never waits on (or requires) an external consumer; when the
/// pipe fills, records are dropped and the consumer is expected to keep up.
pub struct StatusChannel {
    path: PathBuf,
    reader: File,
    writer: File,
}

impl StatusChannel {
    pub fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if !path.exists() {
            nix::unistd::mkfifo(path, Mode::from_bits_truncate(0o666))
                .map_err(std::io::Error::from)?;
        }
        // the in-process read end must open first, or the writer open
        // would fail with no reader attached
        let reader = OpenOptions::new()
            .read(true)
            .custom_flags(nix::fcntl::OFlag::O_NONBLOCK.bits())
            .open(path)?;
        let writer = OpenOptions::new()
            .write(true)
            .custom_flags(nix::fcntl::OFlag::O_NONBLOCK.bits())
            .open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            reader,
            writer,
        })
    }

    /// Write the whole record in one call. Short or refused writes are
    /// dropped silently; a slow consumer loses records, never gets torn
    /// ones.
    pub fn publish(&mut self, status: &PrinterStatus) {
        let record = status.encode();
        match self.writer.write(&record) {
            Ok(n) if n == record.len() => {}
            Ok(n) => tracing::trace!("status record truncated to {n} bytes"),
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                tracing::trace!("status pipe full, record dropped");
            }
            Err(e) => tracing::warn!("status pipe write failed: {e}"),
        }
    }

    /// Drain one record from the in-process read end, if any. Local
    /// consumers (and tests) use this; external ones read the pipe.
    pub fn try_read_record(&mut self) -> Option<PrinterStatus> {
        let mut record = [0u8; STATUS_RECORD_SIZE];
        match self.reader.read_exact(&mut record) {
            Ok(()) => PrinterStatus::decode(&record),
            Err(_) => None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StatusChannel {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

// keep the layout arithmetic honest
const _: () = assert!(STATUS_RECORD_SIZE == 4 + 4 + 4 + 4 + 2 + 4 + SPARE_BYTES);
