// src/lib.rs - Lithos SLA printer engine
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod hardware;
pub mod layers;
pub mod print_data;
pub mod projector;
pub mod status;
pub mod timer;

pub use commands::Command;
pub use config::Settings;
pub use engine::state_machine::{
    EngineOps, Event, PrinterState, PrintingState, StateChange, StateMachine, UiSubState,
};
pub use engine::{EngineContext, PrintEngine};
pub use error::{EngineError, ErrorCode};
pub use layers::LayerType;
pub use status::{PrinterStatus, StatusChannel, STATUS_RECORD_SIZE};
