// src/projector.rs - Seam to the DLP projector driver
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProjectorError {
    #[error("no image available for layer {0}")]
    NoImage(u32),
    #[error("display failure: {0}")]
    Display(String),
}

/// Contract the engine consumes from the projector driver. Every call either
/// succeeds or reports a hard failure; what the engine does about one (black
/// the frame, power down, cancel) is engine policy, not the driver's.
pub trait ProjectorPort {
    /// Show the slice image for a layer.
    fn show_layer(&mut self, layer: u32) -> Result<(), ProjectorError>;

    /// Show an all-black frame so no resin cures.
    fn show_black(&mut self) -> Result<(), ProjectorError>;

    /// Show the alignment test pattern. Callable at any time, from any
    /// state; used for setup only.
    fn show_test_pattern(&mut self) -> Result<(), ProjectorError>;

    /// Lamp power. Fire-and-forget: the driver owns the power sequencing.
    fn set_powered(&mut self, on: bool);
}

/// Stand-in for bench runs without a projector attached.
#[derive(Debug, Default)]
pub struct NullProjector;

impl ProjectorPort for NullProjector {
    fn show_layer(&mut self, layer: u32) -> Result<(), ProjectorError> {
        tracing::debug!("projector: layer {layer}");
        Ok(())
    }

    fn show_black(&mut self) -> Result<(), ProjectorError> {
        tracing::debug!("projector: black");
        Ok(())
    }

    fn show_test_pattern(&mut self) -> Result<(), ProjectorError> {
        tracing::debug!("projector: test pattern");
        Ok(())
    }

    fn set_powered(&mut self, on: bool) {
        tracing::debug!("projector: power {}", if on { "on" } else { "off" });
    }
}
