use embedded_graphics::prelude::Size;
use thiserror::Error;

use crate::frame::DisplayFrame;

pub mod preview;
pub mod waveshare;

pub use preview::PreviewSink;
pub use waveshare::{Epd5in83V2, HardwarePanel, PanelDriver};

#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("GPIO error: {0}")]
    Gpio(#[from] rppal::gpio::Error),

    #[error("SPI error: {0}")]
    Spi(#[from] rppal::spi::Error),

    #[error("unable to write preview image: {0}")]
    Image(#[from] image::ImageError),

    #[error("frame is {frame_width}x{frame_height} but the panel is {panel_width}x{panel_height}")]
    SizeMismatch {
        frame_width: u32,
        frame_height: u32,
        panel_width: u32,
        panel_height: u32,
    },

    #[error("cannot go from {from:?} to {to:?}")]
    InvalidTransition { from: PanelState, to: PanelState },

    #[error("{0}")]
    Driver(String),
}

/// Where a display is in its refresh cycle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PanelState {
    Uninitialized,
    Initialized,
    Committed,
    /// Resting state of a hardware panel between cycles.
    LowPower,
    /// Resting state of a sink that has nothing to power down.
    Terminated,
}

impl PanelState {
    /// Whether the device is awake and owes a trip back to its resting state.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Initialized | Self::Committed)
    }
}

/// A sink for finished frames.
///
/// Every cycle walks the same path: `initialize`, `present_and_commit`, then
/// `enter_low_power`. Calls out of order fail with [`DisplayError::InvalidTransition`]
/// and leave the device untouched.
pub trait Display {
    /// Wake the device and report its size in pixels.
    fn initialize(&mut self) -> Result<Size, DisplayError>;

    /// Size of the frames this device accepts.
    fn dimensions(&self) -> Size;

    /// Show a fully drawn frame.
    fn present_and_commit(&mut self, frame: &DisplayFrame) -> Result<(), DisplayError>;

    /// Return to the resting state after a commit.
    fn enter_low_power(&mut self) -> Result<(), DisplayError>;

    /// Return to the resting state from wherever the cycle stopped. Used when a cycle
    /// fails part way.
    fn abort(&mut self) -> Result<(), DisplayError>;

    fn state(&self) -> PanelState;
}

/// Tracks and validates [`PanelState`] transitions for a [`Display`] implementation.
#[derive(Clone, Debug)]
pub struct Lifecycle {
    state: PanelState,
    rest: PanelState,
}

impl Lifecycle {
    pub fn new(rest: PanelState) -> Self {
        Self {
            state: PanelState::Uninitialized,
            rest,
        }
    }

    pub fn state(&self) -> PanelState {
        self.state
    }

    /// Fail unless `to` is the next step from the current state.
    pub fn check(&self, to: PanelState) -> Result<(), DisplayError> {
        let allowed = match (self.state, to) {
            (PanelState::Uninitialized, PanelState::Initialized) => true,
            (from, PanelState::Initialized) => from == self.rest,
            (PanelState::Initialized, PanelState::Committed) => true,
            (PanelState::Committed, to) => to == self.rest,
            _ => false,
        };

        if allowed {
            Ok(())
        } else {
            Err(DisplayError::InvalidTransition {
                from: self.state,
                to,
            })
        }
    }

    pub fn advance(&mut self, to: PanelState) -> Result<(), DisplayError> {
        self.check(to)?;
        self.state = to;
        Ok(())
    }

    /// Jump straight to the resting state.
    pub fn abort(&mut self) {
        self.state = self.rest;
    }
}

/// One cycle's claim on a display, taken by initializing it.
///
/// If the handle is dropped while the device is still awake, because a step failed or
/// the cycle bailed out early, the device is sent back to its resting state.
pub struct DeviceHandle<'a, D: Display> {
    display: &'a mut D,
    size: Size,
}

impl<'a, D: Display> DeviceHandle<'a, D> {
    pub fn acquire(display: &'a mut D) -> Result<Self, DisplayError> {
        log::debug!("Waking display");
        let size = display.initialize()?;
        Ok(Self { display, size })
    }

    pub fn dimensions(&self) -> Size {
        self.size
    }

    pub fn commit(&mut self, frame: &DisplayFrame) -> Result<(), DisplayError> {
        log::debug!("Pushing frame to display");
        self.display.present_and_commit(frame)
    }

    /// Put the display to rest and end the cycle, returning the resting state reached.
    pub fn release(self) -> Result<PanelState, DisplayError> {
        log::debug!("Putting display to sleep");
        self.display.enter_low_power()?;
        Ok(self.display.state())
    }
}

impl<D: Display> Drop for DeviceHandle<'_, D> {
    fn drop(&mut self) {
        if self.display.state().is_active() {
            log::warn!(
                "Display left in {:?} state, forcing it to rest",
                self.display.state()
            );
            if let Err(e) = self.display.abort() {
                log::error!("Unable to put display to rest: {}", e);
            }
        }
    }
}
