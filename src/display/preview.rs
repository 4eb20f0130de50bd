use std::path::{Path, PathBuf};
use std::process::{Child, Command};

use embedded_graphics::prelude::Size;
use image::{GrayImage, Luma};

use super::{Display, DisplayError, Lifecycle, PanelState};
use crate::config::Config;
use crate::frame::DisplayFrame;

/// Stand-in for the panel during development: frames are written to an image file and
/// handed to the desktop's viewer.
pub struct PreviewSink {
    path: PathBuf,
    viewer: Option<String>,
    viewers: Vec<Child>,
    lifecycle: Lifecycle,
}

impl PreviewSink {
    pub const WIDTH: u32 = 648;
    pub const HEIGHT: u32 = 480;

    pub fn new(path: impl Into<PathBuf>, viewer: Option<String>) -> Self {
        Self {
            path: path.into(),
            viewer,
            viewers: Vec::new(),
            lifecycle: Lifecycle::new(PanelState::Terminated),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.preview_path.clone(), config.preview_viewer.clone())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, frame: &DisplayFrame) -> Result<(), DisplayError> {
        GrayImage::from_fn(frame.width(), frame.height(), |x, y| {
            Luma([if frame.is_ink(x, y) { 0x00 } else { 0xFF }])
        })
        .save(&self.path)?;

        log::info!("Preview written to {}", self.path.display());
        Ok(())
    }

    fn open(&mut self) {
        self.reap_viewers();

        let viewer = match &self.viewer {
            Some(viewer) => viewer,
            None => return,
        };

        // The preview file is already on disk, so a missing viewer is not worth failing for.
        match Command::new(viewer).arg(&self.path).spawn() {
            Ok(child) => self.viewers.push(child),
            Err(e) => log::warn!("Unable to open preview with {}: {}", viewer, e),
        }
    }

    /// Collect viewers launched by earlier cycles that have since exited.
    fn reap_viewers(&mut self) {
        self.viewers.retain_mut(|child| match child.try_wait() {
            Ok(Some(_)) => false,
            Ok(None) => true,
            Err(e) => {
                log::warn!("Unable to check on preview viewer: {}", e);
                false
            }
        });
    }
}

impl Display for PreviewSink {
    fn initialize(&mut self) -> Result<Size, DisplayError> {
        self.lifecycle.advance(PanelState::Initialized)?;
        Ok(self.dimensions())
    }

    fn dimensions(&self) -> Size {
        Size::new(Self::WIDTH, Self::HEIGHT)
    }

    fn present_and_commit(&mut self, frame: &DisplayFrame) -> Result<(), DisplayError> {
        self.lifecycle.check(PanelState::Committed)?;

        self.write(frame)?;
        self.open();
        self.lifecycle.advance(PanelState::Committed)
    }

    /// Nothing to power down.
    fn enter_low_power(&mut self) -> Result<(), DisplayError> {
        self.lifecycle.advance(PanelState::Terminated)
    }

    fn abort(&mut self) -> Result<(), DisplayError> {
        self.lifecycle.abort();
        Ok(())
    }

    fn state(&self) -> PanelState {
        self.lifecycle.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::tests::Recorder;
    use crate::display::DeviceHandle;
    use embedded_graphics::pixelcolor::BinaryColor;
    use embedded_graphics::prelude::{DrawTarget, Pixel, Point};
    use std::env;
    use std::process;
    use std::thread;
    use std::time::{Duration, Instant};

    fn temp_path(name: &str) -> PathBuf {
        env::temp_dir().join(format!("paperboard-{}-{}", process::id(), name))
    }

    #[test]
    fn cycle_writes_image_and_terminates() {
        let path = temp_path("preview.png");
        let mut sink = Recorder::new(PreviewSink::new(&path, None));

        let mut frame = DisplayFrame::new(PreviewSink::WIDTH, PreviewSink::HEIGHT);
        frame
            .draw_iter([Pixel(Point::new(3, 4), BinaryColor::On)])
            .unwrap();

        let mut handle = DeviceHandle::acquire(&mut sink).unwrap();
        assert_eq!(Size::new(648, 480), handle.dimensions());
        handle.commit(&frame).unwrap();
        assert_eq!(PanelState::Terminated, handle.release().unwrap());

        assert_eq!(
            vec![
                PanelState::Uninitialized,
                PanelState::Initialized,
                PanelState::Committed,
                PanelState::Terminated,
            ],
            sink.states
        );

        let written = image::open(&path).unwrap().into_luma8();
        assert_eq!((648, 480), written.dimensions());
        assert_eq!(Luma([0x00]), *written.get_pixel(3, 4));
        assert_eq!(Luma([0xFF]), *written.get_pixel(4, 4));
    }

    #[test]
    fn bitmap_extension_writes_bmp() {
        let path = temp_path("preview.bmp");
        let mut sink = PreviewSink::new(&path, None);

        sink.initialize().unwrap();
        sink.present_and_commit(&DisplayFrame::new(648, 480)).unwrap();
        sink.enter_low_power().unwrap();

        let written = image::open(&path).unwrap();
        assert_eq!(648, written.width());
    }

    #[test]
    fn present_before_initialize_is_rejected() {
        let path = temp_path("never-written.png");
        let mut sink = PreviewSink::new(&path, None);

        assert!(matches!(
            sink.present_and_commit(&DisplayFrame::new(648, 480)),
            Err(DisplayError::InvalidTransition { .. })
        ));
        assert!(!path.exists());
    }

    #[test]
    fn unwritable_path_fails_the_commit() {
        let mut sink = PreviewSink::new(temp_path("missing-dir/preview.png"), None);

        sink.initialize().unwrap();
        assert!(sink
            .present_and_commit(&DisplayFrame::new(648, 480))
            .is_err());
        assert_eq!(PanelState::Initialized, sink.state());

        sink.abort().unwrap();
        assert_eq!(PanelState::Terminated, sink.state());
    }

    #[test]
    fn missing_viewer_is_not_an_error() {
        let path = temp_path("viewer.png");
        let mut sink = PreviewSink::new(&path, Some("paperboard-no-such-viewer".into()));

        sink.initialize().unwrap();
        sink.present_and_commit(&DisplayFrame::new(648, 480)).unwrap();
        assert!(path.exists());
        assert!(sink.viewers.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn exited_viewers_are_reaped_on_the_next_cycle() {
        let path = temp_path("reaped.png");
        let mut sink = PreviewSink::new(&path, Some("true".into()));

        for _ in 0..3 {
            sink.initialize().unwrap();
            sink.present_and_commit(&DisplayFrame::new(648, 480)).unwrap();
            sink.enter_low_power().unwrap();

            let started = Instant::now();
            while sink.viewers.last_mut().unwrap().try_wait().unwrap().is_none() {
                assert!(started.elapsed() < Duration::from_secs(5));
                thread::sleep(Duration::from_millis(10));
            }
        }

        // Only the viewer from the latest cycle is still held.
        assert_eq!(1, sink.viewers.len());
    }
}
