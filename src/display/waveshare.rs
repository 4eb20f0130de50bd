use std::thread;
use std::time::Duration;

use embedded_graphics::prelude::Size;
use rppal::gpio::{Gpio, InputPin, Level, OutputPin};
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};

use super::{Display, DisplayError, Lifecycle, PanelState};
use crate::frame::DisplayFrame;

/// The vendor side of an e-paper panel: everything below "wake, show this buffer,
/// sleep". Buffers are in the panel's native layout, one bit per pixel, rows packed
/// most significant bit first, a set bit meaning black.
pub trait PanelDriver {
    /// Wake and configure the panel. Returns its size in pixels (width, height).
    fn init(&mut self) -> Result<(u32, u32), DisplayError>;

    fn display(&mut self, buffer: &[u8]) -> Result<(), DisplayError>;

    /// Power down into deep sleep.
    fn sleep(&mut self) -> Result<(), DisplayError>;
}

/// A physical e-paper panel.
pub struct HardwarePanel<P: PanelDriver = Epd5in83V2> {
    driver: P,
    size: Size,
    lifecycle: Lifecycle,
}

impl<P: PanelDriver> HardwarePanel<P> {
    /// `size` is what the panel is expected to report; it is replaced by the real value
    /// on every `initialize`.
    pub fn new(driver: P, size: Size) -> Self {
        Self {
            driver,
            size,
            lifecycle: Lifecycle::new(PanelState::LowPower),
        }
    }

    pub fn driver(&self) -> &P {
        &self.driver
    }
}

impl HardwarePanel<Epd5in83V2> {
    pub fn epd5in83_v2() -> Self {
        Self::new(
            Epd5in83V2::new(),
            Size::new(Epd5in83V2::WIDTH, Epd5in83V2::HEIGHT),
        )
    }
}

impl<P: PanelDriver> Display for HardwarePanel<P> {
    fn initialize(&mut self) -> Result<Size, DisplayError> {
        self.lifecycle.check(PanelState::Initialized)?;

        let (width, height) = match self.driver.init() {
            Ok(size) => size,
            Err(e) => {
                // Init may have powered the panel before failing.
                if let Err(sleep_error) = self.driver.sleep() {
                    log::error!("Unable to power down panel after failed init: {}", sleep_error);
                }
                return Err(e);
            }
        };
        self.size = Size::new(width, height);
        self.lifecycle.advance(PanelState::Initialized)?;

        Ok(self.size)
    }

    fn dimensions(&self) -> Size {
        self.size
    }

    fn present_and_commit(&mut self, frame: &DisplayFrame) -> Result<(), DisplayError> {
        self.lifecycle.check(PanelState::Committed)?;

        if frame.width() != self.size.width || frame.height() != self.size.height {
            return Err(DisplayError::SizeMismatch {
                frame_width: frame.width(),
                frame_height: frame.height(),
                panel_width: self.size.width,
                panel_height: self.size.height,
            });
        }

        self.driver.display(&native_buffer(frame))?;
        self.lifecycle.advance(PanelState::Committed)
    }

    fn enter_low_power(&mut self) -> Result<(), DisplayError> {
        self.lifecycle.check(PanelState::LowPower)?;

        self.driver.sleep()?;
        self.lifecycle.advance(PanelState::LowPower)
    }

    fn abort(&mut self) -> Result<(), DisplayError> {
        if !self.lifecycle.state().is_active() {
            return Ok(());
        }

        let result = self.driver.sleep();
        self.lifecycle.abort();
        result
    }

    fn state(&self) -> PanelState {
        self.lifecycle.state()
    }
}

/// Frames mark ink with a clear bit; the panel wants it set. Row padding bits come out
/// clear, which the panel treats as white.
fn native_buffer(frame: &DisplayFrame) -> Vec<u8> {
    if frame.stride() == 0 {
        return Vec::new();
    }
    let padding = (frame.stride() * 8) as u32 - frame.width();
    let last_byte_mask = 0xFFu8 << padding;

    frame
        .as_bytes()
        .chunks(frame.stride())
        .flat_map(|row| {
            let last = row.len() - 1;
            row.iter().enumerate().map(move |(i, byte)| {
                if i == last {
                    !byte & last_byte_mask
                } else {
                    !byte
                }
            })
        })
        .collect()
}

/// Waveshare 5.83" V2 (648x480, black/white) on the Raspberry Pi 40-pin header.
///
/// GPIO and SPI are only claimed between `init` and `sleep`, so a missing or busy
/// device fails one refresh instead of the whole process.
pub struct Epd5in83V2 {
    interface: Option<Interface>,
}

impl Epd5in83V2 {
    const PIN_DC: u8 = 25; // Data/command pin (high = data, low = command)
    const PIN_RST: u8 = 17; // External reset pin (low = reset)
    const PIN_BUSY: u8 = 24; // Busy output pin (low = busy)

    const SPI_CLOCK_HZ: u32 = 4_000_000;

    pub const WIDTH: u32 = 648;
    pub const HEIGHT: u32 = 480;

    pub fn new() -> Self {
        Self { interface: None }
    }

    fn connect() -> Result<Interface, DisplayError> {
        let gpio = Gpio::new()?;

        Ok(Interface {
            spi: Spi::new(
                Bus::Spi0,
                SlaveSelect::Ss0,
                Self::SPI_CLOCK_HZ,
                Mode::Mode0,
            )?,
            pin_dc: gpio.get(Self::PIN_DC)?.into_output(),
            pin_rst: gpio.get(Self::PIN_RST)?.into_output(),
            pin_busy: gpio.get(Self::PIN_BUSY)?.into_input(),
        })
    }

    fn interface(&mut self) -> Result<&mut Interface, DisplayError> {
        self.interface
            .as_mut()
            .ok_or_else(|| DisplayError::Driver("panel is not connected".into()))
    }
}

impl Default for Epd5in83V2 {
    fn default() -> Self {
        Self::new()
    }
}

impl PanelDriver for Epd5in83V2 {
    fn init(&mut self) -> Result<(u32, u32), DisplayError> {
        if self.interface.is_none() {
            self.interface = Some(Self::connect()?);
        }
        let interface = self.interface()?;

        interface.reset();

        // VGH=20V, VGL=-20V, VDH=15V, VDL=-15V
        interface.send(Command::PowerSetting, &[0x07, 0x07, 0x3F, 0x3F])?;
        interface.send(Command::BoosterSoftStart, &[0x17, 0x17, 0x28, 0x17])?;
        interface.send(Command::PowerOn, &[])?;
        thread::sleep(Duration::from_millis(100));
        interface.wait_until_idle()?;

        // KW mode, LUT from OTP
        interface.send(Command::PanelSetting, &[0x1F])?;
        interface.send(
            Command::ResolutionSetting,
            &[
                (Self::WIDTH >> 8) as u8,
                Self::WIDTH as u8,
                (Self::HEIGHT >> 8) as u8,
                Self::HEIGHT as u8,
            ],
        )?;
        interface.send(Command::DualSpi, &[0x00])?;
        interface.send(Command::VcomAndDataInterval, &[0x10, 0x07])?;
        interface.send(Command::TconSetting, &[0x22])?;

        Ok((Self::WIDTH, Self::HEIGHT))
    }

    fn display(&mut self, buffer: &[u8]) -> Result<(), DisplayError> {
        let interface = self.interface()?;

        interface.send(Command::DataStartTransmission2, buffer)?;
        interface.send(Command::DisplayRefresh, &[])?;
        thread::sleep(Duration::from_millis(100));
        interface.wait_until_idle()
    }

    fn sleep(&mut self) -> Result<(), DisplayError> {
        let mut interface = match self.interface.take() {
            Some(interface) => interface,
            None => return Ok(()),
        };

        interface.send(Command::PowerOff, &[])?;
        interface.wait_until_idle()?;
        interface.send(Command::DeepSleep, &[0xA5])?;
        thread::sleep(Duration::from_millis(2000));

        interface.pin_dc.write(Level::Low);
        interface.pin_rst.write(Level::Low);

        Ok(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
#[repr(u8)]
enum Command {
    /// 0x00 "PSR" in documentation
    PanelSetting = 0x00,

    /// 0x01 "PWR" in documentation
    PowerSetting = 0x01,

    /// 0x02 "POF" in documentation
    PowerOff = 0x02,

    /// 0x04 "PON" in documentation
    PowerOn = 0x04,

    /// 0x06 "BTST" in documentation
    BoosterSoftStart = 0x06,

    /// 0x07 "DSLP" in documentation, takes the check code 0xA5
    DeepSleep = 0x07,

    /// 0x12 "DRF" in documentation
    DisplayRefresh = 0x12,

    /// 0x13 "DTM2" in documentation (new image data)
    DataStartTransmission2 = 0x13,

    /// 0x15 "setting dual SPI" in example code
    DualSpi = 0x15,

    /// 0x50 "CDI" in documentation
    VcomAndDataInterval = 0x50,

    /// 0x60 "TCON" in documentation
    TconSetting = 0x60,

    /// 0x61 "TRES" in documentation
    ResolutionSetting = 0x61,

    /// 0x71 "FLG" in documentation, used to poll the busy line
    GetStatus = 0x71,
}

struct Interface {
    spi: Spi,
    pin_dc: OutputPin,
    pin_rst: OutputPin,
    pin_busy: InputPin,
}

impl Interface {
    // Maximum transfer size of the spidev driver with default settings.
    const SPI_CHUNK: usize = 4096;

    fn reset(&mut self) {
        self.pin_rst.write(Level::High);
        thread::sleep(Duration::from_millis(20));
        self.pin_rst.write(Level::Low);
        thread::sleep(Duration::from_millis(2));
        self.pin_rst.write(Level::High);
        thread::sleep(Duration::from_millis(20));
    }

    fn wait_until_idle(&mut self) -> Result<(), DisplayError> {
        self.send_command(Command::GetStatus)?;
        if self.pin_busy.read() == Level::Low {
            log::debug!("Waiting for panel...");
            while self.pin_busy.read() == Level::Low {
                self.send_command(Command::GetStatus)?;
                thread::sleep(Duration::from_millis(20));
            }
        }
        Ok(())
    }

    fn send(&mut self, command: Command, data: &[u8]) -> Result<(), DisplayError> {
        self.send_command(command)?;
        if !data.is_empty() {
            self.send_data(data)?;
        }
        Ok(())
    }

    fn send_command(&mut self, command: Command) -> Result<(), DisplayError> {
        self.pin_dc.write(Level::Low);
        self.spi.write(&[command as u8])?;
        Ok(())
    }

    fn send_data(&mut self, data: &[u8]) -> Result<(), DisplayError> {
        self.pin_dc.write(Level::High);
        for chunk in data.chunks(Self::SPI_CHUNK) {
            self.spi.write(chunk)?;
        }
        Ok(())
    }
}
