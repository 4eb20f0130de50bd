use std::convert::Infallible;

use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{Line, PrimitiveStyle, Rectangle};
use thiserror::Error;
use time::macros::format_description;
use u8g2_fonts::types::{FontColor, HorizontalAlignment, VerticalPosition};
use u8g2_fonts::{fonts, FontRenderer};

use crate::config::RefreshInterval;
use crate::frame::DisplayFrame;
use crate::source::Snapshot;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("unable to draw text: {0}")]
    Text(String),

    #[error("unable to format timestamp: {0}")]
    Timestamp(#[from] time::error::Format),
}

impl From<Infallible> for RenderError {
    fn from(e: Infallible) -> Self {
        match e {}
    }
}

const INK: BinaryColor = BinaryColor::On;
const PAPER: BinaryColor = BinaryColor::Off;

#[derive(Copy, Clone, Debug)]
enum TextSize {
    Small,
    Medium,
    Large,
    Clock,
}

impl TextSize {
    fn renderer(self) -> FontRenderer {
        match self {
            Self::Small => FontRenderer::new::<fonts::u8g2_font_profont17_tf>(),
            Self::Medium => FontRenderer::new::<fonts::u8g2_font_profont22_tf>(),
            Self::Large => FontRenderer::new::<fonts::u8g2_font_profont29_tf>(),
            Self::Clock => FontRenderer::new::<fonts::u8g2_font_logisoso42_tn>(),
        }
        .with_ignore_unknown_chars(true)
    }
}

/// Maps coordinates laid out for the 648x480 reference panel onto the target.
#[derive(Copy, Clone, Debug)]
struct Scale {
    width: u32,
    height: u32,
}

impl Scale {
    fn x(&self, x: i32) -> i32 {
        (x as i64 * self.width as i64 / Renderer::REFERENCE_WIDTH as i64) as i32
    }

    fn y(&self, y: i32) -> i32 {
        (y as i64 * self.height as i64 / Renderer::REFERENCE_HEIGHT as i64) as i32
    }

    fn point(&self, x: i32, y: i32) -> Point {
        Point::new(self.x(x), self.y(y))
    }
}

/// Lays out the dashboard. Output depends only on the snapshot, the target size and
/// the refresh interval, so the same inputs always produce the same frame.
#[derive(Clone, Debug)]
pub struct Renderer {
    interval: RefreshInterval,
}

impl Renderer {
    pub const REFERENCE_WIDTH: u32 = 648;
    pub const REFERENCE_HEIGHT: u32 = 480;

    const MARGIN: i32 = 20;
    const HEADER_HEIGHT: i32 = 72;
    const COLUMN_SPLIT: i32 = 400;
    const BODY_DIVIDER: i32 = 182;
    const LOWER_TOP: i32 = 196;
    const FORECAST_TOP: i32 = 226;
    const FORECAST_SPACING: i32 = 52;
    const STATUS_SPACING: i32 = 36;

    pub fn new(interval: RefreshInterval) -> Self {
        Self { interval }
    }

    pub fn render(&self, snapshot: &Snapshot, size: Size) -> Result<DisplayFrame, RenderError> {
        let mut frame = DisplayFrame::new(size.width, size.height);
        let scale = Scale {
            width: size.width,
            height: size.height,
        };

        self.draw_header(&mut frame, scale, snapshot)?;
        self.draw_current_conditions(&mut frame, scale, snapshot)?;
        self.draw_forecast(&mut frame, scale, snapshot)?;
        self.draw_system_status(&mut frame, scale, snapshot)?;

        Ok(frame)
    }

    fn draw_header(
        &self,
        frame: &mut DisplayFrame,
        scale: Scale,
        snapshot: &Snapshot,
    ) -> Result<(), RenderError> {
        let band_height = scale.y(Self::HEADER_HEIGHT);
        Rectangle::new(Point::zero(), Size::new(scale.width, band_height.max(0) as u32))
            .into_styled(PrimitiveStyle::with_fill(INK))
            .draw(frame)?;

        draw_text(
            frame,
            &snapshot.taken_at.format(format_description!("[hour]:[minute]"))?,
            Point::new(scale.x(Self::MARGIN), band_height / 2),
            TextSize::Clock,
            VerticalPosition::Center,
            HorizontalAlignment::Left,
            PAPER,
        )?;

        let right = scale.width as i32 - scale.x(Self::MARGIN);
        draw_text(
            frame,
            &snapshot.weather.location_label.to_uppercase(),
            Point::new(right, scale.y(12)),
            TextSize::Small,
            VerticalPosition::Top,
            HorizontalAlignment::Right,
            PAPER,
        )?;
        draw_text(
            frame,
            &snapshot
                .taken_at
                .format(format_description!("[weekday], [month repr:short] [day]"))?,
            Point::new(right, scale.y(40)),
            TextSize::Small,
            VerticalPosition::Top,
            HorizontalAlignment::Right,
            PAPER,
        )
    }

    fn draw_current_conditions(
        &self,
        frame: &mut DisplayFrame,
        scale: Scale,
        snapshot: &Snapshot,
    ) -> Result<(), RenderError> {
        let weather = &snapshot.weather;

        label(frame, "CURRENT CONDITIONS", scale.point(Self::MARGIN, 86))?;
        draw_text(
            frame,
            &weather.condition,
            scale.point(Self::MARGIN, 108),
            TextSize::Large,
            VerticalPosition::Top,
            HorizontalAlignment::Left,
            INK,
        )?;
        draw_text(
            frame,
            format!("{}  {}", weather.current_temp, weather.precipitation).trim(),
            scale.point(Self::MARGIN, 146),
            TextSize::Medium,
            VerticalPosition::Top,
            HorizontalAlignment::Left,
            INK,
        )?;

        Line::new(
            scale.point(Self::MARGIN, Self::BODY_DIVIDER),
            Point::new(
                scale.width as i32 - scale.x(Self::MARGIN),
                scale.y(Self::BODY_DIVIDER),
            ),
        )
        .into_styled(PrimitiveStyle::with_stroke(INK, 2))
        .draw(frame)?;

        Ok(())
    }

    fn draw_forecast(
        &self,
        frame: &mut DisplayFrame,
        scale: Scale,
        snapshot: &Snapshot,
    ) -> Result<(), RenderError> {
        label(frame, "3-DAY FORECAST", scale.point(Self::MARGIN, Self::LOWER_TOP))?;

        for (i, day) in snapshot.weather.forecast.iter().enumerate() {
            draw_text(
                frame,
                day,
                scale.point(
                    Self::MARGIN,
                    Self::FORECAST_TOP + Self::FORECAST_SPACING * i as i32,
                ),
                TextSize::Large,
                VerticalPosition::Top,
                HorizontalAlignment::Left,
                INK,
            )?;
        }

        Ok(())
    }

    fn draw_system_status(
        &self,
        frame: &mut DisplayFrame,
        scale: Scale,
        snapshot: &Snapshot,
    ) -> Result<(), RenderError> {
        Line::new(
            scale.point(Self::COLUMN_SPLIT, Self::LOWER_TOP),
            scale.point(Self::COLUMN_SPLIT, 450),
        )
        .into_styled(PrimitiveStyle::with_stroke(INK, 2))
        .draw(frame)?;

        let left = Self::COLUMN_SPLIT + Self::MARGIN;
        label(frame, "SYSTEM STATUS", scale.point(left, Self::LOWER_TOP))?;

        let lines = [
            format!("CPU: {}", snapshot.system.cpu_temp),
            format!("UP: {}", snapshot.system.uptime),
            format!("Interval: {}", self.interval.label()),
        ];
        for (i, line) in lines.iter().enumerate() {
            draw_text(
                frame,
                line,
                scale.point(left, Self::LOWER_TOP + Self::STATUS_SPACING * (i as i32 + 1)),
                TextSize::Medium,
                VerticalPosition::Top,
                HorizontalAlignment::Left,
                INK,
            )?;
        }

        Ok(())
    }
}

fn label(frame: &mut DisplayFrame, text: &str, position: Point) -> Result<(), RenderError> {
    draw_text(
        frame,
        text,
        position,
        TextSize::Small,
        VerticalPosition::Top,
        HorizontalAlignment::Left,
        INK,
    )
}

fn draw_text(
    frame: &mut DisplayFrame,
    text: &str,
    position: Point,
    size: TextSize,
    vertical: VerticalPosition,
    horizontal: HorizontalAlignment,
    color: BinaryColor,
) -> Result<(), RenderError> {
    if text.is_empty() {
        return Ok(());
    }

    size.renderer()
        .render_aligned(
            text,
            position,
            vertical,
            horizontal,
            FontColor::Transparent(color),
            frame,
        )
        .map(|_| ())
        .map_err(|e| RenderError::Text(format!("{:?}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::SystemSnapshot;
    use crate::weather::WeatherSnapshot;
    use embedded_graphics::primitives::PointsIter;
    use time::macros::datetime;

    fn snapshot() -> Snapshot {
        Snapshot {
            weather: WeatherSnapshot {
                condition: "Partly cloudy".into(),
                current_temp: "+54°F".into(),
                precipitation: "0.0in".into(),
                forecast: [
                    "Fri: +60°F/+41°F".into(),
                    "Sat: +58°F/+40°F".into(),
                    "Sun: +61°F/+45°F".into(),
                ],
                location_label: "Rochester, NY".into(),
            },
            system: SystemSnapshot {
                cpu_temp: "48.3°C".into(),
                uptime: "3d 4h 4m".into(),
            },
            taken_at: datetime!(2024-03-15 14:05 UTC),
        }
    }

    fn reference_size() -> Size {
        Size::new(Renderer::REFERENCE_WIDTH, Renderer::REFERENCE_HEIGHT)
    }

    fn ink_in(frame: &DisplayFrame, area: Rectangle) -> usize {
        area.points()
            .filter(|p| frame.is_ink(p.x as u32, p.y as u32))
            .count()
    }

    #[test]
    fn same_inputs_produce_identical_frames() {
        let renderer = Renderer::new(RefreshInterval::FiveMinutes);

        let first = renderer.render(&snapshot(), reference_size()).unwrap();
        let second = renderer.render(&snapshot(), reference_size()).unwrap();

        assert_eq!(first.as_bytes(), second.as_bytes());
        assert_eq!(648, first.width());
        assert_eq!(480, first.height());
    }

    #[test]
    fn header_band_is_inked_with_paper_text() {
        let frame = Renderer::new(RefreshInterval::FiveMinutes)
            .render(&snapshot(), reference_size())
            .unwrap();

        // Corners of the band are solid ink, the clock digits knock out paper.
        assert!(frame.is_ink(2, 2));
        assert!(frame.is_ink(645, 69));
        assert!(!frame.is_ink(2, 75));
        let band = Rectangle::new(Point::zero(), Size::new(648, 72));
        assert!(ink_in(&frame, band) < 648 * 72);

        let clock = Rectangle::new(Point::new(20, 0), Size::new(160, 72));
        assert!(ink_in(&frame, clock) < 160 * 72);
    }

    #[test]
    fn dividers_separate_the_body() {
        let frame = Renderer::new(RefreshInterval::FiveMinutes)
            .render(&snapshot(), reference_size())
            .unwrap();

        assert!((181..=183).any(|y| frame.is_ink(300, y)));
        assert!((399..=401).any(|x| frame.is_ink(x, 300)));
        assert!(!frame.is_ink(5, 300));
    }

    #[test]
    fn content_changes_the_matching_region_only() {
        let renderer = Renderer::new(RefreshInterval::FiveMinutes);
        let mut changed = snapshot();
        changed.system.cpu_temp = "71.9°C".into();

        let before = renderer.render(&snapshot(), reference_size()).unwrap();
        let after = renderer.render(&changed, reference_size()).unwrap();
        assert_ne!(before.as_bytes(), after.as_bytes());

        let forecast = Rectangle::new(Point::new(0, 190), Size::new(395, 290));
        assert_eq!(ink_in(&before, forecast), ink_in(&after, forecast));
    }

    #[test]
    fn interval_label_is_drawn() {
        let five = Renderer::new(RefreshInterval::FiveMinutes)
            .render(&snapshot(), reference_size())
            .unwrap();
        let fifteen = Renderer::new(RefreshInterval::FifteenMinutes)
            .render(&snapshot(), reference_size())
            .unwrap();

        assert_ne!(five.as_bytes(), fifteen.as_bytes());
    }

    #[test]
    fn offline_snapshot_renders() {
        let mut offline = snapshot();
        offline.weather = WeatherSnapshot::offline();

        let frame = Renderer::new(RefreshInterval::FiveMinutes)
            .render(&offline, reference_size())
            .unwrap();

        let conditions = Rectangle::new(Point::new(20, 108), Size::new(370, 30));
        assert!(ink_in(&frame, conditions) > 0);
    }

    #[test]
    fn overflowing_text_is_clipped_not_wrapped() {
        let mut long = snapshot();
        long.weather.condition = "Thunderstorm with heavy rain and hail and more ".repeat(4);

        let frame = Renderer::new(RefreshInterval::FiveMinutes)
            .render(&long, reference_size())
            .unwrap();

        assert_eq!(81 * 480, frame.as_bytes().len());
        // Nothing spills onto the line below the condition text.
        let below = Rectangle::new(Point::new(300, 146), Size::new(348, 30));
        let baseline = Renderer::new(RefreshInterval::FiveMinutes)
            .render(&snapshot(), reference_size())
            .unwrap();
        assert_eq!(ink_in(&baseline, below), ink_in(&frame, below));
    }

    #[test]
    fn layout_scales_to_smaller_targets() {
        let frame = Renderer::new(RefreshInterval::FiveMinutes)
            .render(&snapshot(), Size::new(324, 240))
            .unwrap();

        assert_eq!(324, frame.width());
        assert_eq!(240, frame.height());
        assert!(frame.is_ink(1, 1));
        assert!(frame.is_ink(1, 35));
        assert!(!frame.is_ink(1, 37));
    }
}
