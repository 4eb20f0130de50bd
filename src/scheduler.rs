use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::display::{DeviceHandle, Display, DisplayError, PanelState};
use crate::render::{RenderError, Renderer};
use crate::source::SnapshotSource;

/// Whether the scheduler keeps going after the first refresh.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RunMode {
    Repeating,
    SingleShot,
}

impl FromStr for RunMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "repeating" | "loop" => Ok(Self::Repeating),
            "single-shot" | "single" | "once" => Ok(Self::SingleShot),
            _ => Err(()),
        }
    }
}

/// Anything that ends a refresh early. Never fatal: the next cycle starts from scratch.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("display failure: {0}")]
    Display(#[from] DisplayError),

    #[error("render failure: {0}")]
    Render(#[from] RenderError),
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RunReport {
    pub succeeded: u64,
    pub failed: u64,
}

impl RunReport {
    pub fn cycles(&self) -> u64 {
        self.succeeded + self.failed
    }
}

pub struct Scheduler<S: SnapshotSource, D: Display> {
    source: S,
    renderer: Renderer,
    display: D,
    mode: RunMode,
    interval: Duration,
}

impl<S: SnapshotSource, D: Display> Scheduler<S, D> {
    pub fn new(
        source: S,
        renderer: Renderer,
        display: D,
        mode: RunMode,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            renderer,
            display,
            mode,
            interval,
        }
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    /// Refresh according to the run mode. In repeating mode this only returns if the
    /// process is stopped.
    pub async fn run(&mut self) -> RunReport {
        self.run_cycles(None).await
    }

    /// Like [`run`](Self::run), but a repeating run stops after `limit` cycles.
    pub async fn run_cycles(&mut self, limit: Option<u64>) -> RunReport {
        let mut report = RunReport::default();

        loop {
            log::info!("Starting refresh cycle {}", report.cycles() + 1);
            match self.run_cycle().await {
                Ok(state) => {
                    report.succeeded += 1;
                    log::info!("Cycle complete, display is {:?}", state);
                }
                Err(e) => {
                    report.failed += 1;
                    log::error!("Display update failed: {}", e);
                }
            }

            if self.mode == RunMode::SingleShot || limit.is_some_and(|l| report.cycles() >= l) {
                return report;
            }

            log::info!("Sleeping for {} seconds...", self.interval.as_secs());
            tokio::time::sleep(self.interval).await;
        }
    }

    /// One refresh: gather data, wake the display, draw, commit, and put it back to rest.
    pub async fn run_cycle(&mut self) -> Result<PanelState, CycleError> {
        let snapshot = self.source.snapshot().await;

        let mut handle = DeviceHandle::acquire(&mut self.display)?;
        let frame = self.renderer.render(&snapshot, handle.dimensions())?;
        handle.commit(&frame)?;

        Ok(handle.release()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::env;
    use std::process;

    use embedded_graphics::prelude::Size;
    use time::macros::datetime;
    use tokio::time::Instant;

    use crate::config::RefreshInterval;
    use crate::display::tests::Recorder;
    use crate::display::{HardwarePanel, PanelDriver, PreviewSink};
    use crate::source::Snapshot;
    use crate::system::SystemSnapshot;
    use crate::weather::WeatherSnapshot;

    #[derive(Default)]
    struct FixedSource {
        calls: Cell<u64>,
    }

    impl SnapshotSource for FixedSource {
        async fn snapshot(&self) -> Snapshot {
            self.calls.set(self.calls.get() + 1);
            Snapshot {
                weather: WeatherSnapshot::offline(),
                system: SystemSnapshot {
                    cpu_temp: "45.0°C".into(),
                    uptime: "0d 1h 0m".into(),
                },
                taken_at: datetime!(2024-03-15 14:05 UTC),
            }
        }
    }

    /// Fails to transmit on the listed cycles (counted from 1).
    #[derive(Default)]
    struct FlakyDriver {
        failing_cycles: Vec<u64>,
        cycle: u64,
        shown: Vec<u64>,
        sleeps: u64,
    }

    impl PanelDriver for FlakyDriver {
        fn init(&mut self) -> Result<(u32, u32), DisplayError> {
            self.cycle += 1;
            Ok((648, 480))
        }

        fn display(&mut self, buffer: &[u8]) -> Result<(), DisplayError> {
            assert_eq!(81 * 480, buffer.len());
            if self.failing_cycles.contains(&self.cycle) {
                return Err(DisplayError::Driver("busy line stuck".into()));
            }
            self.shown.push(self.cycle);
            Ok(())
        }

        fn sleep(&mut self) -> Result<(), DisplayError> {
            self.sleeps += 1;
            Ok(())
        }
    }

    fn scheduler<D: Display>(display: D, mode: RunMode) -> Scheduler<FixedSource, D> {
        Scheduler::new(
            FixedSource::default(),
            Renderer::new(RefreshInterval::FiveMinutes),
            display,
            mode,
            RefreshInterval::FiveMinutes.duration(),
        )
    }

    fn panel(failing_cycles: Vec<u64>) -> Recorder<HardwarePanel<FlakyDriver>> {
        Recorder::new(HardwarePanel::new(
            FlakyDriver {
                failing_cycles,
                ..FlakyDriver::default()
            },
            Size::new(648, 480),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn failed_cycle_does_not_stop_the_next_one() {
        let mut scheduler = scheduler(panel(vec![2]), RunMode::Repeating);
        let start = Instant::now();

        let report = scheduler.run_cycles(Some(4)).await;

        assert_eq!(
            RunReport {
                succeeded: 3,
                failed: 1,
            },
            report
        );
        let driver = scheduler.display().inner.driver();
        assert_eq!(vec![1, 3, 4], driver.shown);
        // The failed cycle still put the panel to sleep.
        assert_eq!(4, driver.sleeps);
        assert_eq!(4, scheduler.source.calls.get());
        assert_eq!(PanelState::LowPower, scheduler.display().state());
        assert!(start.elapsed() >= Duration::from_secs(3 * 300));
    }

    #[tokio::test(start_paused = true)]
    async fn every_cycle_follows_the_panel_lifecycle() {
        let mut scheduler = scheduler(panel(vec![]), RunMode::Repeating);

        scheduler.run_cycles(Some(3)).await;

        let mut expected = vec![PanelState::Uninitialized];
        for _ in 0..3 {
            expected.extend([
                PanelState::Initialized,
                PanelState::Committed,
                PanelState::LowPower,
            ]);
        }
        assert_eq!(expected, scheduler.display().states);
    }

    #[tokio::test(start_paused = true)]
    async fn aborted_cycle_goes_straight_back_to_low_power() {
        let mut scheduler = scheduler(panel(vec![1]), RunMode::Repeating);

        scheduler.run_cycles(Some(2)).await;

        assert_eq!(
            vec![
                PanelState::Uninitialized,
                PanelState::Initialized,
                PanelState::LowPower,
                PanelState::Initialized,
                PanelState::Committed,
                PanelState::LowPower,
            ],
            scheduler.display().states
        );
    }

    #[tokio::test(start_paused = true)]
    async fn single_shot_runs_once_even_on_failure() {
        let mut scheduler = scheduler(panel(vec![1]), RunMode::SingleShot);
        let start = Instant::now();

        let report = scheduler.run().await;

        assert_eq!(
            RunReport {
                succeeded: 0,
                failed: 1,
            },
            report
        );
        assert_eq!(1, scheduler.source.calls.get());
        assert_eq!(Duration::ZERO, start.elapsed());
    }

    #[tokio::test(start_paused = true)]
    async fn single_shot_preview_terminates() {
        let path = env::temp_dir().join(format!("paperboard-{}-scheduler.png", process::id()));
        let mut scheduler = scheduler(PreviewSink::new(&path, None), RunMode::SingleShot);

        let report = scheduler.run().await;

        assert_eq!(1, report.succeeded);
        assert_eq!(PanelState::Terminated, scheduler.display().state());
        assert!(path.exists());
    }

    #[test]
    fn run_mode_names() {
        assert_eq!(Ok(RunMode::SingleShot), "single-shot".parse::<RunMode>());
        assert_eq!(Ok(RunMode::Repeating), "repeating".parse::<RunMode>());
        assert!("sometimes".parse::<RunMode>().is_err());
    }
}
