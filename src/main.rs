use anyhow::Context;

use paperboard::config::{Config, Output};
use paperboard::display::{HardwarePanel, PreviewSink};
use paperboard::{DataSource, Renderer, Scheduler};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env().context("invalid configuration")?;
    log::info!(
        "E-Paper Dashboard started ({:?} output, {:?}, every {})",
        config.output,
        config.run_mode,
        config.interval.label()
    );

    let source = DataSource::new(&config).context("unable to create HTTP client")?;
    let renderer = Renderer::new(config.interval);
    let interval = config.interval.duration();

    let report = match config.output {
        Output::Hardware => {
            Scheduler::new(
                source,
                renderer,
                HardwarePanel::epd5in83_v2(),
                config.run_mode,
                interval,
            )
            .run()
            .await
        }
        Output::Preview => {
            Scheduler::new(
                source,
                renderer,
                PreviewSink::from_config(&config),
                config.run_mode,
                interval,
            )
            .run()
            .await
        }
    };

    log::info!(
        "Finished after {} cycle(s), {} failed",
        report.cycles(),
        report.failed
    );
    Ok(())
}
