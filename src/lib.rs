pub mod config;
pub mod display;
pub mod frame;
pub mod render;
pub mod scheduler;
pub mod source;
pub mod system;
pub mod weather;

pub use config::Config;
pub use display::{Display, HardwarePanel, PreviewSink};
pub use frame::DisplayFrame;
pub use render::Renderer;
pub use scheduler::{RunMode, Scheduler};
pub use source::{DataSource, Snapshot, SnapshotSource};
