pub mod cloudwatch;
pub mod console;

pub use cloudwatch::{CloudWatchClient, CloudWatchPublisher, CloudWatchSettings};
pub use console::{ConsolePublisher, ConsoleSettings};
