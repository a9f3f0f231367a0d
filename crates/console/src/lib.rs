//! Live detection console: live view, configuration reconciler and the
//! controller that ties them to the stream transport.

pub mod catalog;
pub mod config;
pub mod console;
pub mod live_view;
pub mod reconciler;

pub use console::{Console, ConsoleError, ConsoleOptions};
pub use reconciler::DetectionStatus;
