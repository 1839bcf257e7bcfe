//! Build events and their correlation into compiler calls.

pub mod command_line;
pub mod correlator;
pub mod model;

pub use command_line::{split_compiler_command_line, tokenize, SplitCommandLine};
pub use correlator::{correlate, correlate_log, CorrelationResult, EventCorrelator};
pub use model::{write_event_log, BuildEvent, EventLogReader};
