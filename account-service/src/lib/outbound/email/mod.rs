pub mod logging;

pub use logging::TracingEmailDispatcher;
