mod meter;
pub use meter::{EmptyMeterNumber, MeterIdentity};

mod relaystate;
pub use relaystate::{RelayState, UnknownRelayStateLiteral};

// Telemetry readings
//
pub mod telemetry;
pub use telemetry::{MeterReading, PowerSnapshot, ReportEntry};

// Request and response bodies
//
pub mod payload;

pub mod lenient;
pub mod timestamp;
