pub mod notice;
pub mod relay;
pub mod report;
pub mod session;
pub mod telemetry;

#[cfg(test)]
mod testing;
