pub mod artifacts;
pub mod chat;
pub mod health;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod test_support;
