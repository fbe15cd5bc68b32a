//! Table-specific database operations, one `impl Database` block per file.

pub mod telemetry;
