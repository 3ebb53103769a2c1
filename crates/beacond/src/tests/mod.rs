//! Unit tests for daemon bootstrap, the plugin catalogue, maintenance and telemetry.

mod support;
