//! Unit tests for configuration loading and precedence.
//!
//! Tests are organised into modules by functional area:
//! - `helpers`: Shared test utilities
//! - `precedence`: Layer precedence tests
//! - `field_resolution`: API URL, token, and endpoint resolution tests
//! - `timing_loading`: Timeout and interval loading from env and CLI
//! - `validation`: Configuration consistency validation tests
//! - `fixture_settings`: Conversion into fixture settings

mod helpers;
mod precedence;
mod timing_loading;
