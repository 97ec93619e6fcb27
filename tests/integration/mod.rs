//! Integration tests for chart-release

mod helpers;
mod test_cli;
mod test_release;
