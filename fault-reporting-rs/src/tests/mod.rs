//! Scenario tests for the fault listener
//!
//! Unit tests live beside each module; these exercise the listener end to end
//! against mocked and buffered tracking clients.

pub mod scenario_tests;
