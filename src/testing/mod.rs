//! Scenario testing for deterministic simulator runs
//!
//! Scripted operator input and contacts are fed to a headless app; the
//! recorder and player outcomes are checked against TOML expectations.

pub mod assertions;
pub mod input;
pub mod parser;
pub mod runner;

pub use assertions::{AssertionError, CapturedEvent, WorldState, check_sequence, check_state};
pub use input::{ScriptedInputs, inject_script, parse_command};
pub use parser::{
    ExpectedEvent, FrameInput, SeedEpisode, StateAssertion, TestDefinition, TestExpectations,
    TestSetup,
};
pub use runner::{TestResult, run_test};

/// Default path for scenario files
pub const SCENARIOS_DIR: &str = "tests/scenarios";
