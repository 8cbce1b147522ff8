//! TOML scenario file parsing

use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Complete scenario definition from a TOML file
#[derive(Debug, Deserialize)]
pub struct TestDefinition {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub setup: TestSetup,
    #[serde(default)]
    pub input: Vec<FrameInput>,
    #[serde(default)]
    pub expect: TestExpectations,
}

/// Scenario setup
#[derive(Debug, Default, Deserialize)]
pub struct TestSetup {
    /// Placement seed; scenarios should always set one
    pub seed: Option<u64>,
    /// Recording time limit in seconds
    pub time_limit: Option<f32>,
    pub target: Option<String>,
    /// Run at least this many frames
    pub frames: Option<u64>,
    /// Episodes present in the store before the first tick
    #[serde(default)]
    pub episodes: Vec<SeedEpisode>,
}

/// A synthetic episode: the agent holds `actions` from the spawn pose
#[derive(Debug, Clone, Deserialize)]
pub struct SeedEpisode {
    pub key: String,
    pub frames: u64,
    #[serde(default)]
    pub actions: Vec<String>,
}

/// Input changes at a specific frame
///
/// `hold` replaces the held action set and persists until the next `hold`;
/// `commands` and `contacts` fire on this frame only.
#[derive(Debug, Clone, Deserialize)]
pub struct FrameInput {
    pub frame: u64,
    pub hold: Option<Vec<String>>,
    #[serde(default)]
    pub commands: Vec<String>,
    #[serde(default)]
    pub contacts: Vec<String>,
}

/// Expected outcomes
#[derive(Debug, Default, Deserialize)]
pub struct TestExpectations {
    /// `manual`, `collision`, `trigger_action` or `time_expired`
    pub stop_reason: Option<String>,
    /// Bounds on the recorded frame count when the run ends
    pub frames_min: Option<usize>,
    pub frames_max: Option<usize>,
    /// Key prefixes that must be listed by the store when the run ends
    #[serde(default)]
    pub saved: Vec<String>,
    #[serde(default)]
    pub sequence: Vec<ExpectedEvent>,
    /// Multiple state assertions at different frames (`[[expect.state]]`)
    #[serde(default)]
    pub state: Vec<StateAssertion>,
}

/// Expected state transition, e.g. `recorder_stopped` or `player_complete`
#[derive(Debug, Deserialize)]
pub struct ExpectedEvent {
    pub event: String,
    pub frame_min: Option<u64>,
    pub frame_max: Option<u64>,
}

/// State assertion after a given frame
#[derive(Debug, Clone, Deserialize)]
pub struct StateAssertion {
    pub after_frame: u64,
    #[serde(default)]
    pub checks: Vec<String>,
}

/// Parse a scenario file from path
pub fn parse_test_file(path: &Path) -> Result<TestDefinition, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;

    toml::from_str(&content).map_err(|e| format!("Failed to parse {}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let toml = r#"
name = "Drive"
[setup]
seed = 7

[[setup.episodes]]
key = "hall.json"
frames = 30
actions = ["w"]

[[input]]
frame = 1
commands = ["start"]
hold = ["w"]

[[input]]
frame = 40
commands = ["save:drive"]

[expect]
stop_reason = "manual"
saved = ["drive"]

[[expect.sequence]]
event = "recorder_recording"
frame_max = 2

[[expect.state]]
after_frame = 45
checks = ["agent.x > 7"]
"#;
        let def: TestDefinition = toml::from_str(toml).unwrap();
        assert_eq!(def.name, "Drive");
        assert_eq!(def.setup.seed, Some(7));
        assert_eq!(def.setup.episodes[0].frames, 30);
        assert_eq!(def.input.len(), 2);
        assert_eq!(def.input[0].hold.as_deref(), Some(&["w".to_string()][..]));
        assert!(def.input[1].hold.is_none());
        assert_eq!(def.expect.stop_reason.as_deref(), Some("manual"));
        assert_eq!(def.expect.state[0].checks.len(), 1);
    }

    #[test]
    fn test_minimal_file() {
        let def: TestDefinition = toml::from_str(r#"name = "Idle""#).unwrap();
        assert!(def.input.is_empty());
        assert!(def.expect.sequence.is_empty());
    }
}
