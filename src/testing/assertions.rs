//! Assertion checking for scenario expectations

use super::parser::{ExpectedEvent, StateAssertion};

/// Error when an assertion fails
#[derive(Debug, Clone)]
pub struct AssertionError {
    pub message: String,
    pub expected: String,
    pub actual: String,
}

impl std::fmt::Display for AssertionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}\n    Expected: {}\n    Actual: {}",
            self.message, self.expected, self.actual
        )
    }
}

/// A recorder or player state change, with the frame it was seen on
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub frame: u64,
    pub event_type: String,
}

/// Check captured transitions contain the expected ones, in order
pub fn check_sequence(
    expected: &[ExpectedEvent],
    captured: &[CapturedEvent],
) -> Result<(), AssertionError> {
    let mut captured_idx = 0;

    for (i, exp) in expected.iter().enumerate() {
        let found = captured[captured_idx..]
            .iter()
            .enumerate()
            .find(|(_, cap)| cap.event_type == exp.event);

        let Some((offset, cap)) = found else {
            return Err(AssertionError {
                message: format!("Event #{} '{}' not found", i + 1, exp.event),
                expected: format!("'{}' event in sequence", exp.event),
                actual: format!(
                    "events after position {}: {:?}",
                    captured_idx,
                    captured[captured_idx..]
                        .iter()
                        .map(|e| &e.event_type)
                        .collect::<Vec<_>>()
                ),
            });
        };

        if let Some(min) = exp.frame_min
            && cap.frame < min
        {
            return Err(AssertionError {
                message: format!("Event #{} '{}' occurred too early", i + 1, exp.event),
                expected: format!("frame >= {}", min),
                actual: format!("frame {}", cap.frame),
            });
        }
        if let Some(max) = exp.frame_max
            && cap.frame > max
        {
            return Err(AssertionError {
                message: format!("Event #{} '{}' occurred too late", i + 1, exp.event),
                expected: format!("frame <= {}", max),
                actual: format!("frame {}", cap.frame),
            });
        }
        captured_idx += offset + 1;
    }

    Ok(())
}

/// Simulator state for assertions
#[derive(Debug, Clone, Default)]
pub struct WorldState {
    pub agent: [f32; 3],
    pub agent_yaw: f32,
    pub recorder_state: String,
    pub recorded_frames: usize,
    pub stop_reason: Option<String>,
    pub player_state: String,
    pub player_frame: u64,
    pub objects: usize,
    pub episodes: usize,
}

/// Parse a check string into (path, operator, value)
fn parse_check(check: &str) -> Option<(&str, &str, &str)> {
    // Try operators in order of specificity (>= before >, etc.)
    for op in &[">=", "<=", "!=", "=", ">", "<"] {
        if let Some(idx) = check.find(op) {
            let path = check[..idx].trim();
            let value = check[idx + op.len()..].trim();
            return Some((path, op, value));
        }
    }
    None
}

/// Check state assertions against the simulator state
///
/// Paths: `agent.x|y|z|yaw`, `recorder.state|frames|stop_reason`,
/// `player.state|frame`, `scene.objects`, `store.episodes`.
pub fn check_state(assertion: &StateAssertion, state: &WorldState) -> Result<(), AssertionError> {
    for check in &assertion.checks {
        let (path, operator, expected_value) = parse_check(check).ok_or_else(|| AssertionError {
            message: format!("Invalid check syntax: {}", check),
            expected: "format: 'scope.property = value' or 'scope.property > value'".to_string(),
            actual: check.clone(),
        })?;

        match path {
            "agent.x" => check_float_comparison(path, state.agent[0], operator, expected_value)?,
            "agent.y" => check_float_comparison(path, state.agent[1], operator, expected_value)?,
            "agent.z" => check_float_comparison(path, state.agent[2], operator, expected_value)?,
            "agent.yaw" => check_float_comparison(path, state.agent_yaw, operator, expected_value)?,
            "recorder.frames" => check_float_comparison(
                path,
                state.recorded_frames as f32,
                operator,
                expected_value,
            )?,
            "player.frame" => check_float_comparison(
                path,
                state.player_frame as f32,
                operator,
                expected_value,
            )?,
            "scene.objects" => {
                check_float_comparison(path, state.objects as f32, operator, expected_value)?
            }
            "store.episodes" => {
                check_float_comparison(path, state.episodes as f32, operator, expected_value)?
            }
            "recorder.state" => {
                check_text(check, &state.recorder_state, operator, expected_value)?
            }
            "recorder.stop_reason" => check_text(
                check,
                state.stop_reason.as_deref().unwrap_or("none"),
                operator,
                expected_value,
            )?,
            "player.state" => check_text(check, &state.player_state, operator, expected_value)?,
            _ => {
                return Err(AssertionError {
                    message: format!("Unknown check path: {}", path),
                    expected: "agent.*, recorder.*, player.*, scene.objects, store.episodes"
                        .to_string(),
                    actual: path.to_string(),
                });
            }
        }
    }

    Ok(())
}

fn check_text(
    check: &str,
    actual: &str,
    operator: &str,
    expected_str: &str,
) -> Result<(), AssertionError> {
    let expected = expected_str.trim_matches('"');
    let pass = match operator {
        "=" => actual == expected,
        "!=" => actual != expected,
        _ => {
            return Err(AssertionError {
                message: format!("Operator '{}' needs a number: {}", operator, check),
                expected: "= or !=".to_string(),
                actual: operator.to_string(),
            });
        }
    };
    if !pass {
        return Err(AssertionError {
            message: format!("Check failed: {}", check),
            expected: format!("{} {}", operator, expected),
            actual: actual.to_string(),
        });
    }
    Ok(())
}

/// Check float comparison with operator
fn check_float_comparison(
    path: &str,
    actual: f32,
    operator: &str,
    expected_str: &str,
) -> Result<(), AssertionError> {
    let value: f32 = expected_str.trim().parse().map_err(|_| AssertionError {
        message: format!("Invalid value for {}", path),
        expected: "number".to_string(),
        actual: expected_str.to_string(),
    })?;

    let pass = match operator {
        ">=" => actual >= value,
        "<=" => actual <= value,
        ">" => actual > value,
        "<" => actual < value,
        "=" => (actual - value).abs() < 0.1,
        "!=" => (actual - value).abs() >= 0.1,
        _ => false,
    };

    if !pass {
        return Err(AssertionError {
            message: format!(
                "Check failed: {} {} {} (actual: {:.2})",
                path, operator, expected_str, actual
            ),
            expected: format!("{} {} {}", path, operator, value),
            actual: format!("{:.2}", actual),
        });
    }

    Ok(())
}
