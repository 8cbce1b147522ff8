//! Scripted input injection for scenarios

use bevy::prelude::*;
use std::collections::{BTreeSet, HashMap};

use crate::events::{Command, SimEvent, SimEventQueue};
use crate::input::ActionInput;
use crate::playback::SourceMode;

use super::parser::FrameInput;

/// Resource holding the scripted inputs for a run
#[derive(Resource, Debug, Default)]
pub struct ScriptedInputs {
    /// Map of frame -> input changes
    pub frames: HashMap<u64, FrameInput>,
    /// Held actions (persist between frames)
    pub held: BTreeSet<String>,
    pub current_frame: u64,
    pub max_frame: u64,
}

/// What the script does on one frame
#[derive(Debug, Default)]
pub struct FrameActions {
    pub held: BTreeSet<String>,
    pub commands: Vec<Command>,
    pub contacts: Vec<String>,
}

/// Parse a script command: `start`, `stop`, `save:<name>`, `abandon`,
/// `select:<key>`, `live:<key>`, `play`, `cancel`, `ack`, `pause`, `step`,
/// `faster`, `slower`, `reset`, `refresh`
pub fn parse_command(text: &str) -> Result<Command, String> {
    let (verb, arg) = match text.split_once(':') {
        Some((verb, arg)) => (verb.trim(), Some(arg.trim())),
        None => (text.trim(), None),
    };
    let needs_arg = |what: &str| {
        arg.filter(|a| !a.is_empty())
            .map(str::to_string)
            .ok_or_else(|| format!("'{}' needs {}", verb, what))
    };
    Ok(match verb {
        "start" => Command::StartRecording,
        "stop" => Command::StopRecording,
        "save" => Command::SaveRecording {
            name: needs_arg("a name")?,
        },
        "abandon" => Command::AbandonRecording,
        "select" => Command::SelectEpisode {
            key: needs_arg("an episode key")?,
            mode: SourceMode::Stored,
        },
        "live" => Command::SelectEpisode {
            key: needs_arg("an episode key")?,
            mode: SourceMode::Live,
        },
        "play" => Command::Play,
        "cancel" => Command::CancelPlayback,
        "ack" => Command::AcknowledgePlayback,
        "pause" => Command::TogglePause,
        "step" => Command::StepForward,
        "faster" => Command::SpeedUp,
        "slower" => Command::SpeedDown,
        "reset" => Command::ResetScene,
        "refresh" => Command::RefreshEpisodeList,
        other => return Err(format!("Unknown command '{}'", other)),
    })
}

impl ScriptedInputs {
    /// Create from parsed frame inputs, rejecting unknown commands up front
    pub fn from_inputs(inputs: &[FrameInput]) -> Result<Self, String> {
        let mut frames = HashMap::new();
        let mut max_frame = 0u64;

        for fi in inputs {
            for command in &fi.commands {
                parse_command(command).map_err(|e| format!("frame {}: {}", fi.frame, e))?;
            }
            max_frame = max_frame.max(fi.frame);
            frames.insert(fi.frame, fi.clone());
        }

        Ok(Self {
            frames,
            held: BTreeSet::new(),
            current_frame: 0,
            max_frame,
        })
    }

    pub fn set_max_frame(&mut self, frame: u64) {
        self.max_frame = self.max_frame.max(frame);
    }

    /// Advance to the next frame and return what to inject
    pub fn advance_frame(&mut self) -> FrameActions {
        let mut actions = FrameActions::default();
        if let Some(input) = self.frames.get(&self.current_frame) {
            if let Some(hold) = &input.hold {
                self.held = hold.iter().cloned().collect();
            }
            actions.commands = input
                .commands
                .iter()
                .filter_map(|c| parse_command(c).ok())
                .collect();
            actions.contacts = input.contacts.clone();
        }
        actions.held = self.held.clone();
        self.current_frame += 1;
        actions
    }

    pub fn should_continue(&self) -> bool {
        self.current_frame <= self.max_frame
    }
}

/// Feed this frame's script into the action input and the event queue
pub fn inject_script(
    mut script: ResMut<ScriptedInputs>,
    mut input: ResMut<ActionInput>,
    mut queue: ResMut<SimEventQueue>,
) {
    let frame = script.advance_frame();
    input.manual = frame.held;
    for command in frame.commands {
        queue.command(command);
    }
    for collider in frame.contacts {
        queue.emit(SimEvent::Contact { collider });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(frame: u64, hold: Option<&[&str]>, commands: &[&str]) -> FrameInput {
        FrameInput {
            frame,
            hold: hold.map(|h| h.iter().map(|s| s.to_string()).collect()),
            commands: commands.iter().map(|s| s.to_string()).collect(),
            contacts: Vec::new(),
        }
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("start").unwrap(), Command::StartRecording);
        assert_eq!(
            parse_command("save: run").unwrap(),
            Command::SaveRecording { name: "run".into() }
        );
        assert_eq!(
            parse_command("live:a.json").unwrap(),
            Command::SelectEpisode {
                key: "a.json".into(),
                mode: SourceMode::Live
            }
        );
        assert!(parse_command("save").is_err());
        assert!(parse_command("jump").is_err());
    }

    #[test]
    fn test_held_actions_persist() {
        let mut script = ScriptedInputs::from_inputs(&[
            input(1, Some(&["w"]), &["start"]),
            input(3, Some(&[]), &[]),
        ])
        .unwrap();
        assert!(script.advance_frame().held.is_empty());
        let frame1 = script.advance_frame();
        assert!(frame1.held.contains("w"));
        assert_eq!(frame1.commands, vec![Command::StartRecording]);
        let frame2 = script.advance_frame();
        assert!(frame2.held.contains("w"));
        assert!(frame2.commands.is_empty());
        assert!(script.advance_frame().held.is_empty());
        assert!(!script.should_continue());
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        let result = ScriptedInputs::from_inputs(&[input(5, None, &["fly"])]);
        assert!(result.unwrap_err().contains("frame 5"));
    }
}
