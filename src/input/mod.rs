//! Input module - ActionInput resource and the keyboard capture system
//!
//! Manual key presses and playback's synthetic actions both land in
//! [`ActionInput`]; [`ControlAuthority`] decides which one drives the agent.

use bevy::prelude::*;
use std::collections::BTreeSet;

use crate::events::{Command, SimEventQueue};
use crate::settings::SimSettings;

/// Who currently drives the agent
#[derive(Resource, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlAuthority {
    #[default]
    Manual,
    Playback,
}

/// Active action symbols for this tick
#[derive(Resource, Debug, Clone, Default)]
pub struct ActionInput {
    /// Held by the operator (keyboard or script)
    pub manual: BTreeSet<String>,
    /// Injected by playback; None when playback is not driving
    pub synthetic: Option<BTreeSet<String>>,
}

impl ActionInput {
    /// The action set the agent and sampler should see
    pub fn effective(&self, authority: ControlAuthority) -> BTreeSet<String> {
        match authority {
            ControlAuthority::Manual => self.manual.clone(),
            ControlAuthority::Playback => self.synthetic.clone().unwrap_or_default(),
        }
    }

    pub fn set_synthetic(&mut self, actions: BTreeSet<String>) {
        self.synthetic = Some(actions);
    }

    pub fn clear_synthetic(&mut self) {
        self.synthetic = None;
    }

    /// Scene reset: nothing held, nothing injected
    pub fn clear(&mut self) {
        self.manual.clear();
        self.synthetic = None;
    }
}

/// Action symbol to key mapping
#[derive(Resource, Debug, Clone)]
pub struct KeyBindings {
    pub actions: Vec<(String, KeyCode)>,
}

impl KeyBindings {
    pub fn from_settings(settings: &SimSettings) -> Self {
        let mut actions = Vec::new();
        for (symbol, key) in &settings.key_bindings {
            match parse_key_code(key) {
                Some(code) => actions.push((symbol.clone(), code)),
                None => warn!("Unknown key '{}' bound to action '{}'", key, symbol),
            }
        }
        Self { actions }
    }
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self::from_settings(&SimSettings::default())
    }
}

/// Operator command keys
const COMMAND_KEYS: [(KeyCode, Command); 10] = [
    (KeyCode::KeyR, Command::StartRecording),
    (KeyCode::KeyT, Command::StopRecording),
    (KeyCode::KeyP, Command::Play),
    (KeyCode::Escape, Command::CancelPlayback),
    (KeyCode::Space, Command::TogglePause),
    (KeyCode::Period, Command::StepForward),
    (KeyCode::Equal, Command::SpeedUp),
    (KeyCode::Minus, Command::SpeedDown),
    (KeyCode::Backspace, Command::ResetScene),
    (KeyCode::KeyL, Command::RefreshEpisodeList),
];

/// Name under which quick-saves from the keyboard are stored
pub const QUICK_SAVE_NAME: &str = "episode";

/// Parse key names as written in the settings file
pub fn parse_key_code(name: &str) -> Option<KeyCode> {
    let code = match name {
        "KeyA" => KeyCode::KeyA,
        "KeyB" => KeyCode::KeyB,
        "KeyC" => KeyCode::KeyC,
        "KeyD" => KeyCode::KeyD,
        "KeyE" => KeyCode::KeyE,
        "KeyF" => KeyCode::KeyF,
        "KeyG" => KeyCode::KeyG,
        "KeyH" => KeyCode::KeyH,
        "KeyI" => KeyCode::KeyI,
        "KeyJ" => KeyCode::KeyJ,
        "KeyK" => KeyCode::KeyK,
        "KeyM" => KeyCode::KeyM,
        "KeyN" => KeyCode::KeyN,
        "KeyO" => KeyCode::KeyO,
        "KeyQ" => KeyCode::KeyQ,
        "KeyS" => KeyCode::KeyS,
        "KeyU" => KeyCode::KeyU,
        "KeyV" => KeyCode::KeyV,
        "KeyW" => KeyCode::KeyW,
        "KeyX" => KeyCode::KeyX,
        "KeyY" => KeyCode::KeyY,
        "KeyZ" => KeyCode::KeyZ,
        "ArrowUp" => KeyCode::ArrowUp,
        "ArrowDown" => KeyCode::ArrowDown,
        "ArrowLeft" => KeyCode::ArrowLeft,
        "ArrowRight" => KeyCode::ArrowRight,
        "ShiftLeft" => KeyCode::ShiftLeft,
        "ControlLeft" => KeyCode::ControlLeft,
        _ => return None,
    };
    Some(code)
}

/// Runs in Update: held action keys go to ActionInput, command keys become
/// queued commands. Manual actions are dropped while playback has control.
pub fn capture_input(
    keyboard: Res<ButtonInput<KeyCode>>,
    bindings: Res<KeyBindings>,
    authority: Res<ControlAuthority>,
    mut input: ResMut<ActionInput>,
    mut queue: ResMut<SimEventQueue>,
) {
    input.manual.clear();
    if *authority == ControlAuthority::Manual {
        for (symbol, code) in &bindings.actions {
            if keyboard.pressed(*code) {
                input.manual.insert(symbol.clone());
            }
        }
    }

    for (code, command) in COMMAND_KEYS.iter() {
        if keyboard.just_pressed(*code) {
            queue.command(command.clone());
        }
    }
    if keyboard.just_pressed(KeyCode::Enter) {
        queue.command(Command::SaveRecording {
            name: QUICK_SAVE_NAME.to_string(),
        });
    }
    if keyboard.just_pressed(KeyCode::Delete) {
        queue.command(Command::AbandonRecording);
    }
    if keyboard.just_pressed(KeyCode::Backquote) {
        queue.command(Command::AcknowledgePlayback);
    }
}
