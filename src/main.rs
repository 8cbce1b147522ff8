//! navsim - headless episode recorder and player
//!
//! Usage:
//!   navsim --record 10 --hold w --save hallway   # drive forward for 10s and save
//!   navsim --replay hallway_1718000000000.json   # replay a stored episode
//!   navsim --live hallway_1718000000000.json     # replay streamed by the backend
//!   navsim --list                                # list stored episodes
//!
//! Options:
//!   --store <store>     file:<dir>, sqlite:<path>, http://..., memory
//!   --settings <path>   settings file (default config/sim_settings.json)
//!   --connect           open the backend socket (implied by --live)
//!   --fast              do not pace ticks to wall-clock time

use bevy::prelude::*;
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use navsim::events::{Command, SimEventQueue};
use navsim::input::ActionInput;
use navsim::playback::{PlaybackState, SourceMode};
use navsim::recorder::RecorderState;
use navsim::session::Session;
use navsim::settings::SimSettings;
use navsim::simulation::HeadlessAppBuilder;
use navsim::simulation::io::{PendingIo, flush_io};
use navsim::transport::SocketTransport;

/// Upper bound on ticks for anything waiting on I/O
const IO_WAIT_TICKS: u64 = 600;

enum Mode {
    Record {
        secs: f32,
        hold: BTreeSet<String>,
        save: Option<String>,
    },
    Replay {
        key: String,
        mode: SourceMode,
    },
    List,
}

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1).cloned())
}

fn parse_mode(args: &[String]) -> Option<Mode> {
    if let Some(secs) = arg_value(args, "--record").and_then(|s| s.parse::<f32>().ok()) {
        let hold = arg_value(args, "--hold")
            .map(|h| {
                h.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        return Some(Mode::Record {
            secs,
            hold,
            save: arg_value(args, "--save"),
        });
    }
    if let Some(key) = arg_value(args, "--replay") {
        return Some(Mode::Replay {
            key,
            mode: SourceMode::Stored,
        });
    }
    if let Some(key) = arg_value(args, "--live") {
        return Some(Mode::Replay {
            key,
            mode: SourceMode::Live,
        });
    }
    if args.iter().any(|a| a == "--list") {
        return Some(Mode::List);
    }
    None
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let Some(mode) = parse_mode(&args) else {
        eprintln!("Usage: navsim (--record <secs> [--hold w,a] [--save <name>] | --replay <key> | --live <key> | --list)");
        eprintln!("       [--store <store>] [--settings <path>] [--connect] [--fast]");
        std::process::exit(2);
    };
    let realtime = !args.iter().any(|a| a == "--fast");

    let mut settings = match arg_value(&args, "--settings") {
        Some(path) => SimSettings::load_from(Path::new(&path)),
        None => SimSettings::load_or_create(),
    };
    if let Some(store) = arg_value(&args, "--store") {
        settings.episode_store = store;
    }

    let wants_socket =
        args.iter().any(|a| a == "--connect") || matches!(mode, Mode::Replay { mode: SourceMode::Live, .. });
    let mut builder = HeadlessAppBuilder::new()
        .with_settings(settings.clone())
        .with_logging();
    if wants_socket {
        match SocketTransport::connect(&settings.socket_url) {
            Ok(socket) => builder = builder.with_transport(Box::new(socket)),
            Err(e) => {
                eprintln!("Failed to connect to {}: {}", settings.socket_url, e);
                if matches!(mode, Mode::Replay { mode: SourceMode::Live, .. }) {
                    std::process::exit(1);
                }
            }
        }
    }

    let mut app = builder.build();
    app.finish();
    app.cleanup();

    let dt = Duration::from_secs_f32(settings.tick_dt());
    let mut step = |app: &mut App| {
        app.update();
        if realtime {
            std::thread::sleep(dt);
        }
    };
    step(&mut app);

    let ok = match mode {
        Mode::Record { secs, hold, save } => {
            run_record(&mut app, &mut step, secs, settings.tick_hz, hold, save)
        }
        Mode::Replay { key, mode } => run_replay(&mut app, &mut step, key, mode),
        Mode::List => run_list(&mut app, &mut step),
    };

    // Let outstanding saves land before exiting
    flush_io(app.world_mut());
    app.update();

    if !ok {
        std::process::exit(1);
    }
}

fn command(app: &mut App, command: Command) {
    app.world_mut().resource_mut::<SimEventQueue>().command(command);
}

fn session(app: &App) -> &Session {
    app.world().resource::<Session>()
}

fn run_record(
    app: &mut App,
    step: &mut impl FnMut(&mut App),
    secs: f32,
    tick_hz: f32,
    hold: BTreeSet<String>,
    save: Option<String>,
) -> bool {
    command(app, Command::StartRecording);
    let ticks = (secs * tick_hz).ceil() as u64;
    for _ in 0..ticks {
        app.world_mut().resource_mut::<ActionInput>().manual = hold.clone();
        step(app);
        if session(app).recorder.state() == RecorderState::Stopped {
            break;
        }
    }
    app.world_mut().resource_mut::<ActionInput>().manual.clear();
    if session(app).recorder.state() == RecorderState::Recording {
        command(app, Command::StopRecording);
        step(app);
    }

    let frames = session(app).recorder.frames().len();
    let reason = session(app)
        .recorder
        .stop_reason()
        .map(|r| r.as_str())
        .unwrap_or("none");
    println!("Recorded {} frames ({})", frames, reason);

    let Some(name) = save else {
        command(app, Command::AbandonRecording);
        step(app);
        return true;
    };
    command(app, Command::SaveRecording { name });
    for _ in 0..IO_WAIT_TICKS {
        step(app);
        let recorder = &session(app).recorder;
        if recorder.state() == RecorderState::Idle {
            println!("Saved");
            return true;
        }
        if !recorder.save_in_flight() && app.world().resource::<PendingIo>().is_empty() {
            eprintln!("{}", recorder.status());
            return false;
        }
    }
    eprintln!("Timed out waiting for the save");
    false
}

fn run_replay(
    app: &mut App,
    step: &mut impl FnMut(&mut App),
    key: String,
    mode: SourceMode,
) -> bool {
    command(app, Command::SelectEpisode { key, mode });
    let mut played = false;
    loop {
        step(app);
        let state = session(app).player.state();
        match state {
            PlaybackState::Loaded if !played => {
                command(app, Command::Play);
                played = true;
            }
            PlaybackState::Complete => {
                println!("{}", session(app).status_line());
                command(app, Command::AcknowledgePlayback);
                step(app);
                return true;
            }
            PlaybackState::Cancelled | PlaybackState::Error => {
                eprintln!("{}", session(app).status_line());
                return false;
            }
            _ => {}
        }
    }
}

fn run_list(app: &mut App, step: &mut impl FnMut(&mut App)) -> bool {
    command(app, Command::RefreshEpisodeList);
    for _ in 0..IO_WAIT_TICKS {
        step(app);
        if app.world().resource::<PendingIo>().is_empty() {
            break;
        }
    }
    // One more tick for the list result to reach the session
    step(app);
    for key in session(app).episodes() {
        println!("{}", key);
    }
    true
}
