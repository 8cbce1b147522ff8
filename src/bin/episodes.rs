//! Episode store tool - inspect, validate and copy recorded episodes
//!
//! Usage:
//!   cargo run --bin episodes -- list [--store file:replays]
//!   cargo run --bin episodes -- show <key> [--store sqlite:data/episodes.db]
//!   cargo run --bin episodes -- validate [--store ...]
//!   cargo run --bin episodes -- copy <key|--all> --to <store> [--store ...]

use std::collections::BTreeMap;
use std::sync::Arc;

use navsim::episode::Episode;
use navsim::settings::SimSettings;
use navsim::store::{EpisodeStore, StoreKind};

struct EpisodesConfig {
    command: String,
    key: Option<String>,
    store: String,
    to: Option<String>,
    all: bool,
}

impl EpisodesConfig {
    fn from_args() -> Self {
        let args: Vec<String> = std::env::args().skip(1).collect();
        let mut config = Self {
            command: String::new(),
            key: None,
            store: SimSettings::load().episode_store,
            to: None,
            all: false,
        };

        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "--store" => {
                    if let Some(v) = args.get(i + 1) {
                        config.store = v.clone();
                        i += 1;
                    }
                }
                "--to" => {
                    config.to = args.get(i + 1).cloned();
                    i += 1;
                }
                "--all" => config.all = true,
                arg if config.command.is_empty() => config.command = arg.to_string(),
                arg if config.key.is_none() => config.key = Some(arg.to_string()),
                arg => eprintln!("Ignoring extra argument '{}'", arg),
            }
            i += 1;
        }
        config
    }
}

fn open_store(target: &str) -> Result<Arc<dyn EpisodeStore>, String> {
    let kind = StoreKind::from_str(target).ok_or_else(|| format!("Unknown store '{}'", target))?;
    kind.open()
        .map_err(|e| format!("Failed to open store '{}': {}", target, e))
}

fn print_help() {
    println!("Episode store tool\n");
    println!("Commands:");
    println!("  list                       List episode keys");
    println!("  show <key>                 Print a summary of one episode");
    println!("  validate                   Load and check every episode");
    println!("  copy <key|--all> --to <s>  Copy episodes into another store");
    println!("\nStores: file:<dir>, sqlite:<path>, http://<host>, memory");
}

fn main() {
    let config = EpisodesConfig::from_args();
    let result = open_store(&config.store).and_then(|store| match config.command.as_str() {
        "list" => list(store.as_ref()),
        "show" => match &config.key {
            Some(key) => show(store.as_ref(), key),
            None => Err("show needs an episode key".to_string()),
        },
        "validate" => validate(store.as_ref()),
        "copy" => {
            let to = config.to.as_deref().ok_or("copy needs --to <store>")?;
            let target = open_store(to)?;
            let keys = if config.all {
                store.list().map_err(|e| e.to_string())?
            } else {
                vec![config.key.clone().ok_or("copy needs a key or --all")?]
            };
            copy(store.as_ref(), target.as_ref(), &keys)
        }
        _ => {
            print_help();
            Ok(())
        }
    });

    if let Err(e) = result {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn list(store: &dyn EpisodeStore) -> Result<(), String> {
    let keys = store.list().map_err(|e| e.to_string())?;
    println!("{} episodes in {}", keys.len(), store.describe());
    for key in keys {
        println!("  {}", key);
    }
    Ok(())
}

fn summarize(episode: &Episode) -> String {
    let mut out = String::new();
    let reason = episode
        .termination_reason
        .map(|r| r.as_str())
        .unwrap_or("unknown");
    out.push_str(&format!("Name:        {}\n", episode.name));
    out.push_str(&format!("Recorded at: {}\n", episode.recorded_at));
    out.push_str(&format!("Stopped by:  {}\n", reason));
    out.push_str(&format!("Frames:      {}\n", episode.frames.len()));
    out.push_str(&format!("Objects:     {}\n", episode.object_placements.len()));

    if let (Some(first), Some(last)) = (episode.frames.first(), episode.frames.last()) {
        let distance = first.translation().distance(last.translation());
        out.push_str(&format!(
            "Start:       ({:.2}, {:.2}, {:.2})\n",
            first.position[0], first.position[1], first.position[2]
        ));
        out.push_str(&format!("Net travel:  {:.2}\n", distance));
        out.push_str(&format!("Target:      {}\n", last.target_object));
    }

    let mut action_frames: BTreeMap<&str, usize> = BTreeMap::new();
    for frame in &episode.frames {
        for action in &frame.active_actions {
            *action_frames.entry(action.as_str()).or_default() += 1;
        }
    }
    if !action_frames.is_empty() {
        out.push_str("Actions:\n");
        for (action, count) in action_frames {
            out.push_str(&format!("  {:<4} {} frames\n", action, count));
        }
    }
    let collisions = episode.frames.iter().filter(|f| f.collision).count();
    if collisions > 0 {
        out.push_str(&format!("Collision frames: {}\n", collisions));
    }
    out
}

fn show(store: &dyn EpisodeStore, key: &str) -> Result<(), String> {
    let episode = store.load_episode(key).map_err(|e| e.to_string())?;
    print!("{}", summarize(&episode));
    Ok(())
}

fn validate(store: &dyn EpisodeStore) -> Result<(), String> {
    let keys = store.list().map_err(|e| e.to_string())?;
    let mut bad = 0;
    for key in &keys {
        let result = store
            .load_episode(key)
            .map_err(|e| e.to_string())
            .and_then(|episode| episode.validate().map_err(|e| e.to_string()));
        match result {
            Ok(()) => println!("  {} ... OK", key),
            Err(e) => {
                println!("  {} ... INVALID: {}", key, e);
                bad += 1;
            }
        }
    }
    println!("\n{} checked, {} invalid", keys.len(), bad);
    if bad > 0 {
        Err(format!("{} invalid episodes", bad))
    } else {
        Ok(())
    }
}

fn copy(source: &dyn EpisodeStore, target: &dyn EpisodeStore, keys: &[String]) -> Result<(), String> {
    let mut copied = 0;
    for key in keys {
        let episode = source.load_episode(key).map_err(|e| format!("{}: {}", key, e))?;
        match target.save(key, &episode) {
            Ok(()) => copied += 1,
            Err(e) => eprintln!("  {} not copied: {}", key, e),
        }
    }
    println!("Copied {} of {} episodes to {}", copied, keys.len(), target.describe());
    Ok(())
}
