//! `--list*` commands

use anyhow::{Context, Result};
use faderlink_core::domain::{AudioServer, LiveAudioObject, TargetCategory};
use faderlink_infra::{midi, MidiPorts, PactlServer};
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub midi: bool,
    pub audio: bool,
    pub detailed: bool,
}

pub async fn run(request: Request) -> Result<()> {
    if request.midi {
        let ports = midi::list_ports().context("Failed to enumerate MIDI ports")?;
        print!("{}", format_midi(&ports));
    }

    if request.audio {
        let server = PactlServer::connect()
            .await
            .context("Audio server is not reachable")?;

        let mut groups = Vec::new();
        for category in TargetCategory::ALL {
            let objects = server
                .list(category)
                .await
                .with_context(|| format!("Failed to list {}", heading(category)))?;
            groups.push((category, objects));
        }
        print!("{}", format_audio(&groups, request.detailed));
    }

    Ok(())
}

fn heading(category: TargetCategory) -> &'static str {
    match category {
        TargetCategory::OutputDevice => "Output devices",
        TargetCategory::InputDevice => "Input devices",
        TargetCategory::PlaybackStream => "Playback streams",
        TargetCategory::RecordStream => "Record streams",
    }
}

pub fn format_midi(ports: &MidiPorts) -> String {
    let mut out = String::new();
    for (title, names) in [("MIDI inputs", &ports.inputs), ("MIDI outputs", &ports.outputs)] {
        let _ = writeln!(out, "{}:", title);
        if names.is_empty() {
            let _ = writeln!(out, "  (none)");
        }
        for name in names {
            let _ = writeln!(out, "  {}", name);
        }
    }
    out
}

pub fn format_audio(groups: &[(TargetCategory, Vec<LiveAudioObject>)], detailed: bool) -> String {
    let mut out = String::new();
    for (category, objects) in groups {
        let _ = writeln!(out, "{}:", heading(*category));
        if objects.is_empty() {
            let _ = writeln!(out, "  (none)");
        }
        for object in objects {
            let _ = writeln!(out, "  {}", object.display_name());
            if detailed {
                let _ = writeln!(out, "    id: {}", object.stable_id);
                let _ = writeln!(out, "    volume: {}%", object.volume);
                for (key, value) in &object.properties {
                    let _ = writeln!(out, "    {} = {}", key, value);
                }
            }
        }
    }
    out
}
