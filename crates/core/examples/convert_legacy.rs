//! Convert a bindings file to the current format and print it
//!
//! Run with: cargo run --package faderlink-core --example convert_legacy -- [FILE]
//!
//! Without a file argument a small built-in legacy file is converted.

use faderlink_core::domain::config::{self, ParsedConfig};

const SAMPLE: &str = r#"
midiDevices:
  - name: KORG nanoKONTROL2
    type: KorgNanoKontrol2
    midiInName: "nanoKONTROL2 nanoKONTROL2 _ CTR"
    midiOutName: "nanoKONTROL2 nanoKONTROL2 _ CTR"
rules:
  - midiMessage:
      deviceControlPath: Group1/Slider
      type: ControlChange
      channel: 0
      controller: 0
    actions:
      - type: SetVolume
        target:
          type: OutputDevice
          name: Default
  - midiMessage:
      type: ControlChange
      channel: 0
      controller: 17
    actions:
      - type: SetVolume
        target:
          type: PlaybackStream
          name: Firefox
"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("faderlink_core=debug,info")
        .with_writer(std::io::stderr)
        .init();

    let contents = match std::env::args().nth(1) {
        Some(path) => tokio::fs::read_to_string(&path).await?,
        None => SAMPLE.to_string(),
    };

    let config = match config::parse(&contents)? {
        ParsedConfig::Current(config) => {
            eprintln!("Already in the current format");
            config
        }
        ParsedConfig::Legacy(config) => {
            eprintln!("Converted from the legacy format");
            config
        }
    };

    let assigned = config.bindings().filter(|b| !b.is_empty()).count();
    eprintln!("{} controls, {} with targets", config.len(), assigned);
    print!("{}", config::to_yaml(&config)?);
    Ok(())
}
