//! Domain entities and business rules

pub mod config;
pub mod control;
pub mod dispatch;
pub mod midi;
pub mod migration;
pub mod registry;
pub mod rules;
pub mod settings;
pub mod store;
pub mod target;

// Re-export specific items to avoid ambiguous glob imports
pub use config::{ConfigError, ConfigManager, ConfigPersistence, LoadOrigin, LoadOutcome};
pub use control::{
    ControlBinding, ControlError, ControlId, ControlKind, ControlValue, Configuration,
    DeviceIdentity,
};
pub use dispatch::EventDispatcher;
pub use midi::ControlEvent;
pub use migration::{MigrationOutcome, MigrationResolver};
pub use registry::{AudioTargetRegistry, Resolution};
pub use rules::{compile, CompiledRule, DeviceLayout, MatchPattern, MessageKind, RuleAction};
pub use settings::AppConfig;
pub use store::{AssignmentStore, StoreEvent};
pub use target::{AudioError, AudioServer, AudioTargetRef, LiveAudioObject, TargetCategory};
