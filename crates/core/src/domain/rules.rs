//! Rule compilation
//!
//! Turns the bindings into a flat list of hardware-event patterns with the
//! actions to run when they match. Rules are derived data: they are never
//! persisted and are rebuilt wholesale whenever an assignment changes.

use crate::domain::control::{ControlId, ControlKind, Configuration, CONTROLS_PER_KIND};
use crate::domain::target::AudioTargetRef;

/// Kind of MIDI message a rule listens for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Note,
    ControlChange,
    ProgramChange,
}

/// Hardware event pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatchPattern {
    pub kind: MessageKind,
    pub channel: u8,
    /// Controller, note or program number
    pub number: u8,
}

impl MatchPattern {
    pub fn control_change(channel: u8, controller: u8) -> Self {
        Self {
            kind: MessageKind::ControlChange,
            channel,
            number: controller,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    SetVolume,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleAction {
    pub target: AudioTargetRef,
    pub kind: ActionKind,
}

/// One pattern and the actions it triggers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledRule {
    pub control: ControlId,
    pub pattern: MatchPattern,
    pub actions: Vec<RuleAction>,
    pub min_value: u8,
    pub max_value: u8,
}

impl CompiledRule {
    pub fn matches(&self, kind: MessageKind, channel: u8, number: u8) -> bool {
        self.pattern.kind == kind && self.pattern.channel == channel && self.pattern.number == number
    }

    /// Map a raw 7-bit value to a volume fraction
    pub fn volume_fraction(&self, raw: u8) -> f32 {
        let span = self.max_value.saturating_sub(self.min_value).max(1);
        (raw as f32 / span as f32).clamp(0.0, 1.0)
    }
}

/// Controller numbers of the supported surface
///
/// The nanoKONTROL2 sends sliders on CC 0-7 and knobs on CC 16-23, all on
/// channel 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLayout {
    pub channel: u8,
    pub slider_base: u8,
    pub knob_base: u8,
}

impl Default for DeviceLayout {
    fn default() -> Self {
        Self {
            channel: 0,
            slider_base: 0,
            knob_base: 16,
        }
    }
}

impl DeviceLayout {
    fn base(&self, kind: ControlKind) -> u8 {
        match kind {
            ControlKind::Slider => self.slider_base,
            ControlKind::Knob => self.knob_base,
        }
    }

    pub fn controller_for(&self, id: ControlId) -> u8 {
        self.base(id.kind()) + id.index() - 1
    }

    pub fn pattern_for(&self, id: ControlId) -> MatchPattern {
        MatchPattern::control_change(self.channel, self.controller_for(id))
    }

    /// Control that sends this controller number, if any
    pub fn control_for(&self, channel: u8, controller: u8) -> Option<ControlId> {
        if channel != self.channel {
            return None;
        }
        ControlKind::ALL.into_iter().find_map(|kind| {
            let offset = controller.checked_sub(self.base(kind))?;
            if offset < CONTROLS_PER_KIND {
                ControlId::new(kind, offset + 1).ok()
            } else {
                None
            }
        })
    }
}

/// Compile one rule per non-empty binding, sliders first then knobs
pub fn compile(config: &Configuration, layout: &DeviceLayout) -> Vec<CompiledRule> {
    config
        .bindings()
        .filter(|b| !b.is_empty())
        .map(|b| CompiledRule {
            control: b.id,
            pattern: layout.pattern_for(b.id),
            actions: b
                .targets()
                .iter()
                .map(|target| RuleAction {
                    target: target.clone(),
                    kind: ActionKind::SetVolume,
                })
                .collect(),
            min_value: 0,
            max_value: 127,
        })
        .collect()
}

/// Rules matching an event, in rule order
pub fn matching_rules<'a>(
    rules: &'a [CompiledRule],
    kind: MessageKind,
    channel: u8,
    number: u8,
) -> impl Iterator<Item = &'a CompiledRule> {
    rules
        .iter()
        .filter(move |rule| rule.matches(kind, channel, number))
}
