//! Decoded MIDI input events

use crate::domain::rules::MessageKind;

/// A channel or system message from the control surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8, velocity: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    SysEx(Vec<u8>),
}

impl ControlEvent {
    /// Decode one raw message; unsupported status bytes yield `None`
    ///
    /// A NoteOn with velocity 0 is reported as NoteOff.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let status = *bytes.first()?;
        if status == 0xF0 {
            return Some(ControlEvent::SysEx(bytes.to_vec()));
        }

        let channel = status & 0x0F;
        let data = |i: usize| bytes.get(i).map(|b| b & 0x7F);

        match status & 0xF0 {
            0x80 => Some(ControlEvent::NoteOff {
                channel,
                note: data(1)?,
                velocity: data(2)?,
            }),
            0x90 => {
                let (note, velocity) = (data(1)?, data(2)?);
                if velocity == 0 {
                    Some(ControlEvent::NoteOff {
                        channel,
                        note,
                        velocity,
                    })
                } else {
                    Some(ControlEvent::NoteOn {
                        channel,
                        note,
                        velocity,
                    })
                }
            }
            0xB0 => Some(ControlEvent::ControlChange {
                channel,
                controller: data(1)?,
                value: data(2)?,
            }),
            0xC0 => Some(ControlEvent::ProgramChange {
                channel,
                program: data(1)?,
            }),
            _ => None,
        }
    }

    /// Rule-matching view: kind, channel, number and the value to apply
    ///
    /// Program changes carry no value and drive their rules at full scale.
    pub fn rule_input(&self) -> Option<(MessageKind, u8, u8, u8)> {
        match *self {
            ControlEvent::NoteOn {
                channel,
                note,
                velocity,
            } => Some((MessageKind::Note, channel, note, velocity)),
            ControlEvent::NoteOff { channel, note, .. } => {
                Some((MessageKind::Note, channel, note, 0))
            }
            ControlEvent::ControlChange {
                channel,
                controller,
                value,
            } => Some((MessageKind::ControlChange, channel, controller, value)),
            ControlEvent::ProgramChange { channel, program } => {
                Some((MessageKind::ProgramChange, channel, program, 0x7F))
            }
            ControlEvent::SysEx(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_control_change() {
        assert_eq!(
            ControlEvent::decode(&[0xB0, 2, 127]),
            Some(ControlEvent::ControlChange {
                channel: 0,
                controller: 2,
                value: 127
            })
        );
        assert_eq!(
            ControlEvent::decode(&[0xB3, 16, 64]),
            Some(ControlEvent::ControlChange {
                channel: 3,
                controller: 16,
                value: 64
            })
        );
    }

    #[test]
    fn test_note_on_zero_velocity_is_note_off() {
        assert_eq!(
            ControlEvent::decode(&[0x90, 41, 0]),
            Some(ControlEvent::NoteOff {
                channel: 0,
                note: 41,
                velocity: 0
            })
        );
    }

    #[test]
    fn test_program_change_drives_full_scale() {
        let event = ControlEvent::decode(&[0xC1, 5]).unwrap();
        assert_eq!(
            event.rule_input(),
            Some((MessageKind::ProgramChange, 1, 5, 127))
        );
    }

    #[test]
    fn test_truncated_and_unknown() {
        assert_eq!(ControlEvent::decode(&[]), None);
        assert_eq!(ControlEvent::decode(&[0xB0, 2]), None);
        assert_eq!(ControlEvent::decode(&[0xE0, 0, 64]), None);
        assert!(matches!(
            ControlEvent::decode(&[0xF0, 0x42, 0x40, 0xF7]),
            Some(ControlEvent::SysEx(bytes)) if bytes.len() == 4
        ));
    }
}
