//! Manual little-endian encode/decode for `InputCommand` and
//! `StateSnapshot`, the two payloads carried over `neutronium`'s
//! opaque `Packet::payload` (spec §4.2 "deliberately not serde/bincode").
//! Same fixed-field byteorder style as `neutronium::codec`.

use crate::types::{ActionFlags, InputCommand, StateFlags, StateSnapshot, Vec2, Vec3};
use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

pub const INPUT_COMMAND_SIZE: usize = 21;
pub const STATE_SNAPSHOT_SIZE: usize = 37;

#[derive(Debug, Error, Eq, PartialEq)]
#[error("malformed payload")]
pub struct WireError;

pub fn encode_input_command(cmd: &InputCommand, out: &mut Vec<u8>) {
    out.clear();
    out.resize(INPUT_COMMAND_SIZE, 0);
    LittleEndian::write_u32(&mut out[0..4], cmd.tick);
    LittleEndian::write_u32(&mut out[4..8], cmd.sequence_number);
    LittleEndian::write_f32(&mut out[8..12], cmd.move_direction.x);
    LittleEndian::write_f32(&mut out[12..16], cmd.move_direction.y);
    LittleEndian::write_f32(&mut out[16..20], cmd.look_rotation);
    out[20] = cmd.action_flags.bits();
}

pub fn decode_input_command(input: &[u8]) -> Result<InputCommand, WireError> {
    if input.len() < INPUT_COMMAND_SIZE {
        return Err(WireError);
    }
    Ok(InputCommand {
        tick: LittleEndian::read_u32(&input[0..4]),
        sequence_number: LittleEndian::read_u32(&input[4..8]),
        move_direction: Vec2 {
            x: LittleEndian::read_f32(&input[8..12]),
            y: LittleEndian::read_f32(&input[12..16]),
        },
        look_rotation: LittleEndian::read_f32(&input[16..20]),
        action_flags: ActionFlags::from_bits_truncate(input[20]),
    })
}

pub fn encode_state_snapshot(state: &StateSnapshot, out: &mut Vec<u8>) {
    out.clear();
    out.resize(STATE_SNAPSHOT_SIZE, 0);
    LittleEndian::write_u32(&mut out[0..4], state.tick);
    LittleEndian::write_u32(&mut out[4..8], state.last_processed_input);
    LittleEndian::write_f32(&mut out[8..12], state.position.x);
    LittleEndian::write_f32(&mut out[12..16], state.position.y);
    LittleEndian::write_f32(&mut out[16..20], state.position.z);
    LittleEndian::write_f32(&mut out[20..24], state.velocity.x);
    LittleEndian::write_f32(&mut out[24..28], state.velocity.y);
    LittleEndian::write_f32(&mut out[28..32], state.velocity.z);
    LittleEndian::write_f32(&mut out[32..36], state.rotation);
    out[36] = state.state_flags.bits();
}

pub fn decode_state_snapshot(input: &[u8]) -> Result<StateSnapshot, WireError> {
    if input.len() < STATE_SNAPSHOT_SIZE {
        return Err(WireError);
    }
    Ok(StateSnapshot {
        tick: LittleEndian::read_u32(&input[0..4]),
        last_processed_input: LittleEndian::read_u32(&input[4..8]),
        position: Vec3 {
            x: LittleEndian::read_f32(&input[8..12]),
            y: LittleEndian::read_f32(&input[12..16]),
            z: LittleEndian::read_f32(&input[16..20]),
        },
        velocity: Vec3 {
            x: LittleEndian::read_f32(&input[20..24]),
            y: LittleEndian::read_f32(&input[24..28]),
            z: LittleEndian::read_f32(&input[28..32]),
        },
        rotation: LittleEndian::read_f32(&input[32..36]),
        state_flags: StateFlags::from_bits_truncate(input[36]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_command_roundtrip() {
        let cmd = InputCommand {
            tick: 42,
            sequence_number: 7,
            move_direction: Vec2 { x: 1.0, y: -1.0 },
            look_rotation: 1.57,
            action_flags: ActionFlags::JUMP | ActionFlags::SPRINT,
        };
        let mut buf = Vec::new();
        encode_input_command(&cmd, &mut buf);
        assert_eq!(decode_input_command(&buf).unwrap(), cmd);
    }

    #[test]
    fn state_snapshot_roundtrip() {
        let state = StateSnapshot {
            tick: 100,
            last_processed_input: 99,
            position: Vec3 { x: 1.0, y: 2.0, z: 3.0 },
            velocity: Vec3 { x: 0.0, y: -9.8, z: 0.0 },
            rotation: 0.5,
            state_flags: StateFlags::GROUNDED,
        };
        let mut buf = Vec::new();
        encode_state_snapshot(&state, &mut buf);
        assert_eq!(decode_state_snapshot(&buf).unwrap(), state);
    }

    #[test]
    fn decode_rejects_short_input() {
        assert_eq!(decode_input_command(&[0u8; 5]), Err(WireError));
        assert_eq!(decode_state_snapshot(&[0u8; 10]), Err(WireError));
    }
}
