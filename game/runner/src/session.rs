//! Per-connection authoritative state: the last applied input sequence
//! number and the current `StateSnapshot`, advanced once per tick by
//! `gamecore::execute` (spec §4.6).

use gamecore::StateSnapshot;

pub struct PlayerSession {
    pub state: StateSnapshot,
    pub last_input_sequence: u32,
}

impl PlayerSession {
    pub fn new(tick: u32) -> PlayerSession {
        PlayerSession {
            state: StateSnapshot::initial(tick),
            last_input_sequence: 0,
        }
    }
}
