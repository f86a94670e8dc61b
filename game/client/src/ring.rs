//! Fixed-capacity ring buffers for pending inputs and predicted states
//! (spec §3 "Input ring buffer" / "State ring buffer"). Backed by
//! `VecDeque` rather than a hand-rolled circular array — the capacities
//! here (default 64) are far too small for index-math to pay for itself.

use gamecore::{InputCommand, StateSnapshot};
use std::collections::VecDeque;

pub struct InputRing {
    capacity: usize,
    entries: VecDeque<InputCommand>,
}

impl InputRing {
    pub fn new(capacity: usize) -> InputRing {
        InputRing {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Append a new command, evicting the oldest if the ring is full.
    pub fn push(&mut self, command: InputCommand) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(command);
    }

    pub fn iter(&self) -> impl Iterator<Item = &InputCommand> {
        self.entries.iter()
    }

    /// Drop every entry whose `sequence_number <= seq` — the server has
    /// confirmed applying them (spec §4.5 reconciliation step 2/5).
    pub fn drop_prefix_up_to(&mut self, seq: u32) {
        while let Some(front) = self.entries.front() {
            if front.sequence_number <= seq {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct StateRing {
    capacity: usize,
    entries: VecDeque<StateSnapshot>,
}

impl StateRing {
    pub fn new(capacity: usize) -> StateRing {
        StateRing {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn push(&mut self, state: StateSnapshot) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(state);
    }

    pub fn lookup_by_tick(&self, tick: u32) -> Option<StateSnapshot> {
        self.entries.iter().find(|s| s.tick == tick).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gamecore::{ActionFlags, Vec2};

    fn cmd(seq: u32) -> InputCommand {
        InputCommand {
            tick: seq,
            sequence_number: seq,
            move_direction: Vec2::default(),
            look_rotation: 0.0,
            action_flags: ActionFlags::empty(),
        }
    }

    #[test]
    fn evicts_oldest_when_full() {
        let mut ring = InputRing::new(2);
        ring.push(cmd(1));
        ring.push(cmd(2));
        ring.push(cmd(3));
        let seqs: Vec<u32> = ring.iter().map(|c| c.sequence_number).collect();
        assert_eq!(seqs, vec![2, 3]);
    }

    #[test]
    fn drop_prefix_removes_acknowledged_entries() {
        let mut ring = InputRing::new(8);
        for s in 1..=5 {
            ring.push(cmd(s));
        }
        ring.drop_prefix_up_to(3);
        let seqs: Vec<u32> = ring.iter().map(|c| c.sequence_number).collect();
        assert_eq!(seqs, vec![4, 5]);
    }

    #[test]
    fn state_ring_lookup_by_tick() {
        let mut ring = StateRing::new(4);
        ring.push(StateSnapshot::initial(1));
        ring.push(StateSnapshot::initial(2));
        assert!(ring.lookup_by_tick(1).is_some());
        assert!(ring.lookup_by_tick(99).is_none());
    }
}
