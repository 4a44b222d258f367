use parking_lot::RwLock;
use std::{collections::VecDeque, sync::Arc, time::Instant};

/// One polled distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Time since polling started
    pub time_ms: u64,
    /// Clamped to the out-of-range limit when `out_of_range` is set
    pub distance_cm: f64,
    pub out_of_range: bool,
}

#[derive(Clone)]
pub struct State {
    /// Oldest first, at most `capacity` entries
    pub history: VecDeque<Reading>,
    pub capacity: usize,
    /// Mode byte last confirmed by the beacon
    pub mode: Option<u8>,
    pub last_poll_ts: Instant,
    pub faults: Vec<String>,
}

impl State {
    pub fn with_capacity(capacity: usize) -> Self {
        State {
            history: VecDeque::with_capacity(capacity),
            capacity,
            mode: None,
            last_poll_ts: Instant::now(),
            faults: Vec::new(),
        }
    }

    pub fn latest(&self) -> Option<&Reading> {
        self.history.back()
    }
}

pub type Blackboard = Arc<RwLock<State>>;

pub fn new_blackboard(capacity: usize) -> Blackboard {
    Arc::new(RwLock::new(State::with_capacity(capacity)))
}

pub fn snapshot(bb: &Blackboard) -> State {
    (*bb.read()).clone()
}

pub fn record(bb: &Blackboard, reading: Reading) {
    let mut g = bb.write();
    while g.capacity > 0 && g.history.len() >= g.capacity {
        g.history.pop_front();
    }
    if g.capacity > 0 {
        g.history.push_back(reading);
    }
    g.last_poll_ts = Instant::now();
}

pub fn set_mode(bb: &Blackboard, mode: u8) {
    bb.write().mode = Some(mode);
}

pub fn raise_fault(bb: &Blackboard, msg: &str) {
    let mut g = bb.write();
    if !g.faults.iter().any(|s| s == msg) {
        g.faults.push(msg.to_string());
    }
}
