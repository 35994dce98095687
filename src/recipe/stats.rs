use std::time::Duration;

/// Timings of the last [`Recipe::all`](super::Recipe::all) call.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Stats {
    pub rows: usize,
    pub db_time: Duration,
    pub enchant_time: Duration,
    pub from_cache: bool,
}
