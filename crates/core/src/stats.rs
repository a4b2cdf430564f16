//! Rolling window of recent probe outcomes for the live monitor readout.

use std::collections::VecDeque;

/// Number of recent probes kept per host.
pub const DEFAULT_WINDOW: usize = 10;

#[derive(Debug, Clone)]
pub struct ProbeWindow {
    capacity: usize,
    results: VecDeque<bool>,
    response_times: VecDeque<f64>,
}

impl ProbeWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            results: VecDeque::with_capacity(capacity),
            response_times: VecDeque::with_capacity(capacity),
        }
    }

    pub fn record(&mut self, success: bool, round_trip_ms: Option<f64>) {
        push_capped(&mut self.results, success, self.capacity);
        if let Some(ms) = round_trip_ms.filter(|ms| success && ms.is_finite()) {
            push_capped(&mut self.response_times, ms, self.capacity);
        }
    }

    /// Outcomes oldest first.
    pub fn results(&self) -> Vec<bool> {
        self.results.iter().copied().collect()
    }

    /// Mean round-trip time of the retained successful probes, `-1.0` if none.
    pub fn average_response_ms(&self) -> f64 {
        if self.response_times.is_empty() {
            return -1.0;
        }
        self.response_times.iter().sum::<f64>() / self.response_times.len() as f64
    }

    pub fn clear(&mut self) {
        self.results.clear();
        self.response_times.clear();
    }
}

impl Default for ProbeWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

fn push_capped<T>(buf: &mut VecDeque<T>, item: T, capacity: usize) {
    if buf.len() == capacity {
        buf.pop_front();
    }
    buf.push_back(item);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_latest_outcomes() {
        let mut window = ProbeWindow::new(3);
        for ok in [true, false, true, true] {
            window.record(ok, None);
        }
        assert_eq!(window.results(), vec![false, true, true]);
    }

    #[test]
    fn averages_successful_round_trips() {
        let mut window = ProbeWindow::default();
        assert_eq!(window.average_response_ms(), -1.0);

        window.record(true, Some(10.0));
        window.record(false, Some(999.0));
        window.record(true, Some(30.0));
        assert_eq!(window.average_response_ms(), 20.0);
    }

    #[test]
    fn clear_empties_both_buffers() {
        let mut window = ProbeWindow::default();
        window.record(true, Some(5.0));
        window.clear();
        assert!(window.results().is_empty());
        assert_eq!(window.average_response_ms(), -1.0);
    }
}
