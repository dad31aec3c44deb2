use std::sync::{
    Mutex,
    atomic::{AtomicU64, Ordering},
};

/// Per-child outstanding-window counts, plus the global sum (§3 "Weight
/// table"). A freshly connected child that hasn't yet reported a weight is
/// treated as weight zero (the table starts all-zero), so it's eligible
/// for dispatch immediately rather than starved until its first report.
pub struct WeightTable {
    weights: Mutex<Vec<u32>>,
    global_in_flight: AtomicU64,
}

impl WeightTable {
    pub fn new(n_children: usize) -> Self {
        Self { weights: Mutex::new(vec![0; n_children]), global_in_flight: AtomicU64::new(0) }
    }

    /// `argmin(weights)`, ties broken by lowest index (§4.6).
    pub fn argmin(&self) -> usize {
        let weights = self.weights.lock().unwrap_or_else(|e| e.into_inner());
        let mut best = 0;
        for i in 1..weights.len() {
            if weights[i] < weights[best] {
                best = i;
            }
        }
        best
    }

    /// The sender's speculative bump on dispatch (§4.6 step 3).
    pub fn bump_on_dispatch(&self, child: usize, delta: u32) {
        let mut weights = self.weights.lock().unwrap_or_else(|e| e.into_inner());
        weights[child] += delta;
        self.global_in_flight.fetch_add(u64::from(delta), Ordering::Relaxed);
    }

    /// The receiver's authoritative update from the child's own report
    /// (§4.6 step 2, §5 "the receiver's value is canonical once applied").
    /// The sender's speculative bump and this report may disagree
    /// transiently; this call always wins.
    pub fn set_authoritative(&self, child: usize, reported: u32, returned_delta: u32) {
        let mut weights = self.weights.lock().unwrap_or_else(|e| e.into_inner());
        weights[child] = reported;
        self.global_in_flight.fetch_sub(u64::from(returned_delta), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Vec<u32> {
        self.weights.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn global_in_flight(&self) -> u64 {
        self.global_in_flight.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn argmin_ties_break_lowest_index() {
        let table = WeightTable::new(3);
        assert_eq!(table.argmin(), 0);
        table.bump_on_dispatch(0, 1);
        assert_eq!(table.argmin(), 1);
    }

    #[test]
    fn dispatch_and_return_balance_global_counter() {
        let table = WeightTable::new(2);
        table.bump_on_dispatch(0, 1);
        table.bump_on_dispatch(1, 1);
        assert_eq!(table.global_in_flight(), 2);
        table.set_authoritative(0, 0, 1);
        assert_eq!(table.global_in_flight(), 1);
        assert_eq!(table.snapshot(), vec![0, 1]);
    }
}
