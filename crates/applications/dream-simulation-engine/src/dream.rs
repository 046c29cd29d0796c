//! Background ("dream") work accounting

use serde::{Deserialize, Serialize};

/// Cumulative background work performed inside the idle budget.
///
/// Read-only outside the crate; only `SpeculativeServer::step` records into it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DreamLedger {
    cpu_secs: f64,
    events: u64,
}

impl DreamLedger {
    /// Cumulative simulated seconds spent on background work
    pub fn cpu_secs(&self) -> f64 {
        self.cpu_secs
    }

    /// Number of ticks that ran any background work
    pub fn events(&self) -> u64 {
        self.events
    }

    /// Record one tick's background work. Non-positive amounts are ignored.
    pub(crate) fn record(&mut self, secs: f64) {
        if secs > 0.0 {
            self.cpu_secs += secs;
            self.events += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_accumulates() {
        let mut ledger = DreamLedger::default();
        ledger.record(0.25);
        ledger.record(0.5);

        assert!((ledger.cpu_secs() - 0.75).abs() < 1e-12);
        assert_eq!(ledger.events(), 2);
    }

    #[test]
    fn test_zero_work_is_not_an_event() {
        let mut ledger = DreamLedger::default();
        ledger.record(0.0);
        ledger.record(-1.0);

        assert_eq!(ledger.cpu_secs(), 0.0);
        assert_eq!(ledger.events(), 0);
    }
}
