use serde::Serialize;

/// Consecutive valid hits. Any miss or invalid hit resets `current`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KillStreak {
    current: u32,
    best: u32,
}

impl KillStreak {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one shot outcome and returns the streak after it.
    pub fn record(&mut self, valid: bool) -> u32 {
        if valid {
            self.current += 1;
            self.best = self.best.max(self.current);
        } else {
            self.current = 0;
        }
        self.current
    }

    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn best(&self) -> u32 {
        self.best
    }
}
