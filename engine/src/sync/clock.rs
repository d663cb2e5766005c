use chrono::{DateTime, Duration, Utc};

/// Simulated time, moved forward in fixed steps until it passes `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationClock {
    now: DateTime<Utc>,
    step: Duration,
    end: DateTime<Utc>,
}

impl SimulationClock {
    pub fn new(start: DateTime<Utc>, step: Duration, end: DateTime<Utc>) -> Self {
        SimulationClock { now: start, step, end }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn step(&self) -> Duration {
        self.step
    }

    /// The instant to build next, or `None` once past `end`.
    pub fn current(&self) -> Option<DateTime<Utc>> {
        (self.now <= self.end).then_some(self.now)
    }

    pub fn is_finished(&self) -> bool {
        self.current().is_none()
    }

    pub fn advance(&mut self) {
        self.now += self.step;
    }
}
