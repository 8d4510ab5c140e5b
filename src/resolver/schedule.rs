use serde::Deserialize;

/// How the buffer levels are searched.
///
/// Growing every buffer never shrinks the intersection, so both strategies
/// settle on the same smallest level; `Bisect` gets there in fewer attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BufferStrategy {
    /// Constant-step sweep from the minimum upwards
    #[default]
    Linear,
    /// Binary search over the same levels
    Bisect,
}

/// Buffer levels `min, min + step, ...` up to and including `max`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferSchedule {
    pub min: f64,
    pub step: f64,
    pub max: f64,
}

impl BufferSchedule {
    pub fn new(min: f64, step: f64, max: f64) -> Self {
        Self { min, step, max }
    }

    /// Buffer of the `n`th attempt, counting from 1
    pub fn level(&self, n: usize) -> f64 {
        self.min + (n.saturating_sub(1)) as f64 * self.step
    }

    pub fn levels(&self) -> Vec<f64> {
        // tolerate float drift so `max` itself stays reachable
        let limit = self.max + self.step * 1e-9;
        (1..)
            .map(|n| self.level(n))
            .take_while(|b| *b <= limit)
            .collect()
    }
}

impl From<&crate::config::BufferConfig> for BufferSchedule {
    fn from(config: &crate::config::BufferConfig) -> Self {
        Self::new(config.min, config.step, config.max)
    }
}
