//! Observation discretization for the tabular learner.

/// Discretization levels per lane value (densities and queues are reported
/// in [0, 1]).
const LEVELS: u64 = 10;

/// Packs a Box observation `[phase one-hot | min-green flag | lane values]`
/// into a compact integer state id.
///
/// The packing is radix-style, so two observations that differ in any
/// discretized component map to different ids, and the same observation
/// always maps to the same id.
#[derive(Debug, Clone, Copy)]
pub struct DiscreteEncoder {
    num_phases: usize,
}

impl DiscreteEncoder {
    pub fn new(num_phases: usize) -> Self {
        Self { num_phases }
    }

    pub fn encode(&self, obs: &[f64]) -> u64 {
        let phase = obs[..self.num_phases]
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap_or(0);
        let min_green = obs[self.num_phases] > 0.5;

        let mut id = phase as u64;
        id = id * 2 + min_green as u64;
        for &val in &obs[self.num_phases + 1..] {
            id = id * (LEVELS + 1) + discretize(val);
        }

        id
    }
}

fn discretize(val: f64) -> u64 {
    (val.clamp(0., 1.) * LEVELS as f64).round() as u64
}
