//! Exploration schedules for the learning agents.

use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    Explore,
    Exploit,
}

/// ε-greedy with multiplicative decay, the schedule the tabular learner
/// uses: ε starts at `initial`, multiplies by `decay` after every choice
/// and never drops below `min`.
#[derive(Debug, Clone)]
pub struct EpsilonGreedy {
    epsilon: f64,
    min_epsilon: f64,
    decay: f64,
}

impl EpsilonGreedy {
    pub fn new(initial_epsilon: f64, min_epsilon: f64, decay: f64) -> Self {
        Self {
            epsilon: initial_epsilon,
            min_epsilon,
            decay,
        }
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn choose<R: Rng>(&mut self, rng: &mut R) -> Choice {
        let choice = if rng.gen::<f64>() < self.epsilon {
            Choice::Explore
        } else {
            Choice::Exploit
        };
        self.epsilon = (self.epsilon * self.decay).max(self.min_epsilon);

        choice
    }
}

/// Linear ε schedule over a fraction of the training budget, the schedule
/// the DQN uses: ε moves from `initial` to `final_value` during the first
/// `end_fraction` of the run and stays at `final_value` afterwards.
#[derive(Debug, Clone, Copy)]
pub struct LinearSchedule {
    pub initial: f64,
    pub final_value: f64,
    pub end_fraction: f64,
}

impl LinearSchedule {
    pub fn value(&self, step: usize, total_steps: usize) -> f64 {
        if total_steps == 0 {
            return self.final_value;
        }

        let progress = step as f64 / total_steps as f64;
        if progress >= self.end_fraction {
            self.final_value
        } else {
            self.initial + progress / self.end_fraction * (self.final_value - self.initial)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn epsilon_decays_to_floor() {
        let mut eg = EpsilonGreedy::new(1.0, 0.05, 0.5);
        let rng = &mut StdRng::seed_from_u64(2718);

        for _ in 0..10 {
            let _ = eg.choose(rng);
        }
        assert_float_eq!(eg.epsilon(), 0.05, abs <= 1e-12);
    }

    #[test]
    fn epsilon_one_always_explores() {
        let mut eg = EpsilonGreedy::new(1.0, 1.0, 1.0);
        let rng = &mut StdRng::seed_from_u64(2718);
        for _ in 0..100 {
            assert_eq!(eg.choose(rng), Choice::Explore);
        }
    }

    #[test]
    fn epsilon_zero_always_exploits() {
        let mut eg = EpsilonGreedy::new(0.0, 0.0, 1.0);
        let rng = &mut StdRng::seed_from_u64(2718);
        for _ in 0..100 {
            assert_eq!(eg.choose(rng), Choice::Exploit);
        }
    }

    #[test]
    fn linear_schedule_endpoints() {
        let s = LinearSchedule {
            initial: 1.0,
            final_value: 0.01,
            end_fraction: 0.1,
        };

        assert_float_eq!(s.value(0, 1000), 1.0, abs <= 1e-12);
        // Halfway through the decay window.
        assert_float_eq!(s.value(50, 1000), 0.505, abs <= 1e-12);
        assert_float_eq!(s.value(100, 1000), 0.01, abs <= 1e-12);
        assert_float_eq!(s.value(999, 1000), 0.01, abs <= 1e-12);
    }
}
