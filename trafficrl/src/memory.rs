//! Experience replay for the DQN.

use std::collections::VecDeque;

use rand::seq::index;
use rand::Rng;

/// One environment transition. Terminal transitions carry no next state.
#[derive(Debug, Clone)]
pub struct Transition<S> {
    pub state: S,
    pub action: usize,
    pub reward: f64,
    pub next_state: Option<S>,
}

/// Bounded transition store with uniform random batch sampling.
#[derive(Debug, Clone)]
pub struct ReplayMemory<S> {
    buf: VecDeque<Transition<S>>,
    capacity: usize,
    batch_size: usize,
}

impl<S> ReplayMemory<S> {
    pub fn new(capacity: usize, batch_size: usize) -> Self {
        assert!(capacity >= batch_size, "capacity must hold at least one batch");
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
            batch_size,
        }
    }

    pub fn push(&mut self, transition: Transition<S>) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(transition);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// A uniform sample of `batch_size` transitions, or `None` until the
    /// buffer holds at least one full batch.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Option<Vec<&Transition<S>>> {
        if self.buf.len() < self.batch_size {
            return None;
        }

        let picks = index::sample(rng, self.buf.len(), self.batch_size);
        Some(picks.iter().map(|i| &self.buf[i]).collect())
    }
}
