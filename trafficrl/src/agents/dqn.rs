//! Deep Q-learning on a single-signal scenario.
//!
//! Policy/target networks are [`Mlp`]s; transitions go through a replay
//! buffer and the policy trains on the MSE toward the Bellman target with
//! terminal next-states masked out.

use burn::{
    grad_clipping::GradientClippingConfig,
    nn::loss::{MseLoss, Reduction},
    optim::{adaptor::OptimizerAdaptor, AdamW, AdamWConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use sumo::{Actions, Observations, ScenarioConfig, Space, SumoResult};

use crate::exploration::LinearSchedule;
use crate::memory::{ReplayMemory, Transition};
use crate::nn::{Mlp, MlpConfig};

use super::{SignalEnv, StepHook, TrafficAgent};

/// Default training backend for the binary and the tests.
pub type DqnBackend = burn::backend::Autodiff<burn::backend::NdArray>;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DqnConfig {
    pub learning_rate: f64,
    pub gamma: f64,
    pub initial_epsilon: f64,
    pub final_epsilon: f64,
    /// Fraction of the step budget over which ε decays linearly.
    pub exploration_fraction: f64,
    pub learning_starts: usize,
    /// Train every n environment steps.
    pub train_freq: usize,
    pub gradient_steps: usize,
    /// Hard-copy the target network every n environment steps.
    pub target_update_interval: usize,
    pub buffer_size: usize,
    pub batch_size: usize,
    pub hidden_layers: Vec<usize>,
    pub seed: u64,
}

impl Default for DqnConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            gamma: 0.99,
            initial_epsilon: 1.0,
            final_epsilon: 0.005,
            exploration_fraction: 0.1,
            learning_starts: 0,
            train_freq: 1,
            gradient_steps: 1,
            target_update_interval: 500,
            buffer_size: 50_000,
            batch_size: 32,
            hidden_layers: vec![64, 64],
            seed: 0,
        }
    }
}

pub struct DqnAgent<B: AutodiffBackend> {
    name: String,
    color: String,
    cfg: DqnConfig,
    device: B::Device,
}

impl<B> DqnAgent<B>
where
    B: AutodiffBackend<FloatElem = f32, IntElem = i64>,
    B::Device: Default,
{
    pub fn new(name: &str, color: &str, cfg: DqnConfig) -> Self {
        Self {
            name: name.to_string(),
            color: color.to_string(),
            cfg,
            device: B::Device::default(),
        }
    }
}

impl<B> TrafficAgent for DqnAgent<B>
where
    B: AutodiffBackend<FloatElem = f32, IntElem = i64>,
    B::Device: Default,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn color(&self) -> &str {
        &self.color
    }

    fn scenario(&self, base: &ScenarioConfig) -> ScenarioConfig {
        ScenarioConfig {
            fixed_ts: false,
            single_agent: true,
            ..base.clone()
        }
    }

    fn run(
        &mut self,
        env: &mut dyn SignalEnv,
        scenario: &ScenarioConfig,
        on_step: &mut StepHook,
    ) -> SumoResult<()> {
        let ts = env
            .signal_ids()
            .first()
            .ok_or("Scenario has no traffic signals.")?
            .clone();
        let obs_dim = env
            .observation_space(&ts)
            .and_then(Space::box_len)
            .ok_or("Signal has no Box observation space.")?;
        let n_actions = env
            .action_space(&ts)
            .and_then(Space::discrete_n)
            .ok_or("Signal has no discrete action space.")? as usize;

        let mut learner = DqnLearner::<B>::new(&self.cfg, obs_dim, n_actions, &self.device);
        let mut memory = ReplayMemory::new(self.cfg.buffer_size, self.cfg.batch_size);
        let rng = &mut StdRng::seed_from_u64(self.cfg.seed);
        let schedule = LinearSchedule {
            initial: self.cfg.initial_epsilon,
            final_value: self.cfg.final_epsilon,
            end_fraction: self.cfg.exploration_fraction,
        };

        // One environment step per control interval.
        let total_steps = (scenario.num_seconds / scenario.delta_time.max(1)) as usize;
        let mut state = to_state(&env.reset(None)?, &ts)?;

        for step in 0..total_steps {
            let epsilon = schedule.value(step, total_steps);
            let action = if rng.gen::<f64>() < epsilon {
                rng.gen_range(0..n_actions)
            } else {
                learner.best_action(&state)
            };

            let out = env.step(&Actions::from([(ts.clone(), action as i64)]))?;
            on_step(&out.metrics);

            let reward = out.rewards.get(&ts).copied().unwrap_or(0.);
            let next_state = if out.done {
                None
            } else {
                Some(to_state(&out.observations, &ts)?)
            };
            memory.push(Transition {
                state: state.clone(),
                action,
                reward,
                next_state: next_state.clone(),
            });

            if step >= self.cfg.learning_starts && (step + 1) % self.cfg.train_freq.max(1) == 0 {
                for _ in 0..self.cfg.gradient_steps {
                    if let Some(batch) = memory.sample(rng) {
                        learner.learn(&batch);
                    }
                }
            }
            if (step + 1) % self.cfg.target_update_interval.max(1) == 0 {
                learner.sync_target();
            }

            state = match next_state {
                Some(next) => next,
                // The episode finished inside the step budget; start over.
                None => {
                    if step + 1 == total_steps {
                        break;
                    }
                    to_state(&env.reset(None)?, &ts)?
                }
            };
        }

        Ok(())
    }
}

fn to_state(observations: &Observations, ts: &str) -> SumoResult<Vec<f32>> {
    observations
        .get(ts)
        .map(|obs| obs.iter().map(|&x| x as f32).collect())
        .ok_or_else(|| format!("No observation for signal {ts}.").into())
}

/// The trainable part, separated from the environment loop.
pub(crate) struct DqnLearner<B: AutodiffBackend> {
    policy: Mlp<B>,
    target: Mlp<B>,
    optimizer: OptimizerAdaptor<AdamW, Mlp<B>, B>,
    device: B::Device,
    gamma: f64,
    lr: f64,
    obs_dim: usize,
}

impl<B> DqnLearner<B>
where
    B: AutodiffBackend<FloatElem = f32, IntElem = i64>,
{
    pub(crate) fn new(
        cfg: &DqnConfig,
        obs_dim: usize,
        n_actions: usize,
        device: &B::Device,
    ) -> Self {
        let policy =
            MlpConfig::new(obs_dim, cfg.hidden_layers.clone(), n_actions).init::<B>(device);
        let target = policy.clone();
        let optimizer = AdamWConfig::new()
            .with_grad_clipping(Some(GradientClippingConfig::Value(100.0)))
            .init();

        Self {
            policy,
            target,
            optimizer,
            device: device.clone(),
            gamma: cfg.gamma,
            lr: cfg.learning_rate,
            obs_dim,
        }
    }

    pub(crate) fn best_action(&self, state: &[f32]) -> usize {
        let input = Tensor::<B, 2>::from_data(
            TensorData::new(state.to_vec(), [1, state.len()]),
            &self.device,
        );
        let best = self.policy.forward(input).argmax(1).into_scalar();

        best as usize
    }

    pub(crate) fn learn(&mut self, batch: &[&Transition<Vec<f32>>]) {
        let n = batch.len();

        let mut states = Vec::with_capacity(n * self.obs_dim);
        let mut next_states = Vec::with_capacity(n * self.obs_dim);
        let mut actions = Vec::with_capacity(n);
        let mut rewards = Vec::with_capacity(n);
        let mut non_terminal = Vec::with_capacity(n);
        for t in batch {
            states.extend_from_slice(&t.state);
            // Terminal transitions feed a zero state; the mask drops their
            // bootstrapped value below.
            match &t.next_state {
                Some(next) => next_states.extend_from_slice(next),
                None => next_states.extend(std::iter::repeat(0f32).take(self.obs_dim)),
            }
            actions.push(t.action as i64);
            rewards.push(t.reward as f32);
            non_terminal.push(t.next_state.is_some());
        }

        let states = Tensor::<B, 2>::from_data(
            TensorData::new(states, [n, self.obs_dim]),
            &self.device,
        );
        let next_states = Tensor::<B, 2>::from_data(
            TensorData::new(next_states, [n, self.obs_dim]),
            &self.device,
        );
        let actions = Tensor::<B, 2, Int>::from_data(TensorData::new(actions, [n, 1]), &self.device);
        let rewards = Tensor::<B, 2>::from_data(TensorData::new(rewards, [n, 1]), &self.device);
        let non_terminal_mask =
            Tensor::<B, 2, Bool>::from_data(TensorData::new(non_terminal, [n, 1]), &self.device);

        // Q values of the actions actually taken.
        let q_values = self.policy.forward(states).gather(1, actions);

        // Bellman target from the target network, zero for terminal states.
        let next_q = self.target.forward(next_states).max_dim(1).detach();
        let expected =
            Tensor::<B, 2>::zeros([n, 1], &self.device).mask_where(non_terminal_mask, next_q);
        let target_return = rewards + expected * self.gamma as f32;

        let loss = MseLoss::new().forward(q_values, target_return, Reduction::Mean);
        let grads = GradientsParams::from_grads(loss.backward(), &self.policy);
        self.policy = self.optimizer.step(self.lr, self.policy.clone(), grads);
    }

    pub(crate) fn sync_target(&mut self) {
        self.target.soft_update(&self.policy, 1.0);
    }
}
