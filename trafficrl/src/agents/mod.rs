//! Control strategies for the traffic signals.

pub mod dqn;
pub mod fixed_cycle;
pub mod q_learning;

pub use dqn::{DqnAgent, DqnBackend, DqnConfig};
pub use fixed_cycle::FixedCycleAgent;
pub use q_learning::{QlAgent, QlConfig};

use sumo::{
    Actions, MetricSnapshot, Observations, ScenarioConfig, Space, SumoEnvironment, SumoResult,
    SumoStep,
};

/// The slice of the bridge environment the control loops consume. The live
/// implementation is [`SumoEnvironment`]; tests drive the loops with
/// scripted environments instead.
pub trait SignalEnv {
    fn signal_ids(&self) -> &[String];

    fn observation_space(&self, signal: &str) -> Option<&Space>;

    fn action_space(&self, signal: &str) -> Option<&Space>;

    fn reset(&mut self, seed: Option<u64>) -> SumoResult<Observations>;

    fn step(&mut self, actions: &Actions) -> SumoResult<SumoStep>;
}

impl SignalEnv for SumoEnvironment {
    fn signal_ids(&self) -> &[String] {
        SumoEnvironment::signal_ids(self)
    }

    fn observation_space(&self, signal: &str) -> Option<&Space> {
        SumoEnvironment::observation_space(self, signal)
    }

    fn action_space(&self, signal: &str) -> Option<&Space> {
        SumoEnvironment::action_space(self, signal)
    }

    fn reset(&mut self, seed: Option<u64>) -> SumoResult<Observations> {
        SumoEnvironment::reset(self, seed)
    }

    fn step(&mut self, actions: &Actions) -> SumoResult<SumoStep> {
        SumoEnvironment::step(self, actions)
    }
}

/// Invoked once per control interval with the simulator's metric snapshot.
pub type StepHook<'a> = dyn FnMut(&MetricSnapshot) + 'a;

/// One control strategy: it declares the scenario variant it needs and
/// drives the episode/training loop against the environment built from it.
pub trait TrafficAgent {
    fn name(&self) -> &str;

    /// Hex color used for this agent's series in the comparison plots.
    fn color(&self) -> &str;

    /// Derive this strategy's scenario from the shared base scenario
    /// (fixed timing plan vs. actuated, single- vs. multi-signal, horizon).
    fn scenario(&self, base: &ScenarioConfig) -> ScenarioConfig;

    /// Run to completion, reporting every control interval through
    /// `on_step`.
    fn run(
        &mut self,
        env: &mut dyn SignalEnv,
        scenario: &ScenarioConfig,
        on_step: &mut StepHook,
    ) -> SumoResult<()>;
}
