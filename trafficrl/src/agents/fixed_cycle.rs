//! Fixed-cycle baseline: the simulator runs the timing plan from the net
//! file and this agent only harvests the metrics.

use sumo::{Actions, ScenarioConfig, SumoResult};

use super::{SignalEnv, StepHook, TrafficAgent};

pub struct FixedCycleAgent {
    name: String,
    color: String,
}

impl FixedCycleAgent {
    pub fn new(name: &str, color: &str) -> Self {
        Self {
            name: name.to_string(),
            color: color.to_string(),
        }
    }
}

impl TrafficAgent for FixedCycleAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn color(&self) -> &str {
        &self.color
    }

    fn scenario(&self, base: &ScenarioConfig) -> ScenarioConfig {
        ScenarioConfig {
            fixed_ts: true,
            single_agent: false,
            // The last control interval would overrun the simulation end.
            num_seconds: base.num_seconds.saturating_sub(base.delta_time),
            ..base.clone()
        }
    }

    fn run(
        &mut self,
        env: &mut dyn SignalEnv,
        _scenario: &ScenarioConfig,
        on_step: &mut StepHook,
    ) -> SumoResult<()> {
        let _ = env.reset(None)?;

        loop {
            let step = env.step(&Actions::new())?;
            on_step(&step.metrics);

            if step.done {
                return Ok(());
            }
        }
    }
}
