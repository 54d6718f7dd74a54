//! Drives the three control loops against a scripted environment.

use std::collections::HashMap;

use sumo::{
    Actions, MetricSnapshot, Observations, ScenarioConfig, Space, SumoResult, SumoStep,
};
use trafficrl::agents::{
    DqnAgent, DqnBackend, DqnConfig, FixedCycleAgent, QlAgent, QlConfig, SignalEnv,
    TrafficAgent,
};

const NUM_PHASES: i64 = 2;
// phase one-hot (2) + min-green flag + density + queue
const OBS_DIM: usize = 5;

/// Deterministic environment: observations cycle with the step index, the
/// reward is the negated synthetic queue, episodes end after `horizon`
/// steps.
struct ScriptedEnv {
    ids: Vec<String>,
    obs_space: Space,
    act_space: Space,
    horizon: usize,
    step_count: usize,
    resets: usize,
    actions_seen: Vec<Actions>,
}

impl ScriptedEnv {
    fn new(ids: &[&str], horizon: usize) -> Self {
        Self {
            ids: ids.iter().map(|s| s.to_string()).collect(),
            obs_space: Space::Box {
                shape: vec![OBS_DIM],
                low: vec![0.; OBS_DIM],
                high: vec![1.; OBS_DIM],
            },
            act_space: Space::Discrete { n: NUM_PHASES },
            horizon,
            step_count: 0,
            resets: 0,
            actions_seen: Vec::new(),
        }
    }

    fn queue(&self) -> f64 {
        (self.step_count % 10) as f64 / 10.
    }

    fn observations(&self) -> Observations {
        let phase = (self.step_count % 2) as usize;
        let mut obs = vec![0.; OBS_DIM];
        obs[phase] = 1.;
        obs[NUM_PHASES as usize] = 1.;
        obs[NUM_PHASES as usize + 1] = self.queue();
        obs[NUM_PHASES as usize + 2] = self.queue();

        self.ids.iter().map(|ts| (ts.clone(), obs.clone())).collect()
    }

    fn metrics(&self) -> MetricSnapshot {
        MetricSnapshot::from([
            ("system_total_stopped".to_string(), self.queue() * 10.),
            ("system_mean_speed".to_string(), 10. - self.queue()),
        ])
    }
}

impl SignalEnv for ScriptedEnv {
    fn signal_ids(&self) -> &[String] {
        &self.ids
    }

    fn observation_space(&self, signal: &str) -> Option<&Space> {
        self.ids
            .iter()
            .any(|ts| ts == signal)
            .then_some(&self.obs_space)
    }

    fn action_space(&self, signal: &str) -> Option<&Space> {
        self.ids
            .iter()
            .any(|ts| ts == signal)
            .then_some(&self.act_space)
    }

    fn reset(&mut self, _seed: Option<u64>) -> SumoResult<Observations> {
        self.step_count = 0;
        self.resets += 1;
        Ok(self.observations())
    }

    fn step(&mut self, actions: &Actions) -> SumoResult<SumoStep> {
        for (ts, phase) in actions {
            assert!(self.ids.iter().any(|id| id == ts), "unknown signal {ts}");
            assert!(
                (0..NUM_PHASES).contains(phase),
                "phase {phase} out of range"
            );
        }

        self.actions_seen.push(actions.clone());
        self.step_count += 1;

        Ok(SumoStep {
            observations: self.observations(),
            rewards: self
                .ids
                .iter()
                .map(|ts| (ts.clone(), -self.queue()))
                .collect::<HashMap<_, _>>(),
            done: self.step_count >= self.horizon,
            metrics: self.metrics(),
        })
    }
}

fn base_scenario() -> ScenarioConfig {
    ScenarioConfig {
        num_seconds: 100,
        delta_time: 5,
        ..Default::default()
    }
}

#[test]
fn fixed_cycle_steps_to_the_end_without_actions() {
    let mut env = ScriptedEnv::new(&["t1", "t2"], 12);
    let mut agent = FixedCycleAgent::new("fixed", "#7f7f7f");
    let scenario = agent.scenario(&base_scenario());

    let mut snapshots = 0;
    agent
        .run(&mut env, &scenario, &mut |_snap| snapshots += 1)
        .unwrap();

    assert_eq!(snapshots, 12);
    assert_eq!(env.resets, 1);
    assert!(env.actions_seen.iter().all(Actions::is_empty));
}

#[test]
fn ql_agent_controls_every_signal_each_interval() {
    let mut env = ScriptedEnv::new(&["t1", "t2"], 20);
    let mut agent = QlAgent::new("ql", "#1f77b4", QlConfig::default());
    let scenario = agent.scenario(&base_scenario());

    let mut snapshots = 0;
    agent
        .run(&mut env, &scenario, &mut |_snap| snapshots += 1)
        .unwrap();

    assert_eq!(snapshots, 20);
    for actions in &env.actions_seen {
        assert_eq!(actions.len(), 2);
        assert!(actions.contains_key("t1") && actions.contains_key("t2"));
    }
}

#[test]
fn ql_agent_forwards_the_simulator_metrics() {
    let mut env = ScriptedEnv::new(&["t1"], 5);
    let mut agent = QlAgent::new("ql", "#1f77b4", QlConfig::default());
    let scenario = agent.scenario(&base_scenario());

    let mut speeds = Vec::new();
    agent
        .run(&mut env, &scenario, &mut |snap| {
            speeds.push(snap["system_mean_speed"]);
        })
        .unwrap();

    assert_eq!(speeds.len(), 5);
    assert!(speeds.iter().all(|&v| v > 9.0));
}

#[test]
fn dqn_agent_spends_the_full_step_budget_across_episodes() {
    // 100 simulated seconds at delta_time 5: a 20 step budget, while the
    // scripted episode ends after 8 steps, so the loop has to reset.
    let mut env = ScriptedEnv::new(&["t1"], 8);
    let cfg = DqnConfig {
        hidden_layers: vec![8],
        batch_size: 4,
        buffer_size: 64,
        target_update_interval: 10,
        ..Default::default()
    };
    let mut agent = DqnAgent::<DqnBackend>::new("dqn", "#ff7f0e", cfg);
    let scenario = agent.scenario(&base_scenario());
    assert!(scenario.single_agent);

    let mut snapshots = 0;
    agent
        .run(&mut env, &scenario, &mut |_snap| snapshots += 1)
        .unwrap();

    assert_eq!(snapshots, 20);
    assert_eq!(env.resets, 3);
    assert_eq!(env.actions_seen.len(), 20);
    assert!(env.actions_seen.iter().all(|a| a.len() == 1));
}
