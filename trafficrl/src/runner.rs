//! Wires an agent to a live bridge environment and persists the run
//! artifacts: per-run CSV, combined per-metric plots.

use anyhow::{anyhow, Result};
use clap::ValueEnum;
use sumo::{MetricSnapshot, ScenarioConfig, SumoClient, SumoEnvironment};
use tracing::{debug, info, warn};

use crate::agents::{
    DqnAgent, DqnBackend, FixedCycleAgent, QlAgent, TrafficAgent,
};
use crate::config::ExperimentConfig;
use crate::metrics::{run_output_stem, write_csv, Metric, MetricCallback, MetricHistory};
use crate::plot::{parse_color, render_all, AgentSeries};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Strategy {
    /// Fixed-cycle timing plan from the net file (baseline).
    Fixed,
    /// Tabular Q-learning, one learner per signal.
    QLearning,
    /// Deep Q-learning on the single-signal scenario.
    Dqn,
}

pub fn build_agent(cfg: &ExperimentConfig, strategy: Strategy) -> Box<dyn TrafficAgent> {
    match strategy {
        Strategy::Fixed => Box::new(FixedCycleAgent::new(&cfg.fixed.name, &cfg.fixed.color)),
        Strategy::QLearning => Box::new(QlAgent::new(
            &cfg.ql.name,
            &cfg.ql.color,
            cfg.ql.hyper.clone(),
        )),
        Strategy::Dqn => Box::new(DqnAgent::<DqnBackend>::new(
            &cfg.dqn.name,
            &cfg.dqn.color,
            cfg.dqn.hyper.clone(),
        )),
    }
}

/// Run one agent against a fresh environment instance, forwarding every
/// recorded metric value to `on_metric` and returning the run history.
pub fn run_experiment(
    api_url: &str,
    base: &ScenarioConfig,
    agent: &mut dyn TrafficAgent,
    on_metric: &mut MetricCallback,
) -> Result<MetricHistory> {
    let scenario = agent.scenario(base);
    let client = SumoClient::new(api_url).map_err(|e| anyhow!(e))?;
    let mut env = SumoEnvironment::create(client, &scenario).map_err(|e| anyhow!(e))?;

    let mut history = MetricHistory::new();
    let name = agent.name().to_string();
    let result = {
        let mut hook = |snapshot: &MetricSnapshot| {
            history.append(snapshot);
            for metric in Metric::ALL {
                if let Some(&value) = snapshot.get(metric.wire_name()) {
                    on_metric(&name, metric, value);
                }
            }
        };
        agent.run(&mut env, &scenario, &mut hook)
    };

    // Free the instance even when the run failed mid-episode.
    if let Err(e) = env.close() {
        warn!(agent = name.as_str(), error = %e, "could not close environment");
    }
    result.map_err(|e| anyhow!(e))?;

    Ok(history)
}

/// Run the selected strategies sequentially, then render the comparison
/// plots across all finished runs.
pub fn run_all(cfg: &ExperimentConfig, strategies: &[Strategy]) -> Result<()> {
    let mut runs = Vec::new();

    for &strategy in strategies {
        let mut agent = build_agent(cfg, strategy);
        let scenario = agent.scenario(&cfg.scenario);
        info!(
            agent = agent.name(),
            num_seconds = scenario.num_seconds,
            "starting run"
        );

        let mut on_metric = |agent: &str, metric: Metric, value: f64| {
            debug!(agent, %metric, value, "metric");
        };
        let history = run_experiment(&cfg.api_url, &cfg.scenario, agent.as_mut(), &mut on_metric)?;

        let stem = run_output_stem(&cfg.out_dir, agent.name(), &scenario_params(&scenario));
        let csv = write_csv(&history, &stem)?;
        info!(
            agent = agent.name(),
            csv = %csv.display(),
            steps = history.len(),
            "run finished"
        );

        let color = parse_color(agent.color())
            .ok_or_else(|| anyhow!("agent {} has a malformed color {}", agent.name(), agent.color()))?;
        runs.push(AgentSeries {
            name: agent.name().to_string(),
            color,
            history,
        });
    }

    let plots = render_all(&cfg.out_dir, &runs)?;
    info!(count = plots.len(), "plots written");

    Ok(())
}

fn scenario_params(scenario: &ScenarioConfig) -> Vec<(&'static str, String)> {
    vec![
        ("num_seconds", scenario.num_seconds.to_string()),
        ("delta_time", scenario.delta_time.to_string()),
        ("yellow_time", scenario.yellow_time.to_string()),
        ("min_green", scenario.min_green.to_string()),
        ("max_green", scenario.max_green.to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_agent_uses_configured_names_and_colors() {
        let cfg = ExperimentConfig::default();

        let fixed = build_agent(&cfg, Strategy::Fixed);
        assert_eq!(fixed.name(), "fixed");
        let ql = build_agent(&cfg, Strategy::QLearning);
        assert_eq!(ql.name(), "ql");
        let dqn = build_agent(&cfg, Strategy::Dqn);
        assert_eq!(dqn.name(), "dqn");
        assert!(parse_color(dqn.color()).is_some());
    }

    #[test]
    fn strategies_pick_their_scenario_variant() {
        let cfg = ExperimentConfig::default();
        let base = &cfg.scenario;

        let fixed = build_agent(&cfg, Strategy::Fixed).scenario(base);
        assert!(fixed.fixed_ts);
        assert!(!fixed.single_agent);
        assert_eq!(fixed.num_seconds, base.num_seconds - base.delta_time);

        let ql = build_agent(&cfg, Strategy::QLearning).scenario(base);
        assert!(!ql.fixed_ts);
        assert!(!ql.single_agent);

        let dqn = build_agent(&cfg, Strategy::Dqn).scenario(base);
        assert!(!dqn.fixed_ts);
        assert!(dqn.single_agent);
        assert_eq!(dqn.num_seconds, base.num_seconds);
    }
}
