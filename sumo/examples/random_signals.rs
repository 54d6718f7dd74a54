extern crate sumo;

use rand::rngs::StdRng;
use rand::SeedableRng;
use sumo::*;

fn main() -> SumoResult<()> {
    let client = SumoClient::new("http://localhost:40004")?;

    let instances = client.open_instances()?;
    println!("Open scenario instances: {instances:?}");

    let scenario = ScenarioConfig {
        num_seconds: 2000,
        ..Default::default()
    };
    let env = SumoEnvironment::create(client, &scenario)?;
    println!("signals: {:?}", env.signal_ids());

    let rng = &mut StdRng::seed_from_u64(2718);
    for ep in 0..5 {
        let _ = env.reset(Some(ep))?;
        let mut tot_reward = 0.;
        loop {
            let actions = env
                .signal_ids()
                .iter()
                .map(|ts| {
                    let phase = env
                        .action_space(ts)
                        .expect("signal id came from the env")
                        .sample(rng)
                        .discrete_value()
                        .expect("action spaces are discrete");
                    (ts.clone(), phase)
                })
                .collect::<Actions>();

            let step = env.step(&actions)?;
            tot_reward += step.rewards.values().sum::<f64>();

            if step.done {
                break;
            }
        }
        println!("Finished episode {ep} with total reward {tot_reward}");
    }

    env.close()
}
