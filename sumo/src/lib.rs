extern crate rand;
extern crate reqwest;
extern crate serde;
extern crate serde_json;

use rand::Rng;
use reqwest::{
    blocking::Client,
    header::{HeaderMap, HeaderValue, CONTENT_TYPE},
};
use serde::{Deserialize, Serialize};
use serde_json::{to_value, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::error::Error;

pub type SumoResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

/// Observation/action space of a single traffic signal, as reported by the
/// bridge. Signals expose a Discrete action space (one action per green
/// phase) and a Box observation space (phase one-hot, min-green flag, lane
/// densities and queues).
#[derive(Debug, Clone, PartialEq)]
pub enum Space {
    Discrete {
        n: i64,
    },

    Box {
        shape: Vec<usize>,
        low: Vec<f64>,
        high: Vec<f64>,
    },
}

impl Space {
    pub fn from_json(info: &Map<String, Value>) -> SumoResult<Self> {
        match info["name"].as_str().ok_or("No space name returned.")? {
            "Discrete" => {
                let n = info["n"].as_i64().ok_or("Discrete space without n.")?;
                Ok(Space::Discrete { n })
            }
            "Box" => Ok(Space::Box {
                shape: as_usize_vec(&info["shape"])?,
                low: as_f64_vec(&info["low"])?,
                high: as_f64_vec(&info["high"])?,
            }),
            e => Err(format!("Unrecognized space name: {e}").into()),
        }
    }

    /// Number of discrete actions, if this is an action space.
    pub fn discrete_n(&self) -> Option<i64> {
        match self {
            Space::Discrete { n } => Some(*n),
            _ => None,
        }
    }

    /// Flattened observation length, if this is a Box space.
    pub fn box_len(&self) -> Option<usize> {
        match self {
            Space::Box { shape, .. } => Some(shape.iter().copied().product()),
            _ => None,
        }
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> SpaceSample {
        match self {
            Space::Discrete { n } => SpaceSample::Discrete(rng.gen_range(0..*n)),
            Space::Box { shape, low, high } => {
                let len: usize = shape.iter().copied().product();
                let vals = (0..len)
                    .map(|i| rng.gen_range(low[i]..=high[i]))
                    .collect::<Vec<_>>();
                SpaceSample::Box(vals)
            }
        }
    }

    fn obs_from_json(&self, vals: &[Value]) -> SumoResult<Vec<f64>> {
        if let Space::Box { shape, .. } = self {
            let len: usize = shape.iter().copied().product();
            if vals.len() != len {
                return Err(format!(
                    "Observation length {} does not match space shape {}.",
                    vals.len(),
                    len
                )
                .into());
            }
        }

        vals.iter()
            .map(|v| v.as_f64().ok_or_else(|| "Non-numeric observation.".into()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpaceSample {
    Discrete(i64),
    Box(Vec<f64>),
}

impl SpaceSample {
    pub fn discrete_value(&self) -> Option<i64> {
        match self {
            Self::Discrete(n) => Some(*n),
            _ => None,
        }
    }
}

/// Scenario settings forwarded verbatim as kwargs when the bridge
/// instantiates the simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub net_file: String,
    pub route_file: String,
    /// Simulated horizon in seconds.
    pub num_seconds: u32,
    /// Seconds between two control decisions.
    pub delta_time: u32,
    pub yellow_time: u32,
    pub min_green: u32,
    pub max_green: u32,
    /// Let the simulator run the timing plan from the net file instead of
    /// acting on external phase choices.
    pub fixed_ts: bool,
    /// Collapse the scenario to its only signal (plain obs/reward instead of
    /// per-signal maps on the wire; this client re-wraps either form).
    pub single_agent: bool,
    pub use_gui: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sumo_seed: Option<u64>,
    pub add_system_info: bool,
    pub add_per_agent_info: bool,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            net_file: "nets/2way-single-intersection/single-intersection.net.xml".to_string(),
            route_file: "nets/2way-single-intersection/single-intersection-vhvh.rou.xml"
                .to_string(),
            num_seconds: 20000,
            delta_time: 5,
            yellow_time: 2,
            min_green: 5,
            max_green: 50,
            fixed_ts: false,
            single_agent: false,
            use_gui: false,
            sumo_seed: None,
            add_system_info: true,
            add_per_agent_info: true,
        }
    }
}

/// Observations keyed by traffic-signal id.
pub type Observations = HashMap<String, Vec<f64>>;

/// Chosen green phase keyed by traffic-signal id. An empty map steps the
/// simulator without overriding any phase (fixed timing plans).
pub type Actions = HashMap<String, i64>;

/// Aggregate per-step measurements from the simulator info dict
/// (system_mean_speed, agents_total_stopped, ...).
pub type MetricSnapshot = BTreeMap<String, f64>;

/// Outcome of advancing the simulation by one control interval.
#[derive(Debug, Clone)]
pub struct SumoStep {
    pub observations: Observations,
    pub rewards: HashMap<String, f64>,
    pub done: bool,
    pub metrics: MetricSnapshot,
}

#[derive(Debug, Clone)]
pub struct SumoClient {
    base_url: String,
    api_url: String,
    client: Client,
}

impl SumoClient {
    pub fn new(base_url: &str) -> SumoResult<Self> {
        let mut base_url = base_url.replace("//localhost:", "//127.0.0.1:");
        if base_url.ends_with('/') {
            _ = base_url.remove(base_url.len() - 1);
        }

        let api_url = format!("{base_url}/v1/envs/");

        Ok(Self {
            base_url,
            api_url,
            client: Client::builder().build()?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Scenario instances currently open on the bridge.
    pub fn open_instances(&self) -> SumoResult<HashMap<String, String>> {
        let val = self.http_get(&self.api_url)?;
        let obj = val["all_envs"]
            .as_object()
            .ok_or("No all_envs returned.")?;

        Ok(obj
            .iter()
            .map(|(k, v)| (k.clone(), v.as_str().unwrap_or_default().to_string()))
            .collect())
    }

    fn make_api_url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    fn http_get(&self, url: &str) -> SumoResult<Value> {
        let res = self
            .client
            .get(url)
            .headers(Self::construct_common_headers())
            .send()?;

        Ok(res.json::<Value>()?)
    }

    fn http_post(&self, url: &str, body: &HashMap<&str, Value>) -> SumoResult<Value> {
        let res = self
            .client
            .post(url)
            .headers(Self::construct_common_headers())
            .json(body)
            .send()?;

        Ok(res.json::<Value>()?)
    }

    fn construct_common_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }
}

/// One scenario instance on the bridge.
///
/// All APIs are sync: the bridge is expected to run next to the experiment
/// process and each step blocks on the simulator anyway.
#[derive(Debug)]
pub struct SumoEnvironment {
    client: SumoClient,
    instance_id: String,
    signal_ids: Vec<String>,
    obs_spaces: HashMap<String, Space>,
    act_spaces: HashMap<String, Space>,
}

impl SumoEnvironment {
    /// Instantiate the scenario on the bridge and fetch signal ids and
    /// per-signal spaces.
    pub fn create(client: SumoClient, scenario: &ScenarioConfig) -> SumoResult<Self> {
        let body = HashMap::from([("kwargs", to_value(scenario)?)]);
        let obj = client.http_post(&client.api_url, &body)?;
        let instance_id = obj["instance_id"]
            .as_str()
            .ok_or("No instance_id returned.")?
            .to_string();

        Self::reference(client, &instance_id)
    }

    /// Attach to an already-open instance.
    pub fn reference(client: SumoClient, instance_id: &str) -> SumoResult<Self> {
        let url = client.make_api_url(&format!("{instance_id}/signals/"));
        let obj = client.http_get(&url)?;
        let signal_ids = obj["signals"]
            .as_array()
            .ok_or("No signals returned.")?
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| "Non-string signal id.".into())
            })
            .collect::<SumoResult<Vec<_>>>()?;

        let obs_spaces = Self::fetch_spaces(&client, instance_id, "observation_space")?;
        let act_spaces = Self::fetch_spaces(&client, instance_id, "action_space")?;

        Ok(Self {
            client,
            instance_id: instance_id.to_string(),
            signal_ids,
            obs_spaces,
            act_spaces,
        })
    }

    fn fetch_spaces(
        client: &SumoClient,
        instance_id: &str,
        which: &str,
    ) -> SumoResult<HashMap<String, Space>> {
        let url = client.make_api_url(&format!("{instance_id}/{which}/"));
        let obj = client.http_get(&url)?;
        let info = obj["info"]
            .as_object()
            .ok_or("No space info returned.")?;

        info.iter()
            .map(|(ts, v)| {
                let space = v
                    .as_object()
                    .ok_or("Malformed space info.")
                    .map_err(Box::<dyn Error + Send + Sync>::from)
                    .and_then(Space::from_json)?;
                Ok((ts.clone(), space))
            })
            .collect()
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn signal_ids(&self) -> &[String] {
        &self.signal_ids
    }

    pub fn observation_space(&self, signal: &str) -> Option<&Space> {
        self.obs_spaces.get(signal)
    }

    pub fn action_space(&self, signal: &str) -> Option<&Space> {
        self.act_spaces.get(signal)
    }

    /// Restart the simulation and return the initial per-signal observations.
    pub fn reset(&self, seed: Option<u64>) -> SumoResult<Observations> {
        let mut body = HashMap::new();
        if let Some(seed) = seed {
            body.insert("seed", to_value(seed)?);
        }

        let url = self.make_url("reset/");
        let obj = self.client.http_post(&url, &body)?;
        self.observations_from_json(&obj["observations"])
    }

    /// Advance the simulation by one control interval (`delta_time` seconds).
    ///
    /// Stepping a finished episode is a protocol error on the bridge and
    /// surfaces as `Err` here.
    pub fn step(&self, actions: &Actions) -> SumoResult<SumoStep> {
        for (ts, phase) in actions {
            let n = self
                .act_spaces
                .get(ts)
                .and_then(Space::discrete_n)
                .ok_or_else(|| format!("Unknown signal id: {ts}"))?;
            if *phase < 0 || *phase >= n {
                return Err(format!("Phase {phase} out of range for signal {ts}.").into());
            }
        }

        let body = HashMap::from([("actions", to_value(actions)?)]);
        let url = self.make_url("step/");
        let obj = self.client.http_post(&url, &body)?;

        let observations = self.observations_from_json(&obj["observations"])?;
        let rewards = obj["rewards"]
            .as_object()
            .ok_or("No rewards returned.")?
            .iter()
            .map(|(ts, v)| {
                v.as_f64()
                    .map(|r| (ts.clone(), r))
                    .ok_or_else(|| "Non-numeric reward.".into())
            })
            .collect::<SumoResult<HashMap<_, _>>>()?;
        let done = obj["done"].as_bool().ok_or("No done flag returned.")?;
        let metrics = metrics_from_info(&obj["info"]);

        Ok(SumoStep {
            observations,
            rewards,
            done,
            metrics,
        })
    }

    pub fn close(&self) -> SumoResult<()> {
        let url = self.make_url("close/");
        self.client.http_post(&url, &HashMap::new())?;
        Ok(())
    }

    fn make_url(&self, path: &str) -> String {
        self.client
            .make_api_url(&format!("{}/{path}", self.instance_id))
    }

    fn observations_from_json(&self, val: &Value) -> SumoResult<Observations> {
        let obj = val.as_object().ok_or("No observations returned.")?;

        obj.iter()
            .map(|(ts, v)| {
                let space = self
                    .obs_spaces
                    .get(ts)
                    .ok_or_else(|| format!("Observation for unknown signal {ts}."))?;
                let vals = v.as_array().ok_or("Malformed observation.")?;
                Ok((ts.clone(), space.obs_from_json(vals)?))
            })
            .collect()
    }
}

/// Pull the numeric fields out of the step info dict. Non-numeric entries
/// (`step` bookkeeping aside, the bridge occasionally adds string fields)
/// are skipped rather than rejected.
pub fn metrics_from_info(info: &Value) -> MetricSnapshot {
    info.as_object()
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_f64().map(|x| (k.clone(), x)))
                .collect()
        })
        .unwrap_or_default()
}

fn as_usize_vec(val: &Value) -> SumoResult<Vec<usize>> {
    val.as_array()
        .ok_or("Expected a JSON array.")?
        .iter()
        .map(|x| {
            x.as_u64()
                .map(|n| n as usize)
                .ok_or_else(|| "Non-integer array entry.".into())
        })
        .collect()
}

fn as_f64_vec(val: &Value) -> SumoResult<Vec<f64>> {
    val.as_array()
        .ok_or("Expected a JSON array.")?
        .iter()
        .map(|x| x.as_f64().ok_or_else(|| "Non-numeric array entry.".into()))
        .collect()
}
