//! Default engine: leaky integrate-and-fire neurons with random sparse
//! fan-out. There is no learning rule; connectivity is fixed at initialize.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::Serialize;

use super::Reservoir;
use crate::encoder::TOKEN_HASH_MULTIPLIER;
use crate::error::ReservoirError;
use crate::types::InputVector;

/// Seed the mobile engine used, so connectivity matches across hosts.
pub const DEFAULT_SEED: u64 = 1337;

const LEAK: f32 = 0.92;
const THRESHOLD: f32 = 1.0;
const WEIGHT_STD_DEV: f32 = 0.08;

#[derive(Serialize)]
struct Summary {
    valence: f64,
    arousal: f64,
    top_anchors: Vec<String>,
}

pub struct LeakyReservoir {
    seed: u64,
    neurons: usize,
    potentials: Vec<f32>,
    spikes: Vec<bool>,
    /// CSR layout: targets of neuron `n` are `targets[offsets[n]..offsets[n + 1]]`.
    offsets: Vec<usize>,
    targets: Vec<usize>,
    weights: Vec<f32>,
    steps: u64,
}

impl Default for LeakyReservoir {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}

impl LeakyReservoir {
    pub fn new(seed: u64) -> Self {
        LeakyReservoir {
            seed,
            neurons: 0,
            potentials: Vec::new(),
            spikes: Vec::new(),
            offsets: Vec::new(),
            targets: Vec::new(),
            weights: Vec::new(),
            steps: 0,
        }
    }

    pub fn neuron_count(&self) -> usize {
        self.neurons
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn spike_count(&self) -> usize {
        self.spikes.iter().filter(|&&s| s).count()
    }

    fn ensure_ready(&self) -> Result<(), ReservoirError> {
        if self.neurons == 0 {
            Err(ReservoirError::NotInitialized)
        } else {
            Ok(())
        }
    }
}

/// Box-Muller draw from N(0, std_dev).
fn gaussian(rng: &mut ChaCha20Rng, std_dev: f32) -> f32 {
    let u1: f32 = rng.gen_range(f32::EPSILON..1.0);
    let u2: f32 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (std::f32::consts::TAU * u2).cos() * std_dev
}

impl Reservoir for LeakyReservoir {
    fn initialize(&mut self, neuron_count: i32, fanout: i32) -> bool {
        if neuron_count <= 0 || fanout < 0 {
            return false;
        }
        let neurons = neuron_count as usize;
        let fanout = fanout as usize;
        let mut rng = ChaCha20Rng::seed_from_u64(self.seed);

        let mut offsets = Vec::with_capacity(neurons + 1);
        let mut targets = Vec::with_capacity(neurons * fanout);
        let mut weights = Vec::with_capacity(neurons * fanout);
        for _ in 0..neurons {
            offsets.push(targets.len());
            for _ in 0..fanout {
                targets.push(rng.gen_range(0..neurons));
                weights.push(gaussian(&mut rng, WEIGHT_STD_DEV));
            }
        }
        offsets.push(targets.len());

        self.neurons = neurons;
        self.potentials = vec![0.0; neurons];
        self.spikes = vec![false; neurons];
        self.offsets = offsets;
        self.targets = targets;
        self.weights = weights;
        self.steps = 0;
        true
    }

    fn apply_inputs(&mut self, vector: &InputVector) -> Result<(), ReservoirError> {
        self.ensure_ready()?;
        // NaN never crosses the threshold, so it would never be reset.
        if let Some(i) = vector.as_slice().iter().position(|v| !v.is_finite()) {
            return Err(ReservoirError::engine(
                "apply_inputs",
                format!("non-finite input at slot {i}"),
            ));
        }
        for (i, &value) in vector.as_slice().iter().enumerate() {
            let idx = ((i as u64 * TOKEN_HASH_MULTIPLIER) % self.neurons as u64) as usize;
            self.potentials[idx] += value;
        }
        Ok(())
    }

    fn step(&mut self) -> Result<(), ReservoirError> {
        self.ensure_ready()?;
        self.spikes.fill(false);

        for n in 0..self.neurons {
            self.potentials[n] *= LEAK;
            if self.potentials[n] >= THRESHOLD {
                self.spikes[n] = true;
                self.potentials[n] = 0.0;
                for p in self.offsets[n]..self.offsets[n + 1] {
                    self.potentials[self.targets[p]] += self.weights[p];
                }
            }
        }
        self.steps += 1;
        Ok(())
    }

    fn export_summary(&mut self) -> Result<String, ReservoirError> {
        self.ensure_ready()?;
        let sample = (self.neurons / 8).max(1);
        let total = self.spike_count();
        let sampled = self.spikes[..sample.min(self.neurons)]
            .iter()
            .filter(|&&s| s)
            .count();

        let round3 = |x: f64| (x * 1000.0).round() / 1000.0;
        let summary = Summary {
            valence: round3(sampled as f64 / (sample + 1) as f64),
            arousal: round3(total as f64 / (self.neurons + 1) as f64),
            top_anchors: Vec::new(),
        };
        serde_json::to_string(&summary).map_err(|e| ReservoirError::engine("export", e.to_string()))
    }
}
