//! Deterministic sensory encoder.
//!
//! Turns a [`TranslatorOutput`] into the fixed-size [`InputVector`] fed to the
//! reservoir. The passes run in a fixed order (text embeddings, sensory
//! stimuli, neurogenesis, normalization) and the order is observable in the
//! result, so it must not be rearranged.

use crate::types::{InputVector, NeuralInputEvent, TranslatorOutput, VECTOR_SIZE};

/// Odd multiplicative constant (Knuth) used to scatter token ids.
pub const TOKEN_HASH_MULTIPLIER: u64 = 2_654_435_761;

/// Width of the falloff window written by a sensory stimulus.
pub const STIM_WINDOW: usize = 6;

const SEED_SCALE: f32 = 0.1;
const NEUROGENESIS_BUMP: f32 = 1.0;

/// Vector slot for a token: multiplicative hash, upper bits, folded to 256.
pub fn token_index(token: i64) -> usize {
    (((token as u64).wrapping_mul(TOKEN_HASH_MULTIPLIER) >> 16) % VECTOR_SIZE as u64) as usize
}

/// Additive contribution of a token, in `[0.005, 0.995]` for any sign.
pub fn token_weight(token: i64) -> f32 {
    0.5 + (token % 100) as f32 / 200.0
}

/// 31-multiplier polynomial hash over UTF-16 code units, absolute value.
///
/// Matches the hash the mobile client uses for receptor ids and cluster
/// labels, so both sides place the same stimulus in the same slot.
pub fn stable_hash(s: &str) -> u32 {
    s.encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(unit as i32))
        .unsigned_abs()
}

fn slot(s: &str) -> usize {
    stable_hash(s) as usize % VECTOR_SIZE
}

/// Pure encoder from translator output to reservoir input.
#[derive(Debug, Clone, Copy, Default)]
pub struct SensoryEncoder;

impl SensoryEncoder {
    pub fn new() -> Self {
        SensoryEncoder
    }

    /// Encode and normalize. The result is either all zero or has max 1.0.
    pub fn encode(&self, output: &TranslatorOutput) -> InputVector {
        let mut vector = self.accumulate(output);
        normalize(&mut vector);
        vector
    }

    /// Run every additive pass without the final normalization.
    pub fn accumulate(&self, output: &TranslatorOutput) -> InputVector {
        let mut vector = InputVector::zeros();
        let v = vector.as_mut_slice();

        for event in &output.neural_inputs {
            if let NeuralInputEvent::TextEmbedding {
                tokens,
                seed_embedding,
                strength,
            } = event
            {
                if let Some(tokens) = tokens {
                    for &t in tokens {
                        v[token_index(t)] += token_weight(t);
                    }
                } else if let Some(seed) = seed_embedding {
                    for (k, &value) in seed.iter().enumerate() {
                        v[k % VECTOR_SIZE] += value * SEED_SCALE;
                    }
                }
                // Strength scales the whole vector, so it compounds across events.
                for x in v.iter_mut() {
                    *x *= strength;
                }
            }
        }

        for event in &output.neural_inputs {
            if let NeuralInputEvent::SensoryStim {
                receptor,
                intensity,
            } = event
            {
                let base = slot(receptor);
                for w in 0..STIM_WINDOW {
                    let falloff = 1.0 - w as f32 / STIM_WINDOW as f32;
                    v[(base + w) % VECTOR_SIZE] += intensity * falloff;
                }
            }
        }

        for request in &output.neurogenesis {
            v[slot(&request.label)] += NEUROGENESIS_BUMP;
        }

        vector
    }
}

/// Overflow saturates to the finite range and NaN becomes 0, so the reservoir
/// only ever sees finite input.
fn saturate(vector: &mut InputVector) {
    for x in vector.as_mut_slice() {
        if x.is_nan() {
            *x = 0.0;
        } else if x.is_infinite() {
            *x = x.signum() * f32::MAX;
        }
    }
}

fn normalize(vector: &mut InputVector) {
    saturate(vector);
    let max = vector.max();
    if max > 0.0 {
        for x in vector.as_mut_slice() {
            *x /= max;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MemoryFlag, NeurogenesisRequest};

    fn text(tokens: &[i64], strength: f32) -> NeuralInputEvent {
        NeuralInputEvent::TextEmbedding {
            tokens: Some(tokens.to_vec()),
            seed_embedding: None,
            strength,
        }
    }

    fn stim(receptor: &str, intensity: f32) -> NeuralInputEvent {
        NeuralInputEvent::SensoryStim {
            receptor: receptor.to_string(),
            intensity,
        }
    }

    fn with_inputs(neural_inputs: Vec<NeuralInputEvent>) -> TranslatorOutput {
        TranslatorOutput {
            neural_inputs,
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_output_encodes_to_zero() {
        let v = SensoryEncoder::new().encode(&TranslatorOutput::default());
        assert_eq!(v.len(), VECTOR_SIZE);
        assert!(v.is_zero());
    }

    #[test]
    fn test_single_token() {
        assert_eq!(token_index(5), 21);

        let encoder = SensoryEncoder::new();
        let out = with_inputs(vec![text(&[5], 1.0)]);

        let raw = encoder.accumulate(&out);
        assert!((raw[21] - 0.525).abs() < 1e-6);

        let v = encoder.encode(&out);
        assert_eq!(v[21], 1.0);
        assert_eq!(v.active(), 1);
    }

    #[test]
    fn test_strength_compounds_in_order() {
        assert_eq!(token_index(6), 76);

        let out = with_inputs(vec![text(&[5], 2.0), text(&[6], 3.0)]);
        let raw = SensoryEncoder::new().accumulate(&out);

        // First event is scaled by both strengths, second only by its own.
        assert!((raw[21] - 0.525 * 6.0).abs() < 1e-5);
        assert!((raw[76] - 0.53 * 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_strength_applies_without_tokens() {
        let out = with_inputs(vec![
            text(&[5], 1.0),
            NeuralInputEvent::TextEmbedding {
                tokens: None,
                seed_embedding: None,
                strength: 0.5,
            },
        ]);
        let raw = SensoryEncoder::new().accumulate(&out);
        assert!((raw[21] - 0.2625).abs() < 1e-6);
    }

    #[test]
    fn test_tokens_take_precedence_over_seed() {
        let out = with_inputs(vec![NeuralInputEvent::TextEmbedding {
            tokens: Some(vec![]),
            seed_embedding: Some(vec![9.0; 4]),
            strength: 1.0,
        }]);
        assert!(SensoryEncoder::new().accumulate(&out).is_zero());
    }

    #[test]
    fn test_seed_embedding_wraps() {
        let mut seed = vec![0.0; VECTOR_SIZE + 2];
        seed[1] = 2.0;
        seed[VECTOR_SIZE + 1] = 3.0;
        let out = with_inputs(vec![NeuralInputEvent::TextEmbedding {
            tokens: None,
            seed_embedding: Some(seed),
            strength: 1.0,
        }]);
        let raw = SensoryEncoder::new().accumulate(&out);
        assert!((raw[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_negative_tokens_stay_in_range() {
        let idx = token_index(-7);
        assert!(idx < VECTOR_SIZE);
        assert!((token_weight(-7) - 0.465).abs() < 1e-6);
    }

    #[test]
    fn test_stim_window_falloff() {
        assert_eq!(stable_hash("a"), 97);

        let raw = SensoryEncoder::new().accumulate(&with_inputs(vec![stim("a", 1.2)]));
        for w in 0..STIM_WINDOW {
            let expected = 1.2 * (1.0 - w as f32 / 6.0);
            assert!((raw[97 + w] - expected).abs() < 1e-6);
        }
        assert_eq!(raw.active(), STIM_WINDOW);
    }

    #[test]
    fn test_stim_window_wraps_around() {
        // U+00FF hashes to 255, the last slot.
        let raw = SensoryEncoder::new().accumulate(&with_inputs(vec![stim("\u{ff}", 1.0)]));
        assert_eq!(raw[255], 1.0);
        assert!(raw[0] > 0.0);
        assert!(raw[4] > 0.0);
        assert_eq!(raw[5], 0.0);
    }

    #[test]
    fn test_stim_is_not_scaled_by_strength() {
        let out = with_inputs(vec![stim("a", 1.0), text(&[], 10.0)]);
        let raw = SensoryEncoder::new().accumulate(&out);
        assert_eq!(raw[97], 1.0);
    }

    #[test]
    fn test_neurogenesis_bumps_label_slot() {
        let out = TranslatorOutput {
            neurogenesis: vec![NeurogenesisRequest {
                label: "ng".to_string(),
                cluster_size: 16,
                seed_embedding: None,
            }],
            memory_flags: vec![MemoryFlag {
                summary: "ignored by the encoder".to_string(),
                importance: 1.0,
            }],
            ..Default::default()
        };
        let v = SensoryEncoder::new().encode(&out);
        assert_eq!(v[185], 1.0);
        assert_eq!(v.active(), 1);
    }

    #[test]
    fn test_normalized_max_is_one_and_deterministic() {
        let out = with_inputs(vec![
            text(&[1, 2, 3, 250, -40], 1.5),
            stim("left_hand", 0.9),
            stim("pain", 2.0),
        ]);
        let encoder = SensoryEncoder::new();
        let a = encoder.encode(&out);
        let b = encoder.encode(&out);

        assert!((a.max() - 1.0).abs() < 1e-6);
        let bits_a: Vec<u32> = a.as_slice().iter().map(|x| x.to_bits()).collect();
        let bits_b: Vec<u32> = b.as_slice().iter().map(|x| x.to_bits()).collect();
        assert_eq!(bits_a, bits_b);
    }

    #[test]
    fn test_huge_strength_stays_finite() {
        let out = TranslatorOutput::from_value(&serde_json::json!({
            "neural_inputs": [{"kind": "text_embedding", "tokens": [5], "strength": 1e39}]
        }));
        let v = SensoryEncoder::new().encode(&out);

        assert!(v.as_slice().iter().all(|x| x.is_finite()));
        assert_eq!(v[21], 1.0);
        assert_eq!(v.active(), 1);
    }

    #[test]
    fn test_compounding_overflow_stays_finite() {
        let out = with_inputs(vec![text(&[5], 1e20), text(&[6], 1e20)]);
        let encoder = SensoryEncoder::new();
        assert!(encoder.accumulate(&out)[21].is_infinite());

        let v = encoder.encode(&out);
        assert!(v.as_slice().iter().all(|x| x.is_finite()));
        assert_eq!(v.max(), 1.0);
        assert_eq!(v[21], 1.0);
        assert!(v[76] > 0.0);
    }

    #[test]
    fn test_nan_from_zero_strength_after_overflow_is_cleared() {
        let out = with_inputs(vec![text(&[5], 1e20), text(&[6], 1e20), text(&[], 0.0)]);
        let v = SensoryEncoder::new().encode(&out);
        assert!(v.as_slice().iter().all(|x| x.is_finite()));
        assert!(v.is_zero());
    }

    #[test]
    fn test_negative_only_vector_is_left_unnormalized() {
        let out = with_inputs(vec![NeuralInputEvent::TextEmbedding {
            tokens: None,
            seed_embedding: Some(vec![-1.0]),
            strength: 1.0,
        }]);
        let v = SensoryEncoder::new().encode(&out);
        assert!((v[0] + 0.1).abs() < 1e-6);
    }
}
