//! Per-cycle data model.
//!
//! Agent responses are free-form JSON, so every type here decodes totally from
//! a [`serde_json::Value`]: missing keys, wrong types and unknown event kinds
//! fall back to defaults or are skipped, never rejected.

use serde::ser::{Serialize, SerializeSeq, Serializer};
use serde_json::{Map, Value};

/// Length of the encoded sensory vector handed to the reservoir.
pub const VECTOR_SIZE: usize = 256;

const DEFAULT_STRENGTH: f32 = 1.0;
const DEFAULT_INTENSITY: f32 = 1.0;
const DEFAULT_RECEPTOR: &str = "default";
const DEFAULT_CLUSTER_LABEL: &str = "ng";
const DEFAULT_CLUSTER_SIZE: i64 = 32;

/// One perception event requested by the translator.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NeuralInputEvent {
    TextEmbedding {
        #[serde(skip_serializing_if = "Option::is_none")]
        tokens: Option<Vec<i64>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        seed_embedding: Option<Vec<f32>>,
        strength: f32,
    },
    SensoryStim {
        receptor: String,
        intensity: f32,
    },
}

impl NeuralInputEvent {
    /// Decode a single event. Returns `None` for non-objects and unknown kinds.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        match obj.get("kind").and_then(Value::as_str)? {
            "text_embedding" => Some(NeuralInputEvent::TextEmbedding {
                tokens: obj
                    .get("tokens")
                    .and_then(Value::as_array)
                    .map(|arr| arr.iter().map(int_or_zero).collect()),
                seed_embedding: float_array(obj, "seed_embedding"),
                strength: float_or(obj, "strength", DEFAULT_STRENGTH),
            }),
            "sensory_stim" => Some(NeuralInputEvent::SensoryStim {
                receptor: string_or(obj, "receptor", DEFAULT_RECEPTOR),
                intensity: float_or(obj, "intensity", DEFAULT_INTENSITY),
            }),
            _ => None,
        }
    }
}

/// Request for a new labelled neuron cluster.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct NeurogenesisRequest {
    pub label: String,
    pub cluster_size: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed_embedding: Option<Vec<f32>>,
}

impl NeurogenesisRequest {
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        Some(NeurogenesisRequest {
            label: string_or(obj, "label", DEFAULT_CLUSTER_LABEL),
            cluster_size: obj
                .get("cluster_size")
                .map(int_or_zero)
                .unwrap_or(DEFAULT_CLUSTER_SIZE),
            seed_embedding: float_array(obj, "seed_embedding"),
        })
    }
}

/// Something worth remembering, flagged by either agent.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct MemoryFlag {
    pub summary: String,
    pub importance: f32,
}

impl MemoryFlag {
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        Some(MemoryFlag {
            summary: string_or(obj, "summary", ""),
            importance: float_or(obj, "importance", 0.0),
        })
    }
}

/// Structured output of the translator step.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct TranslatorOutput {
    pub neural_inputs: Vec<NeuralInputEvent>,
    pub neurogenesis: Vec<NeurogenesisRequest>,
    pub memory_flags: Vec<MemoryFlag>,
}

impl TranslatorOutput {
    /// Total decoding: anything that is not a well-formed section is empty.
    pub fn from_value(value: &Value) -> Self {
        TranslatorOutput {
            neural_inputs: decode_each(value, "neural_inputs", NeuralInputEvent::from_value),
            neurogenesis: decode_each(value, "neurogenesis", NeurogenesisRequest::from_value),
            memory_flags: decode_each(value, "memory_flags", MemoryFlag::from_value),
        }
    }
}

/// Structured output of the cognitive step.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct CognitiveOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_text: Option<String>,
    pub behavior_directives: Map<String, Value>,
    pub archive: Vec<MemoryFlag>,
}

impl CognitiveOutput {
    pub fn from_value(value: &Value) -> Self {
        let user_text = match value.get("user_text") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        };
        CognitiveOutput {
            user_text,
            behavior_directives: value
                .get("behavior_directives")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
            archive: decode_each(value, "archive", MemoryFlag::from_value),
        }
    }
}

/// Fixed-size sensory vector consumed by the reservoir.
#[derive(Debug, Clone, PartialEq)]
pub struct InputVector([f32; VECTOR_SIZE]);

impl InputVector {
    pub fn zeros() -> Self {
        InputVector([0.0; VECTOR_SIZE])
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.0
    }

    pub fn len(&self) -> usize {
        VECTOR_SIZE
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Largest component (0.0 for the zero vector).
    pub fn max(&self) -> f32 {
        self.0.iter().copied().fold(0.0, f32::max)
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&v| v == 0.0)
    }

    /// Number of non-zero components.
    pub fn active(&self) -> usize {
        self.0.iter().filter(|&&v| v != 0.0).count()
    }
}

impl Default for InputVector {
    fn default() -> Self {
        Self::zeros()
    }
}

impl std::ops::Index<usize> for InputVector {
    type Output = f32;

    fn index(&self, idx: usize) -> &f32 {
        &self.0[idx]
    }
}

impl Serialize for InputVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(VECTOR_SIZE))?;
        for v in &self.0 {
            seq.serialize_element(v)?;
        }
        seq.end()
    }
}

fn decode_each<T>(value: &Value, key: &str, decode: fn(&Value) -> Option<T>) -> Vec<T> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(decode).collect())
        .unwrap_or_default()
}

fn int_or_zero(value: &Value) -> i64 {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
        .unwrap_or(0)
}

/// Narrow to f32, saturating at the finite range instead of overflowing to inf.
fn saturate_f32(f: f64) -> f32 {
    if f.is_nan() {
        0.0
    } else {
        f.clamp(-(f32::MAX as f64), f32::MAX as f64) as f32
    }
}

fn float_or(obj: &Map<String, Value>, key: &str, default: f32) -> f32 {
    obj.get(key)
        .and_then(Value::as_f64)
        .map(saturate_f32)
        .unwrap_or(default)
}

fn string_or(obj: &Map<String, Value>, key: &str, default: &str) -> String {
    obj.get(key)
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

fn float_array(obj: &Map<String, Value>, key: &str) -> Option<Vec<f32>> {
    obj.get(key).and_then(Value::as_array).map(|arr| {
        arr.iter()
            .map(|v| saturate_f32(v.as_f64().unwrap_or(0.0)))
            .collect()
    })
}
