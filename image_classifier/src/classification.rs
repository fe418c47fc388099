use serde::{ser::SerializeMap, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub label: String,
    pub probability: f32,
}

/// Top-ranked classes in non-increasing probability order.
///
/// Serializes as a JSON object whose key order is the rank order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Detections(pub Vec<Detection>);

impl Serialize for Detections {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for detection in &self.0 {
            map.serialize_entry(&detection.label, &(detection.probability as f64))?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Classification {
    pub detections: Detections,
}

pub fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Indices and values of the `k` largest probabilities, highest first.
pub fn top_k(probabilities: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut ranked: Vec<(usize, f32)> = probabilities.iter().copied().enumerate().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.truncate(k);
    ranked
}
