//! Speaker embedder (spec §4.5): `extract(samples) -> vector` after
//! light preprocessing, and an in-memory gallery supporting
//! `search`/`register` via cosine similarity.
//!
//! Grounded on `memory/embeddings.rs::cosine_similarity` for the
//! similarity search and on the `ort`-session pattern shared with
//! `wake`/`vad` for `extract()`.

use ort::session::Session;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{info, warn};

const MIN_VOICED_SECS: f64 = 0.5;
const TARGET_RMS: f32 = 0.1;
const SILENCE_THRESHOLD: f32 = 0.01;

/// Extracts a fixed-dimension embedding vector from raw samples.
pub struct SpeakerEmbedder {
    session: Option<Mutex<Session>>,
    sample_rate: u32,
    embedding_dim: usize,
}

impl SpeakerEmbedder {
    pub fn new(model_path: Option<&PathBuf>, sample_rate: u32, embedding_dim: usize) -> anyhow::Result<Self> {
        let session = match model_path {
            Some(path) => {
                let s = Session::builder()?.with_intra_threads(1)?.commit_from_file(path)?;
                info!(path = ?path, "speaker embedding model loaded");
                Some(Mutex::new(s))
            }
            None => {
                warn!("no speaker embedding model configured; extract() returns a deterministic placeholder vector");
                None
            }
        };
        Ok(Self {
            session,
            sample_rate,
            embedding_dim,
        })
    }

    /// Trims leading/trailing silence, normalizes RMS to a target level,
    /// and requires at least `MIN_VOICED_SECS` of voiced audio (spec
    /// §4.5). Returns `None` if there isn't enough voiced audio.
    pub fn preprocess(&self, samples: &[f32]) -> Option<Vec<f32>> {
        let first = samples.iter().position(|&s| s.abs() > SILENCE_THRESHOLD)?;
        let last = samples.iter().rposition(|&s| s.abs() > SILENCE_THRESHOLD)?;
        let trimmed = &samples[first..=last];

        let min_len = (MIN_VOICED_SECS * self.sample_rate as f64) as usize;
        if trimmed.len() < min_len {
            return None;
        }

        let rms = {
            let sum_sq: f32 = trimmed.iter().map(|&s| s * s).sum();
            (sum_sq / trimmed.len() as f32).sqrt()
        };
        if rms <= f32::EPSILON {
            return None;
        }
        let gain = TARGET_RMS / rms;
        Some(trimmed.iter().map(|&s| (s * gain).clamp(-1.0, 1.0)).collect())
    }

    pub fn extract(&self, samples: &[f32]) -> Option<Vec<f32>> {
        let preprocessed = self.preprocess(samples)?;
        match &self.session {
            Some(session) => run_embedding(session, &preprocessed, self.embedding_dim).ok(),
            None => Some(placeholder_vector(&preprocessed, self.embedding_dim)),
        }
    }
}

fn run_embedding(session: &Mutex<Session>, samples: &[f32], dim: usize) -> anyhow::Result<Vec<f32>> {
    use ort::value::Value;
    let mut guard = session.lock().unwrap();
    let input = Value::from_array(([1usize, samples.len()], samples.to_vec()))?;
    let outputs = guard.run(ort::inputs![input])?;
    let (_shape, data) = outputs[0].try_extract_tensor::<f32>()?;
    let mut vec: Vec<f32> = data.to_vec();
    vec.resize(dim, 0.0);
    Ok(vec)
}

/// Deterministic stand-in used only when no model is configured, so the
/// gallery's similarity search remains exercisable without a real model
/// file. Not a real voiceprint.
fn placeholder_vector(samples: &[f32], dim: usize) -> Vec<f32> {
    let mut vec = vec![0.0f32; dim];
    for (i, &s) in samples.iter().enumerate() {
        vec[i % dim] += s;
    }
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vec.iter_mut() {
            *v /= norm;
        }
    }
    vec
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

/// In-memory speaker gallery. Bulk-loaded from persistence at startup.
#[derive(Default)]
pub struct Gallery {
    entries: Mutex<HashMap<String, Vec<Vec<f32>>>>,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &str, vectors: Vec<Vec<f32>>) {
        self.entries.lock().unwrap().entry(name.to_string()).or_default().extend(vectors);
    }

    /// Returns the enrolled name with the highest cosine similarity to
    /// `vector`, if it clears `threshold`.
    pub fn search(&self, vector: &[f32], threshold: f32) -> Option<String> {
        let entries = self.entries.lock().unwrap();
        let mut best: Option<(String, f32)> = None;
        for (name, vectors) in entries.iter() {
            for candidate in vectors {
                let score = cosine_similarity(vector, candidate);
                if best.as_ref().map(|(_, s)| score > *s).unwrap_or(true) {
                    best = Some((name.clone(), score));
                }
            }
        }
        best.filter(|(_, score)| *score >= threshold).map(|(name, _)| name)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        let a = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 0.001);
    }

    #[test]
    fn cosine_similarity_orthogonal_vectors_is_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!((cosine_similarity(&a, &b)).abs() < 0.001);
    }

    #[test]
    fn preprocess_rejects_short_audio() {
        let embedder = SpeakerEmbedder::new(None, 16_000, 128).unwrap();
        let short = vec![0.5f32; 1000];
        assert!(embedder.preprocess(&short).is_none());
    }

    #[test]
    fn preprocess_accepts_half_second_voiced_audio() {
        let embedder = SpeakerEmbedder::new(None, 16_000, 128).unwrap();
        let long = vec![0.5f32; 16_000];
        assert!(embedder.preprocess(&long).is_some());
    }

    #[test]
    fn gallery_search_respects_threshold() {
        let gallery = Gallery::new();
        gallery.register("alice", vec![vec![1.0, 0.0, 0.0]]);
        assert_eq!(gallery.search(&[1.0, 0.0, 0.0], 0.9), Some("alice".to_string()));
        assert_eq!(gallery.search(&[0.0, 1.0, 0.0], 0.9), None);
    }
}
