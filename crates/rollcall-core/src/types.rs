use serde::{Deserialize, Serialize};

/// Embedding dimension produced by the FaceNet-style recognition model.
/// Every stored embedding must have exactly this length.
pub const EMBEDDING_DIM: usize = 512;

/// Maximum raw L2 distance for a probe to be accepted as a match.
///
/// A probe is accepted only when its distance is strictly below this bound.
pub const DEFAULT_DISTANCE_THRESHOLD: f32 = 1.0;

/// Bounding box for a detected face, in pixel coordinates of the source image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

/// Face embedding vector (512-dimensional, un-normalized).
///
/// Embeddings are compared by raw Euclidean distance; they are stored exactly
/// as the model produced them, without L2 normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Euclidean (L2) distance between two embeddings.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// An enrolled person: unique name, one embedding, optional contact fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub mobile: Option<String>,
    pub email: Option<String>,
    pub embedding: Embedding,
}

/// Result of matching a probe embedding against the enrolled gallery.
#[derive(Debug, Clone)]
pub struct MatchResult {
    /// Name of the accepted identity, or `None` when no gallery entry fell
    /// strictly below the threshold.
    pub name: Option<String>,
    /// Best distance seen so far; equals the threshold when nothing beat it.
    pub distance: f32,
}

impl MatchResult {
    pub fn is_match(&self) -> bool {
        self.name.is_some()
    }
}

/// Strategy for comparing a probe embedding against the enrolled gallery.
pub trait Matcher {
    fn best_match(&self, probe: &Embedding, gallery: &[Identity], threshold: f32) -> MatchResult;
}

/// Exact linear-scan matcher over raw L2 distance.
///
/// The gallery is traversed in lexicographic name order regardless of how the
/// caller happened to load it, so ties at equal minimal distance always
/// resolve to the same identity (first encountered wins, via strict `<`).
pub struct L2Matcher;

impl Matcher for L2Matcher {
    fn best_match(&self, probe: &Embedding, gallery: &[Identity], threshold: f32) -> MatchResult {
        let mut order: Vec<&Identity> = gallery.iter().collect();
        order.sort_by(|a, b| a.name.cmp(&b.name));

        let mut best_name: Option<&str> = None;
        let mut best_dist = threshold;

        for identity in order {
            let dist = probe.euclidean_distance(&identity.embedding);
            if dist < best_dist {
                best_dist = dist;
                best_name = Some(&identity.name);
            }
        }

        MatchResult {
            name: best_name.map(str::to_owned),
            distance: best_dist,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(name: &str, values: Vec<f32>) -> Identity {
        Identity {
            name: name.into(),
            mobile: None,
            email: None,
            embedding: Embedding { values },
        }
    }

    #[test]
    fn euclidean_distance_identical_is_zero() {
        let a = Embedding { values: vec![1.0, 2.0, 3.0] };
        assert!(a.euclidean_distance(&a).abs() < 1e-6);
    }

    #[test]
    fn euclidean_distance_unit_axes() {
        let a = Embedding { values: vec![1.0, 0.0] };
        let b = Embedding { values: vec![0.0, 1.0] };
        assert!((a.euclidean_distance(&b) - 2.0f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn exact_probe_matches_with_zero_distance() {
        let gallery = vec![
            identity("alice", vec![0.5, 0.5, 0.0]),
            identity("bob", vec![0.0, 0.0, 1.0]),
        ];
        let probe = Embedding { values: vec![0.5, 0.5, 0.0] };

        let result = L2Matcher.best_match(&probe, &gallery, DEFAULT_DISTANCE_THRESHOLD);
        assert_eq!(result.name.as_deref(), Some("alice"));
        assert!(result.distance.abs() < 1e-6);
    }

    #[test]
    fn distance_at_threshold_is_rejected() {
        // Distance to the sole entry is exactly 1.0; acceptance requires
        // a strictly smaller distance.
        let gallery = vec![identity("alice", vec![1.0, 0.0])];
        let probe = Embedding { values: vec![0.0, 0.0] };

        let result = L2Matcher.best_match(&probe, &gallery, 1.0);
        assert_eq!(result.name, None);
        assert_eq!(result.distance, 1.0);
    }

    #[test]
    fn distance_above_threshold_is_unknown() {
        let gallery = vec![identity("alice", vec![1.2, 0.0])];
        let probe = Embedding { values: vec![0.0, 0.0] };

        let result = L2Matcher.best_match(&probe, &gallery, 1.0);
        assert_eq!(result.name, None);
        assert!(!result.is_match());
    }

    #[test]
    fn empty_gallery_is_always_unknown() {
        let probe = Embedding { values: vec![0.0, 0.0] };
        let result = L2Matcher.best_match(&probe, &[], 1.0);
        assert_eq!(result.name, None);
        assert_eq!(result.distance, 1.0);
    }

    #[test]
    fn tie_resolves_to_lexicographically_first_name() {
        // Both entries sit at the same distance from the probe. The scan runs
        // in name order with strict `<`, so "anna" wins no matter how the
        // gallery slice is ordered.
        let gallery = vec![
            identity("zoe", vec![0.3, 0.0]),
            identity("anna", vec![-0.3, 0.0]),
        ];
        let probe = Embedding { values: vec![0.0, 0.0] };

        let result = L2Matcher.best_match(&probe, &gallery, 1.0);
        assert_eq!(result.name.as_deref(), Some("anna"));
        assert!((result.distance - 0.3).abs() < 1e-6);
    }

    #[test]
    fn closest_entry_wins_even_when_scanned_last() {
        let gallery = vec![
            identity("alice", vec![0.5, 0.0]),
            identity("zed", vec![0.1, 0.0]),
        ];
        let probe = Embedding { values: vec![0.0, 0.0] };

        let result = L2Matcher.best_match(&probe, &gallery, 1.0);
        assert_eq!(result.name.as_deref(), Some("zed"));
        assert!((result.distance - 0.1).abs() < 1e-6);
    }
}
