use std::cmp::Ordering;

use crate::core::errors::GroundingError;

/// Distances closer to zero than this are f32 rounding noise from normalization.
const DISTANCE_EPSILON: f32 = 1e-6;

/// Returns a unit-length copy of `vector`.
///
/// Zero, NaN or infinite input cannot be normalized and is reported as an
/// embedding failure, since it can only come from a broken embedder.
pub fn l2_normalized(vector: &[f32]) -> Result<Vec<f32>, GroundingError> {
    if vector.is_empty() {
        return Err(GroundingError::EmbeddingFailure(
            "embedder returned an empty vector".to_string(),
        ));
    }
    if vector.iter().any(|x| !x.is_finite()) {
        return Err(GroundingError::EmbeddingFailure(
            "embedder returned a non-finite component".to_string(),
        ));
    }

    let norm = vector
        .iter()
        .map(|x| (*x as f64) * (*x as f64))
        .sum::<f64>()
        .sqrt();
    if norm <= f64::EPSILON {
        return Err(GroundingError::EmbeddingFailure(
            "embedder returned a zero vector".to_string(),
        ));
    }

    Ok(vector.iter().map(|x| ((*x as f64) / norm) as f32).collect())
}

/// Cosine similarity of two unit-normalized vectors, clamped to `[-1, 1]`.
pub fn cosine_similarity(query: &[f32], candidate: &[f32]) -> Result<f32, GroundingError> {
    if query.len() != candidate.len() {
        return Err(GroundingError::DimensionMismatch {
            expected: candidate.len(),
            got: query.len(),
        });
    }

    let dot: f64 = query
        .iter()
        .zip(candidate.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();

    Ok(dot.clamp(-1.0, 1.0) as f32)
}

/// The only place similarity becomes distance.
pub fn similarity_to_distance(score: f32) -> f32 {
    let distance = 1.0 - score;
    if distance.abs() < DISTANCE_EPSILON {
        0.0
    } else {
        distance
    }
}

/// Scores every candidate and keeps the `top_k` best as `(index, score)`.
///
/// Order is descending by score; equal scores keep ascending index order, so
/// callers that pass candidates in insertion order get earliest-first ties.
pub fn rank_top_k<'a, I>(
    query: &[f32],
    candidates: I,
    top_k: usize,
) -> Result<Vec<(usize, f32)>, GroundingError>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    let mut scores = Vec::new();
    for (idx, candidate) in candidates.into_iter().enumerate() {
        scores.push((idx, cosine_similarity(query, candidate)?));
    }

    scores.sort_by(|left, right| {
        right
            .1
            .partial_cmp(&left.1)
            .unwrap_or(Ordering::Equal)
            .then(left.0.cmp(&right.0))
    });
    scores.truncate(top_k);
    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(left: f32, right: f32) -> bool {
        (left - right).abs() < 1e-5
    }

    #[test]
    fn normalized_vector_has_unit_length() {
        let unit = l2_normalized(&[3.0, 4.0]).unwrap();
        assert!(approx_eq(unit[0], 0.6));
        assert!(approx_eq(unit[1], 0.8));
    }

    #[test]
    fn normalizing_rejects_degenerate_vectors() {
        assert!(matches!(
            l2_normalized(&[0.0, 0.0]),
            Err(GroundingError::EmbeddingFailure(_))
        ));
        assert!(matches!(
            l2_normalized(&[f32::NAN, 1.0]),
            Err(GroundingError::EmbeddingFailure(_))
        ));
        assert!(l2_normalized(&[]).is_err());
    }

    #[test]
    fn cosine_is_one_for_identical_vectors() {
        let vec = l2_normalized(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        let score = cosine_similarity(&vec, &vec).unwrap();
        assert!(approx_eq(score, 1.0));
        assert_eq!(similarity_to_distance(score), 0.0);
    }

    #[test]
    fn cosine_rejects_length_mismatch() {
        let err = cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]).unwrap_err();
        assert!(matches!(
            err,
            GroundingError::DimensionMismatch { expected: 3, got: 2 }
        ));
    }

    #[test]
    fn distance_is_one_minus_similarity() {
        assert!(approx_eq(similarity_to_distance(0.25), 0.75));
        assert!(approx_eq(similarity_to_distance(-1.0), 2.0));
    }

    #[test]
    fn ranking_returns_highest_similarity_first_and_breaks_ties_by_index() {
        let query = vec![1.0, 0.0];
        let candidates = [
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![0.6, 0.8],
            vec![1.0, 0.0],
        ];
        let ranked = rank_top_k(&query, candidates.iter().map(Vec::as_slice), 10).unwrap();

        let order: Vec<usize> = ranked.iter().map(|(idx, _)| *idx).collect();
        assert_eq!(order, vec![1, 3, 2, 0]);
    }

    #[test]
    fn ranking_truncates_to_top_k() {
        let query = vec![1.0, 0.0];
        let candidates = [vec![1.0, 0.0], vec![0.0, 1.0], vec![0.6, 0.8]];
        let ranked = rank_top_k(&query, candidates.iter().map(Vec::as_slice), 2).unwrap();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[1].0, 2);
    }
}
