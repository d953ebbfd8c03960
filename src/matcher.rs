use crate::backend::DistanceMetric;
use crate::error::{MatchError, Result};
use crate::{Embedding, EMBEDDING_DIM};

/// Closest gallery candidate for a query face.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    /// Position in the candidate list as passed in.
    pub index: usize,
    pub distance: f32,
    /// `(1 - distance) * 100`
    pub similarity: f32,
}

pub fn similarity(distance: f32) -> f32 {
    (1.0 - distance) * 100.0
}

/// Linear scan for the candidate nearest to `query`.
///
/// The query must be a valid embedding. Candidates that are not
/// [`EMBEDDING_DIM`] long (empty ones included) are skipped but keep their
/// slot, so `index` always points into `candidates`. Ties go to the earliest
/// candidate.
pub fn find_match<M>(query: &[f32], candidates: &[&[f32]], metric: &M) -> Result<Match>
where
    M: DistanceMetric + ?Sized,
{
    let query = Embedding::new(query.to_vec()).map_err(|_| MatchError::InvalidQuery)?;

    let (slots, valid): (Vec<usize>, Vec<&[f32]>) = candidates
        .iter()
        .enumerate()
        .filter(|(i, c)| {
            let ok = c.len() == EMBEDDING_DIM;
            if !ok && !c.is_empty() {
                log::warn!("candidate {} has {} values, skipping", i, c.len());
            }
            ok
        })
        .map(|(i, c)| (i, *c))
        .unzip();
    if valid.is_empty() {
        return Err(MatchError::NoValidCandidates);
    }

    let distances = metric.distances(query.as_slice(), &valid);
    let (best, distance) = distances
        .iter()
        .copied()
        .enumerate()
        .fold(None, |acc: Option<(usize, f32)>, (i, d)| match acc {
            Some((_, best)) if best <= d || d.is_nan() => acc,
            _ => Some((i, d)),
        })
        .ok_or(MatchError::NoDistances)?;

    let index = *slots.get(best).ok_or(MatchError::NoDistances)?;
    log::debug!(
        "nearest candidate {} at distance {:.4} ({} compared)",
        index,
        distance,
        valid.len()
    );
    Ok(Match {
        index,
        distance,
        similarity: similarity(distance),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Euclidean;

    /// Returns canned distances regardless of input.
    struct Canned(Vec<f32>);

    impl DistanceMetric for Canned {
        fn distance(&self, _a: &[f32], _b: &[f32]) -> f32 {
            unreachable!("Canned only answers batches")
        }

        fn distances(&self, _query: &[f32], _candidates: &[&[f32]]) -> Vec<f32> {
            self.0.clone()
        }
    }

    fn vector(seed: f32) -> Vec<f32> {
        (0..EMBEDDING_DIM).map(|i| seed + i as f32 * 1e-3).collect()
    }

    #[test]
    fn test_find_match_valid() {
        let user = vector(0.1);
        let presidents = [vector(0.2), vector(0.3), vector(0.4)];
        let refs: Vec<&[f32]> = presidents.iter().map(Vec::as_slice).collect();

        let m = find_match(&user, &refs, &Canned(vec![0.2, 0.5, 0.8])).unwrap();
        assert_eq!(m.index, 0);
        assert!((m.similarity - 80.0).abs() < 1e-4);
        assert_eq!(m.distance, 0.2);
    }

    #[test]
    fn test_picks_minimum_anywhere() {
        let user = vector(0.0);
        let presidents = [vector(0.0), vector(0.0), vector(0.0)];
        let refs: Vec<&[f32]> = presidents.iter().map(Vec::as_slice).collect();

        let m = find_match(&user, &refs, &Canned(vec![0.7, 0.45, 0.6])).unwrap();
        assert_eq!(m.index, 1);
        assert!((m.similarity - 55.0).abs() < 1e-4);
    }

    #[test]
    fn test_ties_go_to_first() {
        let user = vector(0.0);
        let presidents = [vector(0.0), vector(0.0), vector(0.0)];
        let refs: Vec<&[f32]> = presidents.iter().map(Vec::as_slice).collect();

        let m = find_match(&user, &refs, &Canned(vec![0.5, 0.3, 0.3])).unwrap();
        assert_eq!(m.index, 1);
    }

    #[test]
    fn test_euclidean_nearest() {
        let user = vec![0.0; EMBEDDING_DIM];
        let far = vec![1.0; EMBEDDING_DIM];
        let mut near = vec![0.0; EMBEDDING_DIM];
        near[0] = 0.25;
        let refs = vec![far.as_slice(), near.as_slice()];

        let m = find_match(&user, &refs, &Euclidean).unwrap();
        assert_eq!(m.index, 1);
        assert!((m.distance - 0.25).abs() < 1e-6);
        assert!((m.similarity - 75.0).abs() < 1e-4);
    }

    #[test]
    fn test_empty_candidates() {
        let none: Vec<&[f32]> = Vec::new();
        let err = find_match(&vector(0.1), &none, &Euclidean).unwrap_err();
        assert!(matches!(err, MatchError::NoValidCandidates));
        assert_eq!(err.to_string(), "No valid presidents.");
    }

    #[test]
    fn test_all_empty_candidates() {
        let empty: &[f32] = &[];
        let err = find_match(&vector(0.1), &[empty, empty], &Euclidean).unwrap_err();
        assert!(matches!(err, MatchError::NoValidCandidates));
    }

    #[test]
    fn test_empty_candidates_keep_their_slot() {
        let user = vec![0.0; EMBEDDING_DIM];
        let near = vec![0.0; EMBEDDING_DIM];
        let empty: &[f32] = &[];
        let refs = vec![empty, near.as_slice()];

        let m = find_match(&user, &refs, &Euclidean).unwrap();
        assert_eq!(m.index, 1);
        assert_eq!(m.similarity, 100.0);
    }

    #[test]
    fn test_wrong_length_candidate_is_skipped() {
        let user = vec![0.0; EMBEDDING_DIM];
        let mut good = vec![0.0; EMBEDDING_DIM];
        good[100] = 0.3;
        let short = vec![0.0; 3];
        let refs = vec![good.as_slice(), short.as_slice()];

        let m = find_match(&user, &refs, &Euclidean).unwrap();
        assert_eq!(m.index, 0);
        assert!((m.distance - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_only_wrong_length_candidates() {
        let short = vec![0.0; 3];
        let long = vec![0.0; EMBEDDING_DIM + 1];
        let err = find_match(&vector(0.1), &[short.as_slice(), long.as_slice()], &Euclidean)
            .unwrap_err();
        assert!(matches!(err, MatchError::NoValidCandidates));
    }

    #[test]
    fn test_invalid_user() {
        let presidents = [vector(0.2), vector(0.3), vector(0.4)];
        let refs: Vec<&[f32]> = presidents.iter().map(Vec::as_slice).collect();

        for bad in [Vec::<f32>::new(), vec![0.1, 0.2, 0.3], vec![0.0; EMBEDDING_DIM + 1]] {
            let err = find_match(&bad, &refs, &Euclidean).unwrap_err();
            assert!(matches!(err, MatchError::InvalidQuery));
            assert_eq!(err.to_string(), "Invalid user encoding.");
        }
    }

    #[test]
    fn test_invalid_user_checked_before_candidates() {
        let none: Vec<&[f32]> = Vec::new();
        let err = find_match(&[], &none, &Euclidean).unwrap_err();
        assert!(matches!(err, MatchError::InvalidQuery));
    }

    #[test]
    fn test_no_distances() {
        let presidents = [vector(0.2), vector(0.3), vector(0.4)];
        let refs: Vec<&[f32]> = presidents.iter().map(Vec::as_slice).collect();

        let err = find_match(&vector(0.1), &refs, &Canned(vec![])).unwrap_err();
        assert!(matches!(err, MatchError::NoDistances));
        assert_eq!(err.to_string(), "No distances found.");
    }

    #[test]
    fn test_similarity() {
        assert_eq!(similarity(0.0), 100.0);
        assert_eq!(similarity(1.0), 0.0);
        assert!(similarity(1.5) < 0.0);
    }
}
