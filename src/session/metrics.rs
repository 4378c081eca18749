//! Sequence-level evaluation metrics.

/// Levenshtein distance between two code sequences.
pub fn edit_distance<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];
    for (i, item_a) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, item_b) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(item_a != item_b);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

/// Mean per-sample edit distance, normalized by the target length.
///
/// Empty targets are normalized by one so a wrong prediction against an
/// empty label counts as its full length rather than an infinity.
pub fn character_error_rate(predicted: &[Vec<u32>], target: &[Vec<u32>]) -> f32 {
    if target.is_empty() {
        return 0.0;
    }
    let total: f32 = predicted
        .iter()
        .zip(target)
        .map(|(p, t)| edit_distance(p, t) as f32 / t.len().max(1) as f32)
        .sum();
    total / target.len() as f32
}

/// Fraction of predictions that exactly match their lowercase-folded target.
pub fn sequence_accuracy(predicted: &[String], target: &[String]) -> f32 {
    if target.is_empty() {
        return 0.0;
    }
    let hits = predicted
        .iter()
        .zip(target)
        .filter(|(p, t)| p.as_str() == t.to_lowercase())
        .count();
    hits as f32 / target.len() as f32
}
