use std::cmp::Ordering;

pub struct Statistics;

impl Statistics {
    pub fn sum(values: &[f64]) -> f64 {
        values.iter().sum()
    }

    /// Continuous 50th percentile: the mean of the two middle order statistics
    /// when the count is even.
    pub fn median(values: &[f64]) -> Option<f64> {
        Self::percentile(values, 0.5)
    }

    /// Linear-interpolated percentile, `fraction` in `[0, 1]`.
    pub fn percentile(values: &[f64], fraction: f64) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        let position = fraction.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
        let lower = position.floor() as usize;
        let upper = position.ceil() as usize;
        let weight = position - lower as f64;
        Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
    }

    pub fn min_max(values: &[f64]) -> Option<(f64, f64)> {
        let first = *values.first()?;
        let mut min = first;
        let mut max = first;
        for &v in values.iter().skip(1) {
            min = min.min(v);
            max = max.max(v);
        }
        Some((min, max))
    }

    /// Row-number ranks by descending value: the largest value gets 1.
    ///
    /// Every input gets a distinct rank in `1..=values.len()`. Equal values keep
    /// their input order. Absent values rank after all present ones, unlike a
    /// plain `ORDER BY x DESC` in PostgreSQL, which puts nulls first.
    pub fn rank_descending(values: &[Option<f64>]) -> Vec<usize> {
        let mut order: Vec<usize> = (0..values.len()).collect();
        // stable sort keeps input order among ties
        order.sort_by(|&a, &b| match (values[a], values[b]) {
            (Some(x), Some(y)) => y.total_cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });

        let mut ranks = vec![0; values.len()];
        for (position, index) in order.into_iter().enumerate() {
            ranks[index] = position + 1;
        }
        ranks
    }
}

#[cfg(test)]
mod tests {
    use super::Statistics;

    #[test]
    fn median_interpolates_even_counts() {
        assert_eq!(Statistics::median(&[10.0, 20.0, 30.0]), Some(20.0));
        assert_eq!(Statistics::median(&[10.0, 20.0]), Some(15.0));
        assert_eq!(Statistics::median(&[30.0, 10.0, 40.0, 20.0]), Some(25.0));
        assert_eq!(Statistics::median(&[7.5]), Some(7.5));
        assert_eq!(Statistics::median(&[]), None);
    }

    #[test]
    fn min_max_and_sum() {
        assert_eq!(Statistics::min_max(&[3.0, -1.0, 8.0]), Some((-1.0, 8.0)));
        assert_eq!(Statistics::min_max(&[]), None);
        assert!((Statistics::sum(&[0.1, 0.2, 0.3]) - 0.6).abs() < 1e-12);
    }

    #[test]
    fn ranks_are_a_gapless_permutation() {
        let values = [Some(5.0), Some(9.0), Some(5.0), None, Some(1.0), Some(9.0)];
        let ranks = Statistics::rank_descending(&values);
        assert_eq!(ranks, vec![3, 1, 4, 6, 5, 2]);

        let mut sorted = ranks.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (1..=values.len()).collect::<Vec<_>>());
    }

    #[test]
    fn absent_values_never_outrank_present_ones() {
        // a leading null would rank 1 under a plain descending sort in PostgreSQL
        let ranks = Statistics::rank_descending(&[None, Some(0.0), None, Some(-3.0)]);
        assert_eq!(ranks, vec![3, 1, 4, 2]);
    }

    #[test]
    fn single_value_ranks_first() {
        assert_eq!(Statistics::rank_descending(&[None]), vec![1]);
        assert!(Statistics::rank_descending(&[]).is_empty());
    }
}
