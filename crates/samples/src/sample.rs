//! Immutable sample tables and random picking.

use crate::error::SamplePickError;
use crate::row::{FieldMap, Row};
use rand::Rng;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Immutable, order-preserving table of rows.
///
/// Cumulative weight tables are computed once per column on first use and
/// cached for the life of the sample.
#[derive(Debug)]
pub struct Sample {
    rows: Vec<Row>,
    fields: Arc<FieldMap>,
    cumulative_weights: RwLock<HashMap<String, Arc<[f64]>>>,
}

impl Sample {
    /// Build a sample from raw row values.
    ///
    /// Every row must have exactly as many values as there are fields.
    pub(crate) fn new(fields: FieldMap, rows: Vec<Vec<Value>>) -> Self {
        let fields = Arc::new(fields);
        let rows = rows
            .into_iter()
            .map(|values| Row::new(values, Arc::clone(&fields)))
            .collect();

        Self {
            rows,
            fields,
            cumulative_weights: RwLock::new(HashMap::new()),
        }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    pub fn get(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Pick one row uniformly at random.
    pub fn pick(&self) -> Result<&Row, SamplePickError> {
        self.pick_with(&mut rand::rng())
    }

    pub fn pick_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<&Row, SamplePickError> {
        if self.rows.is_empty() {
            return Err(SamplePickError::Empty);
        }
        Ok(&self.rows[rng.random_range(0..self.rows.len())])
    }

    /// Pick `n` rows uniformly at random, with replacement.
    pub fn pick_n(&self, n: usize) -> Result<Vec<&Row>, SamplePickError> {
        self.pick_n_with(&mut rand::rng(), n)
    }

    pub fn pick_n_with<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        n: usize,
    ) -> Result<Vec<&Row>, SamplePickError> {
        (0..n).map(|_| self.pick_with(rng)).collect()
    }

    /// Pick one row with probability proportional to the value in `column`.
    pub fn weighted_pick(&self, column: &str) -> Result<&Row, SamplePickError> {
        self.weighted_pick_with(&mut rand::rng(), column)
    }

    pub fn weighted_pick_with<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        column: &str,
    ) -> Result<&Row, SamplePickError> {
        let cumulative = self.cumulative_weights(column)?;
        Ok(self.pick_cumulative(rng, &cumulative))
    }

    /// Pick `n` weighted rows, with replacement.
    pub fn weighted_pick_n(&self, column: &str, n: usize) -> Result<Vec<&Row>, SamplePickError> {
        self.weighted_pick_n_with(&mut rand::rng(), column, n)
    }

    pub fn weighted_pick_n_with<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        column: &str,
        n: usize,
    ) -> Result<Vec<&Row>, SamplePickError> {
        let cumulative = self.cumulative_weights(column)?;
        Ok((0..n).map(|_| self.pick_cumulative(rng, &cumulative)).collect())
    }

    fn pick_cumulative<R: Rng + ?Sized>(&self, rng: &mut R, cumulative: &[f64]) -> &Row {
        let total = cumulative[cumulative.len() - 1];
        let target = rng.random::<f64>() * total;
        // First row whose cumulative weight exceeds the target; zero-weight rows are never chosen
        let index = cumulative
            .partition_point(|&c| c <= target)
            .min(self.rows.len() - 1);
        &self.rows[index]
    }

    fn cumulative_weights(&self, column: &str) -> Result<Arc<[f64]>, SamplePickError> {
        if let Some(cached) = self
            .cumulative_weights
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(column)
        {
            return Ok(Arc::clone(cached));
        }

        let computed = self.compute_cumulative_weights(column)?;

        self.cumulative_weights
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(column.to_string())
            .or_insert_with(|| Arc::clone(&computed));

        Ok(computed)
    }

    fn compute_cumulative_weights(&self, column: &str) -> Result<Arc<[f64]>, SamplePickError> {
        let position = self
            .fields
            .position(column)
            .ok_or_else(|| SamplePickError::ColumnNotFound(column.to_string()))?;

        if self.rows.is_empty() {
            return Err(SamplePickError::Empty);
        }

        let mut total = 0.0;
        let mut cumulative = Vec::with_capacity(self.rows.len());

        for (row_index, row) in self.rows.iter().enumerate() {
            let value = row.get_index(position).unwrap_or(&Value::Null);
            let weight = weight_value(value).ok_or_else(|| SamplePickError::NonNumeric {
                column: column.to_string(),
                row: row_index,
                value: value.to_string(),
            })?;

            if weight < 0.0 {
                return Err(SamplePickError::Negative {
                    column: column.to_string(),
                    row: row_index,
                    value: weight,
                });
            }

            total += weight;
            cumulative.push(total);
        }

        if total <= 0.0 {
            return Err(SamplePickError::ZeroWeights(column.to_string()));
        }

        Ok(cumulative.into())
    }
}

/// Interpret a cell as a weight. CSV cells arrive as strings.
fn weight_value(value: &Value) -> Option<f64> {
    let weight = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    weight.is_finite().then_some(weight)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn weighted_sample() -> Sample {
        Sample::new(
            FieldMap::new(vec!["level".into(), "weight".into()]),
            vec![
                vec![json!("info"), json!(70)],
                vec![json!("warn"), json!("20")],
                vec![json!("error"), json!(10.0)],
            ],
        )
    }

    #[test]
    fn test_pick_from_empty_sample() {
        let sample = Sample::new(FieldMap::ordinal(1), Vec::new());
        assert_eq!(sample.pick().unwrap_err(), SamplePickError::Empty);
        assert_eq!(sample.pick_n(3).unwrap_err(), SamplePickError::Empty);
    }

    #[test]
    fn test_pick_n_returns_n_rows() {
        let sample = weighted_sample();
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(sample.pick_n_with(&mut rng, 25).unwrap().len(), 25);
        assert!(sample.pick_n(0).unwrap().is_empty());
    }

    #[test]
    fn test_weighted_pick_frequency_follows_weights() {
        let sample = weighted_sample();
        let mut rng = StdRng::seed_from_u64(42);
        let mut counts: HashMap<String, usize> = HashMap::new();

        for row in sample
            .weighted_pick_n_with(&mut rng, "weight", 10_000)
            .unwrap()
        {
            let level = row.get("level").unwrap().as_str().unwrap().to_string();
            *counts.entry(level).or_default() += 1;
        }

        let info = counts["info"];
        let warn = counts["warn"];
        let error = counts["error"];
        assert!(info > warn && warn > error, "{counts:?}");
        assert!(info > 5_000, "{counts:?}");
    }

    #[test]
    fn test_weighted_pick_never_chooses_zero_weight() {
        let sample = Sample::new(
            FieldMap::new(vec!["v".into(), "w".into()]),
            vec![
                vec![json!("a"), json!(0)],
                vec![json!("b"), json!(1)],
                vec![json!("c"), json!(0)],
            ],
        );
        let mut rng = StdRng::seed_from_u64(1);
        for row in sample.weighted_pick_n_with(&mut rng, "w", 500).unwrap() {
            assert_eq!(row.get("v"), Some(&json!("b")));
        }
    }

    #[test]
    fn test_weighted_pick_missing_column() {
        let err = weighted_sample().weighted_pick("nope").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_weighted_pick_non_numeric() {
        let sample = Sample::new(
            FieldMap::new(vec!["w".into()]),
            vec![vec![json!(1)], vec![json!("heavy")]],
        );
        let err = sample.weighted_pick("w").unwrap_err();
        assert!(matches!(err, SamplePickError::NonNumeric { row: 1, .. }));
        assert!(err.to_string().contains("non-numeric value"));
    }

    #[test]
    fn test_weighted_pick_negative() {
        let sample = Sample::new(
            FieldMap::new(vec!["w".into()]),
            vec![vec![json!(-1)], vec![json!(2)]],
        );
        let err = sample.weighted_pick("w").unwrap_err();
        assert!(matches!(err, SamplePickError::Negative { row: 0, .. }));
        assert!(err.to_string().contains("negative value"));
    }

    #[test]
    fn test_weighted_pick_all_zero() {
        let sample = Sample::new(
            FieldMap::new(vec!["w".into()]),
            vec![vec![json!(0)], vec![json!("0.0")]],
        );
        let err = sample.weighted_pick("w").unwrap_err();
        assert!(err.to_string().contains("All weights are zero"));
    }

    #[test]
    fn test_cumulative_weights_are_cached() {
        let sample = weighted_sample();
        let first = sample.cumulative_weights("weight").unwrap();
        let second = sample.cumulative_weights("weight").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(&*first, &[70.0, 90.0, 100.0]);
    }
}
