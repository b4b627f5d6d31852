//! Shared column helpers used by several agents.

use crate::error::{PipelineError, Result};
use ndarray::Array2;
use polars::prelude::*;

// =============================================================================
// Data Type Utilities
// =============================================================================

/// Check if a DataType is numeric (integer or float).
#[inline]
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Check if a DataType is floating point (the only kind that can hold NaN).
#[inline]
pub fn is_float_dtype(dtype: &DataType) -> bool {
    matches!(dtype, DataType::Float32 | DataType::Float64)
}

// =============================================================================
// Missing value markers
// =============================================================================

/// Cell texts read as missing when loading a delimited file, in addition to
/// empty cells. Matching is exact, so common spellings are listed.
pub const MISSING_MARKERS: [&str; 18] = [
    "NA", "N/A", "n/a", "#N/A", "#N/A N/A", "#NA", "<NA>", "NULL", "null", "None", "NaN", "nan",
    "-NaN", "-nan", "1.#IND", "-1.#IND", "1.#QNAN", "-1.#QNAN",
];

// =============================================================================
// Value extraction
// =============================================================================

/// Values of a numeric series as `f64`, nulls kept as `None`.
pub fn numeric_values(series: &Series) -> Result<Vec<Option<f64>>> {
    let casted = series.cast(&DataType::Float64)?;
    Ok(casted.f64()?.into_iter().collect())
}

/// Mean and sample standard deviation (n - 1) of the non-null, non-NaN values.
///
/// Returns `None` when fewer than two usable values exist.
pub fn mean_and_std(values: &[Option<f64>]) -> Option<(f64, f64)> {
    let present: Vec<f64> = values
        .iter()
        .flatten()
        .copied()
        .filter(|v| !v.is_nan())
        .collect();
    if present.len() < 2 {
        return None;
    }

    let n = present.len() as f64;
    let mean = present.iter().sum::<f64>() / n;
    let variance = present.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some((mean, variance.sqrt()))
}

/// Convert an all-numeric frame into a dense row-major matrix.
///
/// Fails with [`PipelineError::InvalidData`] on nulls, NaN, or non-numeric
/// columns, since the estimator cannot consume them.
pub fn to_feature_matrix(df: &DataFrame) -> Result<Array2<f64>> {
    let mut matrix = Array2::<f64>::zeros((df.height(), df.width()));

    for (j, column) in df.get_columns().iter().enumerate() {
        if !is_numeric_dtype(column.dtype()) {
            return Err(PipelineError::InvalidData(format!(
                "feature column '{}' is not numeric ({})",
                column.name(),
                column.dtype()
            )));
        }

        let values = numeric_values(column.as_materialized_series())?;
        for (i, value) in values.into_iter().enumerate() {
            match value {
                Some(v) if !v.is_nan() => matrix[[i, j]] = v,
                _ => {
                    return Err(PipelineError::InvalidData(format!(
                        "feature column '{}' has a missing value at row {}",
                        column.name(),
                        i
                    )));
                }
            }
        }
    }

    Ok(matrix)
}

// =============================================================================
// Label Utilities
// =============================================================================

/// A label series reduced to scalars.
///
/// Numeric labels keep their values. Any other dtype is mapped onto the
/// index of its value in the sorted vocabulary, so the same label series
/// always yields the same codes.
#[derive(Debug, Clone, PartialEq)]
pub enum LabelValues {
    Numeric(Vec<Option<f64>>),
    Coded {
        codes: Vec<Option<f64>>,
        vocabulary: Vec<String>,
    },
}

impl LabelValues {
    pub fn from_series(series: &Series) -> Result<Self> {
        if is_numeric_dtype(series.dtype()) {
            return Ok(LabelValues::Numeric(numeric_values(series)?));
        }

        let as_text = series.cast(&DataType::String)?;
        let text = as_text.str()?;

        let mut vocabulary: Vec<String> = text.into_iter().flatten().map(str::to_string).collect();
        vocabulary.sort();
        vocabulary.dedup();

        let codes = text
            .into_iter()
            .map(|value| {
                value.map(|v| {
                    vocabulary
                        .binary_search_by(|probe| probe.as_str().cmp(v))
                        .map(|idx| idx as f64)
                        .unwrap_or(f64::NAN)
                })
            })
            .collect();

        Ok(LabelValues::Coded { codes, vocabulary })
    }

    pub fn values(&self) -> &[Option<f64>] {
        match self {
            LabelValues::Numeric(values) => values,
            LabelValues::Coded { codes, .. } => codes,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, LabelValues::Numeric(_))
    }

    pub fn vocabulary(&self) -> Option<&[String]> {
        match self {
            LabelValues::Numeric(_) => None,
            LabelValues::Coded { vocabulary, .. } => Some(vocabulary),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_numeric_dtype() {
        assert!(is_numeric_dtype(&DataType::Int64));
        assert!(is_numeric_dtype(&DataType::Float32));
        assert!(!is_numeric_dtype(&DataType::String));
        assert!(!is_numeric_dtype(&DataType::Boolean));
    }

    #[test]
    fn test_mean_and_std() {
        let values = vec![Some(2.0), Some(4.0), Some(4.0), Some(4.0), Some(5.0), Some(5.0), Some(7.0), Some(9.0)];
        let (mean, std) = mean_and_std(&values).unwrap();
        assert!((mean - 5.0).abs() < 1e-12);
        // sample std of the classic example: sqrt(32 / 7)
        assert!((std - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_mean_and_std_skips_missing() {
        let values = vec![Some(1.0), None, Some(3.0), Some(f64::NAN)];
        let (mean, _) = mean_and_std(&values).unwrap();
        assert!((mean - 2.0).abs() < 1e-12);
        assert!(mean_and_std(&[Some(1.0), None]).is_none());
    }

    #[test]
    fn test_to_feature_matrix() {
        let df = df!(
            "a" => [1i64, 2, 3],
            "b" => [0.5f64, 1.5, 2.5]
        )
        .unwrap();
        let matrix = to_feature_matrix(&df).unwrap();
        assert_eq!(matrix.dim(), (3, 2));
        assert_eq!(matrix[[2, 0]], 3.0);
        assert_eq!(matrix[[1, 1]], 1.5);
    }

    #[test]
    fn test_to_feature_matrix_rejects_text() {
        let df = df!("a" => ["x", "y"]).unwrap();
        assert!(matches!(
            to_feature_matrix(&df),
            Err(PipelineError::InvalidData(_))
        ));
    }

    #[test]
    fn test_label_values_text_uses_sorted_codes() {
        let series = Series::new("label".into(), &["yes", "no", "yes", "maybe"]);
        let labels = LabelValues::from_series(&series).unwrap();

        assert!(!labels.is_numeric());
        assert_eq!(
            labels.vocabulary().unwrap(),
            ["maybe".to_string(), "no".to_string(), "yes".to_string()]
        );
        assert_eq!(
            labels.values(),
            &[Some(2.0), Some(1.0), Some(2.0), Some(0.0)]
        );
    }

    #[test]
    fn test_label_values_numeric() {
        let series = Series::new("label".into(), &[1i32, 0, 1]);
        let labels = LabelValues::from_series(&series).unwrap();
        assert!(labels.is_numeric());
        assert_eq!(labels.values(), &[Some(1.0), Some(0.0), Some(1.0)]);
    }
}
