//! Categorical encoders.
//!
//! Both encoders are total: every value, including a missing one, gets a
//! code, and equal values always share a code. Missing values form their own
//! category.

use crate::error::PipelineError;
use polars::prelude::StringChunked;
use std::collections::HashMap;
use std::fmt;

/// Result of encoding one column.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedColumn {
    /// One dense code per row, in `0..categories.len()`.
    pub codes: Vec<u32>,
    /// Category of each code; `None` is the missing-value category.
    pub categories: Vec<Option<String>>,
}

impl EncodedColumn {
    pub fn vocabulary_size(&self) -> usize {
        self.categories.len()
    }
}

/// Maps the distinct values of a text column onto dense integer codes.
pub trait CategoricalEncoder: Send + Sync + fmt::Debug {
    /// Short name recorded in the feature agent's state.
    fn name(&self) -> &'static str;

    fn encode(&self, values: &StringChunked) -> EncodedColumn;
}

/// Codes are positions in the sorted vocabulary, so they do not depend on
/// row order. The missing category sorts first.
#[cfg(feature = "label-encoder")]
#[derive(Debug, Clone, Copy, Default)]
pub struct LabelEncoder;

#[cfg(feature = "label-encoder")]
impl CategoricalEncoder for LabelEncoder {
    fn name(&self) -> &'static str {
        "label_encoder"
    }

    fn encode(&self, values: &StringChunked) -> EncodedColumn {
        let mut vocabulary: Vec<Option<&str>> = values.into_iter().collect();
        vocabulary.sort_unstable();
        vocabulary.dedup();

        let codes = values
            .into_iter()
            .map(|value| vocabulary.binary_search(&value).unwrap_or(0) as u32)
            .collect();

        EncodedColumn {
            codes,
            categories: vocabulary
                .into_iter()
                .map(|v| v.map(str::to_string))
                .collect(),
        }
    }
}

/// Codes follow first appearance in the column.
#[derive(Debug, Clone, Copy, Default)]
pub struct CategoryCodes;

impl CategoricalEncoder for CategoryCodes {
    fn name(&self) -> &'static str {
        "category_codes"
    }

    fn encode(&self, values: &StringChunked) -> EncodedColumn {
        let mut lookup: HashMap<Option<&str>, u32> = HashMap::new();
        let mut categories = Vec::new();

        let codes = values
            .into_iter()
            .map(|value| {
                *lookup.entry(value).or_insert_with(|| {
                    categories.push(value.map(str::to_string));
                    (categories.len() - 1) as u32
                })
            })
            .collect();

        EncodedColumn { codes, categories }
    }
}

/// Pick the preferred encoder, or report that it is not compiled in.
pub(crate) fn probe_label_encoder() -> Result<Box<dyn CategoricalEncoder>, PipelineError> {
    #[cfg(feature = "label-encoder")]
    {
        Ok(Box::new(LabelEncoder))
    }
    #[cfg(not(feature = "label-encoder"))]
    {
        Err(PipelineError::CapabilityUnavailable(
            crate::error::Capability::LabelEncoding,
        ))
    }
}
