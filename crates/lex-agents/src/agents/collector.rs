//! Collection agent: load a delimited file and sanitize it.

use super::Stage;
use crate::config::{CleaningOrder, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::types::StageState;
use crate::utils::{MISSING_MARKERS, is_float_dtype};
use polars::prelude::*;
use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;
use tracing::debug;

/// Loads a tabular dataset and removes duplicate and incomplete rows.
///
/// Empty cells and the usual missing-value spellings (`NA`, `N/A`, `null`,
/// see [`MISSING_MARKERS`]) load as null. Rows are never imputed: a row with
/// any null cell, or a NaN in a float column, is dropped. After a successful
/// run the dataset has no two equal rows and no missing cells, and surviving
/// rows keep their file order.
#[derive(Debug, Clone)]
pub struct DataCollector {
    separator: u8,
    infer_schema_length: Option<usize>,
    cleaning_order: CleaningOrder,
    state: StageState,
}

impl Default for DataCollector {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl DataCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            separator: config.separator,
            infer_schema_length: config.infer_schema_length,
            cleaning_order: config.cleaning_order,
            state: StageState::new(),
        }
    }

    /// Load and sanitize the dataset at `path`.
    pub fn collect(&mut self, path: &Path) -> Result<DataFrame> {
        self.run(path)
    }

    fn read(&self, path: &Path) -> Result<DataFrame> {
        let file = File::open(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => PipelineError::SourceNotFound {
                path: path.to_path_buf(),
            },
            _ => PipelineError::Io(e),
        })?;

        if file.metadata()?.len() == 0 {
            return Err(PipelineError::FormatError {
                path: path.to_path_buf(),
                reason: "file is empty".to_string(),
            });
        }

        let markers: Vec<PlSmallStr> = MISSING_MARKERS
            .iter()
            .map(|&m| PlSmallStr::from_static(m))
            .collect();
        let parse_options = CsvParseOptions::default()
            .with_separator(self.separator)
            .with_null_values(Some(NullValues::AllColumns(markers)));

        CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(self.infer_schema_length)
            .with_parse_options(parse_options)
            .into_reader_with_file_handle(file)
            .finish()
            .map_err(|e| PipelineError::FormatError {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }

    fn remove_duplicates(&mut self, df: DataFrame) -> Result<DataFrame> {
        let before = df.height();
        let df = df.unique_stable(None, UniqueKeepStrategy::First, None)?;
        let removed = before - df.height();

        self.state.set("duplicates_removed", removed);
        self.note(format!("Removed {} duplicate rows", removed));
        Ok(df)
    }

    fn remove_incomplete(&mut self, df: DataFrame) -> Result<DataFrame> {
        let (complete, missing_cells) = complete_rows(&df)?;
        let df = df.filter(&complete)?;

        self.state.set("missing_cells", missing_cells);
        self.state.set("rows_remaining", df.height());
        self.note(format!(
            "Found {} missing cells; {} rows remain after dropping incomplete rows",
            missing_cells,
            df.height()
        ));
        Ok(df)
    }
}

/// Mask of rows without null or NaN cells, and the number of such cells.
fn complete_rows(df: &DataFrame) -> Result<(BooleanChunked, usize)> {
    let mut mask = BooleanChunked::full("complete".into(), true, df.height());
    let mut missing_cells = 0;

    for column in df.get_columns() {
        missing_cells += column.null_count();
        mask = &mask & &column.is_not_null();

        if is_float_dtype(column.dtype()) {
            let series = column.as_materialized_series();
            missing_cells += series.is_nan()?.sum().unwrap_or(0) as usize;
            mask = &mask & &series.is_not_nan()?;
        }
    }

    // is_not_nan is null on null cells
    Ok((mask.fill_null_with_values(false)?, missing_cells))
}

impl Stage for DataCollector {
    type Input<'a> = &'a Path;
    type Output = DataFrame;

    fn name(&self) -> &'static str {
        "DataCollector"
    }

    fn run(&mut self, path: &Path) -> Result<DataFrame> {
        self.state.clear();
        self.state.set("source", path.display().to_string());

        let df = self.read(path)?;
        let (rows, columns) = df.shape();
        self.state.set("rows_loaded", rows);
        self.state.set("columns_loaded", columns);
        self.note(format!("Loaded {} rows x {} columns from {}", rows, columns, path.display()));

        let df = match self.cleaning_order {
            CleaningOrder::DuplicatesFirst => {
                let df = self.remove_duplicates(df)?;
                self.remove_incomplete(df)?
            }
            CleaningOrder::IncompleteFirst => {
                let df = self.remove_incomplete(df)?;
                let df = self.remove_duplicates(df)?;
                self.state.set("rows_remaining", df.height());
                df
            }
        };

        debug!("Collection finished with shape {:?}", df.shape());
        Ok(df)
    }

    fn state(&self) -> &StageState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut StageState {
        &mut self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_removes_duplicates_then_incomplete() {
        let file = write_csv("a,b\n1,x\n1,x\n2,\n3,z\n3,z\n");
        let mut collector = DataCollector::new();

        let df = collector.collect(file.path()).unwrap();

        assert_eq!(df.shape(), (2, 2));
        let state = collector.state();
        assert_eq!(state.get_usize("rows_loaded"), Some(5));
        assert_eq!(state.get_usize("duplicates_removed"), Some(2));
        assert_eq!(state.get_usize("missing_cells"), Some(1));
        assert_eq!(state.get_usize("rows_remaining"), Some(2));
        assert_eq!(state.notes().len(), 3);
    }

    #[test]
    fn test_incomplete_first_counts_every_missing_cell() {
        let file = write_csv("a,b\n1,\n1,\n2,y\n");
        let config = PipelineConfig::builder()
            .cleaning_order(CleaningOrder::IncompleteFirst)
            .build()
            .unwrap();
        let mut collector = DataCollector::from_config(&config);

        let df = collector.collect(file.path()).unwrap();

        assert_eq!(df.height(), 1);
        assert_eq!(collector.state().get_usize("missing_cells"), Some(2));
        assert_eq!(collector.state().get_usize("duplicates_removed"), Some(0));
        assert_eq!(collector.state().get_usize("rows_remaining"), Some(1));
    }

    #[test]
    fn test_nan_counts_as_missing() {
        let file = write_csv("a,b\n1.0,2.0\nNaN,3.0\n4.0,5.0\n");
        let mut collector = DataCollector::new();

        let df = collector.collect(file.path()).unwrap();

        assert_eq!(df.height(), 2);
        assert_eq!(collector.state().get_usize("missing_cells"), Some(1));
    }

    #[test]
    fn test_missing_markers_count_as_missing() {
        let file = write_csv("age,city\n25,paris\nNA,rome\n35,N/A\n45,oslo\nnull,bern\n");
        let mut collector = DataCollector::new();

        let df = collector.collect(file.path()).unwrap();

        assert_eq!(df.shape(), (2, 2));
        assert_eq!(df.column("age").unwrap().dtype(), &DataType::Int64);
        assert_eq!(collector.state().get_usize("missing_cells"), Some(3));
    }

    #[test]
    fn test_late_float_widens_integer_column() {
        let mut contents = String::from("a,b\n");
        for i in 0..150 {
            contents.push_str(&format!("{},{}\n", i, i % 2));
        }
        contents.push_str("3.5,1\n");
        let file = write_csv(&contents);
        let mut collector = DataCollector::new();

        let df = collector.collect(file.path()).unwrap();

        assert_eq!(df.height(), 151);
        assert_eq!(df.column("a").unwrap().dtype(), &DataType::Float64);
    }

    #[test]
    fn test_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let mut collector = DataCollector::new();
        let result = collector.collect(&dir.path().join("nope.csv"));
        assert!(matches!(result, Err(PipelineError::SourceNotFound { .. })));
    }

    #[test]
    fn test_empty_source_is_format_error() {
        let file = write_csv("");
        let mut collector = DataCollector::new();
        let result = collector.collect(file.path());
        assert!(matches!(result, Err(PipelineError::FormatError { .. })));
    }

    #[test]
    fn test_state_is_reset_between_runs() {
        let file = write_csv("a\n1\n1\n");
        let mut collector = DataCollector::new();
        collector.collect(file.path()).unwrap();
        collector.collect(file.path()).unwrap();

        assert_eq!(collector.state().notes().len(), 3);
        assert_eq!(collector.state().get_usize("duplicates_removed"), Some(1));
    }
}
