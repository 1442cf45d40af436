use std::collections::BTreeMap;

use pyo3::{exceptions::PyValueError, prelude::*};
use vicbf::{
    batch, IterationLimit, Params, SearchError, DEFAULT_DEVIATION, DEFAULT_DIGIT_BASE,
    DEFAULT_TARGET,
};

struct Error(String);

impl From<vicbf::Error> for Error {
    fn from(value: vicbf::Error) -> Self {
        Self(value.to_string())
    }
}

impl From<SearchError> for Error {
    fn from(value: SearchError) -> Self {
        Self(value.to_string())
    }
}

impl From<Error> for PyErr {
    fn from(value: Error) -> Self {
        PyValueError::new_err(value.0)
    }
}

fn params(target: f64, deviation: f64, digit_base: f64, max_iterations: Option<u64>) -> Params {
    Params::new(target, deviation)
        .digit_base(digit_base)
        .limit(match max_iterations {
            Some(max) => IterationLimit::Fixed(max),
            None => IterationLimit::Auto,
        })
}

#[pyclass]
#[derive(Clone, Copy)]
/// Filter parameters found for a number of entries
pub struct FilterSpec(vicbf::FilterSpec);

#[pymethods]
impl FilterSpec {
    #[getter]
    pub fn entries(&self) -> u64 {
        self.0.entries
    }

    #[getter]
    pub fn hash_functions(&self) -> u64 {
        self.0.hash_functions
    }

    #[getter]
    pub fn slots(&self) -> u64 {
        self.0.slots
    }

    #[getter]
    pub fn fpr(&self) -> f64 {
        self.0.fpr
    }

    #[getter]
    pub fn iterations(&self) -> u64 {
        self.0.iterations
    }

    /// Estimated size in bytes of the serialized filter
    #[getter]
    pub fn uncompressed_size(&self) -> u64 {
        self.0.size_estimate().uncompressed
    }

    /// Estimated size in bytes of the compressed filter
    #[getter]
    pub fn compressed_size(&self) -> u64 {
        self.0.size_estimate().compressed
    }

    fn __repr__(&self) -> String {
        format!(
            "FilterSpec(entries={}, hash_functions={}, slots={}, fpr={})",
            self.0.entries, self.0.hash_functions, self.0.slots, self.0.fpr
        )
    }
}

#[pyfunction]
/// Estimates the false positive rate of a filter with m slots, digit
/// base l and k hash functions holding n entries
pub fn estimate_fpr(n: f64, m: f64, l: f64, k: f64) -> f64 {
    vicbf::estimate_fpr(n, m, l, k)
}

#[pyfunction]
#[pyo3(signature = (entries, target=DEFAULT_TARGET, deviation=DEFAULT_DEVIATION, digit_base=DEFAULT_DIGIT_BASE, max_iterations=None))]
/// Searches the number of hash functions and slots needed by a filter
/// holding entries to reach the target false positive rate
pub fn find_params(
    py: Python<'_>,
    entries: i64,
    target: f64,
    deviation: f64,
    digit_base: f64,
    max_iterations: Option<u64>,
) -> PyResult<FilterSpec> {
    let p = params(target, deviation, digit_base, max_iterations);
    let spec = py.allow_threads(|| p.find(entries)).map_err(Error::from)?;
    Ok(FilterSpec(spec))
}

#[pyfunction]
#[pyo3(signature = (records, target=DEFAULT_TARGET, deviation=DEFAULT_DEVIATION, digit_base=DEFAULT_DIGIT_BASE, max_iterations=None, jobs=0))]
/// Searches filter parameters for every record, records with the same
/// number of entries share a single search. Returns the parameters found
/// and the error messages of the failed records.
#[allow(clippy::type_complexity)]
pub fn find_batch(
    py: Python<'_>,
    records: BTreeMap<String, i64>,
    target: f64,
    deviation: f64,
    digit_base: f64,
    max_iterations: Option<u64>,
    jobs: usize,
) -> PyResult<(BTreeMap<String, FilterSpec>, BTreeMap<String, String>)> {
    let p = params(target, deviation, digit_base, max_iterations);
    p.validate().map_err(Error::from)?;

    let report = py
        .allow_threads(|| batch::run(&records, p, jobs))
        .map_err(Error::from)?;

    Ok((
        report
            .specs
            .into_iter()
            .map(|(k, s)| (k, FilterSpec(s)))
            .collect(),
        report
            .failures
            .into_iter()
            .map(|(k, e)| (k, e.to_string()))
            .collect(),
    ))
}

/// Python bindings to the VI-CBF parameter search library (written in Rust)
#[pymodule]
#[pyo3(name = "vicbf")]
fn vicbf_py(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<FilterSpec>()?;
    m.add_function(wrap_pyfunction!(estimate_fpr, m)?)?;
    m.add_function(wrap_pyfunction!(find_params, m)?)?;
    m.add_function(wrap_pyfunction!(find_batch, m)?)?;
    Ok(())
}
