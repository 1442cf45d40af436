//! Runs parameter searches for many records at once. Records sharing the
//! same number of entries share a single search.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
};

use log::{info, warn};

use crate::{Error, FilterSpec, Params, SearchError};

/// Outcome of the search done for each distinct number of entries
pub type Searches = BTreeMap<i64, Result<FilterSpec, SearchError>>;

#[inline(always)]
pub fn optimal_jobs(jobs: usize) -> usize {
    match jobs {
        0 => thread::available_parallelism()
            .map(|j| j.get())
            .unwrap_or(1),
        _ => jobs,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport<K: Ord> {
    pub specs: BTreeMap<K, FilterSpec>,
    pub failures: BTreeMap<K, SearchError>,
    /// number of searches actually run
    pub searches: usize,
}

impl<K: Ord> BatchReport<K> {
    pub fn get(&self, key: &K) -> Option<Result<&FilterSpec, &SearchError>> {
        match self.specs.get(key) {
            Some(spec) => Some(Ok(spec)),
            None => self.failures.get(key).map(Err),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Searches parameters for every distinct value of `entries` using `jobs`
/// threads (0 to use the available parallelism).
pub fn search_distinct<I>(entries: I, params: Params, jobs: usize) -> Result<Searches, Error>
where
    I: IntoIterator<Item = i64>,
{
    let distinct = entries.into_iter().collect::<BTreeSet<i64>>();
    let total = distinct.len();
    let jobs = optimal_jobs(jobs).min(total.max(1));

    // search cost grows with entries so values are dealt round robin
    let mut batches = vec![vec![]; jobs];
    for (i, n) in distinct.into_iter().enumerate() {
        batches[i % jobs].push(n);
    }

    let done = Arc::new(AtomicUsize::new(0));
    let log_every = (total / 10).max(1);
    let mut handles = vec![];

    for batch in batches {
        let done = Arc::clone(&done);

        handles.push(thread::spawn(move || {
            let mut out = Vec::with_capacity(batch.len());
            for n in batch {
                out.push((n, params.find(n)));

                let done = done.fetch_add(1, Ordering::Relaxed) + 1;
                if done % log_every == 0 || done == total {
                    info!("searched parameters for {done}/{total} entry counts");
                }
            }
            out
        }));
    }

    let mut searches = Searches::new();
    for h in handles {
        searches.extend(h.join().map_err(|_| Error::Worker)?);
    }

    Ok(searches)
}

/// Maps every record to the filter parameters matching its number of
/// entries. A failed search only affects the records sharing its number
/// of entries.
///
/// # Example
///
/// ```
/// use std::collections::BTreeMap;
/// use vicbf_params::{batch, Params};
///
/// let records = BTreeMap::from([("a", 500), ("b", 500), ("c", 700)]);
/// let report = batch::run(&records, Params::default(), 2).unwrap();
///
/// assert_eq!(report.searches, 2);
/// assert_eq!(report.specs["a"], report.specs["b"]);
/// ```
pub fn run<K: Ord + Clone>(
    records: &BTreeMap<K, i64>,
    params: Params,
    jobs: usize,
) -> Result<BatchReport<K>, Error> {
    let searches = search_distinct(records.values().copied(), params, jobs)?;

    let mut report = BatchReport {
        specs: BTreeMap::new(),
        failures: BTreeMap::new(),
        searches: searches.len(),
    };

    for (key, n) in records {
        match searches.get(n) {
            Some(Ok(spec)) => {
                report.specs.insert(key.clone(), *spec);
            }
            Some(Err(e)) => {
                report.failures.insert(key.clone(), e.clone());
            }
            // every value has been searched
            None => unreachable!(),
        }
    }

    searches
        .iter()
        .filter_map(|(n, r)| r.as_ref().err().map(|e| (n, e)))
        .for_each(|(n, e)| warn!("no parameters for {n} entries: {e}"));

    Ok(report)
}
