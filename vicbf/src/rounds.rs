//! Aggregated simulation rounds: whitespace separated rows where the first
//! column is the round number. The number of entries a filter must hold is
//! derived from the columns of each row, one value per statistic.

use std::{
    collections::BTreeMap,
    fmt::Display,
    io::{BufRead, Write},
    str::FromStr,
};

use log::{info, warn};

use crate::{
    batch::{self, BatchReport},
    Error, Params,
};

/// Zero based column index, or difference of two columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnExpr {
    Column(usize),
    Diff(usize, usize),
}

impl FromStr for ColumnExpr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let index = |c: &str| {
            c.trim()
                .parse::<usize>()
                .map_err(|_| Error::InvalidExpr(s.to_string()))
        };

        match s.split_once('-') {
            Some((a, b)) => Ok(Self::Diff(index(a)?, index(b)?)),
            None => Ok(Self::Column(index(s)?)),
        }
    }
}

impl Display for ColumnExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Column(c) => write!(f, "{c}"),
            Self::Diff(a, b) => write!(f, "{a}-{b}"),
        }
    }
}

impl ColumnExpr {
    pub fn eval(&self, fields: &[&str]) -> Result<i64, String> {
        let col = |i: usize| -> Result<i64, String> {
            fields
                .get(i)
                .ok_or_else(|| format!("missing column {i}"))?
                .parse::<i64>()
                .map_err(|e| format!("column {i}: {e}"))
        };

        match *self {
            Self::Column(c) => col(c),
            Self::Diff(a, b) => col(a)?
                .checked_sub(col(b)?)
                .ok_or_else(|| format!("overflow computing {self}")),
        }
    }
}

/// A named column expression, written `NAME=EXPR` (e.g. `r_med=26-31`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statistic {
    pub name: String,
    pub expr: ColumnExpr,
}

impl Statistic {
    pub fn new<S: Into<String>>(name: S, expr: ColumnExpr) -> Self {
        Self {
            name: name.into(),
            expr,
        }
    }
}

impl FromStr for Statistic {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((name, expr)) if !name.trim().is_empty() => {
                Ok(Self::new(name.trim(), expr.parse()?))
            }
            _ => Err(Error::InvalidExpr(s.to_string())),
        }
    }
}

impl Display for Statistic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.name, self.expr)
    }
}

/// Statistic sets of the round files produced by the simulator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    /// entries retrieved at least once (median, min and max)
    RetrOnly,
    /// entries not retrieved and never retrieved, side by side
    Proto1,
}

impl Preset {
    fn as_str(&self) -> &'static str {
        match self {
            Self::RetrOnly => "retr-only",
            Self::Proto1 => "proto1",
        }
    }

    pub fn statistics(&self) -> Vec<Statistic> {
        use ColumnExpr::*;
        match self {
            Self::RetrOnly => vec![
                Statistic::new("r_med", Diff(26, 31)),
                Statistic::new("r_min", Diff(29, 34)),
                Statistic::new("r_max", Diff(30, 35)),
            ],
            Self::Proto1 => vec![
                Statistic::new("nor_med", Column(26)),
                Statistic::new("nor_min", Column(29)),
                Statistic::new("nor_max", Column(30)),
                Statistic::new("nvr_med", Column(31)),
                Statistic::new("nvr_min", Column(34)),
                Statistic::new("nvr_max", Column(35)),
            ],
        }
    }
}

impl Display for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Preset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            s if s == Self::RetrOnly.as_str() => Ok(Self::RetrOnly),
            s if s == Self::Proto1.as_str() => Ok(Self::Proto1),
            _ => Err(Error::UnknownPreset(s.to_string())),
        }
    }
}

/// Entries derived for a round, in the order of the statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Round {
    pub number: u64,
    pub entries: Vec<i64>,
}

/// Reads rounds sorted by number. Lines starting with `r` (header) or `#`
/// are ignored, so is round 0. When a round appears twice the last
/// occurrence wins.
pub fn read_rounds<R: BufRead>(r: R, stats: &[Statistic]) -> Result<Vec<Round>, Error> {
    let mut rounds = BTreeMap::new();

    for (i, line) in r.lines().enumerate() {
        let line = line?;
        let lineno = i + 1;

        if line.starts_with('r') || line.starts_with('#') || line.trim().is_empty() {
            continue;
        }

        let fields = line.split_whitespace().collect::<Vec<&str>>();
        let number = fields[0].parse::<u64>().map_err(|e| Error::Parse {
            line: lineno,
            reason: format!("round number: {e}"),
        })?;

        if number == 0 {
            continue;
        }

        let entries = stats
            .iter()
            .map(|s| {
                s.expr.eval(&fields).map_err(|reason| Error::Parse {
                    line: lineno,
                    reason: format!("{}: {reason}", s.name),
                })
            })
            .collect::<Result<Vec<i64>, Error>>()?;

        rounds.insert(number, entries);
    }

    Ok(rounds
        .into_iter()
        .map(|(number, entries)| Round { number, entries })
        .collect())
}

/// Batch records keyed by `(round number, statistic index)`
pub fn records(rounds: &[Round]) -> BTreeMap<(u64, usize), i64> {
    rounds
        .iter()
        .flat_map(|r| {
            r.entries
                .iter()
                .enumerate()
                .map(move |(i, &n)| ((r.number, i), n))
        })
        .collect()
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TableSummary {
    pub written: usize,
    pub omitted: usize,
}

/// Writes one row per round with, for every statistic, the number of hash
/// functions, slots, estimated fpr and estimated uncompressed and
/// compressed sizes. Rounds with a failed statistic are omitted.
pub fn write_table<W: Write>(
    w: &mut W,
    stats: &[Statistic],
    rounds: &[Round],
    report: &BatchReport<(u64, usize)>,
) -> Result<TableSummary, Error> {
    let mut summary = TableSummary::default();

    let mut header = String::from("round");
    for s in stats {
        let n = &s.name;
        header.push_str(&format!(" {n}_hf {n}_slots {n}_prob {n}_lu {n}_lc"));
    }
    writeln!(w, "{header}")?;

    'rounds: for round in rounds {
        let mut row = round.number.to_string();

        for (i, stat) in stats.iter().enumerate() {
            match report.get(&(round.number, i)) {
                Some(Ok(spec)) => {
                    let size = spec.size_estimate();
                    row.push_str(&format!(
                        " {} {} {} {} {}",
                        spec.hash_functions, spec.slots, spec.fpr, size.uncompressed, size.compressed
                    ));
                }
                Some(Err(e)) => {
                    warn!("omitting round {}: {}: {e}", round.number, stat.name);
                    summary.omitted += 1;
                    continue 'rounds;
                }
                None => {
                    warn!("omitting round {}: {} was not computed", round.number, stat.name);
                    summary.omitted += 1;
                    continue 'rounds;
                }
            }
        }

        writeln!(w, "{row}")?;
        summary.written += 1;
    }

    Ok(summary)
}

/// Reads rounds from `r`, searches filter parameters for all their
/// statistics and writes the resulting table to `w`.
pub fn scale<R: BufRead, W: Write>(
    r: R,
    w: &mut W,
    stats: &[Statistic],
    params: Params,
    jobs: usize,
) -> Result<TableSummary, Error> {
    let rounds = read_rounds(r, stats)?;
    let records = records(&rounds);
    info!(
        "read {} rounds, {} values to search parameters for",
        rounds.len(),
        records.len()
    );

    let report = batch::run(&records, params, jobs)?;
    info!("{} distinct searches done", report.searches);

    write_table(w, stats, &rounds, &report)
}

#[cfg(test)]
mod test {
    use std::io;

    use super::*;
    use crate::SearchError;

    fn row(round: u64, values: &[(usize, i64)]) -> String {
        let mut fields = vec![String::from("1"); 36];
        fields[0] = round.to_string();
        for &(i, v) in values {
            fields[i] = v.to_string();
        }
        fields.join(" ")
    }

    fn sample() -> String {
        [
            "round a b c".to_string(),
            "# comment".to_string(),
            row(0, &[]),
            row(2, &[(26, 600), (31, 100), (29, 550), (34, 50), (30, 800), (35, 100)]),
            row(1, &[(26, 600), (31, 100), (29, 600), (34, 100), (30, 700), (35, 0)]),
            String::new(),
        ]
        .join("\n")
    }

    #[test]
    fn test_column_expr() {
        assert_eq!("26".parse::<ColumnExpr>().unwrap(), ColumnExpr::Column(26));
        assert_eq!(
            "26-31".parse::<ColumnExpr>().unwrap(),
            ColumnExpr::Diff(26, 31)
        );
        assert_eq!(
            " 1 - 2 ".parse::<ColumnExpr>().unwrap(),
            ColumnExpr::Diff(1, 2)
        );
        assert!(matches!(
            "a-1".parse::<ColumnExpr>(),
            Err(Error::InvalidExpr(_))
        ));
        assert!("".parse::<ColumnExpr>().is_err());
        assert_eq!(ColumnExpr::Diff(3, 4).to_string(), "3-4");

        let fields = ["1", "10", "3"];
        assert_eq!(ColumnExpr::Column(1).eval(&fields), Ok(10));
        assert_eq!(ColumnExpr::Diff(2, 1).eval(&fields), Ok(-7));
        assert!(ColumnExpr::Column(3).eval(&fields).is_err());
        assert!(ColumnExpr::Column(3).eval(&["x", "y", "z", "w"]).is_err());
    }

    #[test]
    fn test_statistic() {
        let s = "r_med=26-31".parse::<Statistic>().unwrap();
        assert_eq!(s, Statistic::new("r_med", ColumnExpr::Diff(26, 31)));
        assert_eq!(s.to_string(), "r_med=26-31");
        assert!("=26".parse::<Statistic>().is_err());
        assert!("r_med".parse::<Statistic>().is_err());
    }

    #[test]
    fn test_presets() {
        assert_eq!("retr-only".parse::<Preset>().unwrap(), Preset::RetrOnly);
        assert_eq!("proto1".parse::<Preset>().unwrap(), Preset::Proto1);
        assert!(matches!(
            "unknown".parse::<Preset>(),
            Err(Error::UnknownPreset(_))
        ));
        assert_eq!(Preset::RetrOnly.statistics().len(), 3);
        assert_eq!(Preset::Proto1.statistics().len(), 6);
        assert_eq!(Preset::Proto1.to_string(), "proto1");
    }

    #[test]
    fn test_read_rounds() {
        let stats = Preset::RetrOnly.statistics();
        let rounds = read_rounds(io::Cursor::new(sample()), &stats).unwrap();

        assert_eq!(
            rounds,
            vec![
                Round {
                    number: 1,
                    entries: vec![500, 500, 700]
                },
                Round {
                    number: 2,
                    entries: vec![500, 500, 700]
                },
            ]
        );

        let records = records(&rounds);
        assert_eq!(records.len(), 6);
        assert_eq!(records[&(2, 2)], 700);
    }

    #[test]
    fn test_read_errors() {
        let stats = Preset::RetrOnly.statistics();

        let err = read_rounds(io::Cursor::new("1 2 3\n"), &stats).unwrap_err();
        assert!(matches!(err, Error::Parse { line: 1, .. }));

        let err = read_rounds(io::Cursor::new("# header\nx 1 2\n"), &stats).unwrap_err();
        assert!(matches!(err, Error::Parse { line: 2, .. }));
    }

    #[test]
    fn test_scale() {
        let stats = Preset::RetrOnly.statistics();
        let mut out = vec![];

        let summary = scale(
            io::Cursor::new(sample()),
            &mut out,
            &stats,
            Params::default(),
            2,
        )
        .unwrap();
        assert_eq!(
            summary,
            TableSummary {
                written: 2,
                omitted: 0
            }
        );

        let out = String::from_utf8(out).unwrap();
        let lines = out.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("round r_med_hf r_med_slots r_med_prob r_med_lu r_med_lc"));
        assert_eq!(lines[0].split(' ').count(), 16);

        let fields = lines[1].split(' ').collect::<Vec<_>>();
        assert_eq!(fields.len(), 16);
        assert_eq!(fields[0], "1");
        assert_eq!(&fields[1..3], &["7", "3042"]);
        assert!((fields[3].parse::<f64>().unwrap() - 0.0010975286325648084).abs() < 1e-15);
        assert_eq!(&fields[4..6], &["3052", "1587"]);
        assert_eq!(&fields[11..13], &["7", "4258"]);
        assert_eq!(&fields[14..16], &["4268", "2219"]);
        assert!(lines[2].starts_with("2 7 3042"));
    }

    #[test]
    fn test_failed_rounds_are_omitted() {
        let stats = vec![Statistic::new("diff", ColumnExpr::Diff(1, 2))];
        let input = "1 100 50\n2 50 100\n3 0 0\n";
        let rounds = read_rounds(io::Cursor::new(input), &stats).unwrap();
        let report = batch::run(&records(&rounds), Params::default(), 1).unwrap();

        assert!(matches!(
            report.failures[&(2, 0)],
            SearchError::InvalidInput(_)
        ));

        let mut out = vec![];
        let summary = write_table(&mut out, &stats, &rounds, &report).unwrap();
        assert_eq!(
            summary,
            TableSummary {
                written: 1,
                omitted: 2
            }
        );

        let out = String::from_utf8(out).unwrap();
        assert_eq!(out.lines().count(), 2);
        assert!(out.lines().nth(1).unwrap().starts_with("1 7 "));
    }
}
