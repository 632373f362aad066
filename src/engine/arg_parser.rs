use clap::{Parser, ValueEnum};
use std::path::PathBuf;

struct DefaultArgs;

impl DefaultArgs {
    pub const INPUT: &'static str = "-";
}

/// Terminal operation run by the CLI.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OpKind {
    /// All values (source order with --combine-all).
    ToVec,
    /// Distinct values, printed sorted.
    ToSet,
    /// Print each value as its batch processes it.
    ForEach,
    Count,
    /// Sum of the values (parallel fold).
    Sum,
    /// Does any value satisfy --pred?
    Any,
    /// Do all values satisfy --pred?
    All,
    /// Does no value satisfy --pred?
    #[value(name = "none")]
    NoneMatch,
    /// First value (source order) satisfying --pred.
    Detect,
    /// Group values by --key.
    GroupBy,
    /// Group values under every key of a comma-separated --key list.
    GroupByEach,
    /// Index values by --key; fails on a repeated key.
    GroupByUniqueKey,
}

impl OpKind {
    /// Ops where --pred is the terminal predicate rather than a filter step.
    pub fn is_query(self) -> bool {
        matches!(self, OpKind::Any | OpKind::All | OpKind::NoneMatch | OpKind::Detect)
    }

    pub fn needs_key(self) -> bool {
        matches!(
            self,
            OpKind::GroupBy | OpKind::GroupByEach | OpKind::GroupByUniqueKey
        )
    }
}

/// Batch-parallel operations over a list of integers.
#[derive(Clone, Parser)]
#[command(name = "parbatch")]
#[command(about = "Split integers into batches, run a filter/map chain on a worker pool, merge the results.")]
pub struct Cli {
    /// File with one integer per line. `-` or absent: stdin.
    #[arg(value_name = "INPUT", default_value = DefaultArgs::INPUT)]
    pub input: PathBuf,

    /// Terminal operation.
    #[arg(long, short = 'o', value_enum)]
    pub op: OpKind,

    /// Predicate: even, odd, gt:N, lt:N, eq:N, mod:K:R, fail-on:N. Filter step, or the query
    /// predicate for any/all/none/detect.
    #[arg(long, short = 'p')]
    pub pred: Option<String>,

    /// Transform: square, neg, add:N, mul:N, div:N (N divided by the value), repeat:N.
    #[arg(long, short = 'm')]
    pub map: Option<String>,

    /// Grouping key: mod:K or sign. Comma-separated list for group-by-each.
    #[arg(long, short = 'k')]
    pub key: Option<String>,

    /// Elements per batch.
    #[arg(long, short = 'b')]
    pub batch_size: Option<usize>,

    /// Worker threads. Default: available parallelism.
    #[arg(long, short = 'w')]
    pub workers: Option<usize>,

    /// Batches that may wait in the submission queue.
    #[arg(long)]
    pub queue_cap: Option<usize>,

    /// Hold partial containers and merge them in batch order (source-ordered output).
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub combine_all: Option<bool>,

    /// De-duplicate the input across all batches before any other step.
    #[arg(long, short = 'd', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub distinct: Option<bool>,

    /// Print the result (and dispatch stats when available) as JSON.
    #[arg(long, short = 'j', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub json: Option<bool>,

    /// Verbose output: debug logging and a batch progress bar.
    #[arg(long, short = 'v', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub verbose: Option<bool>,
}

impl Cli {
    /// True when input should be read from stdin.
    pub fn reads_stdin(&self) -> bool {
        self.input.as_os_str() == DefaultArgs::INPUT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags_and_defaults() {
        let cli = Cli::try_parse_from([
            "parbatch",
            "--op",
            "group-by-unique-key",
            "--key",
            "mod:3",
            "-b",
            "8",
            "--distinct",
        ])
        .unwrap();
        assert_eq!(cli.op, OpKind::GroupByUniqueKey);
        assert!(cli.reads_stdin());
        assert_eq!(cli.batch_size, Some(8));
        assert_eq!(cli.distinct, Some(true));
        assert_eq!(cli.combine_all, None);
        assert!(cli.op.needs_key());
    }

    #[test]
    fn explicit_false_overrides_file() {
        let cli = Cli::try_parse_from(["parbatch", "nums.txt", "-o", "any", "--json=false"]).unwrap();
        assert_eq!(cli.json, Some(false));
        assert!(!cli.reads_stdin());
        assert!(cli.op.is_query());
    }

    #[test]
    fn op_is_required() {
        assert!(Cli::try_parse_from(["parbatch"]).is_err());
    }
}
