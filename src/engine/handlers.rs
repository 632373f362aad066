//! CLI command handler: layer the options, read the integers, run one operation, print the result.

use anyhow::{Context, Result, bail};
use log::{debug, info};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::io::Read;

use crate::engine::arg_parser::{Cli, OpKind};
use crate::engine::expr::{KeyFn, Pred, Transform};
use crate::utils::parbatch_toml::{apply_env_to_opts, apply_file_to_opts, load_parbatch_toml};
use crate::utils::setup_logging;
use crate::{Config, DispatchStats, Opts, ParallelIterable, par_iter};

/// Defaults, then `.parbatch.toml`, then `PARBATCH_*` env, then flags.
fn setup_opts(cli: &Cli) -> Opts {
    let mut opts = Opts::default();
    if let Ok(cwd) = std::env::current_dir()
        && let Some(file) = load_parbatch_toml(&cwd)
    {
        apply_file_to_opts(&file, &mut opts);
    }
    apply_env_to_opts(&mut opts);
    apply_cli_to_opts(cli, &mut opts);
    setup_logging(opts.verbose);
    opts
}

fn apply_cli_to_opts(cli: &Cli, opts: &mut Opts) {
    if cli.batch_size.is_some() {
        opts.batch_size = cli.batch_size;
    }
    if cli.workers.is_some() {
        opts.num_threads = cli.workers;
    }
    if cli.queue_cap.is_some() {
        opts.queue_cap = cli.queue_cap;
    }
    if let Some(v) = cli.combine_all {
        opts.combine_all = v;
    }
    if let Some(v) = cli.distinct {
        opts.distinct = v;
    }
    if let Some(v) = cli.json {
        opts.json = v;
    }
    if let Some(v) = cli.verbose {
        opts.verbose = v;
    }
}

/// Parse integers, one per line. Blank lines and `#` comments are skipped.
pub fn parse_input(text: &str) -> Result<Vec<i64>> {
    text.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(n, line)| {
            line.parse::<i64>()
                .with_context(|| format!("line {}: not an integer: {:?}", n, line))
        })
        .collect()
}

fn read_input(cli: &Cli) -> Result<Vec<i64>> {
    let text = if cli.reads_stdin() {
        let mut s = String::new();
        std::io::stdin()
            .read_to_string(&mut s)
            .context("reading stdin")?;
        s
    } else {
        std::fs::read_to_string(&cli.input)
            .with_context(|| format!("reading {}", cli.input.display()))?
    };
    parse_input(&text)
}

/// Result of one CLI run, serialized for `--json`.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub op: String,
    pub chain: String,
    pub result: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<DispatchStats>,
}

/// Parsed `--pred/--map/--key` for one run.
struct Exprs {
    pred: Option<Pred>,
    map: Option<Transform>,
    keys: Vec<KeyFn>,
}

impl Exprs {
    fn parse(cli: &Cli) -> Result<Self> {
        let pred = cli.pred.as_deref().map(str::parse::<Pred>).transpose()?;
        let map = cli.map.as_deref().map(str::parse::<Transform>).transpose()?;
        let keys = match cli.key.as_deref() {
            Some(k) => KeyFn::parse_list(k)?,
            None => Vec::new(),
        };
        if cli.op.is_query() && pred.is_none() {
            bail!("--op {:?} needs --pred", cli.op);
        }
        if cli.op.needs_key() && keys.is_empty() {
            bail!("--op {:?} needs --key", cli.op);
        }
        if keys.len() > 1 && cli.op != OpKind::GroupByEach {
            bail!("only group-by-each takes a list of keys");
        }
        Ok(Self { pred, map, keys })
    }
}

/// Build the lazy view: optional distinct (from config), filter unless the predicate is the query,
/// then the transform.
fn build_view<'a>(
    data: &'a [i64],
    config: Config,
    op: OpKind,
    exprs: &Exprs,
) -> ParallelIterable<'a, i64, i64> {
    let mut view = par_iter(data, config);
    if let Some(pred) = exprs.pred
        && !op.is_query()
    {
        view = view.try_select(move |x: &i64| pred.eval(*x));
    }
    match exprs.map {
        Some(Transform::Repeat(n)) => view.flat_collect(move |x| std::iter::repeat_n(x, n)),
        Some(t) => view.try_collect(move |x| t.apply(x)),
        None => view,
    }
}

/// Run `op` over `view`.
fn run_op(view: &ParallelIterable<'_, i64, i64>, op: OpKind, exprs: &Exprs) -> Result<RunReport> {
    // Query predicates may fail (fail-on:N), so they are evaluated in the chain and the terminal
    // only looks at the flag.
    let flagged = |pred: Pred| {
        view.clone()
            .try_collect(move |x: i64| pred.eval(x).map(|hit| (x, hit)))
    };
    let mut stats = None;
    let result = match op {
        OpKind::ToVec => {
            let (v, s) = view.to_vec_with_stats()?;
            stats = Some(s);
            json!(v)
        }
        OpKind::ToSet => {
            let mut v: Vec<i64> = view.to_set()?.into_iter().collect();
            v.sort_unstable();
            json!(v)
        }
        OpKind::ForEach => {
            view.for_each(|x| println!("{}", x))?;
            Value::Null
        }
        OpKind::Count => json!(view.count()?),
        OpKind::Sum => {
            let sum = view.fold(|| 0_i128, |acc, x| acc + i128::from(x), |a, b| a + b)?;
            match i64::try_from(sum) {
                Ok(v) => json!(v),
                Err(_) => json!(sum.to_string()),
            }
        }
        OpKind::Any | OpKind::NoneMatch => {
            let pred = query_pred(exprs)?;
            let (any, s) = flagged(pred).any_satisfy_with_stats(|(_, hit)| *hit)?;
            stats = Some(s);
            json!(if op == OpKind::Any { any } else { !any })
        }
        OpKind::All => {
            let pred = query_pred(exprs)?;
            let (all, s) = flagged(pred).all_satisfy_with_stats(|(_, hit)| *hit)?;
            stats = Some(s);
            json!(all)
        }
        OpKind::Detect => {
            let pred = query_pred(exprs)?;
            let (found, s) = flagged(pred).detect_with_stats(|(_, hit)| *hit)?;
            stats = Some(s);
            json!(found.map(|(x, _)| x))
        }
        OpKind::GroupBy => {
            let key = exprs.keys[0];
            let groups = view.group_by(move |x| key.key(*x))?;
            json!(groups.into_iter().collect::<BTreeMap<_, _>>())
        }
        OpKind::GroupByEach => {
            let keys = exprs.keys.clone();
            let groups = view.group_by_each(move |x| keys.iter().map(|k| k.key(*x)).collect::<Vec<_>>())?;
            json!(groups.into_iter().collect::<BTreeMap<_, _>>())
        }
        OpKind::GroupByUniqueKey => {
            let key = exprs.keys[0];
            let index = view.group_by_unique_key(move |x| key.key(*x))?;
            json!(index.into_iter().collect::<BTreeMap<_, _>>())
        }
    };
    Ok(RunReport {
        op: format!("{:?}", op),
        chain: view.chain().describe(),
        result,
        stats,
    })
}

fn query_pred(exprs: &Exprs) -> Result<Pred> {
    exprs.pred.context("query needs a predicate")
}

fn print_text(report: &RunReport) {
    match &report.result {
        Value::Null => {}
        Value::Array(items) => {
            for item in items {
                println!("{}", item);
            }
        }
        Value::Object(groups) => {
            for (key, values) in groups {
                println!("{}: {}", key, values);
            }
        }
        Value::String(s) => println!("{}", s),
        other => println!("{}", other),
    }
    if let Some(s) = &report.stats {
        info!(
            "batches: {} total, {} submitted, {} skipped, {} completed, {} discarded, {} failed",
            s.total_batches, s.submitted, s.skipped, s.completed, s.discarded, s.failed
        );
    }
}

/// Parse options and input, run the requested operation and print its result.
pub fn handle_run(cli: &Cli) -> Result<()> {
    let opts = setup_opts(cli);
    let exprs = Exprs::parse(cli)?;
    let data = read_input(cli)?;
    debug!("read {} integers", data.len());

    let config = Config::from(&opts);
    let view = build_view(&data, config, cli.op, &exprs);
    let report = run_op(&view, cli.op, &exprs)?;

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_text(&report);
    }
    Ok(())
}
