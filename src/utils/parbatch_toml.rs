//! Load `.parbatch.toml` and `PARBATCH_*` environment overrides (CLI only). Lib callers pass a
//! [`Config`](crate::Config) directly.

use serde::Deserialize;
use std::path::Path;

use crate::Opts;
use crate::utils::config::PackagePaths;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ParbatchToml {
    #[serde(default)]
    settings: SettingsSection,
}

#[derive(Debug, Default, Deserialize)]
struct SettingsSection {
    batch_size: Option<usize>,
    workers: Option<usize>,
    queue_cap: Option<usize>,
    combine_all: Option<bool>,
    distinct: Option<bool>,
    verbose: Option<bool>,
    json: Option<bool>,
}

/// Parse the TOML text of a config file. Errors are logged and yield None.
pub(crate) fn parse_parbatch_toml(s: &str, origin: &Path) -> Option<ParbatchToml> {
    toml::from_str(s)
        .map_err(|e| log::warn!("{}: {}", origin.display(), e))
        .ok()
}

/// Load the config file from `dir` if present. Returns None if file missing or unreadable.
pub(crate) fn load_parbatch_toml(dir: &Path) -> Option<ParbatchToml> {
    let path = dir.join(PackagePaths::get().config_filename());
    let s = std::fs::read_to_string(&path).ok()?;
    parse_parbatch_toml(&s, &path)
}

/// Overwrite opts field from file when present.
macro_rules! apply_file_opt {
    ($sec:expr, $opts:expr, $sec_field:ident => $opts_field:ident) => {
        if let Some(v) = $sec.$sec_field {
            $opts.$opts_field = v;
        }
    };
}

/// Apply file config to opts (only fields present in the file). Call before env and CLI.
pub(crate) fn apply_file_to_opts(file: &ParbatchToml, opts: &mut Opts) {
    let s = &file.settings;
    if s.batch_size.is_some() {
        opts.batch_size = s.batch_size;
    }
    if s.workers.is_some() {
        opts.num_threads = s.workers;
    }
    if s.queue_cap.is_some() {
        opts.queue_cap = s.queue_cap;
    }
    apply_file_opt!(s, opts, combine_all => combine_all);
    apply_file_opt!(s, opts, distinct => distinct);
    apply_file_opt!(s, opts, verbose => verbose);
    apply_file_opt!(s, opts, json => json);
}

fn env_usize(key: &str) -> Option<usize> {
    let name = PackagePaths::get().env_var(key);
    let raw = std::env::var(&name).ok()?;
    raw.trim()
        .parse()
        .map_err(|e| log::warn!("{}={:?}: {}", name, raw, e))
        .ok()
}

/// Apply `PARBATCH_BATCH_SIZE`, `PARBATCH_WORKERS`, `PARBATCH_QUEUE_CAP` (after `.env` is loaded).
pub(crate) fn apply_env_to_opts(opts: &mut Opts) {
    if let Some(v) = env_usize("BATCH_SIZE") {
        opts.batch_size = Some(v);
    }
    if let Some(v) = env_usize("WORKERS") {
        opts.num_threads = Some(v);
    }
    if let Some(v) = env_usize("QUEUE_CAP") {
        opts.queue_cap = Some(v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn file_settings_override_only_present_fields() {
        let toml = "[settings]\nbatch_size = 16\ncombine_all = true\n";
        let file = parse_parbatch_toml(toml, &PathBuf::from("test.toml")).unwrap();
        let mut opts = Opts {
            num_threads: Some(3),
            ..Default::default()
        };
        apply_file_to_opts(&file, &mut opts);
        assert_eq!(opts.batch_size, Some(16));
        assert_eq!(opts.num_threads, Some(3));
        assert!(opts.combine_all);
        assert!(!opts.distinct);
    }

    #[test]
    fn malformed_file_is_ignored() {
        assert!(parse_parbatch_toml("[settings]\nbatch_size = \"x\"", &PathBuf::from("bad")).is_none());
    }

    #[test]
    fn missing_settings_table_is_empty() {
        let file = parse_parbatch_toml("", &PathBuf::from("empty")).unwrap();
        let mut opts = Opts::default();
        apply_file_to_opts(&file, &mut opts);
        assert_eq!(opts.batch_size, None);
    }
}
