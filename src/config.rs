/*
 * This module contains the run configuration. A `FairEvalConfig` can be built in code with the
 * `FairEvalConfigBuilder`, or read from a `key = value` configuration file:
 *
 *   target_in = path/to/gold            # file or directory
 *   system_in = path/to/predictions     # file or directory
 *   eval_out = cmd                      # cmd, a directory (-> eval.csv) or a file
 *   labels = NP, PP                     # or all
 *   exclude = VP
 *   ignore_punct = true
 *   focus = target                      # or system
 *   weights = LE = 0.5*FP + 0.5*FN, BE = 0.5*TP + 0.5*FN
 *   eval_method = traditional, fair, weighted
 *   match_strategy = first              # or max_overlap
 *   parallel = false
*/
use crate::aggregator::{LabelFilter, MatchSettings};
use crate::matcher::{Focus, MatchStrategy};
use crate::metrics::EvalVersion;
use crate::weights::WeightTable;
use ahash::AHashSet;
use enum_iterator::all;
use std::error::Error;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::warn;

/// Labels that are always excluded when a deny-list is configured.
const ALWAYS_EXCLUDED: [&str; 2] = ["NONE", "EMPTY"];

/// File name used when the output is a directory.
const DEFAULT_OUTPUT_NAME: &str = "eval.csv";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `target_in` or `system_in` is missing
    MissingInput(&'static str),
    /// An input path is neither a file nor a directory
    NotFileOrDirectory { key: String, value: String },
    /// The output file cannot be created
    IllegalOutput(String),
    /// The configuration file cannot be read
    Unreadable { path: PathBuf, reason: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingInput(key) => write!(
                f,
                "Cannot evaluate without target AND system file(s): '{}' is missing",
                key
            ),
            Self::NotFileOrDirectory { key, value } => {
                write!(f, "'{} = {}' is not a file/directory", key, value)
            }
            Self::IllegalOutput(value) => {
                write!(f, "'eval_out = {}' is not a legal output file", value)
            }
            Self::Unreadable { path, reason } => write!(
                f,
                "Cannot read the configuration file {}: {}",
                path.display(),
                reason
            ),
        }
    }
}

impl Error for ConfigError {}

/// Where the report is written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum OutputTarget {
    #[default]
    Stdout,
    File(PathBuf),
}

impl Display for OutputTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => write!(f, "cmd"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Settings of an evaluation run.
pub struct FairEvalConfig {
    target_in: Option<PathBuf>,
    system_in: Option<PathBuf>,
    eval_out: OutputTarget,
    labels: Option<Vec<String>>,
    exclude: Vec<String>,
    ignore_punct: bool,
    focus: Focus,
    weights: Option<WeightTable>,
    eval_methods: Vec<EvalVersion>,
    strategy: MatchStrategy,
    parallel: bool,
}

impl Default for FairEvalConfig {
    fn default() -> Self {
        FairEvalConfigBuilder::new().build()
    }
}

/// Keeps the requested versions in canonical order. `weighted` needs weights: without them it is
/// replaced by `fair`.
fn normalize_methods(methods: &[EvalVersion], weights_given: bool) -> Vec<EvalVersion> {
    all::<EvalVersion>()
        .filter(|v| match v {
            EvalVersion::Weighted => weights_given && methods.contains(v),
            EvalVersion::Fair => {
                methods.contains(v) || (!weights_given && methods.contains(&EvalVersion::Weighted))
            }
            EvalVersion::Traditional => methods.contains(v),
        })
        .collect()
}

fn sorted_unique(values: impl IntoIterator<Item = String>) -> Vec<String> {
    let set: AHashSet<String> = values.into_iter().collect();
    let mut values: Vec<String> = set.into_iter().collect();
    values.sort_unstable();
    values
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(String::from)
        .collect()
}

fn check_input(key: &str, value: &str) -> Result<PathBuf, ConfigError> {
    let path = PathBuf::from(value);
    if path.is_dir() || path.is_file() {
        Ok(path)
    } else {
        Err(ConfigError::NotFileOrDirectory {
            key: String::from(key),
            value: String::from(value),
        })
    }
}

/// Resolves `eval_out`: `cmd` is the standard output, a directory receives `eval.csv`, anything
/// else is a file whose parent directories are created.
fn resolve_output(value: &str) -> Result<OutputTarget, ConfigError> {
    if value == "cmd" {
        return Ok(OutputTarget::Stdout);
    }
    let path = PathBuf::from(value);
    if path.is_dir() {
        return Ok(OutputTarget::File(path.join(DEFAULT_OUTPUT_NAME)));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|_| ConfigError::IllegalOutput(String::from(value)))?;
    }
    Ok(OutputTarget::File(path))
}

fn parse_methods(value: &str) -> Vec<EvalVersion> {
    if value.trim() == "all" {
        return all::<EvalVersion>().collect();
    }
    let requested: Vec<EvalVersion> = split_list(value)
        .iter()
        .filter_map(|m| match m.parse::<EvalVersion>() {
            Ok(version) => Some(version),
            Err(e) => {
                warn!("{}, ignoring it", e);
                None
            }
        })
        .collect();
    if requested.is_empty() {
        warn!("No evaluation method specified, applying all methods");
        all::<EvalVersion>().collect()
    } else {
        all::<EvalVersion>()
            .filter(|v| requested.contains(v))
            .collect()
    }
}

impl FairEvalConfig {
    /// Reads a configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_config_str(&text)
    }

    /// Parses the content of a configuration file. Comments start with `#`; the value is
    /// everything after the first `=`. Duplicate keys keep the last value.
    pub fn from_config_str(text: &str) -> Result<Self, ConfigError> {
        let mut builder = FairEvalConfigBuilder::new().eval_methods(all::<EvalVersion>());
        let mut seen: AHashSet<String> = AHashSet::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = match line.split_once('=') {
                Some((key, value)) => (key.trim(), value.trim()),
                None => (line, ""),
            };
            if !seen.insert(String::from(key)) {
                warn!("Duplicate config item '{}' found", key);
            }
            builder = match key {
                "target_in" => builder.target_in(check_input(key, value)?),
                "system_in" => builder.system_in(check_input(key, value)?),
                "eval_out" => builder.eval_out(resolve_output(value)?),
                "labels" => {
                    let labels = split_list(value);
                    if labels.iter().any(|l| l == "all") {
                        builder.all_labels()
                    } else {
                        builder.labels(labels)
                    }
                }
                "exclude" => builder.exclude(
                    split_list(value)
                        .into_iter()
                        .chain(ALWAYS_EXCLUDED.iter().map(|l| String::from(*l))),
                ),
                "ignore_punct" => builder.ignore_punct(!value.eq_ignore_ascii_case("false")),
                "focus" => builder.focus(value.parse().unwrap_or_default()),
                "weights" => builder.weights(WeightTable::from_formulas(value)),
                "eval_method" => builder.eval_methods(parse_methods(value)),
                "parallel" => builder.parallel(value.eq_ignore_ascii_case("true")),
                "match_strategy" => match value.parse::<MatchStrategy>() {
                    Ok(strategy) => builder.strategy(strategy),
                    Err(e) => {
                        warn!("{}, using '{}'", e, MatchStrategy::default());
                        builder
                    }
                },
                other => {
                    warn!("Unknown config item '{}' ignored", other);
                    builder
                }
            };
        }
        let config = builder.build();
        if config.target_in.is_none() {
            return Err(ConfigError::MissingInput("target_in"));
        }
        if config.system_in.is_none() {
            return Err(ConfigError::MissingInput("system_in"));
        }
        Ok(config)
    }

    pub fn target_in(&self) -> Option<&Path> {
        self.target_in.as_deref()
    }

    pub fn system_in(&self) -> Option<&Path> {
        self.system_in.as_deref()
    }

    pub fn eval_out(&self) -> &OutputTarget {
        &self.eval_out
    }

    pub fn ignore_punct(&self) -> bool {
        self.ignore_punct
    }

    pub fn focus(&self) -> Focus {
        self.focus
    }

    /// Weight table of the weighted evaluation; the fair table when none was configured.
    pub fn weights(&self) -> WeightTable {
        self.weights.unwrap_or_default()
    }

    pub fn weights_given(&self) -> bool {
        self.weights.is_some()
    }

    pub fn eval_methods(&self) -> &[EvalVersion] {
        &self.eval_methods
    }

    pub fn strategy(&self) -> MatchStrategy {
        self.strategy
    }

    pub fn parallel(&self) -> bool {
        self.parallel
    }

    /// Overrides the `parallel` setting, e.g. from a command line flag.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn label_filter(&self) -> LabelFilter {
        LabelFilter::new(self.labels.as_ref(), &self.exclude)
    }

    pub fn match_settings(&self) -> MatchSettings {
        MatchSettings {
            focus: self.focus,
            strategy: self.strategy,
            filter: self.label_filter(),
        }
    }
}

impl FromStr for FairEvalConfig {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_config_str(s)
    }
}

/// Lists the settings sorted by key, one `key: value` per line.
impl Display for FairEvalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let methods: Vec<String> = self.eval_methods.iter().map(|m| m.to_string()).collect();
        writeln!(f, "eval_method: {}", methods.join(", "))?;
        writeln!(f, "exclude: {}", self.exclude.join(", "))?;
        writeln!(f, "focus: {}", self.focus)?;
        writeln!(f, "ignore_punct: {}", self.ignore_punct)?;
        match &self.labels {
            Some(labels) => writeln!(f, "labels: {}", labels.join(", "))?,
            None => writeln!(f, "labels: all")?,
        }
        writeln!(f, "match_strategy: {}", self.strategy)?;
        writeln!(f, "parallel: {}", self.parallel)?;
        if let Some(system_in) = &self.system_in {
            writeln!(f, "system_in: {}", system_in.display())?;
        }
        if let Some(target_in) = &self.target_in {
            writeln!(f, "target_in: {}", target_in.display())?;
        }
        if let Some(weights) = &self.weights {
            writeln!(f, "weights: {}", weights)?;
        }
        Ok(())
    }
}

/// This builder can be used to build and customize a `FairEvalConfig` structure.
pub struct FairEvalConfigBuilder {
    target_in: Option<PathBuf>,
    system_in: Option<PathBuf>,
    eval_out: OutputTarget,
    labels: Option<Vec<String>>,
    exclude: Vec<String>,
    ignore_punct: bool,
    focus: Focus,
    weights: Option<WeightTable>,
    eval_methods: Vec<EvalVersion>,
    strategy: MatchStrategy,
    parallel: bool,
}

impl Default for FairEvalConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FairEvalConfigBuilder {
    pub fn new() -> Self {
        Self {
            target_in: None,
            system_in: None,
            eval_out: OutputTarget::Stdout,
            labels: None,
            exclude: Vec::new(),
            ignore_punct: false,
            focus: Focus::Target,
            weights: None,
            eval_methods: vec![EvalVersion::Traditional, EvalVersion::Fair],
            strategy: MatchStrategy::First,
            parallel: false,
        }
    }
    pub fn target_in<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.target_in = Some(path.into());
        self
    }
    pub fn system_in<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.system_in = Some(path.into());
        self
    }
    pub fn eval_out(mut self, eval_out: OutputTarget) -> Self {
        self.eval_out = eval_out;
        self
    }
    /// Only evaluate these labels.
    pub fn labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = Some(sorted_unique(labels.into_iter().map(Into::into)));
        self
    }
    pub fn all_labels(mut self) -> Self {
        self.labels = None;
        self
    }
    pub fn exclude<I, S>(mut self, exclude: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = sorted_unique(exclude.into_iter().map(Into::into));
        self
    }
    pub fn ignore_punct(mut self, ignore_punct: bool) -> Self {
        self.ignore_punct = ignore_punct;
        self
    }
    pub fn focus(mut self, focus: Focus) -> Self {
        self.focus = focus;
        self
    }
    pub fn weights(mut self, weights: WeightTable) -> Self {
        self.weights = Some(weights);
        self
    }
    pub fn eval_methods<I: IntoIterator<Item = EvalVersion>>(mut self, methods: I) -> Self {
        self.eval_methods = methods.into_iter().collect();
        self
    }
    pub fn strategy(mut self, strategy: MatchStrategy) -> Self {
        self.strategy = strategy;
        self
    }
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
    pub fn build(self) -> FairEvalConfig {
        let eval_methods = normalize_methods(&self.eval_methods, self.weights.is_some());
        FairEvalConfig {
            target_in: self.target_in,
            system_in: self.system_in,
            eval_out: self.eval_out,
            labels: self.labels,
            exclude: self.exclude,
            ignore_punct: self.ignore_punct,
            focus: self.focus,
            weights: self.weights,
            eval_methods,
            strategy: self.strategy,
            parallel: self.parallel,
        }
    }
}
