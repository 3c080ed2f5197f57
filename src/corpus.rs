/**
File level driver. Inputs are files or directories; target and system files are paired by file
name, read sentence by sentence, parsed into spans and evaluated as one corpus.
*/
use crate::aggregator::evaluate_corpus;
use crate::config::{ConfigError, FairEvalConfig};
use crate::reader::{parse_sentence, read_sentences, ParsingError};
use crate::reporter::Reporter;
use crate::span::SentencePair;
use either::Either as LeftOrRight;
use std::error::Error;
use std::ffi::OsString;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Target and system files of a pair hold a different number of sentences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InconsistentLengthError(pub usize, pub usize);

impl Display for InconsistentLengthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Inconsistent number of sentences: target holds {} sentences, system holds {}",
            self.0, self.1
        )
    }
}

impl Error for InconsistentLengthError {}

#[derive(Debug)]
pub enum EvaluationError {
    Io(std::io::Error),
    /// A sentence of a file could not be parsed. `sentence` is 1-based.
    Parsing {
        path: PathBuf,
        sentence: usize,
        error: ParsingError,
    },
    Config(ConfigError),
    InconsistentLength {
        target: PathBuf,
        system: PathBuf,
        error: InconsistentLengthError,
    },
}

impl Display for EvaluationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "{}", e),
            Self::Parsing {
                path,
                sentence,
                error,
            } => write!(
                f,
                "{}, sentence {}: {}",
                path.display(),
                sentence,
                error
            ),
            Self::Config(e) => write!(f, "{}", e),
            Self::InconsistentLength {
                target,
                system,
                error,
            } => write!(
                f,
                "{} and {}: {}",
                target.display(),
                system.display(),
                error
            ),
        }
    }
}

impl Error for EvaluationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Parsing { error, .. } => Some(error),
            Self::Config(e) => Some(e),
            Self::InconsistentLength { error, .. } => Some(error),
        }
    }
}

impl From<std::io::Error> for EvaluationError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<ConfigError> for EvaluationError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

/// Files designated by an input path: the path itself, or every file of the directory sorted by
/// name.
pub fn expand_input<P: AsRef<Path>>(
    path: P,
) -> Result<impl Iterator<Item = PathBuf>, std::io::Error> {
    let path = path.as_ref();
    if path.is_dir() {
        let mut files = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry_path = entry?.path();
            if entry_path.is_file() {
                files.push(entry_path);
            }
        }
        files.sort_unstable();
        Ok(LeftOrRight::Left(files.into_iter()))
    } else {
        Ok(LeftOrRight::Right(std::iter::once(path.to_path_buf())))
    }
}

/// Pairs every target file with the system file of the same name. Target files without
/// counterpart are skipped.
pub fn pair_files<P, Q>(
    target_in: P,
    system_in: Q,
) -> Result<Vec<(PathBuf, PathBuf)>, std::io::Error>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let system_files: Vec<(Option<OsString>, PathBuf)> = expand_input(system_in)?
        .map(|p| (p.file_name().map(|n| n.to_os_string()), p))
        .collect();
    let mut pairs = Vec::new();
    for target in expand_input(target_in)? {
        let name = target.file_name().map(|n| n.to_os_string());
        match system_files.iter().find(|(n, _)| n.is_some() && *n == name) {
            Some((_, system)) => pairs.push((target, system.clone())),
            None => warn!(
                "No system file matching {}, skipping it",
                target.display()
            ),
        }
    }
    Ok(pairs)
}

/// Reads and parses both files of a pair into aligned sentences.
pub fn read_file_pair<P, Q>(
    target: P,
    system: Q,
    ignore_punct: bool,
) -> Result<Vec<SentencePair>, EvaluationError>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let (target, system) = (target.as_ref(), system.as_ref());
    let target_sentences = read_sentences(target)?;
    let system_sentences = read_sentences(system)?;
    if target_sentences.len() != system_sentences.len() {
        return Err(EvaluationError::InconsistentLength {
            target: target.to_path_buf(),
            system: system.to_path_buf(),
            error: InconsistentLengthError(target_sentences.len(), system_sentences.len()),
        });
    }
    let parse = |path: &Path, i: usize, lines: &[String]| {
        parse_sentence(lines, ignore_punct).map_err(|error| EvaluationError::Parsing {
            path: path.to_path_buf(),
            sentence: i + 1,
            error,
        })
    };
    let mut pairs = Vec::with_capacity(target_sentences.len());
    for (i, (t, s)) in target_sentences.iter().zip(system_sentences.iter()).enumerate() {
        pairs.push(SentencePair::new(parse(target, i, t)?, parse(system, i, s)?));
    }
    Ok(pairs)
}

/// Evaluates the configured inputs and scores every requested version.
pub fn evaluate_files(config: &FairEvalConfig) -> Result<Reporter, EvaluationError> {
    let target_in = config
        .target_in()
        .ok_or(ConfigError::MissingInput("target_in"))?;
    let system_in = config
        .system_in()
        .ok_or(ConfigError::MissingInput("system_in"))?;
    let mut pairs = Vec::new();
    for (target, system) in pair_files(target_in, system_in)? {
        info!("Comparing {} with {}", target.display(), system.display());
        let sentences = read_file_pair(&target, &system, config.ignore_punct())?;
        debug!("{} sentences read from {}", sentences.len(), target.display());
        pairs.extend(sentences);
    }
    let aggregator = evaluate_corpus(&pairs, &config.match_settings(), config.parallel());
    Ok(Reporter::new(
        aggregator,
        config.eval_methods(),
        config.weights(),
        config.parallel(),
    )
    .with_settings(config.to_string()))
}
