//! Drives every selected cell through compile, run, and record, and keeps
//! going past any individual failure.

use std::{
  collections::BTreeMap,
  fmt, fs,
  sync::atomic::{AtomicBool, AtomicUsize, Ordering},
  thread,
};

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::{
  bench::BenchmarkRunner,
  compile::compile,
  config::HarnessConfig,
  dataset::Dataset,
  error::{Failure, SelectionError},
  registry::{Algorithm, BuildRunSpec, Language, Registry},
  report::{write_json, MachineMetadata, Report, ResultAggregator},
  run::Executor,
  stats::{BenchmarkCell, Cell},
  verify::{TestOutcome, Verifier},
};

pub const VERIFY_RESULTS: &str = "verify_results.json";
pub const BENCH_RESULTS: &str = "raw_runs.json";
pub const METADATA: &str = "metadata.json";

/// What to run: the cross product of these four lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
  pub languages: Vec<Language>,
  pub algorithms: Vec<Algorithm>,
  pub sizes: Vec<usize>,
  pub distributions: Vec<String>,
}

impl Selection {
  /// Resolves names given on the command line. An empty list, or one that
  /// contains `all`, selects every available language (or every algorithm).
  /// Unknown names are returned alongside and otherwise ignored.
  pub fn resolve(registry: &Registry, languages: &[String], algorithms: &[String]) -> (Self, Vec<SelectionError>) {
    let mut errors = Vec::new();

    let languages = if selects_all(languages) {
      registry.available_languages().into_iter().collect()
    } else {
      parse_names(languages, &mut errors)
    };

    let algorithms = if selects_all(algorithms) {
      Algorithm::ALL.to_vec()
    } else {
      parse_names(algorithms, &mut errors)
    };

    let selection = Self {
      languages,
      algorithms,
      ..Self::default()
    };

    (selection, errors)
  }

  fn pairs(&self) -> impl Iterator<Item = (Language, Algorithm)> + '_ {
    self
      .languages
      .iter()
      .flat_map(|lang| self.algorithms.iter().map(move |algo| (*lang, *algo)))
  }

  fn cells(&self, sizes: &[usize]) -> Vec<Cell> {
    let mut cells = Vec::new();

    for (language, algorithm) in self.pairs() {
      for size in sizes {
        for distribution in &self.distributions {
          cells.push(Cell {
            language,
            algorithm,
            size: *size,
            distribution: distribution.clone(),
          });
        }
      }
    }

    cells
  }
}

fn selects_all(names: &[String]) -> bool {
  names.is_empty() || names.iter().any(|name| name.eq_ignore_ascii_case("all"))
}

fn parse_names<T: std::str::FromStr<Err = SelectionError> + PartialEq>(
  names: &[String],
  errors: &mut Vec<SelectionError>,
) -> Vec<T> {
  let mut parsed = Vec::new();

  for name in names {
    match name.parse::<T>() {
      Ok(value) if !parsed.contains(&value) => parsed.push(value),
      Ok(_) => {}
      Err(err) => errors.push(err),
    }
  }

  parsed
}

/// Lifecycle of one cell. `CompileFailed`, `Completed` and `Failed` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
  Pending,
  Compiling,
  CompileFailed,
  Runnable,
  Executing,
  Completed,
  Failed,
}

impl CellState {
  fn can_become(self, next: CellState) -> bool {
    use CellState::*;

    matches!(
      (self, next),
      (Pending, Compiling)
        | (Compiling, CompileFailed)
        | (Compiling, Runnable)
        | (Runnable, Executing)
        | (Executing, Completed)
        | (Executing, Failed)
    )
  }
}

struct Tracker<'c> {
  cell: &'c Cell,
  state: CellState,
}

impl<'c> Tracker<'c> {
  fn new(cell: &'c Cell) -> Self {
    Self {
      cell,
      state: CellState::Pending,
    }
  }

  fn advance(&mut self, next: CellState) {
    debug_assert!(self.state.can_become(next), "{:?} -> {next:?}", self.state);
    debug!(cell = %self.cell, from = ?self.state, to = ?next, "cell state");
    self.state = next;
  }
}

/// What a sweep records per cell.
pub trait CellEntry: Serialize + Send {
  /// The entry for a cell that never got to execute.
  fn not_run(failure: Failure) -> Self;

  /// Whether the cell produced a usable result at all.
  fn completed(&self) -> bool;

  /// Whether nothing about the cell failed.
  fn clean(&self) -> bool;

  fn status_line(&self, cell: &Cell) -> String;
}

impl CellEntry for TestOutcome {
  fn not_run(failure: Failure) -> Self {
    failure.into()
  }

  fn completed(&self) -> bool {
    self.is_pass()
  }

  fn clean(&self) -> bool {
    self.is_pass()
  }

  fn status_line(&self, cell: &Cell) -> String {
    let target = format!("{}/{} + {}", cell.language, cell.algorithm, cell.distribution);

    match self {
      TestOutcome::Pass => format!("  {}  {target}", self.label()),
      TestOutcome::Fail { reason } => format!("  {}  {target}  ({reason})", self.label()),
    }
  }
}

impl CellEntry for BenchmarkCell {
  fn not_run(failure: Failure) -> Self {
    BenchmarkCell::not_run(failure)
  }

  fn completed(&self) -> bool {
    BenchmarkCell::completed(self)
  }

  fn clean(&self) -> bool {
    BenchmarkCell::clean(self)
  }

  fn status_line(&self, cell: &Cell) -> String {
    if let Some(failure) = &self.failure {
      return format!("  SKIP  {cell}  ({failure})");
    }

    let label = if self.clean() {
      "DONE"
    } else if self.completed() {
      "PART"
    } else {
      "FAIL"
    };
    let ok = self.runs.len() - self.failed_runs();

    format!("  {label}  {cell}  {ok}/{} runs ok", self.runs.len())
  }
}

/// Pass/fail counts over a finished report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
  pub passed: usize,
  pub failed: usize,
}

impl Tally {
  /// With `allow_partial`, a cell where only some repetitions failed still
  /// counts as passed.
  pub fn of<T: CellEntry>(report: &Report<T>, allow_partial: bool) -> Self {
    let mut tally = Tally::default();

    for entry in report.results.values().flat_map(BTreeMap::values) {
      let ok = if allow_partial { entry.completed() } else { entry.clean() };
      if ok {
        tally.passed += 1;
      } else {
        tally.failed += 1;
      }
    }

    tally
  }

  pub fn total(&self) -> usize {
    self.passed + self.failed
  }
}

impl fmt::Display for Tally {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let rule = "=".repeat(48);

    writeln!(f, "{rule}")?;
    writeln!(f, "  Results: {}/{} tests passed", self.passed, self.total())?;
    if self.failed > 0 {
      writeln!(f, "  {} test(s) FAILED", self.failed)?;
    } else {
      writeln!(f, "  All tests passed!")?;
    }
    write!(f, "{rule}")
  }
}

pub struct Sweep<'a> {
  registry: &'a Registry,
  executor: &'a Executor,
  config: &'a HarnessConfig,
}

impl<'a> Sweep<'a> {
  pub fn new(registry: &'a Registry, executor: &'a Executor, config: &'a HarnessConfig) -> Self {
    Self {
      registry,
      executor,
      config,
    }
  }

  /// Checks every selected candidate against the oracle at the configured
  /// verification size.
  pub fn verify(&self, selection: &Selection) -> Result<Report<TestOutcome>> {
    let metadata = self.prepare()?;
    let compiled = self.compile_all(selection)?;

    let results = self.config.results_dir.join(VERIFY_RESULTS);
    let aggregator = ResultAggregator::new(metadata, Some(results.clone()));
    let verifier = Verifier::new(self.executor, self.config.verify_timeout());

    let cells = selection.cells(&[self.config.verify_size]);
    self.run_cells(&cells, &aggregator, &compiled, Cell::outcome_key, |cell, spec| {
      verifier.verify(&self.dataset(cell), spec)
    })?;

    aggregator.persist(&results)?;
    aggregator.finalize()
  }

  /// Times every selected candidate over every selected size and
  /// distribution.
  pub fn benchmark(&self, selection: &Selection, repetitions: u32) -> Result<Report<BenchmarkCell>> {
    let metadata = self.prepare()?;
    let compiled = self.compile_all(selection)?;

    let log_dir = self.config.log_dir();
    fs::create_dir_all(&log_dir).with_context(|| format!("create {log_dir:?}"))?;

    let results = self.config.results_dir.join(BENCH_RESULTS);
    let aggregator = ResultAggregator::new(metadata, Some(results.clone()));
    let runner = BenchmarkRunner::new(self.executor, log_dir, self.config.bench_timeout());

    let cells = selection.cells(&selection.sizes);
    self.run_cells(&cells, &aggregator, &compiled, Cell::bench_key, |cell, spec| {
      runner.benchmark(cell, spec, &self.dataset(cell), repetitions)
    })?;

    aggregator.persist(&results)?;
    aggregator.finalize()
  }

  /// Creates the results directory and writes the machine snapshot.
  fn prepare(&self) -> Result<MachineMetadata> {
    let dir = &self.config.results_dir;
    fs::create_dir_all(dir).with_context(|| format!("create {dir:?}"))?;

    let metadata = MachineMetadata::capture();
    write_json(&dir.join(METADATA), &metadata).context("write metadata")?;

    Ok(metadata)
  }

  fn dataset(&self, cell: &Cell) -> Dataset {
    Dataset::locate(&self.config.dataset_dir, cell.size, &cell.distribution)
  }

  /// Compiles each selected candidate once, sequentially. The outcome is
  /// shared by all of that candidate's cells.
  fn compile_all(&self, selection: &Selection) -> Result<BTreeMap<(Language, Algorithm), Option<Failure>>> {
    let mut compiled = BTreeMap::new();

    for (language, algorithm) in selection.pairs() {
      let spec = self.registry.lookup(language, algorithm)?;
      let failure = compile(self.executor, spec, self.config.compile_timeout())
        .with_context(|| format!("compile {language}/{algorithm}"))?;

      if let Some(failure) = &failure {
        info!("{language}/{algorithm}: {failure}");
      }
      compiled.insert((language, algorithm), failure);
    }

    Ok(compiled)
  }

  /// Processes `cells` on up to `jobs` workers. A cell's failure is recorded
  /// and the sweep moves on; only harness I/O errors stop it, after which no
  /// new cells are started.
  fn run_cells<T, F>(
    &self,
    cells: &[Cell],
    aggregator: &ResultAggregator<T>,
    compiled: &BTreeMap<(Language, Algorithm), Option<Failure>>,
    key: fn(&Cell) -> String,
    execute: F,
  ) -> Result<()>
  where
    T: CellEntry,
    F: Fn(&Cell, &BuildRunSpec) -> Result<T> + Sync,
  {
    let next = AtomicUsize::new(0);
    let abort = AtomicBool::new(false);
    let jobs = self.config.jobs.clamp(1, cells.len().max(1));

    let worker = || -> Result<()> {
      while !abort.load(Ordering::Relaxed) {
        let Some(cell) = cells.get(next.fetch_add(1, Ordering::Relaxed)) else {
          break;
        };

        let recorded = self.process(cell, compiled, &execute).and_then(|entry| {
          println!("{}", entry.status_line(cell));
          aggregator.record(cell.language.id(), key(cell), entry)
        });

        if let Err(err) = recorded {
          abort.store(true, Ordering::Relaxed);
          return Err(err.context(format!("{cell}")));
        }
      }

      Ok(())
    };

    thread::scope(|scope| {
      let workers: Vec<_> = (0..jobs).map(|_| scope.spawn(&worker)).collect();

      workers
        .into_iter()
        .try_for_each(|handle| handle.join().map_err(|_| anyhow!("worker panicked"))?)
    })
  }

  fn process<T, F>(&self, cell: &Cell, compiled: &BTreeMap<(Language, Algorithm), Option<Failure>>, execute: &F) -> Result<T>
  where
    T: CellEntry,
    F: Fn(&Cell, &BuildRunSpec) -> Result<T>,
  {
    let mut tracker = Tracker::new(cell);
    tracker.advance(CellState::Compiling);

    let spec = self.registry.lookup(cell.language, cell.algorithm)?;
    if let Some(Some(failure)) = compiled.get(&(cell.language, cell.algorithm)) {
      tracker.advance(CellState::CompileFailed);
      return Ok(T::not_run(failure.clone()));
    }

    tracker.advance(CellState::Runnable);
    tracker.advance(CellState::Executing);
    let entry = execute(cell, spec)?;

    tracker.advance(if entry.completed() {
      CellState::Completed
    } else {
      CellState::Failed
    });

    Ok(entry)
  }
}
