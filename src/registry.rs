//! The static catalog of candidate programs: for every supported language and
//! algorithm, how to build it and how to run it.
//!
//! The catalog is built once at startup from closed enumerations. Building a
//! profile matches exhaustively on [`Language`], so a language without an
//! entry for some [`Algorithm`] does not compile.

use std::{
  collections::{BTreeMap, BTreeSet},
  fmt,
  path::{Path, PathBuf},
  str::FromStr,
};

use crate::error::{NotFound, SelectionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Language {
  Java,
  Go,
  Python,
  Rust,
  Julia,
  Cpp,
  Zig,
  Odin,
}

impl Language {
  pub const ALL: [Language; 8] = [
    Language::Java,
    Language::Go,
    Language::Python,
    Language::Rust,
    Language::Julia,
    Language::Cpp,
    Language::Zig,
    Language::Odin,
  ];

  /// Stable identifier, used in report keys and log file names.
  pub fn id(self) -> &'static str {
    match self {
      Language::Java => "java",
      Language::Go => "go",
      Language::Python => "python",
      Language::Rust => "rust",
      Language::Julia => "julia",
      Language::Cpp => "cpp",
      Language::Zig => "zig",
      Language::Odin => "odin",
    }
  }

  /// Directory under the sorting root holding this language's sources.
  fn dir(self) -> &'static str {
    match self {
      Language::Cpp => "c++",
      other => other.id(),
    }
  }
}

impl fmt::Display for Language {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.pad(self.id())
  }
}

impl FromStr for Language {
  type Err = SelectionError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let lower = s.to_ascii_lowercase();
    if lower == "c++" {
      return Ok(Language::Cpp);
    }

    Language::ALL
      .into_iter()
      .find(|lang| lang.id() == lower)
      .ok_or_else(|| SelectionError::UnknownLanguage(s.to_string()))
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Algorithm {
  Bubble,
  Insertion,
  Selection,
  Merge,
  Quick,
}

impl Algorithm {
  pub const ALL: [Algorithm; 5] = [
    Algorithm::Bubble,
    Algorithm::Insertion,
    Algorithm::Selection,
    Algorithm::Merge,
    Algorithm::Quick,
  ];

  pub fn id(self) -> &'static str {
    match self {
      Algorithm::Bubble => "bubble",
      Algorithm::Insertion => "insertion",
      Algorithm::Selection => "selection",
      Algorithm::Merge => "merge",
      Algorithm::Quick => "quick",
    }
  }

  /// `bubble_sort`, `merge_sort`, ...
  fn file_stem(self) -> String {
    format!("{}_sort", self.id())
  }

  /// `BubbleSort`, `MergeSort`, ...
  fn class_name(self) -> String {
    let id = self.id();
    format!("{}{}Sort", id[..1].to_ascii_uppercase(), &id[1..])
  }
}

impl fmt::Display for Algorithm {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.pad(self.id())
  }
}

impl FromStr for Algorithm {
  type Err = SelectionError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let lower = s.to_ascii_lowercase();

    Algorithm::ALL
      .into_iter()
      .find(|algo| algo.id() == lower)
      .ok_or_else(|| SelectionError::UnknownAlgorithm(s.to_string()))
  }
}

/// One compiler invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileStep {
  pub argv: Vec<String>,
  pub cwd: Option<PathBuf>,
}

/// How to turn one candidate's source into something runnable, and how to
/// run it. An empty `compile` list means the candidate is interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRunSpec {
  pub compile: Vec<CompileStep>,
  pub run: Vec<String>,
  /// Probed by [`Registry::available_languages`].
  pub source: PathBuf,
  /// Compiled output; its parent directory is created before compiling.
  pub artifact: Option<PathBuf>,
}

impl BuildRunSpec {
  pub fn interpreted(source: PathBuf, run: Vec<String>) -> Self {
    Self {
      compile: Vec::new(),
      run,
      source,
      artifact: None,
    }
  }

  pub fn is_interpreted(&self) -> bool {
    self.compile.is_empty()
  }

  pub fn source_present(&self) -> bool {
    self.source.exists()
  }
}

pub type LanguageProfile = BTreeMap<Algorithm, BuildRunSpec>;

pub struct Registry {
  profiles: BTreeMap<Language, LanguageProfile>,
}

impl Registry {
  /// Builds the full catalog rooted at `root`.
  pub fn new(root: &Path) -> Self {
    let root = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());

    let profiles = Language::ALL
      .into_iter()
      .map(|lang| {
        let profile = Algorithm::ALL
          .into_iter()
          .map(|algo| (algo, spec_for(&root, lang, algo)))
          .collect();
        (lang, profile)
      })
      .collect();

    Self { profiles }
  }

  pub fn lookup(&self, language: Language, algorithm: Algorithm) -> Result<&BuildRunSpec, NotFound> {
    self
      .profiles
      .get(&language)
      .and_then(|profile| profile.get(&algorithm))
      .ok_or_else(|| NotFound {
        language: language.to_string(),
        algorithm: algorithm.to_string(),
      })
  }

  /// Languages with at least one algorithm whose source file exists.
  pub fn available_languages(&self) -> BTreeSet<Language> {
    self
      .profiles
      .iter()
      .filter(|(_, profile)| profile.values().any(BuildRunSpec::source_present))
      .map(|(lang, _)| *lang)
      .collect()
  }

  pub fn iter(&self) -> impl Iterator<Item = (Language, Algorithm, &BuildRunSpec)> {
    self
      .profiles
      .iter()
      .flat_map(|(lang, profile)| profile.iter().map(move |(algo, spec)| (*lang, *algo, spec)))
  }

  /// Replaces one entry. Used to point the harness at stand-in candidates.
  #[cfg(test)]
  pub fn with_spec(mut self, language: Language, algorithm: Algorithm, spec: BuildRunSpec) -> Self {
    self.profiles.entry(language).or_default().insert(algorithm, spec);
    self
  }
}

fn arg<P: AsRef<Path>>(path: P) -> String {
  path.as_ref().to_string_lossy().into_owned()
}

fn spec_for(root: &Path, language: Language, algorithm: Algorithm) -> BuildRunSpec {
  let dir = root.join(language.dir());
  let stem = algorithm.file_stem();

  let native = |source: PathBuf, binary: PathBuf, argv: Vec<String>, cwd: Option<PathBuf>| BuildRunSpec {
    compile: vec![CompileStep { argv, cwd }],
    run: vec![arg(&binary)],
    source,
    artifact: Some(binary),
  };

  match language {
    Language::Java => {
      let class = algorithm.class_name();
      let source = dir.join(format!("{class}.java"));

      BuildRunSpec {
        compile: vec![CompileStep {
          argv: vec!["javac".to_string(), arg(&source)],
          cwd: None,
        }],
        run: vec!["java".to_string(), "-cp".to_string(), arg(&dir), class],
        source,
        artifact: None,
      }
    }
    Language::Go => {
      let source = dir.join("cmd").join(algorithm.id()).join("main.go");
      let binary = dir.join("bin").join(&stem);
      let argv = vec!["go".to_string(), "build".to_string(), "-o".to_string(), arg(&binary), arg(&source)];

      native(source, binary, argv, Some(dir))
    }
    Language::Python => {
      let source = dir.join(format!("{stem}.py"));
      BuildRunSpec::interpreted(source.clone(), vec!["python3".to_string(), arg(&source)])
    }
    Language::Rust => {
      let source = dir.join(format!("{stem}.rs"));
      let binary = dir.join("bin").join(&stem);
      let argv = vec!["rustc".to_string(), arg(&source), "-o".to_string(), arg(&binary)];

      native(source, binary, argv, None)
    }
    Language::Julia => {
      let source = dir.join(format!("{stem}.jl"));
      BuildRunSpec::interpreted(source.clone(), vec!["julia".to_string(), arg(&source)])
    }
    Language::Cpp => {
      let source = dir.join(format!("{stem}.cpp"));
      let binary = dir.join(&stem);
      let argv = vec![
        "g++".to_string(),
        "-O2".to_string(),
        "-o".to_string(),
        arg(&binary),
        arg(&source),
      ];

      native(source, binary, argv, None)
    }
    Language::Zig => {
      let source = dir.join(format!("{stem}.zig"));
      let binary = dir.join(&stem);
      let argv = vec![
        "zig".to_string(),
        "build-exe".to_string(),
        format!("-femit-bin={}", arg(&binary)),
        arg(&source),
      ];

      native(source, binary, argv, None)
    }
    Language::Odin => {
      let source = dir.join(format!("{stem}.odin"));
      let binary = dir.join(&stem);
      let argv = vec![
        "odin".to_string(),
        "build".to_string(),
        arg(&source),
        "-file".to_string(),
        format!("-out:{}", arg(&binary)),
      ];

      native(source, binary, argv, None)
    }
  }
}

#[cfg(test)]
mod tests {
  use std::fs;

  use tempfile::TempDir;

  use super::*;

  #[test]
  fn every_pair_has_an_entry() {
    let registry = Registry::new(Path::new("/sorting"));

    for lang in Language::ALL {
      for algo in Algorithm::ALL {
        assert!(registry.lookup(lang, algo).is_ok(), "{lang}/{algo}");
      }
    }
    assert_eq!(registry.iter().count(), Language::ALL.len() * Algorithm::ALL.len());
  }

  #[test]
  fn parses_names_and_aliases() {
    assert_eq!("Java".parse::<Language>().unwrap(), Language::Java);
    assert_eq!("c++".parse::<Language>().unwrap(), Language::Cpp);
    assert_eq!("merge".parse::<Algorithm>().unwrap(), Algorithm::Merge);
    assert_eq!(
      "cobol".parse::<Language>().unwrap_err(),
      SelectionError::UnknownLanguage("cobol".to_string())
    );
    assert_eq!(
      "bogo".parse::<Algorithm>().unwrap_err(),
      SelectionError::UnknownAlgorithm("bogo".to_string())
    );
  }

  #[test]
  fn java_runs_class_from_source_dir() {
    let registry = Registry::new(Path::new("/sorting"));
    let spec = registry.lookup(Language::Java, Algorithm::Quick).unwrap();

    assert_eq!(spec.run, vec!["java", "-cp", "/sorting/java", "QuickSort"]);
    assert_eq!(spec.compile[0].argv, vec!["javac", "/sorting/java/QuickSort.java"]);
  }

  #[test]
  fn interpreted_specs_have_no_compile_steps() {
    let registry = Registry::new(Path::new("/sorting"));

    let python = registry.lookup(Language::Python, Algorithm::Bubble).unwrap();
    assert!(python.is_interpreted());
    assert_eq!(python.run, vec!["python3", "/sorting/python/bubble_sort.py"]);

    let go = registry.lookup(Language::Go, Algorithm::Bubble).unwrap();
    assert!(!go.is_interpreted());
    assert_eq!(go.compile[0].cwd.as_deref(), Some(Path::new("/sorting/go")));
    assert_eq!(go.artifact.as_deref(), Some(Path::new("/sorting/go/bin/bubble_sort")));
  }

  #[test]
  fn available_languages_probes_sources() {
    let root = TempDir::new().unwrap();
    fs::create_dir(root.path().join("python")).unwrap();
    fs::write(root.path().join("python/merge_sort.py"), "").unwrap();
    fs::create_dir(root.path().join("c++")).unwrap();
    fs::write(root.path().join("c++/quick_sort.cpp"), "").unwrap();

    let available = Registry::new(root.path()).available_languages();

    assert_eq!(available.into_iter().collect::<Vec<_>>(), vec![Language::Python, Language::Cpp]);
  }
}
