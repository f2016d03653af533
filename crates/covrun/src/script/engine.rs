//! Reference test engine for the script dialect.

use super::suite::{Step, TestFile, TestSpec};
use super::syntax::{self, Condition, Header, Node, StatementKind};
use crate::coverage::{CoverageSink, FileCoverage, Probe};
use crate::engine::{ModuleCache, SuiteHook, SuiteResults, TestEngine, TestResult};
use crate::hook::SourceProvider;
use crate::path::{CanonicalPath, CaseFolding};
use crate::result::{CoverError, CoverResult};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Instant;

/// Shared log of per-file results, filled as the engine runs
pub type ResultLog = Rc<RefCell<Vec<SuiteResults>>>;

#[derive(Debug)]
struct Binding {
    sink: CoverageSink,
    file: CanonicalPath,
}

impl Binding {
    /// Register the descriptor carried by an instrumentation header.
    ///
    /// Text instrumented for a different coverage variable keeps running
    /// but counts nothing.
    fn attach(path: &Path, header: Option<&Header>, sink: Option<CoverageSink>) -> CoverResult<Option<Self>> {
        match (header, sink) {
            (Some(header), Some(sink)) if header.variable == sink.variable().as_str() => {
                let descriptor: FileCoverage = serde_json::from_str(&header.descriptor)
                    .map_err(|e| CoverError::load(path, format!("bad coverage descriptor: {e}")))?;
                let file = descriptor.path.clone();
                sink.register(descriptor);
                Ok(Some(Self { sink, file }))
            }
            (Some(header), _) => {
                tracing::debug!(
                    file = %path.display(),
                    variable = %header.variable,
                    "file instrumented for another run, probes ignored"
                );
                Ok(None)
            }
            (None, _) => Ok(None),
        }
    }

    fn record(&self, probe: Probe) {
        self.sink.hit(&self.file, probe);
    }
}

fn record(binding: Option<&Binding>, probe: Probe) {
    if let Some(binding) = binding {
        binding.record(probe);
    }
}

/// A test file ready to run
struct LoadedSuite {
    tests: Vec<TestSpec>,
    modules: HashMap<String, Rc<Module>>,
    coverage: Option<Binding>,
}

#[derive(Debug)]
struct Function {
    param: Option<String>,
    body: Vec<Node>,
}

#[derive(Debug)]
struct Module {
    path: PathBuf,
    flags: HashMap<String, bool>,
    functions: HashMap<String, Function>,
    coverage: Option<Binding>,
}

impl Module {
    fn record(&self, probe: Probe) {
        record(self.coverage.as_ref(), probe);
    }

    fn exec(&self, nodes: &[Node], env: &mut HashMap<String, bool>) -> Result<(), String> {
        for node in nodes {
            match node {
                Node::Probe(probe) => self.record(*probe),
                Node::Statement { kind, .. } => match kind {
                    StatementKind::Inert => {}
                    StatementKind::Let(name, value) => {
                        let _ = env.insert(name.clone(), *value);
                    }
                    StatementKind::Throw(message) if message.is_empty() => {
                        return Err("error thrown".to_string());
                    }
                    StatementKind::Throw(message) => return Err(message.clone()),
                },
                // Hoisted when the module is loaded.
                Node::Function { .. } => {}
                Node::If {
                    cond,
                    then_body,
                    else_body,
                    ..
                } => {
                    let taken = match cond {
                        Condition::Literal(value) => *value,
                        Condition::Flag(name) => env.get(name).copied().unwrap_or(false),
                        Condition::Not(name) => !env.get(name).copied().unwrap_or(false),
                    };
                    if taken {
                        self.exec(then_body, env)?;
                    } else if let Some(else_body) = else_body {
                        self.exec(else_body, env)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn call(&self, name: &str, arg: bool) -> Result<(), String> {
        let function = self
            .functions
            .get(name)
            .ok_or_else(|| format!("{} has no function '{name}'", self.path.display()))?;
        let mut env = self.flags.clone();
        if let Some(param) = &function.param {
            let _ = env.insert(param.clone(), arg);
        }
        self.exec(&function.body, &mut env)
    }
}

/// Runs `*.test.js` files written in the script dialect.
///
/// Modules are cached after their first successful load, like a CommonJS
/// `require` cache.
#[derive(Debug)]
pub struct ScriptEngine {
    files: Vec<PathBuf>,
    hooks: Vec<SuiteHook>,
    cache: ModuleCache<Rc<Module>>,
    folding: CaseFolding,
    results: ResultLog,
}

impl ScriptEngine {
    /// Create an engine using the platform case-folding policy
    #[must_use]
    pub fn new() -> Self {
        Self::with_case_folding(CaseFolding::platform())
    }

    /// Create an engine with an explicit case-folding policy
    #[must_use]
    pub fn with_case_folding(folding: CaseFolding) -> Self {
        Self {
            files: Vec::new(),
            hooks: Vec::new(),
            cache: ModuleCache::new(),
            folding,
            results: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Handle to the results of the most recent run
    #[must_use]
    pub fn results(&self) -> ResultLog {
        Rc::clone(&self.results)
    }

    /// Number of modules currently cached
    #[must_use]
    pub fn cached_modules(&self) -> usize {
        self.cache.len()
    }

    /// Load a module into the cache ahead of a run
    pub fn preload(&mut self, path: &Path, provider: &dyn SourceProvider) -> CoverResult<()> {
        let _ = self.require(path, provider)?;
        Ok(())
    }

    fn require(&mut self, path: &Path, provider: &dyn SourceProvider) -> CoverResult<Rc<Module>> {
        let canonical = CanonicalPath::new(path, self.folding);
        if let Some(module) = self.cache.get(&canonical) {
            return Ok(Rc::clone(module));
        }

        let source = provider.load(path)?;
        let script = syntax::parse(&source.text, path)?;

        let coverage = Binding::attach(path, script.header.as_ref(), source.coverage)?;

        let mut module = Module {
            path: path.to_path_buf(),
            flags: HashMap::new(),
            functions: HashMap::new(),
            coverage,
        };
        for node in &script.body {
            if let Node::Function {
                name, param, body, ..
            } = node
            {
                let function = Function {
                    param: param.clone(),
                    body: body.clone(),
                };
                let _ = module.functions.insert(name.clone(), function);
            }
        }
        let mut flags = HashMap::new();
        module
            .exec(&script.body, &mut flags)
            .map_err(|message| CoverError::load(path, message))?;
        module.flags = flags;

        tracing::debug!(file = %path.display(), "module loaded");
        let module = Rc::new(module);
        self.cache.insert(canonical, Rc::clone(&module));
        Ok(module)
    }

    fn run_file(&mut self, file: &Path, provider: &dyn SourceProvider) -> SuiteResults {
        let start = Instant::now();
        let results = match self.load_suite(file, provider) {
            Ok(suite) => suite
                .tests
                .iter()
                .map(|test| {
                    let started = Instant::now();
                    let result = match run_steps(&test.steps, &suite.modules, suite.coverage.as_ref()) {
                        Ok(()) => TestResult::pass(&test.name),
                        Err(message) => TestResult::fail(&test.name, message),
                    };
                    result.with_duration(started.elapsed())
                })
                .collect(),
            Err(e) => {
                tracing::warn!(file = %file.display(), error = %e, "test file failed to load");
                vec![TestResult::fail(file.display().to_string(), e.to_string())]
            }
        };

        for result in &results {
            match &result.error {
                None => tracing::info!(test = %result.name, "passed"),
                Some(error) => tracing::info!(test = %result.name, %error, "failed"),
            }
        }

        SuiteResults {
            file: file.to_path_buf(),
            results,
            duration: start.elapsed(),
        }
    }

    fn load_suite(&mut self, file: &Path, provider: &dyn SourceProvider) -> CoverResult<LoadedSuite> {
        let source = provider.load(file)?;
        let parsed = TestFile::parse(&source.text, file)?;
        let coverage = Binding::attach(file, parsed.header.as_ref(), source.coverage)?;
        let dir = file.parent().unwrap_or_else(|| Path::new(""));

        let mut modules = HashMap::new();
        for import in &parsed.imports {
            for probe in &import.counters {
                record(coverage.as_ref(), *probe);
            }
            let module = self.require(&dir.join(&import.module), provider)?;
            let _ = modules.insert(import.alias.clone(), module);
        }
        Ok(LoadedSuite {
            tests: parsed.tests,
            modules,
            coverage,
        })
    }
}

impl Default for ScriptEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn run_steps(
    steps: &[Step],
    modules: &HashMap<String, Rc<Module>>,
    coverage: Option<&Binding>,
) -> Result<(), String> {
    for step in steps {
        match step {
            Step::Record(probe) => record(coverage, *probe),
            Step::Call {
                alias,
                function,
                arg,
            } => {
                let module = modules
                    .get(alias)
                    .ok_or_else(|| format!("unknown module alias '{alias}'"))?;
                module.call(function, *arg)?;
            }
            Step::Fail(message) => return Err(message.clone()),
        }
    }
    Ok(())
}

impl TestEngine for ScriptEngine {
    fn add_file(&mut self, path: PathBuf) {
        self.files.push(path);
    }

    fn after_all(&mut self, hook: SuiteHook) {
        self.hooks.push(hook);
    }

    fn evict_module(&mut self, path: &CanonicalPath) -> bool {
        self.cache.evict(path)
    }

    fn run(&mut self, provider: &dyn SourceProvider) -> usize {
        self.results.borrow_mut().clear();
        let files = std::mem::take(&mut self.files);

        let mut failures = 0;
        for file in &files {
            let suite = self.run_file(file, provider);
            failures += suite.failed_count();
            self.results.borrow_mut().push(suite);
        }

        for hook in std::mem::take(&mut self.hooks) {
            let _ = hook.fire();
        }
        failures
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::coverage::{CoverageAggregator, CoverageVariable};
    use crate::hook::{FsSourceProvider, HookedProvider, LoadHook};
    use crate::instrument::Transformer;
    use crate::matcher::MatchIndex;
    use crate::script::ScriptInstrumenter;
    use std::cell::Cell;
    use std::fs;

    const GREETER: &str = "let ready = true\nfunction greet(loud) {\n  if loud {\n    shout\n  } else {\n    whisper\n  }\n}\nfunction broken() {\n  throw not implemented\n}\nfunction check() {\n  if !ready {\n    throw not ready\n  }\n}\n";

    fn fixture(test: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/greeter.js"), GREETER).unwrap();
        fs::write(dir.path().join("greeter.test.js"), test).unwrap();
        dir
    }

    fn engine() -> ScriptEngine {
        ScriptEngine::with_case_folding(CaseFolding::Sensitive)
    }

    #[test]
    fn test_runs_tests_and_counts_failures() {
        let dir = fixture(
            "use src/greeter.js as g\ntest loud\ncall g.greet true\ntest check\ncall g.check\ntest broken\ncall g.broken\ntest explicit\nfail nope\ntest missing\ncall g.absent\n",
        );
        let mut engine = engine();
        engine.add_file(dir.path().join("greeter.test.js"));
        let failures = engine.run(&FsSourceProvider);
        assert_eq!(failures, 3);

        let results = engine.results();
        let results = results.borrow();
        let suite = &results[0];
        assert_eq!(suite.total(), 5);
        assert_eq!(suite.failures()[0].error.as_deref(), Some("not implemented"));
        assert_eq!(suite.failures()[1].error.as_deref(), Some("nope"));
        assert!(suite.failures()[2].error.as_ref().unwrap().contains("no function 'absent'"));
    }

    #[test]
    fn test_unloadable_test_file_counts_one_failure() {
        let dir = fixture("use src/missing.js as m\ntest a\ntest b\n");
        let mut engine = engine();
        engine.add_file(dir.path().join("greeter.test.js"));
        assert_eq!(engine.run(&FsSourceProvider), 1);
    }

    #[test]
    fn test_top_level_throw_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bad.js"), "throw at load\n").unwrap();
        let mut engine = engine();
        let err = engine.preload(&dir.path().join("bad.js"), &FsSourceProvider).unwrap_err();
        assert!(matches!(err, CoverError::Load { .. }));
        assert_eq!(engine.cached_modules(), 0);
    }

    #[test]
    fn test_modules_are_cached_and_evictable() {
        let dir = fixture("");
        let path = dir.path().join("src/greeter.js");
        let mut engine = engine();
        engine.preload(&path, &FsSourceProvider).unwrap();
        engine.preload(&path, &FsSourceProvider).unwrap();
        assert_eq!(engine.cached_modules(), 1);
        assert!(engine.evict_module(&CanonicalPath::new(&path, CaseFolding::Sensitive)));
        assert_eq!(engine.cached_modules(), 0);
    }

    #[test]
    fn test_after_all_hooks_fire_once_after_tests() {
        let dir = fixture("use src/greeter.js as g\ntest loud\ncall g.greet true\n");
        let fired = Rc::new(Cell::new(0));
        let counter = Rc::clone(&fired);
        let mut engine = engine();
        engine.after_all(SuiteHook::new(move || counter.set(counter.get() + 1)));
        engine.add_file(dir.path().join("greeter.test.js"));
        let _ = engine.run(&FsSourceProvider);
        let _ = engine.run(&FsSourceProvider);
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn test_instrumented_module_reports_hits() {
        let dir = fixture("use src/greeter.js as g\ntest loud\ncall g.greet true\n");
        let source = dir.path().join("src/greeter.js");
        let agg = CoverageAggregator::with_variable(CoverageVariable::named("$$cov_e$$"));
        let index = MatchIndex::from_files(dir.path(), vec![source.clone()], CaseFolding::Sensitive);
        let transformer = Transformer::new(
            Rc::new(ScriptInstrumenter::new()),
            agg.variable().clone(),
            CaseFolding::Sensitive,
        );
        let provider = HookedProvider::default();
        provider
            .install(LoadHook::new(Rc::new(index), transformer, agg.sink(), false))
            .unwrap();

        let mut engine = engine();
        engine.add_file(dir.path().join("greeter.test.js"));
        assert_eq!(engine.run(&provider), 0);

        let map = agg.snapshot();
        let cov = map.get(&CanonicalPath::new(&source, CaseFolding::Sensitive)).unwrap();
        // let ready, greet decl, if, shout, whisper, broken decl, throw, check decl, if, throw
        assert_eq!(cov.s[&0], 1);
        assert_eq!(cov.s[&3], 1);
        assert_eq!(cov.s[&4], 0);
        assert_eq!(cov.f[&0], 1);
        assert_eq!(cov.f[&1], 0);
        assert_eq!(cov.b[&0], vec![1, 0]);
    }

    #[test]
    fn test_instrumented_test_file_counts_its_own_statements() {
        let dir = fixture("use src/greeter.js as g\ntest loud\ncall g.greet true\ntest explicit\nfail nope\nfail never\n");
        let suite = dir.path().join("greeter.test.js");
        let agg = CoverageAggregator::with_variable(CoverageVariable::named("$$cov_e$$"));
        let index = MatchIndex::from_files(
            dir.path(),
            vec![dir.path().join("src/greeter.js"), suite.clone()],
            CaseFolding::Sensitive,
        );
        let transformer = Transformer::new(
            Rc::new(ScriptInstrumenter::new()),
            agg.variable().clone(),
            CaseFolding::Sensitive,
        );
        let provider = HookedProvider::default();
        provider
            .install(LoadHook::new(Rc::new(index), transformer, agg.sink(), false))
            .unwrap();

        let mut engine = engine();
        engine.add_file(suite.clone());
        assert_eq!(engine.run(&provider), 1);

        let map = agg.snapshot();
        let cov = map.get(&CanonicalPath::new(&suite, CaseFolding::Sensitive)).unwrap();
        let hits: Vec<u64> = cov.s.values().copied().collect();
        // use, test, call, test, fail run; the second fail is never reached
        assert_eq!(hits, vec![1, 1, 1, 1, 1, 0]);
    }

    #[test]
    fn test_foreign_variable_probes_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.js");
        let out = Transformer::new(
            Rc::new(ScriptInstrumenter::new()),
            CoverageVariable::named("$$cov_other$$"),
            CaseFolding::Sensitive,
        )
        .transform("work\n", &path)
        .unwrap();
        fs::write(&path, out.code).unwrap();

        let agg = CoverageAggregator::with_variable(CoverageVariable::named("$$cov_mine$$"));
        let index = MatchIndex::from_files(dir.path(), Vec::new(), CaseFolding::Sensitive);
        let transformer = Transformer::new(
            Rc::new(ScriptInstrumenter::new()),
            agg.variable().clone(),
            CaseFolding::Sensitive,
        );
        let provider = HookedProvider::default();
        provider
            .install(LoadHook::new(Rc::new(index), transformer, agg.sink(), false))
            .unwrap();

        let mut engine = engine();
        engine.preload(&path, &provider).unwrap();
        assert!(agg.is_empty());
    }
}
