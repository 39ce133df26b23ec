use crate::ast::Program;
use crate::diagnostics::{Diagnostic, ErrorCode};
use crate::parser::{ParseError, Parser};
use crate::tokenizer::{LexError, Position, Tokenizer};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x1000_0000_01b3;

const COMPILED_EXTENSION: &str = "smc";

/// Where the text of a script comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSource {
    File(PathBuf),
    Text { name: String, text: String },
}

impl ScriptSource {
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        ScriptSource::File(path.into())
    }

    pub fn from_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        ScriptSource::Text {
            name: name.into(),
            text: text.into(),
        }
    }

    pub fn name(&self) -> String {
        match self {
            ScriptSource::File(path) => path.display().to_string(),
            ScriptSource::Text { name, .. } => name.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("Source file not found: {}", .path.display())]
    SourceNotFound {
        path: PathBuf,
        #[source]
        error: io::Error,
    },
    #[error("Imported script '{module}' could not be located")]
    NotFound {
        module: String,
        importer: PathBuf,
        position: Position,
    },
    #[error("Failed reading script '{}'", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        error: io::Error,
    },
    #[error("Tokenizer error while loading '{}'", .path.display())]
    Tokenize {
        path: PathBuf,
        #[source]
        error: LexError,
    },
    #[error("Parse error while loading '{}'", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        error: ParseError,
    },
    #[error("Cyclic script import detected for '{module}'")]
    Cyclic {
        module: String,
        importer: PathBuf,
        position: Position,
    },
    #[error("Imported script '{module}' does not have the '.{expected}' extension")]
    Extension {
        module: String,
        expected: String,
        importer: PathBuf,
        position: Position,
    },
}

impl ModuleError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ModuleError::Tokenize { .. } | ModuleError::Parse { .. } => ErrorCode::Syntax,
            _ => ErrorCode::ModuleResolution,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let diagnostic = Diagnostic::error(self.code(), self.to_string());
        match self {
            ModuleError::SourceNotFound { error, .. } | ModuleError::Io { error, .. } => {
                diagnostic.with_cause(error.to_string())
            }
            ModuleError::Tokenize { path, error } => {
                let position = error.position();
                diagnostic
                    .with_cause(error.to_string())
                    .at(path, position.line, position.column)
            }
            ModuleError::Parse { path, error } => {
                let position = error.position();
                diagnostic
                    .with_cause(error.to_string())
                    .at(path, position.line, position.column)
            }
            ModuleError::NotFound {
                importer, position, ..
            }
            | ModuleError::Cyclic {
                importer, position, ..
            }
            | ModuleError::Extension {
                importer, position, ..
            } => diagnostic.at(importer, position.line, position.column),
        }
    }
}

/// A parsed script and the ids of the scripts it imports.
#[derive(Debug, Clone)]
pub struct LoadedScript {
    pub id: String,
    pub path: PathBuf,
    pub program: Program,
    pub imports: Vec<String>,
    pub fingerprint: String,
    pub from_cache: bool,
}

/// Every script reachable from a root, dependencies ordered before
/// their importers.
#[derive(Debug, Clone)]
pub struct ScriptGraph {
    pub root: String,
    pub scripts: HashMap<String, LoadedScript>,
    pub order: Vec<String>,
}

impl ScriptGraph {
    pub fn script(&self, id: &str) -> Option<&LoadedScript> {
        self.scripts.get(id)
    }

    pub fn root_script(&self) -> &LoadedScript {
        &self.scripts[&self.root]
    }

    /// Ids of every script reachable from `id` through imports, excluding `id`.
    pub fn transitive_imports(&self, id: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut stack: Vec<String> = self
            .script(id)
            .map(|script| script.imports.clone())
            .unwrap_or_default();
        let mut result = Vec::new();
        while let Some(next) = stack.pop() {
            if next == id || !seen.insert(next.clone()) {
                continue;
            }
            if let Some(script) = self.script(&next) {
                stack.extend(script.imports.iter().cloned());
            }
            result.push(next);
        }
        result
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ModuleStatus {
    Initializing,
    Ready,
}

/// Resolves, parses and caches a script together with its imports.
#[derive(Debug)]
pub struct ScriptLoader {
    extension: String,
    search_roots: Vec<PathBuf>,
    cache_dir: Option<PathBuf>,
    status: HashMap<String, ModuleStatus>,
    scripts: HashMap<String, LoadedScript>,
    order: Vec<String>,
    reports: Vec<Diagnostic>,
}

impl ScriptLoader {
    pub fn new(extension: impl Into<String>, cache_dir: Option<PathBuf>) -> Self {
        Self {
            extension: extension.into(),
            search_roots: Vec::new(),
            cache_dir,
            status: HashMap::new(),
            scripts: HashMap::new(),
            order: Vec::new(),
            reports: Vec::new(),
        }
    }

    pub fn add_search_root<P: Into<PathBuf>>(&mut self, path: P) {
        let path = path.into();
        if !self.search_roots.contains(&path) {
            self.search_roots.push(path);
        }
    }

    /// Warnings collected while loading.
    pub fn take_reports(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.reports)
    }

    pub fn load(&mut self, source: &ScriptSource) -> Result<ScriptGraph, ModuleError> {
        let (path, text) = match source {
            ScriptSource::File(path) => {
                let text = fs::read_to_string(path).map_err(|error| {
                    if error.kind() == io::ErrorKind::NotFound {
                        ModuleError::SourceNotFound {
                            path: path.clone(),
                            error,
                        }
                    } else {
                        ModuleError::Io {
                            path: path.clone(),
                            error,
                        }
                    }
                })?;
                (self.canonical_path_buf(path), text)
            }
            ScriptSource::Text { name, text } => (PathBuf::from(name), text.clone()),
        };
        let root = self.load_script(path, text)?;
        Ok(ScriptGraph {
            root,
            scripts: std::mem::take(&mut self.scripts),
            order: std::mem::take(&mut self.order),
        })
    }

    fn load_script(&mut self, path: PathBuf, text: String) -> Result<String, ModuleError> {
        let id = path.display().to_string();
        self.status.insert(id.clone(), ModuleStatus::Initializing);

        let fingerprint = Self::compute_fingerprint(&text);
        let (program, from_cache) = match self.read_compiled(&id, &fingerprint) {
            Some(program) => (program, true),
            None => {
                let program = Self::parse_script(&path, &text)?;
                self.write_compiled(&id, &fingerprint, &program);
                (program, false)
            }
        };

        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let mut imports = Vec::new();
        for import in program.find_imports() {
            let resolved = self.resolve_import(&import.path, &base_dir, &path, import.position)?;
            let import_id = resolved.display().to_string();
            if imports.contains(&import_id) {
                self.reports.push(
                    Diagnostic::warning(format!("Script '{}' is imported more than once", import.path))
                        .at(&path, import.position.line, import.position.column),
                );
                continue;
            }
            match self.status.get(&import_id) {
                Some(ModuleStatus::Initializing) => {
                    return Err(ModuleError::Cyclic {
                        module: import.path.clone(),
                        importer: path.clone(),
                        position: import.position,
                    });
                }
                Some(ModuleStatus::Ready) => {
                    debug!(script = %import_id, "script already loaded");
                }
                None => {
                    let text = fs::read_to_string(&resolved).map_err(|error| ModuleError::Io {
                        path: resolved.clone(),
                        error,
                    })?;
                    self.load_script(resolved, text)?;
                }
            }
            imports.push(import_id);
        }

        self.status.insert(id.clone(), ModuleStatus::Ready);
        self.order.push(id.clone());
        self.scripts.insert(
            id.clone(),
            LoadedScript {
                id: id.clone(),
                path,
                program,
                imports,
                fingerprint,
                from_cache,
            },
        );
        Ok(id)
    }

    fn resolve_import(
        &self,
        module_path: &str,
        base_dir: &Path,
        importer: &Path,
        position: Position,
    ) -> Result<PathBuf, ModuleError> {
        if !module_path.ends_with(&format!(".{}", self.extension)) {
            return Err(ModuleError::Extension {
                module: module_path.to_string(),
                expected: self.extension.clone(),
                importer: importer.to_path_buf(),
                position,
            });
        }

        let direct = PathBuf::from(module_path);
        let mut candidates = Vec::new();
        if direct.is_absolute() {
            candidates.push(direct);
        } else {
            candidates.push(base_dir.join(module_path));
            for root in &self.search_roots {
                candidates.push(root.join(module_path));
            }
        }

        for candidate in candidates {
            if candidate.is_file() {
                debug!(import = module_path, resolved = %candidate.display(), "resolved script import");
                return Ok(self.canonical_path_buf(&candidate));
            }
        }

        Err(ModuleError::NotFound {
            module: module_path.to_string(),
            importer: importer.to_path_buf(),
            position,
        })
    }

    fn parse_script(path: &Path, text: &str) -> Result<Program, ModuleError> {
        let tokens = Tokenizer::new(text)
            .tokenize()
            .map_err(|error| ModuleError::Tokenize {
                path: path.to_path_buf(),
                error,
            })?;
        Parser::new(tokens)
            .parse()
            .map_err(|error| ModuleError::Parse {
                path: path.to_path_buf(),
                error,
            })
    }

    fn canonical_path_buf(&self, path: &Path) -> PathBuf {
        path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
    }

    //=============================================
    //            Compiled script cache
    //=============================================

    fn read_compiled(&mut self, id: &str, fingerprint: &str) -> Option<Program> {
        let cache_path = self.cache_file_for(id, fingerprint)?;
        if !cache_path.exists() {
            debug!(script = id, cache = %cache_path.display(), "compiled script cache miss");
            return None;
        }
        let decoded = fs::read(&cache_path)
            .map_err(|error| error.to_string())
            .and_then(|bytes| {
                bincode::deserialize::<Program>(&bytes).map_err(|error| error.to_string())
            });
        match decoded {
            Ok(program) => {
                debug!(script = id, cache = %cache_path.display(), "compiled script cache hit");
                Some(program)
            }
            Err(cause) => {
                warn!(script = id, %cause, "ignoring unreadable compiled script");
                self.reports.push(
                    Diagnostic::warning(format!(
                        "Ignoring unreadable compiled script cache entry '{}'",
                        cache_path.display()
                    ))
                    .with_cause(cause),
                );
                None
            }
        }
    }

    fn write_compiled(&mut self, id: &str, fingerprint: &str, program: &Program) {
        let Some(cache_path) = self.cache_file_for(id, fingerprint) else {
            return;
        };
        let written = cache_path
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .map_err(|error| error.to_string())
            .and_then(|_| bincode::serialize(program).map_err(|error| error.to_string()))
            .and_then(|bytes| fs::write(&cache_path, bytes).map_err(|error| error.to_string()));
        if let Err(cause) = written {
            warn!(script = id, %cause, "failed to store compiled script");
            self.reports.push(
                Diagnostic::warning(format!(
                    "Unable to store compiled script in '{}'",
                    cache_path.display()
                ))
                .with_cause(cause),
            );
        }
    }

    fn cache_file_for(&self, id: &str, fingerprint: &str) -> Option<PathBuf> {
        let dir = self.cache_dir.as_ref()?;
        let hash = Self::hash_bytes(id.as_bytes().iter().copied());
        Some(dir.join(format!("{}-{}.{}", hash, fingerprint, COMPILED_EXTENSION)))
    }

    fn compute_fingerprint(source: &str) -> String {
        Self::hash_bytes(
            source
                .as_bytes()
                .iter()
                .copied()
                .chain(env!("CARGO_PKG_VERSION").as_bytes().iter().copied()),
        )
    }

    fn hash_bytes<I: IntoIterator<Item = u8>>(iter: I) -> String {
        let mut hash = FNV_OFFSET_BASIS;
        for byte in iter {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        format!("{:016x}", hash)
    }
}
