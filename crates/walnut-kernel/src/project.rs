//! Project files: a module graph as text.
//!
//! A project file has one record per line:
//!
//! ```text
//! // comment
//! MODULE:<id>:<prototype name>
//! DATA:<id>:<filename>
//! PROPERTY:(<id>,<property path>)=<value>
//! CONNECTION:(<id>,<output>)->(<id>,<input>)
//! ```
//!
//! Ids are local to one file. Property paths use `/` between nested groups
//! and values use the canonical string form of the property type, with `\`,
//! line feeds and carriage returns written as `\\`, `\n` and `\r`.
//!
//! [`ProjectFile::from_container`] captures a running graph and
//! [`ProjectFileCombiner`] rebuilds one. Loading is tolerant: a module that
//! cannot be created or crashes on startup is left out, and every property and
//! connection referring to it is skipped with a warning instead of failing the
//! whole load.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use walnut_core::PerfSpan;

use crate::combiner::{CombinerReport, CombinerWarning, ModuleCombiner, startup_failure};
use crate::config::{DEFAULT_DATA_MODULE, ParseMode};
use crate::container::ModuleContainer;
use crate::error::{KernelError, KernelResult};
use crate::factory::ModuleFactory;
use crate::module::Module;

static MODULE_RECORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^MODULE:([0-9]+):(.+)$").expect("valid MODULE pattern"));
static DATA_RECORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^DATA:([0-9]+):(.+)$").expect("valid DATA pattern"));
static CONNECTION_RECORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^CONNECTION:\(([0-9]+),(.*)\)->\(([0-9]+),(.*)\)$")
        .expect("valid CONNECTION pattern")
});
static PROPERTY_RECORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^PROPERTY:\(([0-9]+),(.*?)\)=(.*)$").expect("valid PROPERTY pattern")
});

/// Project-local module id.
pub type RecordId = usize;

/// One line of a project file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectRecord {
    Module {
        id: RecordId,
        prototype: String,
    },
    Data {
        id: RecordId,
        filename: PathBuf,
    },
    Property {
        id: RecordId,
        path: String,
        value: String,
    },
    Connection {
        from_id: RecordId,
        from_connector: String,
        to_id: RecordId,
        to_connector: String,
    },
}

impl ProjectRecord {
    /// Parse a single line. `None` if the line is not a record.
    pub fn parse(line: &str) -> Option<Self> {
        if let Some(caps) = MODULE_RECORD.captures(line) {
            return Some(Self::Module {
                id: caps[1].parse().ok()?,
                prototype: caps[2].to_string(),
            });
        }
        if let Some(caps) = DATA_RECORD.captures(line) {
            return Some(Self::Data {
                id: caps[1].parse().ok()?,
                filename: PathBuf::from(&caps[2]),
            });
        }
        if let Some(caps) = CONNECTION_RECORD.captures(line) {
            return Some(Self::Connection {
                from_id: caps[1].parse().ok()?,
                from_connector: caps[2].to_string(),
                to_id: caps[3].parse().ok()?,
                to_connector: caps[4].to_string(),
            });
        }
        if let Some(caps) = PROPERTY_RECORD.captures(line) {
            return Some(Self::Property {
                id: caps[1].parse().ok()?,
                path: caps[2].to_string(),
                value: unescape_value(&caps[3]),
            });
        }
        None
    }
}

impl fmt::Display for ProjectRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Module { id, prototype } => write!(f, "MODULE:{id}:{prototype}"),
            Self::Data { id, filename } => write!(f, "DATA:{id}:{}", filename.display()),
            Self::Property { id, path, value } => {
                write!(f, "PROPERTY:({id},{path})={}", escape_value(value))
            }
            Self::Connection {
                from_id,
                from_connector,
                to_id,
                to_connector,
            } => write!(
                f,
                "CONNECTION:({from_id},{from_connector})->({to_id},{to_connector})"
            ),
        }
    }
}

/// Keeps a property value on one line.
fn escape_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Inverse of [`escape_value`]. Unknown escapes are kept as written.
fn unescape_value(value: &str) -> String {
    let mut unescaped = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            unescaped.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => unescaped.push('\\'),
            Some('n') => unescaped.push('\n'),
            Some('r') => unescaped.push('\r'),
            Some(other) => {
                unescaped.push('\\');
                unescaped.push(other);
            }
            None => unescaped.push('\\'),
        }
    }
    unescaped
}

/// A parsed project file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectFile {
    records: Vec<ProjectRecord>,
    skipped: Vec<(usize, String)>,
}

impl ProjectFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse project text. Blank lines and `//` comments are ignored.
    ///
    /// In [`ParseMode::Strict`] an unrecognized line fails the parse; in
    /// [`ParseMode::Lenient`] it is remembered and later reported as a
    /// [`CombinerWarning::LineSkipped`].
    pub fn parse(text: &str, mode: ParseMode) -> KernelResult<Self> {
        let mut file = Self::new();
        for (index, raw) in text.lines().enumerate() {
            let line_number = index + 1;
            let line = raw.strip_suffix('\r').unwrap_or(raw);
            if line.trim().is_empty() || line.trim_start().starts_with("//") {
                continue;
            }

            match ProjectRecord::parse(line) {
                Some(record) => {
                    tracing::debug!(target: "walnut_kernel::project", line = line_number, ?record, "parsed record");
                    file.records.push(record);
                }
                None if mode == ParseMode::Strict => {
                    return Err(KernelError::Parse {
                        line: line_number,
                        content: line.to_string(),
                    });
                }
                None => {
                    tracing::warn!(
                        target: "walnut_kernel::project",
                        line = line_number,
                        content = line,
                        "unrecognized project line"
                    );
                    file.skipped.push((line_number, line.to_string()));
                }
            }
        }
        Ok(file)
    }

    /// Read and parse a project file.
    pub fn read(path: impl AsRef<Path>, mode: ParseMode) -> KernelResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| KernelError::io(path, e))?;
        Self::parse(&text, mode)
    }

    /// Capture the modules of `container`, their properties and connections.
    ///
    /// The container's read ticket is held for the whole walk, so the result
    /// is a consistent snapshot. Ids follow the container's iteration order.
    pub fn from_container(container: &ModuleContainer) -> Self {
        let ticket = container.modules();
        let modules: Vec<&Arc<dyn Module>> = ticket.values().collect();

        let mut input_owners = HashMap::new();
        for (id, module) in modules.iter().enumerate() {
            for input in module.base().inputs() {
                input_owners.insert(Arc::as_ptr(&input) as usize, (id, input.name().to_string()));
            }
        }

        let mut file = Self::new();
        for (id, module) in modules.iter().enumerate() {
            match module.data_filename() {
                Some(filename) => file.push(ProjectRecord::Data { id, filename }),
                None => file.push(ProjectRecord::Module {
                    id,
                    prototype: module.name().to_string(),
                }),
            }
            module
                .base()
                .properties()
                .visit_leaves("", &mut |path, property| {
                    file.records.push(ProjectRecord::Property {
                        id,
                        path: path.to_string(),
                        value: property.get_as_string(),
                    });
                });
        }

        for (from_id, module) in modules.iter().enumerate() {
            for output in module.base().outputs() {
                for input in output.connected() {
                    let Some((to_id, to_connector)) = input_owners.get(&(Arc::as_ptr(&input) as usize))
                    else {
                        tracing::debug!(
                            target: "walnut_kernel::project",
                            connector = %input.canonical_name(),
                            "connection leaves the container, not saved"
                        );
                        continue;
                    };
                    file.push(ProjectRecord::Connection {
                        from_id,
                        from_connector: output.name().to_string(),
                        to_id: *to_id,
                        to_connector: to_connector.clone(),
                    });
                }
            }
        }
        file
    }

    /// Write the project to `path`.
    pub fn write(&self, path: impl AsRef<Path>) -> KernelResult<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_string()).map_err(|e| KernelError::io(path, e))
    }

    pub fn push(&mut self, record: ProjectRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[ProjectRecord] {
        &self.records
    }

    /// Unrecognized lines kept by a lenient parse, with their line numbers.
    pub fn skipped_lines(&self) -> &[(usize, String)] {
        &self.skipped
    }
}

impl fmt::Display for ProjectFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "// Walnut project file")?;
        for record in &self.records {
            writeln!(f, "{record}")?;
        }
        Ok(())
    }
}

/// Rebuilds the graph described by a [`ProjectFile`].
///
/// The steps run in this order, each over all records: create every module
/// (data modules get their filename before they start), add and start them,
/// wait until each is ready or crashed, apply properties, connect.
#[derive(Debug, Clone)]
pub struct ProjectFileCombiner {
    file: ProjectFile,
    data_module: String,
}

impl ProjectFileCombiner {
    pub fn new(file: ProjectFile) -> Self {
        Self {
            file,
            data_module: DEFAULT_DATA_MODULE.to_string(),
        }
    }

    /// Prototype used for `DATA` records.
    pub fn data_module(mut self, name: impl Into<String>) -> Self {
        self.data_module = name.into();
        self
    }

    pub fn file(&self) -> &ProjectFile {
        &self.file
    }

    fn instantiate(
        &self,
        factory: &ModuleFactory,
        id: RecordId,
        prototype: &str,
        filename: Option<&Path>,
    ) -> Result<Arc<dyn Module>, String> {
        let prototype = factory
            .get_prototype_by_name(prototype)
            .map_err(|e| e.to_string())?;
        let module = factory.create(&prototype).map_err(|e| e.to_string())?;
        if let Some(filename) = filename {
            let property = module
                .base()
                .properties()
                .find_property("filename")
                .ok_or_else(|| format!("prototype '{}' has no filename property", prototype.name()))?;
            if !property.set_as_string(&filename.to_string_lossy()) {
                return Err(format!("filename '{}' rejected", filename.display()));
            }
        }
        tracing::debug!(target: "walnut_kernel::project", id, module = module.name(), "instantiated module");
        Ok(module)
    }
}

fn describe(id: RecordId, prototype: &str) -> String {
    format!("#{id} ({prototype})")
}

impl ModuleCombiner for ProjectFileCombiner {
    #[tracing::instrument(skip_all, target = "walnut_kernel::project", level = "trace")]
    fn apply(&self, factory: &ModuleFactory, container: &ModuleContainer) -> KernelResult<CombinerReport> {
        let _perf = PerfSpan::new("project_apply");
        let mut report = CombinerReport::new();

        for (line, content) in &self.file.skipped {
            report.warn(CombinerWarning::LineSkipped {
                line: *line,
                content: content.clone(),
            });
        }

        let mut created: BTreeMap<RecordId, Arc<dyn Module>> = BTreeMap::new();
        for record in &self.file.records {
            let (id, prototype, filename) = match record {
                ProjectRecord::Module { id, prototype } => (*id, prototype.as_str(), None),
                ProjectRecord::Data { id, filename } => {
                    (*id, self.data_module.as_str(), Some(filename.as_path()))
                }
                _ => continue,
            };
            if created.contains_key(&id) {
                report.warn(CombinerWarning::ModuleNotCreated {
                    module: describe(id, prototype),
                    reason: "duplicate module id".to_string(),
                });
                continue;
            }
            match self.instantiate(factory, id, prototype, filename) {
                Ok(module) => {
                    created.insert(id, module);
                }
                Err(reason) => report.warn(CombinerWarning::ModuleNotCreated {
                    module: describe(id, prototype),
                    reason,
                }),
            }
        }

        created.retain(|id, module| match container.add(module.clone(), true) {
            Ok(_) => true,
            Err(err) => {
                report.warn(CombinerWarning::ModuleNotCreated {
                    module: describe(*id, module.name()),
                    reason: err.to_string(),
                });
                false
            }
        });

        created.retain(|id, module| match startup_failure(module.as_ref()) {
            None => true,
            Some(reason) => {
                report.warn(CombinerWarning::ModuleCrashed {
                    module: describe(*id, module.name()),
                    reason,
                });
                false
            }
        });

        for record in &self.file.records {
            let ProjectRecord::Property { id, path, value } = record else {
                continue;
            };
            let skip = |reason: String| CombinerWarning::PropertySkipped {
                module: format!("#{id}"),
                property: path.clone(),
                reason,
            };
            let Some(module) = created.get(id) else {
                report.warn(skip(format!("module {id} is not available")));
                continue;
            };
            match module.base().properties().find_property(path) {
                None => report.warn(skip("no such property".to_string())),
                Some(property) if !property.set_as_string(value) => {
                    report.warn(skip(format!("value '{value}' rejected")));
                }
                Some(_) => {}
            }
        }

        for record in &self.file.records {
            let ProjectRecord::Connection {
                from_id,
                from_connector,
                to_id,
                to_connector,
            } = record
            else {
                continue;
            };
            let skip = |reason: String| CombinerWarning::ConnectionSkipped {
                from: format!("({from_id},{from_connector})"),
                to: format!("({to_id},{to_connector})"),
                reason,
            };
            let (Some(from), Some(to)) = (created.get(from_id), created.get(to_id)) else {
                let missing = if created.contains_key(from_id) { to_id } else { from_id };
                report.warn(skip(format!("module {missing} is not available")));
                continue;
            };
            let connected = from
                .base()
                .get_output_connector(from_connector)
                .and_then(|output| output.connect(&to.base().get_input_connector(to_connector)?));
            if let Err(err) = connected {
                report.warn(skip(err.to_string()));
            }
        }

        for module in created.into_values() {
            report.push_module(module);
        }
        tracing::info!(
            target: "walnut_kernel::project",
            modules = report.modules().len(),
            warnings = report.warnings().len(),
            "project applied"
        );
        Ok(report)
    }
}
