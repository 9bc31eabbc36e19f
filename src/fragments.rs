//! Fragment extraction from chunk files.
//!
//! A [`FragmentExtractor`] holds the pattern modules selected for a run and
//! streams a chunk line by line through them, collecting every match into one
//! [`ExtractedRecord`]. Modules are chosen once, when the extractor is built;
//! the per-line loop only iterates over what was enabled.

use anyhow::{Context, Result};
use regex::Regex;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, warn};

use crate::error::ModuleError;
use crate::models::ExtractedRecord;

/// The fragment lists an [`ExtractedRecord`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FragmentKind {
    Email,
    Ip,
    Domain,
    PhoneNumber,
}

impl FragmentKind {
    pub const ALL: [FragmentKind; 4] = [
        FragmentKind::Email,
        FragmentKind::Ip,
        FragmentKind::Domain,
        FragmentKind::PhoneNumber,
    ];

    /// Module name as used on the command line and in config.
    pub fn name(&self) -> &'static str {
        match self {
            FragmentKind::Email => "email",
            FragmentKind::Ip => "ip",
            FragmentKind::Domain => "domain",
            FragmentKind::PhoneNumber => "phonenumber",
        }
    }

    fn list_mut<'r>(&self, record: &'r mut ExtractedRecord) -> &'r mut Vec<String> {
        match self {
            FragmentKind::Email => &mut record.emails,
            FragmentKind::Ip => &mut record.ips,
            FragmentKind::Domain => &mut record.domains,
            FragmentKind::PhoneNumber => &mut record.phonenumbers,
        }
    }
}

impl fmt::Display for FragmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FragmentKind {
    type Err = ModuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "email" | "emails" => Ok(FragmentKind::Email),
            "ip" | "ips" => Ok(FragmentKind::Ip),
            "domain" | "domains" => Ok(FragmentKind::Domain),
            "phonenumber" | "phonenumbers" | "phone" => Ok(FragmentKind::PhoneNumber),
            _ => Err(ModuleError::Unknown(s.to_string())),
        }
    }
}

/// A pluggable line scanner.
pub trait FragmentModule: Send + Sync {
    /// Which record list the matches go to.
    fn kind(&self) -> FragmentKind;

    /// Append every match in `line` to `out`, in order of appearance.
    fn scan(&self, line: &str, out: &mut Vec<String>);
}

/// A module backed by a single regular expression.
pub struct PatternModule {
    kind: FragmentKind,
    regex: Regex,
}

const EMAIL_PATTERN: &str = r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}";
const IP_PATTERN: &str = r"\b(?:(?:25[0-5]|2[0-4][0-9]|1[0-9]{2}|[1-9]?[0-9])\.){3}(?:25[0-5]|2[0-4][0-9]|1[0-9]{2}|[1-9]?[0-9])\b";
const DOMAIN_PATTERN: &str =
    r"\b(?:[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?\.)+[A-Za-z]{2,63}\b";
const PHONE_PATTERN: &str = r"\+[0-9]{1,3}[ .-]?\(?[0-9]{1,4}\)?(?:[ .-]?[0-9]{2,4}){2,5}";

impl PatternModule {
    pub fn new(kind: FragmentKind, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            kind,
            regex: Regex::new(pattern)?,
        })
    }

    /// The built-in pattern for `kind`.
    pub fn builtin(kind: FragmentKind) -> Result<Self, ModuleError> {
        let pattern = match kind {
            FragmentKind::Email => EMAIL_PATTERN,
            FragmentKind::Ip => IP_PATTERN,
            FragmentKind::Domain => DOMAIN_PATTERN,
            FragmentKind::PhoneNumber => PHONE_PATTERN,
        };
        Self::new(kind, pattern).map_err(|e| ModuleError::Pattern {
            module: kind.name().to_string(),
            message: e.to_string(),
        })
    }
}

impl FragmentModule for PatternModule {
    fn kind(&self) -> FragmentKind {
        self.kind
    }

    fn scan(&self, line: &str, out: &mut Vec<String>) {
        out.extend(self.regex.find_iter(line).map(|m| m.as_str().to_string()));
    }
}

pub struct FragmentExtractor {
    modules: Vec<Box<dyn FragmentModule>>,
}

impl FragmentExtractor {
    /// An extractor with no modules; add some with [`FragmentExtractor::with_module`].
    pub fn empty() -> Self {
        Self {
            modules: Vec::new(),
        }
    }

    /// Every built-in module.
    pub fn all() -> Result<Self, ModuleError> {
        Self::with_kinds(&FragmentKind::ALL)
    }

    /// Built-in modules for each kind, in the given order.
    pub fn with_kinds(kinds: &[FragmentKind]) -> Result<Self, ModuleError> {
        let mut extractor = Self::empty();
        for kind in kinds {
            if !extractor.modules.iter().any(|m| m.kind() == *kind) {
                extractor
                    .modules
                    .push(Box::new(PatternModule::builtin(*kind)?));
            }
        }
        Ok(extractor)
    }

    /// Built-in modules selected by name. No names selects all of them.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, ModuleError> {
        if names.is_empty() {
            return Self::all();
        }
        let kinds = names
            .iter()
            .map(|n| n.as_ref().parse::<FragmentKind>())
            .collect::<Result<Vec<_>, _>>()?;
        Self::with_kinds(&kinds)
    }

    pub fn with_module(mut self, module: Box<dyn FragmentModule>) -> Self {
        self.modules.push(module);
        self
    }

    pub fn kinds(&self) -> Vec<FragmentKind> {
        self.modules.iter().map(|m| m.kind()).collect()
    }

    /// Scan the file at `path` into a record carrying `id`.
    ///
    /// Failing to open the file is an error. A read error part-way through is
    /// logged and the fragments gathered up to that point are returned.
    pub fn extract(&self, id: &str, path: &Path) -> Result<ExtractedRecord> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open chunk: {}", path.display()))?;
        debug!(path = %path.display(), "extracting fragments");
        Ok(self.extract_reader(id, BufReader::new(file), &path.display().to_string()))
    }

    /// Scan every line `reader` yields. `source` only labels log messages.
    pub fn extract_reader<R: BufRead>(&self, id: &str, mut reader: R, source: &str) -> ExtractedRecord {
        let mut record = ExtractedRecord::new(id);
        let mut buf = Vec::new();
        let mut line_no: u64 = 0;

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    line_no += 1;
                    let line = String::from_utf8_lossy(&buf);
                    self.scan_line(&line, &mut record);
                }
                Err(e) => {
                    warn!(
                        source = %source,
                        line = line_no + 1,
                        error = %e,
                        "read error; keeping fragments found so far"
                    );
                    break;
                }
            }
        }
        record
    }

    fn scan_line(&self, line: &str, record: &mut ExtractedRecord) {
        for module in &self.modules {
            module.scan(line, module.kind().list_mut(record));
        }
    }
}
