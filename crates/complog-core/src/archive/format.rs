//! Fixed entries of the archive container and the format version header.
//!
//! `metadata.txt` is the only entry a reader inspects before it knows which
//! decoder to use, so its syntax never changes between versions:
//!
//! ```text
//! Version: 2
//! Count: 14
//! IsWindows: false
//! ```
//!
//! The first archives carried only a `Count:` line; a header without
//! `Version:` is version 0.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use complog_store::ModuleId;

use crate::domain::{AssemblyIdentity, ComplogError, Result};

pub const METADATA_ENTRY: &str = "metadata.txt";
pub const ASSEMBLY_INFO_ENTRY: &str = "assemblyinfo.txt";
pub const COMPILATIONS_PREFIX: &str = "compilations/";

/// Version every writer emits.
pub const LATEST_VERSION: u32 = 2;
/// Oldest version still readable.
pub const OLDEST_VERSION: u32 = 0;

/// Archive format versions this reader can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatVersion {
    /// Header without a version line; records use the V1 text layout.
    V0,
    /// Line-oriented text records with inline arguments.
    V1,
    /// JSON compilation packs with arguments in a content blob.
    V2,
}

impl FormatVersion {
    /// Select the decoder for a header version.
    pub fn from_number(version: u32) -> Result<Self> {
        match version {
            0 => Ok(FormatVersion::V0),
            1 => Ok(FormatVersion::V1),
            2 => Ok(FormatVersion::V2),
            v => Err(ComplogError::ArchiveTooNew {
                found: v,
                supported: LATEST_VERSION,
            }),
        }
    }

    pub fn number(self) -> u32 {
        match self {
            FormatVersion::V0 => 0,
            FormatVersion::V1 => 1,
            FormatVersion::V2 => 2,
        }
    }

    /// Entry name of the compilation record at `index`.
    pub fn compilation_entry(self, index: usize) -> String {
        match self {
            FormatVersion::V0 | FormatVersion::V1 => format!("{COMPILATIONS_PREFIX}{index}.txt"),
            FormatVersion::V2 => format!("{COMPILATIONS_PREFIX}{index}.json"),
        }
    }
}

/// Contents of `metadata.txt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveMetadata {
    pub version: u32,
    /// Number of compilation records.
    pub count: usize,
    /// Whether the archive was produced on Windows; absent in some archives.
    pub is_windows: Option<bool>,
}

impl ArchiveMetadata {
    pub fn new(count: usize, is_windows: bool) -> Self {
        Self {
            version: LATEST_VERSION,
            count,
            is_windows: Some(is_windows),
        }
    }

    pub fn render(&self) -> String {
        let mut out = format!("Version: {}\nCount: {}\n", self.version, self.count);
        if let Some(w) = self.is_windows {
            let _ = writeln!(out, "IsWindows: {w}");
        }
        out
    }

    /// Parse the header. The version line is validated first: an archive
    /// from a newer tool is reported as such even if the rest of its header
    /// is unfamiliar. A missing version line means version 0.
    pub fn parse(text: &str) -> Result<Self> {
        let fields: BTreeMap<&str, &str> = text
            .lines()
            .filter_map(|line| line.split_once(':'))
            .map(|(k, v)| (k.trim(), v.trim()))
            .collect();

        let version: u32 = match fields.get("Version") {
            Some(v) => v
                .parse()
                .map_err(|_| malformed("metadata Version is not a number"))?,
            None => 0,
        };
        FormatVersion::from_number(version)?;

        let count = fields
            .get("Count")
            .ok_or_else(|| malformed("metadata has no Count line"))?
            .parse()
            .map_err(|_| malformed("metadata Count is not a number"))?;

        let is_windows = match fields.get("IsWindows") {
            None => None,
            Some(v) if v.eq_ignore_ascii_case("true") => Some(true),
            Some(v) if v.eq_ignore_ascii_case("false") => Some(false),
            Some(v) => return Err(malformed(&format!("metadata IsWindows `{v}` is not a bool"))),
        };

        Ok(Self {
            version,
            count,
            is_windows,
        })
    }

    pub fn format_version(&self) -> Result<FormatVersion> {
        FormatVersion::from_number(self.version)
    }
}

/// One row of `assemblyinfo.txt`: the canonical name recorded for a module id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyInfo {
    pub identity: AssemblyIdentity,
    /// File name of the first path the module was seen under.
    pub file_name: String,
}

/// Render the assembly index, one tab-separated row per module id.
pub fn render_assembly_index<'a>(rows: impl IntoIterator<Item = &'a AssemblyInfo>) -> String {
    let mut out = String::new();
    for row in rows {
        let _ = write!(
            out,
            "{}\t{}\t{}",
            row.identity.module_id, row.file_name, row.identity.name
        );
        if let Some(v) = &row.identity.informational_version {
            let _ = write!(out, "\t{v}");
        }
        out.push('\n');
    }
    out
}

pub fn parse_assembly_index(text: &str) -> Result<BTreeMap<ModuleId, AssemblyInfo>> {
    let mut index = BTreeMap::new();
    for (n, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let mut cols = line.split('\t');
        let (Some(id), Some(file_name), Some(name)) = (cols.next(), cols.next(), cols.next())
        else {
            return Err(malformed(&format!(
                "{ASSEMBLY_INFO_ENTRY} line {} has too few columns",
                n + 1
            )));
        };
        let module_id: ModuleId = id.parse().map_err(|_| {
            malformed(&format!(
                "{ASSEMBLY_INFO_ENTRY} line {}: bad module id `{id}`",
                n + 1
            ))
        })?;
        let informational_version = cols.next().filter(|v| !v.is_empty()).map(str::to_string);
        index.insert(
            module_id,
            AssemblyInfo {
                identity: AssemblyIdentity {
                    module_id,
                    name: name.to_string(),
                    informational_version,
                },
                file_name: file_name.to_string(),
            },
        );
    }
    Ok(index)
}

fn malformed(msg: &str) -> ComplogError {
    ComplogError::MalformedArchive(msg.to_string())
}
