//! Analyzer loading strategies and host fingerprints.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::AnalyzerData;

/// How analyzers for a compiler call are made available.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BasicAnalyzerKind {
    /// Load nothing; substitute generated text recorded in the archive.
    None,
    /// Load analyzer bytes straight into an isolated context.
    #[default]
    InMemory,
    /// Write analyzer bytes to a scratch directory and load from there.
    OnDisk,
}

impl BasicAnalyzerKind {
    /// Whether this strategy needs to load analyzer code.
    pub fn loads_code(self) -> bool {
        !matches!(self, BasicAnalyzerKind::None)
    }
}

impl fmt::Display for BasicAnalyzerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BasicAnalyzerKind::None => write!(f, "none"),
            BasicAnalyzerKind::InMemory => write!(f, "in_memory"),
            BasicAnalyzerKind::OnDisk => write!(f, "on_disk"),
        }
    }
}

impl FromStr for BasicAnalyzerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(BasicAnalyzerKind::None),
            "in_memory" | "inmemory" => Ok(BasicAnalyzerKind::InMemory),
            "on_disk" | "ondisk" => Ok(BasicAnalyzerKind::OnDisk),
            other => Err(format!("unknown analyzer kind `{other}`")),
        }
    }
}

/// Cache key for an analyzer set: module ids, sorted, `;`-joined.
///
/// Order of the analyzers on the command line does not matter; the same
/// module listed twice counts once.
pub fn fingerprint(analyzers: &[AnalyzerData]) -> String {
    let mut ids: Vec<String> = analyzers
        .iter()
        .map(|a| a.identity.module_id.to_string())
        .collect();
    ids.sort();
    ids.dedup();
    ids.join(";")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AssemblyIdentity;
    use complog_store::ModuleId;

    fn analyzer(byte: u8, path: &str) -> AnalyzerData {
        AnalyzerData {
            identity: AssemblyIdentity {
                module_id: ModuleId::from_bytes([byte; 16]),
                name: "A".to_string(),
                informational_version: None,
            },
            file_path: path.to_string(),
        }
    }

    #[test]
    fn display_and_parse_cover_all_variants() {
        for kind in [
            BasicAnalyzerKind::None,
            BasicAnalyzerKind::InMemory,
            BasicAnalyzerKind::OnDisk,
        ] {
            assert_eq!(kind.to_string().parse::<BasicAnalyzerKind>().unwrap(), kind);
        }
        assert!("sometimes".parse::<BasicAnalyzerKind>().is_err());
        assert!(!BasicAnalyzerKind::None.loads_code());
    }

    #[test]
    fn fingerprint_ignores_order_and_paths() {
        let a = [analyzer(1, "/x/A.dll"), analyzer(2, "/x/B.dll")];
        let b = [analyzer(2, "/y/B.dll"), analyzer(1, "/y/A.dll")];
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_ne!(fingerprint(&a), fingerprint(&a[..1]));
        assert_eq!(fingerprint(&[]), "");
    }
}
