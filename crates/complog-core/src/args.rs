//! Structured compiler arguments.
//!
//! The compiler front end owns the real argument grammar. This module
//! defines the contract the rest of the crate needs from it
//! ([`ArgumentParser`]) and a default [`CommandLineParser`] covering the
//! csc/vbc options that name compilation inputs. Anything it does not
//! model is kept verbatim in [`ParsedArguments::options`].

use std::path::{Path, PathBuf};

use crate::domain::descriptor::file_name_of;
use crate::domain::{ComplogError, Language, Result};

/// A reference as written on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReference {
    pub path: PathBuf,
    pub aliases: Vec<String>,
    pub embed_interop: bool,
}

/// A `/resource:` or `/linkresource:` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResource {
    pub path: PathBuf,
    /// Logical manifest name; defaults to the file name.
    pub name: String,
    pub is_public: bool,
    /// `true` for `/linkresource:`.
    pub linked: bool,
}

/// Compiler arguments split by the role each input plays.
///
/// Paths are resolved against the base directory given to the parser.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedArguments {
    pub sources: Vec<PathBuf>,
    pub references: Vec<ParsedReference>,
    pub analyzers: Vec<PathBuf>,
    pub additional_files: Vec<PathBuf>,
    pub analyzer_configs: Vec<PathBuf>,
    pub embedded_files: Vec<PathBuf>,
    pub resources: Vec<ParsedResource>,
    pub output_file: Option<String>,
    pub target: Option<String>,
    pub ruleset: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    pub source_link: Option<PathBuf>,
    pub generated_files_out: Option<PathBuf>,
    /// Options not modelled above, verbatim.
    pub options: Vec<String>,
}

impl ParsedArguments {
    /// Output assembly name without extension, if `/out:` was given.
    pub fn assembly_name(&self) -> Option<&str> {
        let file = file_name_of(self.output_file.as_deref()?);
        Some(file.rsplit_once('.').map_or(file, |(stem, _)| stem))
    }
}

/// Turns raw compiler arguments into [`ParsedArguments`].
///
/// Implementations must be pure: the same arguments and base directory
/// always give the same result.
pub trait ArgumentParser: Send + Sync {
    fn parse(
        &self,
        language: Language,
        arguments: &[String],
        base_directory: &Path,
    ) -> Result<ParsedArguments>;
}

/// Default parser for the csc/vbc option syntax.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandLineParser;

impl ArgumentParser for CommandLineParser {
    fn parse(
        &self,
        _language: Language,
        arguments: &[String],
        base_directory: &Path,
    ) -> Result<ParsedArguments> {
        let mut parsed = ParsedArguments::default();
        let resolve = |p: &str| resolve_path(base_directory, p);

        for arg in arguments {
            let Some((name, value)) = split_option(arg) else {
                if arg.starts_with('@') {
                    parsed.options.push(arg.clone());
                } else {
                    parsed.sources.push(resolve(arg));
                }
                continue;
            };

            match (name.to_ascii_lowercase().as_str(), value) {
                ("reference" | "r", Some(v)) => parsed.references.extend(parse_references(v, false, &resolve)),
                ("link" | "l", Some(v)) => parsed.references.extend(parse_references(v, true, &resolve)),
                ("analyzer" | "a", Some(v)) => parsed.analyzers.extend(split_list(v).map(&resolve)),
                ("additionalfile", Some(v)) => {
                    parsed.additional_files.extend(split_list(v).map(&resolve))
                }
                ("analyzerconfig", Some(v)) => {
                    parsed.analyzer_configs.extend(split_list(v).map(&resolve))
                }
                ("embed", Some(v)) => parsed.embedded_files.extend(split_list(v).map(&resolve)),
                ("resource" | "res", Some(v)) => parsed.resources.push(parse_resource(arg, v, false, &resolve)?),
                ("linkresource" | "linkres", Some(v)) => {
                    parsed.resources.push(parse_resource(arg, v, true, &resolve)?)
                }
                ("out", Some(v)) => parsed.output_file = Some(v.to_string()),
                ("target" | "t", Some(v)) => parsed.target = Some(v.to_string()),
                ("ruleset", Some(v)) => parsed.ruleset = Some(resolve(unquote(v))),
                ("keyfile", Some(v)) => parsed.key_file = Some(resolve(unquote(v))),
                ("sourcelink", Some(v)) => parsed.source_link = Some(resolve(unquote(v))),
                ("generatedfilesout", Some(v)) => {
                    parsed.generated_files_out = Some(resolve(unquote(v)))
                }
                _ => parsed.options.push(arg.clone()),
            }
        }
        Ok(parsed)
    }
}

/// Split `/name:value` or `-name:value`. Returns `None` for file arguments,
/// including absolute Unix paths such as `/src/a.cs`.
fn split_option(arg: &str) -> Option<(&str, Option<&str>)> {
    let body = arg.strip_prefix('/').or_else(|| arg.strip_prefix('-'))?;
    let (name, value) = match body.split_once(':') {
        Some((n, v)) => (n, Some(v)),
        None => (body, None),
    };
    let core = name.trim_end_matches(['+', '-']);
    if core.is_empty() || !core.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some((core, value))
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
}

/// Split a `,`/`;` separated list, dropping empty items.
fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value
        .split([',', ';'])
        .map(unquote)
        .filter(|s| !s.is_empty())
}

fn parse_references(
    value: &str,
    embed_interop: bool,
    resolve: &impl Fn(&str) -> PathBuf,
) -> Vec<ParsedReference> {
    // `alias1,alias2=path` names exactly one file.
    if let Some((aliases, path)) = value.split_once('=') {
        return vec![ParsedReference {
            path: resolve(unquote(path)),
            aliases: split_list(aliases).map(str::to_string).collect(),
            embed_interop,
        }];
    }
    split_list(value)
        .map(|p| ParsedReference {
            path: resolve(p),
            aliases: Vec::new(),
            embed_interop,
        })
        .collect()
}

fn parse_resource(
    arg: &str,
    value: &str,
    linked: bool,
    resolve: &impl Fn(&str) -> PathBuf,
) -> Result<ParsedResource> {
    let mut parts = value.split(',').map(unquote);
    let path = parts
        .next()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ComplogError::InvalidArguments(format!("`{arg}` names no file")))?;
    let name = parts
        .next()
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| file_name_of(path))
        .to_string();
    let is_public = match parts.next().map(str::to_ascii_lowercase).as_deref() {
        None | Some("") | Some("public") => true,
        Some("private") => false,
        Some(other) => {
            return Err(ComplogError::InvalidArguments(format!(
                "`{arg}`: unknown resource visibility `{other}`"
            )))
        }
    };
    Ok(ParsedResource {
        path: resolve(path),
        name,
        is_public,
        linked,
    })
}

/// Whether `path` is rooted on either platform's conventions.
pub(crate) fn is_rooted(path: &str) -> bool {
    let bytes = path.as_bytes();
    path.starts_with(['/', '\\'])
        || (bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':')
}

pub(crate) fn resolve_path(base: &Path, path: &str) -> PathBuf {
    if is_rooted(path) {
        PathBuf::from(path)
    } else {
        base.join(path)
    }
}
