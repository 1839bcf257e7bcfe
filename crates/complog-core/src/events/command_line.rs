//! Splitting a captured compiler command line into compiler path and
//! arguments.
//!
//! The build tool logs the full command text. It takes one of two shapes:
//!
//! ```text
//! /path/to/csc.exe <args>
//! /path/to/dotnet exec /path/to/csc.dll <args>
//! ```
//!
//! Paths may be quoted or contain unquoted spaces, and hosts other than
//! `dotnet` show up with a trailing ` exec`. Finding the boundary is a
//! heuristic; when it does not match, the call fails rather than guessing.

use crate::domain::descriptor::file_name_of;
use crate::domain::{ComplogError, Language, Result};

/// Names of the generic host that runs a compiler library.
const HOST_NAMES: &[&str] = &["dotnet", "dotnet.exe"];

const EXEC: &str = "exec";

/// A command line split at the compiler boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitCommandLine {
    /// The compiler executable or library, as written.
    pub compiler_file_path: String,
    /// Arguments after the compiler, unquoted.
    pub arguments: Vec<String>,
}

/// Split `command_line` for a compiler of `language`.
///
/// Returns `ComplogError::CommandLineParse` if no compiler boundary can be
/// found.
pub fn split_compiler_command_line(
    command_line: &str,
    language: Language,
) -> Result<SplitCommandLine> {
    let text = command_line.trim();
    let (compiler_file_path, rest) =
        find_compiler(text, language).ok_or_else(|| ComplogError::CommandLineParse {
            command_line: command_line.to_string(),
            reason: format!(
                "no `{}` boundary found, directly or after an `exec` host",
                language.compiler_file_names().join("`/`")
            ),
        })?;
    Ok(SplitCommandLine {
        compiler_file_path,
        arguments: tokenize(&text[rest..], true),
    })
}

/// Locate the compiler token. Returns its text and the byte offset where
/// arguments begin.
fn find_compiler(text: &str, language: Language) -> Option<(String, usize)> {
    if text.starts_with('"') {
        let close = text[1..].find('"')? + 1;
        return classify_head(text, &text[1..close], close + 1, language).flatten();
    }

    // Unquoted paths may contain spaces, so try every whitespace-terminated
    // prefix, shortest first.
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some(found) = classify_head(text, &text[..i], i, language) {
                return found;
            }
        }
    }
    classify_head(text, text, text.len(), language).flatten()
}

/// `None` means `head` is not a boundary and a longer prefix may be tried.
/// `Some(None)` means `head` is a host whose `exec` boundary is missing,
/// which ends the search.
fn classify_head(
    text: &str,
    head: &str,
    after: usize,
    language: Language,
) -> Option<Option<(String, usize)>> {
    if is_compiler(head, language) {
        return Some(Some((head.to_string(), after)));
    }
    if is_host(head) {
        return Some(compiler_after_host(text, after, language));
    }
    if head.ends_with(" exec") {
        // Unrecognised host name followed by `exec`: the compiler is next.
        return read_compiler_token(text, after, language).map(Some);
    }
    None
}

fn is_compiler(token: &str, language: Language) -> bool {
    let name = file_name_of(token);
    language
        .compiler_file_names()
        .iter()
        .any(|n| name.eq_ignore_ascii_case(n))
}

fn is_host(token: &str) -> bool {
    let name = file_name_of(token);
    HOST_NAMES.iter().any(|n| name.eq_ignore_ascii_case(n))
}

fn skip_whitespace(text: &str, from: usize) -> usize {
    text[from..]
        .char_indices()
        .find(|(_, c)| !c.is_whitespace())
        .map(|(i, _)| from + i)
        .unwrap_or(text.len())
}

/// After the host name: an `exec` token, then the compiler library.
fn compiler_after_host(text: &str, after: usize, language: Language) -> Option<(String, usize)> {
    let start = skip_whitespace(text, after);
    let rest = &text[start..];
    let has_exec = rest
        .get(..EXEC.len())
        .is_some_and(|s| s.eq_ignore_ascii_case(EXEC))
        && rest[EXEC.len()..].starts_with(char::is_whitespace);
    if !has_exec {
        return None;
    }
    read_compiler_token(text, start + EXEC.len(), language)
}

/// Read a quoted or unquoted compiler path starting at `from`.
fn read_compiler_token(text: &str, from: usize, language: Language) -> Option<(String, usize)> {
    let start = skip_whitespace(text, from);
    let rest = &text[start..];
    if rest.starts_with('"') {
        let close = rest[1..].find('"')? + 1;
        let token = &rest[1..close];
        return is_compiler(token, language).then(|| (token.to_string(), start + close + 1));
    }

    for (i, c) in rest.char_indices() {
        if c.is_whitespace() && is_compiler(&rest[..i], language) {
            return Some((rest[..i].to_string(), start + i));
        }
    }
    is_compiler(rest, language).then(|| (rest.to_string(), text.len()))
}

/// Split argument text with the compiler's quoting rules.
///
/// Whitespace separates arguments unless quoted. `2n` backslashes before a
/// quote become `n` backslashes and the quote toggles quoting; `2n + 1`
/// become `n` backslashes and a literal quote. Other backslashes are
/// literal. With `remove_hash_comments`, an unquoted `#` starting an
/// argument comments out the rest of the line.
pub fn tokenize(text: &str, remove_hash_comments: bool) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut args = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }
        if i >= chars.len() {
            break;
        }
        if remove_hash_comments && chars[i] == '#' {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }

        let mut arg = String::new();
        let mut in_quotes = false;
        while i < chars.len() {
            let c = chars[i];
            if c == '\\' {
                let run = chars[i..].iter().take_while(|c| **c == '\\').count();
                i += run;
                if i < chars.len() && chars[i] == '"' {
                    arg.extend(std::iter::repeat('\\').take(run / 2));
                    if run % 2 == 1 {
                        arg.push('"');
                        i += 1;
                    }
                } else {
                    arg.extend(std::iter::repeat('\\').take(run));
                }
            } else if c == '"' {
                in_quotes = !in_quotes;
                i += 1;
            } else if c.is_whitespace() && !in_quotes {
                break;
            } else {
                arg.push(c);
                i += 1;
            }
        }
        args.push(arg);
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(text: &str) -> Result<SplitCommandLine> {
        split_compiler_command_line(text, Language::CSharp)
    }

    #[test]
    fn dotnet_exec_compiler_library() {
        let s = split("dotnet exec csc.dll /nologo a.cs").unwrap();
        assert_eq!(s.compiler_file_path, "csc.dll");
        assert_eq!(s.arguments, vec!["/nologo", "a.cs"]);
    }

    #[test]
    fn host_without_exec_boundary_is_a_hard_failure() {
        let err = split("dotnet not what we expect a.cs").unwrap_err();
        assert!(matches!(err, ComplogError::CommandLineParse { .. }));
    }

    #[test]
    fn host_requires_exec_before_compiler_library() {
        for text in [
            "dotnet csc.dll /nologo a.cs",
            "/usr/share/dotnet/dotnet /usr/share/dotnet/sdk/csc.dll a.cs",
            r#""C:\Program Files\dotnet\dotnet.exe" csc.dll a.cs"#,
        ] {
            let err = split(text).unwrap_err();
            assert!(matches!(err, ComplogError::CommandLineParse { .. }), "{text}");
        }
    }

    #[test]
    fn direct_compiler_executable() {
        let s = split(r"C:\tools\csc.exe /target:library b.cs").unwrap();
        assert_eq!(s.compiler_file_path, r"C:\tools\csc.exe");
        assert_eq!(s.arguments, vec!["/target:library", "b.cs"]);
    }

    #[test]
    fn quoted_host_and_quoted_compiler() {
        let s = split(
            r#""C:\Program Files\dotnet\dotnet.exe" exec "C:\Program Files\dotnet\sdk\8.0.100\Roslyn\bincore\csc.dll" /noconfig a.cs"#,
        )
        .unwrap();
        assert_eq!(
            s.compiler_file_path,
            r"C:\Program Files\dotnet\sdk\8.0.100\Roslyn\bincore\csc.dll"
        );
        assert_eq!(s.arguments, vec!["/noconfig", "a.cs"]);
    }

    #[test]
    fn unquoted_host_path_with_spaces() {
        let s = split(
            r"C:\Program Files\dotnet\dotnet.exe exec C:\Program Files\dotnet\sdk\csc.dll /out:x.dll",
        )
        .unwrap();
        assert_eq!(s.compiler_file_path, r"C:\Program Files\dotnet\sdk\csc.dll");
        assert_eq!(s.arguments, vec!["/out:x.dll"]);
    }

    #[test]
    fn quoted_compiler_executable() {
        let s = split(r#""/opt/my tools/csc" -nologo "my file.cs""#).unwrap();
        assert_eq!(s.compiler_file_path, "/opt/my tools/csc");
        assert_eq!(s.arguments, vec!["-nologo", "my file.cs"]);
    }

    #[test]
    fn custom_host_ending_in_exec() {
        let s = split("/opt/custom/dn exec /opt/roslyn/csc.dll /nologo a.cs").unwrap();
        assert_eq!(s.compiler_file_path, "/opt/roslyn/csc.dll");
        assert_eq!(s.arguments, vec!["/nologo", "a.cs"]);
    }

    #[test]
    fn compiler_with_no_arguments() {
        let s = split("/usr/share/dotnet/csc").unwrap();
        assert_eq!(s.compiler_file_path, "/usr/share/dotnet/csc");
        assert!(s.arguments.is_empty());
    }

    #[test]
    fn visual_basic_compiler_is_not_csharp() {
        assert!(split("dotnet exec vbc.dll a.vb").is_err());
        let s = split_compiler_command_line("dotnet exec vbc.dll a.vb", Language::VisualBasic)
            .unwrap();
        assert_eq!(s.compiler_file_path, "vbc.dll");
    }

    #[test]
    fn name_suffix_is_not_a_compiler() {
        assert!(split("/bin/notcsc.exe a.cs").is_err());
    }

    #[test]
    fn unterminated_quote_fails() {
        assert!(split(r#""C:\tools\csc.exe a.cs"#).is_err());
    }

    #[test]
    fn tokenize_quotes_and_backslashes() {
        assert_eq!(
            tokenize(r#"/define:"A;B" "a b.cs" c\d.cs"#, false),
            vec!["/define:A;B", "a b.cs", r"c\d.cs"]
        );
        assert_eq!(tokenize(r#"a\"b"#, false), vec![r#"a"b"#]);
        assert_eq!(tokenize(r#""a\\" b"#, false), vec![r"a\", "b"]);
        assert_eq!(tokenize(r#""""#, false), vec![""]);
    }

    #[test]
    fn tokenize_strips_hash_comments() {
        let text = "/nologo # compiler flags\na.cs\n#b.cs\nc#.cs";
        assert_eq!(tokenize(text, true), vec!["/nologo", "a.cs", "c#.cs"]);
        assert_eq!(tokenize("#x y", false), vec!["#x", "y"]);
    }
}
