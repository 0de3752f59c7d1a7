/// Action source extractor
///
/// Scans job scripts for registration call sites (`jobs.add_to_jobs(callable,
/// "identifier", ...)`) and turns each one into an `ActionRecord`: the require
/// directives visible at the call, the script's namespace, and the callable
/// re-targeted at the `jobs.execute_job` entry. Other top-level locals are
/// not captured, so a callable may only reach required modules, `services`
/// and its argument. Pure transform; the caller hands the result to the action
/// source store.

use crate::action::lexer::{tokenize, Token, TokenKind};
use crate::action::record::ActionRecord;
use crate::error::ExtractionError;
use regex::Regex;
use std::{
    collections::BTreeMap,
    path::Path,
    sync::OnceLock,
};
use walkdir::WalkDir;

/// Name of the registration call scripts use
pub const REGISTRATION_CALL: &str = "add_to_jobs";

/// Call every extracted body is re-targeted to
pub const EXECUTION_ENTRY: &str = "jobs.execute_job";

/// Extension of the job scripts the extractor scans
pub const SCRIPT_EXTENSION: &str = "lua";

/// One registration call site turned into a persistable action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedAction {
    pub identifier: String,
    pub record: ActionRecord,
    /// Raw text of every argument at the call site, kept for diagnostics
    pub arguments: Vec<String>,
    /// `file:line` of the call site
    pub location: String,
}

/// Result of scanning a single source unit
#[derive(Debug, Default)]
pub struct SourceExtraction {
    pub actions: Vec<ExtractedAction>,
    pub errors: Vec<ExtractionError>,
}

/// Result of scanning a whole scripts tree
#[derive(Debug, Default)]
pub struct ExtractionReport {
    /// Extracted actions keyed by identifier
    pub actions: BTreeMap<String, ExtractedAction>,
    /// Everything that was reported and skipped
    pub errors: Vec<ExtractionError>,
    pub files_scanned: usize,
}

impl ExtractionReport {
    /// First whole-file failure, if any (unreadable or unparsable script)
    pub fn file_failure(&self) -> Option<&ExtractionError> {
        self.errors
            .iter()
            .find(|e| matches!(e, ExtractionError::Parse { .. } | ExtractionError::Io { .. }))
    }
}

/// Static-analysis pass over job scripts
#[derive(Debug, Clone)]
pub struct ActionExtractor {
    call_name: String,
}

impl Default for ActionExtractor {
    fn default() -> Self {
        Self::new(REGISTRATION_CALL)
    }
}

fn import_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"^\s*(local\s+[A-Za-z_]\w*(\s*,\s*[A-Za-z_]\w*)*\s*=\s*)?require\s*[("'\[]"#)
            .unwrap_or_else(|e| unreachable!("import pattern is a valid regex: {e}"))
    })
}

fn is_block_open(token: &Token, source: &str) -> bool {
    match token.kind {
        TokenKind::Symbol => matches!(token.text(source), "(" | "{" | "["),
        TokenKind::Name => matches!(token.text(source), "function" | "do" | "if" | "repeat"),
        _ => false,
    }
}

fn is_block_close(token: &Token, source: &str) -> bool {
    match token.kind {
        TokenKind::Symbol => matches!(token.text(source), ")" | "}" | "]"),
        TokenKind::Name => matches!(token.text(source), "end" | "until"),
        _ => false,
    }
}

/// Dotted namespace of a script relative to the scanned root (`accounts/init.lua` -> `accounts`)
pub fn namespace_for(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut parts: Vec<String> = relative
        .with_extension("")
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.len() > 1 && parts.last().map(String::as_str) == Some("init") {
        parts.pop();
    }
    parts.join(".")
}

fn lua_quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

impl ActionExtractor {
    pub fn new(call_name: impl Into<String>) -> Self {
        Self {
            call_name: call_name.into(),
        }
    }

    /// Extract every registration call site from one script
    ///
    /// `file` labels diagnostics; `namespace` becomes the `_NAMESPACE` declaration
    /// in each record's prelude.
    pub fn extract_source(&self, file: &str, namespace: &str, source: &str) -> SourceExtraction {
        let mut result = SourceExtraction::default();
        let tokens = match tokenize(source) {
            Ok(tokens) => tokens,
            Err(e) => {
                result.errors.push(ExtractionError::Parse {
                    file: file.to_string(),
                    line: e.line,
                    message: e.message,
                });
                return result;
            }
        };

        let imports = self.import_directives(source, &tokens);
        let namespace_line = format!("local _NAMESPACE = {}", lua_quote(namespace));

        for (index, token) in tokens.iter().enumerate() {
            if !token.is_name(source, &self.call_name)
                || !tokens.get(index + 1).is_some_and(|t| t.is_symbol(source, "("))
            {
                continue;
            }

            // walk back over `a.b:` receivers to find where the call expression starts
            let mut callee = index;
            while callee >= 2
                && (tokens[callee - 1].is_symbol(source, ".") || tokens[callee - 1].is_symbol(source, ":"))
                && tokens[callee - 2].kind == TokenKind::Name
            {
                callee -= 2;
            }
            if callee > 0 && tokens[callee - 1].is_name(source, "function") {
                continue;
            }

            let arguments = match split_arguments(source, &tokens, index + 2) {
                Ok(arguments) => arguments,
                Err(message) => {
                    result.errors.push(ExtractionError::Parse {
                        file: file.to_string(),
                        line: token.line,
                        message,
                    });
                    // the rest of the file cannot be trusted past an unbalanced call
                    return result;
                }
            };

            match self.build_action(file, token.line, source, &tokens, &arguments) {
                Ok((identifier, callable)) => {
                    let start = tokens[callee].start;
                    let mut prelude: Vec<&str> = imports
                        .iter()
                        .filter(|(offset, _)| *offset < start)
                        .map(|(_, line)| *line)
                        .collect();
                    prelude.push(&namespace_line);

                    result.actions.push(ExtractedAction {
                        identifier,
                        record: ActionRecord::new(
                            prelude.join("\n"),
                            format!("{}({})", EXECUTION_ENTRY, callable),
                        ),
                        arguments: arguments
                            .iter()
                            .map(|range| argument_text(source, &tokens, range).to_string())
                            .collect(),
                        location: format!("{}:{}", file, token.line),
                    });
                }
                Err(e) => result.errors.push(e),
            }
        }

        result
    }

    /// Scan every `.lua` file under `root`, in path order
    pub fn extract_dir(&self, root: &Path) -> ExtractionReport {
        let mut report = ExtractionReport::default();

        let entries = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    report.errors.push(ExtractionError::Io {
                        file: root.display().to_string(),
                        message: e.to_string(),
                    });
                    None
                }
            })
            .filter(|entry| {
                entry.file_type().is_file()
                    && entry.path().extension().and_then(|x| x.to_str()) == Some(SCRIPT_EXTENSION)
            })
            .collect::<Vec<_>>();

        for entry in entries {
            let path = entry.path();
            let file = path.strip_prefix(root).unwrap_or(path).display().to_string();
            report.files_scanned += 1;

            let source = match std::fs::read_to_string(path) {
                Ok(source) => source,
                Err(e) => {
                    report.errors.push(ExtractionError::Io {
                        file,
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            let extraction = self.extract_source(&file, &namespace_for(root, path), &source);
            report.errors.extend(extraction.errors);
            for action in extraction.actions {
                if let Some(first) = report.actions.get(&action.identifier) {
                    let (file, line) = action
                        .location
                        .rsplit_once(':')
                        .map(|(f, l)| (f.to_string(), l.parse().unwrap_or(0)))
                        .unwrap_or_else(|| (action.location.clone(), 0));
                    report.errors.push(ExtractionError::DuplicateIdentifier {
                        file,
                        line,
                        identifier: action.identifier.clone(),
                        first: first.location.clone(),
                    });
                    continue;
                }
                report.actions.insert(action.identifier.clone(), action);
            }
        }

        tracing::info!(
            "📜 Extracted {} actions from {} scripts ({} problems reported)",
            report.actions.len(),
            report.files_scanned,
            report.errors.len()
        );
        report
    }

    /// Top-level require directives, as (byte offset of the line, line text)
    fn import_directives<'a>(&self, source: &'a str, tokens: &[Token]) -> Vec<(usize, &'a str)> {
        // depth of the first token on every line
        let mut line_depth: BTreeMap<usize, usize> = BTreeMap::new();
        let mut depth = 0usize;
        for token in tokens {
            line_depth.entry(token.line).or_insert(depth);
            if is_block_open(token, source) {
                depth += 1;
            } else if is_block_close(token, source) {
                depth = depth.saturating_sub(1);
            }
        }

        let mut offset = 0;
        let mut directives = Vec::new();
        for (number, line) in source.split_inclusive('\n').enumerate() {
            let at_top = line_depth.get(&(number + 1)).copied() == Some(0);
            if at_top && import_pattern().is_match(line) {
                directives.push((offset, line.trim_end()));
            }
            offset += line.len();
        }
        directives
    }

    fn build_action(
        &self,
        file: &str,
        line: usize,
        source: &str,
        tokens: &[Token],
        arguments: &[std::ops::Range<usize>],
    ) -> Result<(String, String), ExtractionError> {
        let (Some(callable), Some(identifier)) = (arguments.first(), arguments.get(1)) else {
            return Err(ExtractionError::MissingIdentifier {
                file: file.to_string(),
                line,
            });
        };

        let literal = match &tokens[identifier.clone()] {
            [Token {
                kind: TokenKind::Str(value),
                ..
            }] => value.clone(),
            _ => {
                return Err(ExtractionError::NonLiteralIdentifier {
                    file: file.to_string(),
                    line,
                    found: argument_text(source, tokens, identifier).to_string(),
                })
            }
        };

        Ok((literal, argument_text(source, tokens, callable).to_string()))
    }
}

/// Token ranges of each argument of the call whose first argument token is at `first`
fn split_arguments(source: &str, tokens: &[Token], first: usize) -> Result<Vec<std::ops::Range<usize>>, String> {
    let mut arguments = Vec::new();
    let mut nesting = 0usize;
    let mut start = first;

    for (index, token) in tokens.iter().enumerate().skip(first) {
        if is_block_open(token, source) {
            nesting += 1;
        } else if is_block_close(token, source) {
            if nesting == 0 {
                if !token.is_symbol(source, ")") {
                    return Err(format!("unexpected `{}` inside registration call", token.text(source)));
                }
                if index > start || !arguments.is_empty() {
                    arguments.push(start..index);
                }
                return Ok(arguments);
            }
            nesting -= 1;
        } else if nesting == 0 && token.is_symbol(source, ",") {
            arguments.push(start..index);
            start = index + 1;
        }
    }

    Err("unterminated registration call".to_string())
}

fn argument_text<'a>(source: &'a str, tokens: &[Token], range: &std::ops::Range<usize>) -> &'a str {
    if range.is_empty() {
        return "";
    }
    &source[tokens[range.start].start..tokens[range.end - 1].end]
}
