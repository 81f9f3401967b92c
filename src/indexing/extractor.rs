//! External symbol extractor subprocess.
//!
//! The extractor is a separate CLI that, given a file path, prints one UTF-8
//! JSON document `{symbols: [...], identifiers: [...], relationships: [...]}`
//! on stdout. When no extractor is configured, extraction degrades to empty
//! output so lexical indexing keeps working.

use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use crate::config::ExtractorConfig;
use crate::error::{EngineError, EngineResult};
use crate::types::{Identifier, Symbol, SymbolRelation};

/// Confidence assigned to an identifier occurrence that sits inside a string
/// literal on its context line.
const STRING_LITERAL_CONFIDENCE: f32 = 0.5;

#[derive(Debug, Default, Deserialize)]
pub struct ExtractorOutput {
    #[serde(default)]
    pub symbols: Vec<Symbol>,
    #[serde(default)]
    pub identifiers: Vec<Identifier>,
    #[serde(default)]
    pub relationships: Vec<SymbolRelation>,
}

/// Spawns the configured extractor CLI per file.
#[derive(Debug, Clone)]
pub struct SymbolExtractor {
    command: Option<Vec<String>>,
}

impl SymbolExtractor {
    pub fn new(config: &ExtractorConfig) -> Self {
        Self {
            command: config.command.clone(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.command.as_ref().is_some_and(|c| !c.is_empty())
    }

    /// Run the extractor for one file and parse its output. Identifier
    /// confidences are adjusted for string-literal occurrences before
    /// returning.
    pub async fn extract(&self, file_path: &Path) -> EngineResult<ExtractorOutput> {
        let Some(command) = self.command.as_ref().filter(|c| !c.is_empty()) else {
            return Err(EngineError::DependencyUnavailable {
                dependency: "symbol extractor".into(),
                reason: "extractor.command is not configured".into(),
            });
        };

        let mut child = tokio::process::Command::new(&command[0])
            .args(&command[1..])
            .arg(file_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| EngineError::DependencyUnavailable {
                dependency: "symbol extractor".into(),
                reason: format!("failed to spawn '{}': {e}", command[0]),
            })?;

        let mut stdout = String::new();
        if let Some(mut pipe) = child.stdout.take() {
            pipe.read_to_string(&mut stdout).await?;
        }
        let status = child.wait().await?;
        if !status.success() {
            return Err(EngineError::DependencyUnavailable {
                dependency: "symbol extractor".into(),
                reason: format!("extractor exited with {status} for {}", file_path.display()),
            });
        }

        let mut output: ExtractorOutput =
            serde_json::from_str(&stdout).map_err(|e| EngineError::DependencyUnavailable {
                dependency: "symbol extractor".into(),
                reason: format!("unparseable extractor output: {e}"),
            })?;

        adjust_confidence(&mut output.identifiers);
        debug!(
            "extracted {} symbols / {} identifiers from {}",
            output.symbols.len(),
            output.identifiers.len(),
            file_path.display()
        );
        Ok(output)
    }

    /// Like [`extract`], but degrades to empty output when the extractor is
    /// missing, logging once per call site via `warn`.
    pub async fn extract_or_empty(&self, file_path: &Path) -> ExtractorOutput {
        match self.extract(file_path).await {
            Ok(output) => output,
            Err(EngineError::DependencyUnavailable { reason, .. }) => {
                warn!("symbol extraction skipped for {}: {reason}", file_path.display());
                ExtractorOutput::default()
            }
            Err(e) => {
                warn!("symbol extraction failed for {}: {e}", file_path.display());
                ExtractorOutput::default()
            }
        }
    }
}

/// Lower confidence for occurrences that the context line places inside a
/// string literal. An occurrence is "inside" when an odd number of unescaped
/// double quotes precede its column.
pub fn adjust_confidence(identifiers: &mut [Identifier]) {
    for ident in identifiers {
        let Some(context) = ident.code_context.as_deref() else {
            continue;
        };
        let col = ident.start_col as usize;
        if in_string_literal(context, col) {
            ident.confidence = ident.confidence.min(STRING_LITERAL_CONFIDENCE);
        }
    }
}

fn in_string_literal(line: &str, col: usize) -> bool {
    let mut quotes = 0usize;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if i >= col {
            break;
        }
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' => quotes += 1,
            _ => {}
        }
    }
    quotes % 2 == 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IdentifierKind;

    fn ident(context: &str, col: u32) -> Identifier {
        Identifier {
            id: "i1".into(),
            name: "target".into(),
            kind: IdentifierKind::Call,
            language: "rust".into(),
            file_path: "a.rs".into(),
            start_line: 1,
            start_col: col,
            end_line: 1,
            end_col: col + 6,
            code_context: Some(context.into()),
            containing_symbol_id: None,
            target_symbol_id: None,
            confidence: 1.0,
        }
    }

    #[test]
    fn literal_occurrences_lose_confidence() {
        let mut ids = vec![ident(r#"log("call target here");"#, 10)];
        adjust_confidence(&mut ids);
        assert_eq!(ids[0].confidence, STRING_LITERAL_CONFIDENCE);
    }

    #[test]
    fn code_occurrences_keep_confidence() {
        let mut ids = vec![ident("let x = target();", 8)];
        adjust_confidence(&mut ids);
        assert_eq!(ids[0].confidence, 1.0);
    }

    #[test]
    fn escaped_quotes_do_not_flip_parity() {
        // The \" inside the literal must not close it.
        assert!(in_string_literal(r#"msg("escaped \" quote target")"#, 22));
        assert!(!in_string_literal(r#"done("x"); target()"#, 11));
    }

    #[tokio::test]
    async fn missing_extractor_is_unavailable() {
        let extractor = SymbolExtractor::new(&ExtractorConfig { command: None });
        assert!(!extractor.is_available());
        let err = extractor.extract(Path::new("x.rs")).await.unwrap_err();
        assert!(matches!(err, EngineError::DependencyUnavailable { .. }));
        // The degrading variant returns empty output instead.
        let out = extractor.extract_or_empty(Path::new("x.rs")).await;
        assert!(out.symbols.is_empty());
    }

    #[tokio::test]
    async fn parses_extractor_json() {
        // Use a shell echo as a stand-in extractor.
        let payload = serde_json::json!({
            "symbols": [{
                "id": "s1", "name": "foo", "kind": "function", "language": "rust",
                "file_path": "a.rs", "start_line": 1, "start_col": 0,
                "end_line": 2, "end_col": 1
            }],
            "identifiers": [],
            "relationships": []
        })
        .to_string();
        // The trailing file-path argument lands in $0 and is ignored.
        let extractor = SymbolExtractor::new(&ExtractorConfig {
            command: Some(vec!["sh".into(), "-c".into(), format!("echo '{payload}'")]),
        });
        let out = extractor.extract(Path::new("a.rs")).await.unwrap();
        assert_eq!(out.symbols.len(), 1);
        assert_eq!(out.symbols[0].name, "foo");
    }
}
