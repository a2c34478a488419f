//! Excerpt analyzer implementation.

use std::fmt::Write as _;

use assay_agent::{AgentError, AgentResult, AnalysisOutput, AnalysisRequest, Analyzer};
use async_trait::async_trait;
use tracing::{debug, instrument};

/// Minimum length of a printable run to count as text.
const MIN_RUN: usize = 4;

/// Words shorter than this are ignored when matching the query.
const MIN_KEYWORD: usize = 3;

/// Local analyzer producing a keyword digest and an excerpt.
#[derive(Debug, Clone)]
pub struct ExcerptAnalyzer {
    excerpt_chars: usize,
    max_matches: usize,
}

impl ExcerptAnalyzer {
    /// Create an analyzer with default limits.
    pub fn new() -> Self {
        Self {
            excerpt_chars: 600,
            max_matches: 12,
        }
    }

    /// Limit the excerpt to `chars` characters.
    pub fn with_excerpt_chars(mut self, chars: usize) -> Self {
        self.excerpt_chars = chars;
        self
    }

    /// Limit the number of matching lines reported.
    pub fn with_max_matches(mut self, max: usize) -> Self {
        self.max_matches = max;
        self
    }

    fn render(&self, query: &str, text: &str, size: usize) -> String {
        let keywords: Vec<String> = query
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() >= MIN_KEYWORD)
            .map(str::to_lowercase)
            .collect();

        let matches: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|line| {
                let lower = line.to_lowercase();
                keywords.iter().any(|k| lower.contains(k.as_str()))
            })
            .take(self.max_matches)
            .collect();

        let mut out = String::new();
        let _ = writeln!(out, "Query: {query}");
        let _ = writeln!(
            out,
            "Document: {size} bytes, {} words of readable text",
            text.split_whitespace().count()
        );

        if matches.is_empty() {
            let _ = writeln!(out, "\nNo lines mention the query terms.");
        } else {
            let _ = writeln!(out, "\nRelevant lines:");
            for line in &matches {
                let _ = writeln!(out, "- {line}");
            }
        }

        let excerpt: String = text.chars().take(self.excerpt_chars).collect();
        if !excerpt.trim().is_empty() {
            let _ = writeln!(out, "\nExcerpt:\n{}", excerpt.trim_end());
        }

        out
    }
}

impl Default for ExcerptAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Analyzer for ExcerptAnalyzer {
    fn name(&self) -> &str {
        "local-excerpt"
    }

    #[instrument(skip(self, request), fields(path = %request.file_path.display()))]
    async fn analyze(&self, request: &AnalysisRequest) -> AgentResult<AnalysisOutput> {
        let bytes = tokio::fs::read(&request.file_path)
            .await
            .map_err(|source| AgentError::FileUnreadable {
                path: request.file_path.clone(),
                source,
            })?;

        let text = extract_text(&bytes);
        if text.trim().is_empty() {
            return Err(AgentError::InvalidInput(format!(
                "no readable text in {}",
                request.file_path.display()
            )));
        }
        debug!("Extracted {} chars from {} bytes", text.len(), bytes.len());

        Ok(AnalysisOutput::new(self.render(
            &request.query,
            &text,
            bytes.len(),
        )))
    }
}

/// Pull printable runs out of arbitrary bytes, one run per line.
///
/// Valid UTF-8 documents come back mostly unchanged; binary formats such as
/// PDF yield their embedded plain-text fragments.
pub fn extract_text(bytes: &[u8]) -> String {
    let decoded = String::from_utf8_lossy(bytes);
    let mut out = String::new();
    let mut run = String::new();

    for ch in decoded.chars() {
        if ch == '\n' || ch == '\r' {
            flush_run(&mut run, &mut out);
        } else if ch == '\u{FFFD}' || (ch.is_control() && ch != '\t') {
            flush_run(&mut run, &mut out);
        } else {
            run.push(ch);
        }
    }
    flush_run(&mut run, &mut out);
    out
}

fn flush_run(run: &mut String, out: &mut String) {
    let trimmed = run.trim();
    if trimmed.chars().count() >= MIN_RUN {
        out.push_str(trimmed);
        out.push('\n');
    }
    run.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_extract_text_skips_binary_noise() {
        let bytes = b"%PDF-1.4\x00\x01\x02Hemoglobin 13.5 g/dL\n\xff\xfeab\nLDL 160 mg/dL";
        let text = extract_text(bytes);
        assert!(text.contains("Hemoglobin 13.5 g/dL"));
        assert!(text.contains("LDL 160 mg/dL"));
        assert!(!text.contains("ab\n"));
    }

    #[tokio::test]
    async fn test_analyze_reports_matching_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Patient: Jane Doe").unwrap();
        writeln!(file, "Cholesterol total 240 mg/dL (high)").unwrap();
        writeln!(file, "Glucose 92 mg/dL").unwrap();

        let analyzer = ExcerptAnalyzer::new();
        let out = analyzer
            .analyze(&AnalysisRequest::new("Is my cholesterol ok?", file.path()))
            .await
            .unwrap();

        assert!(out.text.contains("Query: Is my cholesterol ok?"));
        assert!(out.text.contains("- Cholesterol total 240 mg/dL (high)"));
        assert!(!out.text.contains("- Glucose"));
    }

    #[tokio::test]
    async fn test_analyze_missing_file() {
        let analyzer = ExcerptAnalyzer::new();
        let err = analyzer
            .analyze(&AnalysisRequest::new("q", "/nonexistent/report.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::FileUnreadable { .. }));
    }

    #[tokio::test]
    async fn test_analyze_rejects_unreadable_content() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0u8, 1, 2, 3, 0xff, 0xfe]).unwrap();

        let err = ExcerptAnalyzer::new()
            .analyze(&AnalysisRequest::new("q", file.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidInput(_)));
    }
}
