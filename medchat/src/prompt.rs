//! Prompt composition for the generation API.
//!
//! Retrieval results are included as-is, advisory snippets included; the
//! bridge guarantees their shape so nothing here special-cases failures.

use std::fmt::Write;

use crate::llm::ChatMessage;
use crate::models::{ReadinessStatus, RetrievalResult};

const MAX_REPORT_QUERY_CHARS: usize = 1_000;

const SYSTEM_PROMPT: &str = "You are a careful medical information assistant.\n\
     Explain findings in plain language and reference the provided medical knowledge when it is relevant.\n\
     If the knowledge base snippets do not cover the question, say so and answer from general medical knowledge.\n\
     Never give a definitive diagnosis and always recommend consulting a qualified healthcare professional.";

/// Text sent to the retrieval backend: the question plus the start of the report.
pub fn retrieval_query(report: Option<&str>, question: &str) -> String {
    let question = question.trim();
    match report.map(str::trim).filter(|r| !r.is_empty()) {
        Some(report) => {
            let excerpt: String = report.chars().take(MAX_REPORT_QUERY_CHARS).collect();
            format!("{question}\n{excerpt}")
        }
        None => question.to_string(),
    }
}

pub fn compose(
    status: &ReadinessStatus,
    knowledge: Option<&RetrievalResult>,
    report: Option<&str>,
    question: &str,
) -> Vec<ChatMessage> {
    let mut body = String::new();

    let _ = writeln!(body, "Knowledge base status: {}", status.message);
    body.push('\n');

    match knowledge {
        Some(result) if !result.is_empty() => {
            body.push_str("Relevant medical knowledge:\n");
            for (i, snippet) in result.snippets.iter().enumerate() {
                let _ = writeln!(body, "{}. {}", i + 1, snippet.trim());
            }
        }
        _ => body.push_str("No specialised medical knowledge was retrieved for this question.\n"),
    }

    if let Some(report) = report.map(str::trim).filter(|r| !r.is_empty()) {
        let _ = write!(body, "\nPatient report:\n{report}\n");
    }

    let _ = write!(body, "\nQuestion: {}", question.trim());

    vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(body)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RetrievalOutcome;

    fn ready() -> ReadinessStatus {
        ReadinessStatus {
            ready: true,
            message: "Medical knowledge base ready with 10 documents".into(),
            details: None,
        }
    }

    #[test]
    fn retrieval_query_without_report_is_the_question() {
        assert_eq!(retrieval_query(None, "  What is HbA1c? "), "What is HbA1c?");
        assert_eq!(retrieval_query(Some("   "), "q"), "q");
    }

    #[test]
    fn retrieval_query_truncates_long_reports() {
        let report = "é".repeat(5_000);
        let query = retrieval_query(Some(&report), "Explain");
        assert!(query.starts_with("Explain\n"));
        assert_eq!(query.chars().count(), "Explain\n".len() + MAX_REPORT_QUERY_CHARS);
    }

    #[test]
    fn compose_numbers_snippets_in_order() {
        let result = RetrievalResult::retrieved(vec!["first".into(), "second".into()]);
        let messages = compose(&ready(), Some(&result), None, "Why?");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        let body = &messages[1].content;
        let first = body.find("1. first").unwrap();
        let second = body.find("2. second").unwrap();
        assert!(first < second);
        assert!(body.ends_with("Question: Why?"));
        assert!(!body.contains("Patient report"));
    }

    #[test]
    fn compose_includes_advisory_snippets_like_any_other() {
        let result = RetrievalResult::advisory(RetrievalOutcome::ExitFailure, &["down", "retry"]);
        let body = compose(&ready(), Some(&result), None, "q").remove(1).content;
        assert!(body.contains("1. down"));
        assert!(body.contains("2. retry"));
    }

    #[test]
    fn compose_without_knowledge_says_so() {
        let status = ReadinessStatus::not_ready("not ready", serde_json::json!({}));
        let body = compose(&status, None, Some("WBC 14.2"), "Is this high?")
            .remove(1)
            .content;
        assert!(body.contains("Knowledge base status: not ready"));
        assert!(body.contains("No specialised medical knowledge"));
        assert!(body.contains("Patient report:\nWBC 14.2"));
    }
}
