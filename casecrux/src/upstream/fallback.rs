//! Demo payloads returned when the ML service is unavailable outside production.
//!
//! Every payload carries `demo_mode: true` and a `message` so clients and
//! operators can tell it apart from a real summary.

use serde_json::{json, Value};

use super::error::UpstreamFailure;
use crate::cache::middleware::UploadedFile;

const SUGGESTED_ACTION: &str = "Check ML service GROQ API keys configuration";

/// Diagnostic block attached to every fallback payload
pub fn demo_info(failure: &UpstreamFailure, ml_service_url: &str) -> Value {
    json!({
        "reason": "ML service returned error",
        "error_type": failure.kind.as_str(),
        "ml_service_url": ml_service_url,
        "target_url": failure.url,
        "ml_service_status": failure.status,
        "error_message": failure.detail_text(),
        "duration_ms": failure.duration_ms(),
        "suggested_action": SUGGESTED_ACTION,
    })
}

/// Stand-in for `/summarize_from_urls`
pub fn url_summary(failure: &UpstreamFailure, ml_service_url: &str, urls: &[String]) -> Value {
    let status = failure
        .status
        .map(|s| s.to_string())
        .unwrap_or_else(|| "Connection Failed".to_string());
    let requested = if urls.is_empty() {
        "None provided".to_string()
    } else {
        urls.join(", ")
    };

    let raw = format!(
        "[DEMO MODE - ML Service Issue]\n\n\
         The ML service at {} encountered an issue (Status: {}).\n\n\
         This demonstration shows the expected response format for legal document analysis. \
         With a properly configured ML service, this would contain actual AI-generated summaries.\n\n\
         URLs requested: {}\n\n\
         Error details: {}",
        ml_service_url,
        status,
        requested,
        failure.detail_text()
    );

    json!({
        "overall_summary": {
            "pros": [
                "Legal precedent established in favor of the case",
                "Strong evidence supporting the main arguments",
                "Clear documentation and witness testimonies",
                "Comprehensive case analysis provided"
            ],
            "cons": [
                "Some procedural issues noted during the proceedings",
                "Limited jurisdiction scope may affect broader application",
                "Potential for appeal based on technical grounds",
                "Additional expert review may be beneficial"
            ],
            "final_judgment": "Based on the analysis of the provided documents, the case presents a \
                solid legal foundation with well-documented evidence. The pros outweigh the cons, \
                indicating a favorable outcome. Attention should be paid to the procedural aspects \
                to prevent potential appeals.",
            "raw": raw,
            "demo_mode": true,
            "service_status": "fallback"
        },
        "demo_mode": true,
        "message": "Fallback response - ML service unavailable or misconfigured",
        "demo_info": demo_info(failure, ml_service_url),
    })
}

/// Stand-in for `/summarize` (single uploaded file)
pub fn file_summary(failure: &UpstreamFailure, ml_service_url: &str, file: &UploadedFile) -> Value {
    json!({
        "summary": {
            "executive_summary": format!(
                "This is an executive summary of {}. The document appears to be a legal case file \
                 containing procedural and substantive legal matters that require careful analysis.",
                file.filename
            ),
            "key_findings": [
                "Document contains significant legal precedents",
                "Evidence presented supports the primary arguments",
                "Procedural requirements have been adequately addressed",
                "Case demonstrates clear legal reasoning and analysis"
            ],
            "detailed_analysis": {
                "introduction": "This legal document presents a case analysis with multiple facets requiring careful consideration.",
                "main_arguments": "The primary arguments center around established legal precedents and statutory interpretations.",
                "evidence_review": "Supporting evidence includes documented testimonies, expert analyses, and relevant case law citations.",
                "conclusions": "The analysis concludes with recommendations for proceeding based on the strength of the presented evidence."
            },
            "abstractive_summary": "This document presents a legal case with strong evidentiary support. \
                The legal foundation is solid, with precedents favoring the position taken.",
            "extractive_summary": [
                "The court finds that the evidence presented is credible and substantial",
                "Legal precedent clearly supports the arguments made in this case",
                "Procedural requirements have been satisfied according to established guidelines"
            ],
            "metadata": {
                "filename": file.filename,
                "file_size": file.size(),
                "file_type": file.content_type,
            }
        },
        "demo_mode": true,
        "message": "Fallback response - ML service unavailable",
        "demo_info": demo_info(failure, ml_service_url),
    })
}

/// Stand-in for any other summarization endpoint
pub fn generic(failure: &UpstreamFailure, ml_service_url: &str, endpoint: &str) -> Value {
    json!({
        "summary": format!(
            "[DEMO MODE] The ML service endpoint '{}' is unavailable. \
             This placeholder shows where the generated analysis would appear.",
            endpoint
        ),
        "demo_mode": true,
        "message": "Fallback response - ML service unavailable",
        "demo_info": demo_info(failure, ml_service_url),
    })
}

fn section(name: &str, summary: &str, word_count: u32) -> Value {
    json!({
        "summary": summary,
        "section_type": name,
        "method": "abstractive",
        "word_count": word_count,
    })
}

/// Section-wise demo analysis, served when the ML service fails its health probe
pub fn section_summary() -> Value {
    json!({
        "success": true,
        "demo_mode": true,
        "message": "Fallback response - ML service unavailable",
        "summary": {
            "overall_summary": {
                "summary": "[DEMO MODE] This would be a comprehensive legal analysis. The system would analyze \
                    the document structure, identify key sections, and provide summaries for each part.",
                "method": "abstractive",
                "level": "detailed",
                "word_count": 45,
                "processing_info": {"demo_mode": true, "api_based": false}
            },
            "section_summaries": {
                "introduction": section("introduction", "[DEMO] Introduction section - Case background, parties involved, and initial circumstances would be analyzed here.", 18),
                "facts": section("facts", "[DEMO] Facts section - Key events, timeline, evidence, and relevant circumstances would be extracted and summarized.", 16),
                "legal_issues": section("legal_issues", "[DEMO] Legal issues section - Primary legal questions, areas of law, and specific standards would be identified.", 17),
                "analysis": section("analysis", "[DEMO] Analysis section - Court's reasoning, legal principles applied, precedents cited, and logical framework would be detailed.", 19),
                "holding": section("holding", "[DEMO] Holding section - Final court determination, legal ruling, and rationale would be summarized.", 15)
            },
            "sections_detected": ["introduction", "facts", "legal_issues", "analysis", "holding"],
            "processing_info": {
                "total_sections": 5,
                "method": "abstractive",
                "level": "detailed",
                "section_wise_analysis": true,
                "demo_mode": true
            }
        },
        "metadata": {
            "filename": "demo-document.pdf",
            "summary_type": "detailed",
            "method": "abstractive",
            "section_wise": true,
            "demo_mode": true
        }
    })
}
