//! Compliance exports
//!
//! Renders an [`AnalyticsSummary`] as a CSV leaderboard and as a small
//! paginated PDF report, and wraps both as base64 `data:` URLs for the admin
//! analytics response.
//!
//! The PDF uses the built-in Helvetica face with WinAnsi encoding, so Latin-1
//! names (accents, umlauts) render as written. The CSV carries full Unicode.

use crate::analytics::AnalyticsSummary;
use crate::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfLayerReference};
use serde::Serialize;

const CSV_HEADERS: [&str; 3] = ["Learner", "Completion", "Score"];

const REPORT_TITLE: &str = "Compliance Training Analytics";
const LAYER_NAME: &str = "Report";

// A4
const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const MARGIN_MM: f32 = 18.0;
const LINE_HEIGHT_MM: f32 = 6.0;
const LINES_PER_PAGE: usize = 44;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComplianceExports {
    pub csv: String,
    pub pdf: String,
}

pub fn compliance_exports(summary: &AnalyticsSummary) -> Result<ComplianceExports> {
    Ok(ComplianceExports {
        csv: data_url("text/csv", to_csv(summary).as_bytes()),
        pdf: data_url("application/pdf", &to_pdf(summary)?),
    })
}

pub fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

/// Leaderboard as RFC 4180 CSV (CRLF line endings)
pub fn to_csv(summary: &AnalyticsSummary) -> String {
    let mut lines = vec![CSV_HEADERS.join(",")];

    for entry in &summary.leaderboard {
        let fields = [
            csv_field(&entry.name),
            entry.completion.map(format_number).unwrap_or_default(),
            entry.score.map(format_number).unwrap_or_default(),
        ];
        lines.push(fields.join(","));
    }

    let mut csv = lines.join("\r\n");
    csv.push_str("\r\n");
    csv
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Whole numbers without a fraction, others to two decimals
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.2}", value)
    }
}

/// One line of report text
#[derive(Debug, Clone, PartialEq)]
struct ReportLine {
    size: f32,
    text: String,
}

impl ReportLine {
    fn heading(text: impl Into<String>) -> Self {
        Self { size: 14.0, text: text.into() }
    }

    fn body(text: impl Into<String>) -> Self {
        Self { size: 11.0, text: text.into() }
    }

    fn blank() -> Self {
        Self::body("")
    }
}

fn report_lines(summary: &AnalyticsSummary) -> Vec<ReportLine> {
    let mut lines = vec![
        ReportLine { size: 18.0, text: REPORT_TITLE.to_string() },
        ReportLine::blank(),
        ReportLine::body(format!("Total learners: {}", summary.total_learners)),
        ReportLine::body(format!("Average completion: {:.1}%", summary.average_completion)),
        ReportLine::body(format!("Average score: {:.1}%", summary.average_score)),
        ReportLine::body(format!("xAPI statements: {}", summary.total_statements)),
        ReportLine::blank(),
        ReportLine::heading("Leaderboard"),
    ];

    if summary.leaderboard.is_empty() {
        lines.push(ReportLine::body("No learners yet."));
    }
    for (index, entry) in summary.leaderboard.iter().enumerate() {
        let completion = entry
            .completion
            .map(|c| format!("{:.0}% completion", c))
            .unwrap_or_else(|| "not started".to_string());
        lines.push(ReportLine::body(format!("{}. {} - {}", index + 1, entry.name, completion)));
    }

    lines.push(ReportLine::blank());
    lines.push(ReportLine::heading("Course Breakdown"));

    if summary.course_breakdown.is_empty() {
        lines.push(ReportLine::body("No courses yet."));
    }
    for course in &summary.course_breakdown {
        let score = course
            .average_score
            .map(|s| format!("{:.1}%", s))
            .unwrap_or_else(|| "n/a".to_string());
        lines.push(ReportLine::body(
            course.title.clone().unwrap_or_else(|| format!("Untitled course ({})", course.course_id)),
        ));
        lines.push(ReportLine::body(format!(
            "Completion: {:.1}% | Avg Score: {} | Time: {:.1} min | Enrollments: {}",
            course.completion, score, course.time_spent_minutes, course.enrollments
        )));
    }

    lines
}

/// Paginated A4 report, one text layer per page
pub fn to_pdf(summary: &AnalyticsSummary) -> Result<Vec<u8>> {
    let lines = report_lines(summary);
    let pages: Vec<&[ReportLine]> = lines.chunks(LINES_PER_PAGE).collect();

    let (doc, first_page, first_layer) =
        PdfDocument::new(REPORT_TITLE, Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), LAYER_NAME);
    let font = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_error)?;

    for (index, page_lines) in pages.iter().enumerate() {
        let layer = if index == 0 {
            doc.get_page(first_page).get_layer(first_layer)
        } else {
            let (page, layer) = doc.add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), LAYER_NAME);
            doc.get_page(page).get_layer(layer)
        };
        write_page(&layer, &font, page_lines, index + 1, pages.len());
    }

    doc.save_to_bytes().map_err(pdf_error)
}

fn write_page(
    layer: &PdfLayerReference,
    font: &IndirectFontRef,
    lines: &[ReportLine],
    page: usize,
    page_count: usize,
) {
    let mut y = PAGE_HEIGHT_MM - MARGIN_MM;

    for line in lines {
        if !line.text.is_empty() {
            layer.use_text(line.text.as_str(), line.size, Mm(MARGIN_MM), Mm(y), font);
        }
        y -= LINE_HEIGHT_MM;
    }

    layer.use_text(
        format!("Page {} of {}", page, page_count),
        9.0,
        Mm(PAGE_WIDTH_MM - MARGIN_MM - 22.0),
        Mm(MARGIN_MM / 2.0),
        font,
    );
}

fn pdf_error(e: printpdf::Error) -> Error {
    Error::Internal(format!("PDF export failed: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::{CourseBreakdown, LeaderboardEntry};

    fn summary(learners: usize) -> AnalyticsSummary {
        AnalyticsSummary {
            total_learners: learners as i64,
            average_completion: 62.5,
            average_score: 80.0,
            total_statements: 12,
            leaderboard: (0..learners)
                .map(|i| LeaderboardEntry {
                    user_id: format!("u{}", i),
                    name: format!("Learner {}", i),
                    completion: Some(100.0 - i as f64),
                    score: if i % 2 == 0 { Some(80.0) } else { None },
                })
                .collect(),
            course_breakdown: vec![CourseBreakdown {
                course_id: "c1".to_string(),
                title: Some("Anti-Bribery (2024)".to_string()),
                completion: 62.5,
                average_score: Some(80.0),
                time_spent_minutes: 12.5,
                enrollments: 2,
            }],
        }
    }

    #[test]
    fn test_csv_header_and_rows() {
        let csv = to_csv(&summary(2));
        let lines: Vec<&str> = csv.split("\r\n").collect();
        assert_eq!(lines[0], "Learner,Completion,Score");
        assert_eq!(lines[1], "Learner 0,100,80");
        assert_eq!(lines[2], "Learner 1,99,");
    }

    #[test]
    fn test_csv_quotes_special_characters() {
        assert_eq!(csv_field("Doe, Jane"), "\"Doe, Jane\"");
        assert_eq!(csv_field("The \"Boss\""), "\"The \"\"Boss\"\"\"");
        assert_eq!(csv_field("plain"), "plain");
    }

    fn pdf_text(pdf: &[u8]) -> (usize, String) {
        let doc = lopdf::Document::load_mem(pdf).unwrap();
        let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
        (page_numbers.len(), doc.extract_text(&page_numbers).unwrap())
    }

    #[test]
    fn test_pdf_structure() {
        let pdf = to_pdf(&summary(3)).unwrap();
        assert!(pdf.starts_with(b"%PDF-"));

        let (pages, text) = pdf_text(&pdf);
        assert_eq!(pages, 1);
        assert!(text.contains("Compliance Training Analytics"));
        assert!(text.contains("Anti-Bribery (2024)"));
        assert!(text.contains("Page 1 of 1"));
    }

    #[test]
    fn test_pdf_paginates_long_reports() {
        let pdf = to_pdf(&summary(100)).unwrap();

        let (pages, text) = pdf_text(&pdf);
        assert_eq!(pages, 3);
        assert!(text.contains("Page 3 of 3"));
        assert!(text.contains("Learner 99"));
    }

    #[test]
    fn test_pdf_keeps_accented_names() {
        let mut report = summary(1);
        report.leaderboard[0].name = "Zoë Ångström".to_string();

        let (_, text) = pdf_text(&to_pdf(&report).unwrap());
        assert!(text.contains("Zoë Ångström"));
        assert!(!text.contains("Zo?"));
    }

    #[test]
    fn test_exports_are_data_urls() {
        let exports = compliance_exports(&summary(1)).unwrap();
        assert!(exports.csv.starts_with("data:text/csv;base64,"));
        assert!(exports.pdf.starts_with("data:application/pdf;base64,"));

        let encoded = exports.csv.trim_start_matches("data:text/csv;base64,");
        let decoded = STANDARD.decode(encoded).unwrap();
        assert!(String::from_utf8(decoded).unwrap().starts_with("Learner,Completion,Score"));
    }
}
