//! CSV rendering and roster parsing. Output is UTF-8 with a BOM so
//! spreadsheet tools pick up the Korean headers.

use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::HttpResponse;

use crate::db::User;
use crate::reflection::ClassReflection;

const BOM: char = '\u{feff}';
const DEFAULT_STUDENT_NAME: &str = "이름없음";

pub const REFLECTION_HEADER: &str =
    "학번,이름,날짜,수업태도,학습내용,학습활동,협동성찰,AI감정,AI피드백,교사피드백";
pub const ROSTER_HEADER: &str = "studentNumber,name,isActive";

/// One (studentNumber, name) pair read from an upload or a pasted list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterLine {
    pub student_number: String,
    pub name: String,
}

/// Always quotes, doubling embedded quotes.
pub fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

pub fn reflections_csv(rows: &[ClassReflection]) -> String {
    let mut out = String::new();
    out.push(BOM);
    out.push_str(REFLECTION_HEADER);
    out.push('\n');

    for row in rows {
        let r = &row.reflection;
        let sentiment = r
            .sentiment
            .and_then(|s| serde_json::to_value(s).ok())
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "N/A".to_string());
        let fields = [
            quote(&row.student_number),
            quote(&row.student_name),
            r.date.to_string(),
            r.attitude_rating.to_string(),
            quote(&r.learned_content),
            quote(&r.activities),
            quote(&r.collaboration),
            sentiment,
            quote(r.ai_feedback.as_deref().unwrap_or("")),
            quote(r.teacher_feedback.as_deref().unwrap_or("")),
        ];
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

pub fn roster_csv(students: &[User]) -> String {
    let mut out = String::new();
    out.push(BOM);
    out.push_str(ROSTER_HEADER);
    out.push('\n');
    for student in students {
        out.push_str(&format!(
            "{},{},{}\n",
            quote(student.student_number.as_deref().unwrap_or("")),
            quote(&student.name),
            student.is_active
        ));
    }
    out
}

/// Splits one CSV record. Commas inside quotes are kept and `""` becomes `"`.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    fields.push(current);
    fields
}

fn roster_line(number: Option<&str>, name: Option<&str>) -> Option<RosterLine> {
    let student_number = number?.trim().to_string();
    if student_number.is_empty() {
        return None;
    }
    let name = name.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string);
    Some(RosterLine {
        student_number,
        name: name.unwrap_or_else(|| DEFAULT_STUDENT_NAME.to_string()),
    })
}

/// Parses an uploaded roster. The first non-blank line is a header and is
/// skipped; rows without a student number are dropped.
pub fn parse_roster_csv(text: &str) -> Vec<RosterLine> {
    text.trim_start_matches(BOM)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .skip(1)
        .filter_map(|line| {
            let fields = split_csv_line(line);
            roster_line(fields.first().map(String::as_str), fields.get(1).map(String::as_str))
        })
        .collect()
}

/// Parses pasted "10301 홍길동" lines. Everything after the number is the name.
pub fn parse_roster_lines(text: &str) -> Vec<RosterLine> {
    text.lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let number = parts.next();
            let name = parts.collect::<Vec<_>>().join(" ");
            roster_line(number, Some(&name))
        })
        .collect()
}

pub fn csv_response(filename: &str, body: String) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(filename.to_string())],
        })
        .body(body)
}
