//! Class transcripts for a date range and the chat-model summary built from them.

use crate::config::AiConfig;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

const INSTRUCTION: &str = "You are an assistant helping a teacher.
Summarize the following class data into a clear report:
- Attendance trends (who was frequently absent/present)
- Key remarks/issues raised
- Activities or notes worth highlighting
- Provide an overall summary for the class teacher

Important rules:
- Use ONLY the data provided below.
- If no data is available for a section, explicitly say: \"No records available\".
- Do NOT invent or assume extra details.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptLine {
    pub date: String,
    pub name: String,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassRecords {
    pub attendance: Vec<TranscriptLine>,
    pub remarks: Vec<TranscriptLine>,
    pub notes: Vec<TranscriptLine>,
}

fn query_lines(
    conn: &Connection,
    sql: &str,
    class_section: &str,
    start: &str,
    end: &str,
) -> rusqlite::Result<Vec<TranscriptLine>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map((class_section, start, end), |r| {
        Ok(TranscriptLine {
            date: r.get(0)?,
            name: r.get(1)?,
            text: r.get(2)?,
        })
    })?;
    rows.collect()
}

/// Rows for students whose class label equals `class_section` exactly,
/// dated within `[start, end]`.
pub fn fetch_class_records(
    conn: &Connection,
    class_section: &str,
    start: &str,
    end: &str,
) -> rusqlite::Result<ClassRecords> {
    let attendance = query_lines(
        conn,
        "SELECT a.date, COALESCE(s.name, ''), a.status
         FROM attendance a
         JOIN students s ON a.student_id = s.id
         WHERE s.class_section = ?1 AND a.date BETWEEN ?2 AND ?3
         ORDER BY a.date, a.id",
        class_section,
        start,
        end,
    )?;
    let remarks = query_lines(
        conn,
        "SELECT r.date, COALESCE(s.name, ''), r.remark
         FROM student_remarks r
         JOIN students s ON r.student_id = s.id
         WHERE s.class_section = ?1 AND r.date BETWEEN ?2 AND ?3
         ORDER BY r.date, r.id",
        class_section,
        start,
        end,
    )?;
    let notes = query_lines(
        conn,
        "SELECT act.date, COALESCE(s.name, ''), act.note
         FROM activities act
         JOIN students s ON act.student_id = s.id
         WHERE s.class_section = ?1 AND act.date BETWEEN ?2 AND ?3
         ORDER BY act.date, act.id",
        class_section,
        start,
        end,
    )?;
    Ok(ClassRecords {
        attendance,
        remarks,
        notes,
    })
}

pub fn build_transcript(class_section: &str, start: &str, end: &str, records: &ClassRecords) -> String {
    let mut out = format!("Class {class_section} summary from {start} to {end}.\n\n");
    let sections = [
        ("Attendance Records:", &records.attendance),
        ("Remarks:", &records.remarks),
        ("Activities/Notes:", &records.notes),
    ];
    let mut first = true;
    for (title, lines) in sections {
        if lines.is_empty() {
            continue;
        }
        if !first {
            out.push('\n');
        }
        first = false;
        out.push_str(title);
        out.push('\n');
        for l in lines {
            out.push_str(&format!("{}: {} - {}\n", l.date, l.name, l.text));
        }
    }
    out
}

pub fn build_prompt(transcript: &str) -> String {
    format!("{INSTRUCTION}\n\nData:\n{transcript}")
}

#[derive(Debug, thiserror::Error)]
pub enum InsightsError {
    #[error("AI summaries are disabled")]
    Disabled,
    #[error("chat request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("chat service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("chat response had no message text")]
    EmptyResponse,
}

/// Anything that can turn a prompt into display text.
pub trait Summarizer {
    fn summarize(&self, prompt: &str) -> Result<String, InsightsError>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    message: Option<ChatReplyMessage>,
}

/// Blocking client for an Ollama-style `/api/chat` endpoint.
pub struct ChatClient {
    cfg: AiConfig,
}

impl ChatClient {
    pub fn new(cfg: AiConfig) -> Self {
        Self { cfg }
    }
}

impl Summarizer for ChatClient {
    fn summarize(&self, prompt: &str) -> Result<String, InsightsError> {
        if !self.cfg.enabled {
            return Err(InsightsError::Disabled);
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(self.cfg.timeout)
            .build()?;
        let body = ChatRequest {
            model: &self.cfg.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: false,
        };
        let url = format!("{}/api/chat", self.cfg.base_url);
        tracing::debug!(%url, model = %self.cfg.model, "requesting class summary");
        let resp = client.post(&url).json(&body).send()?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(InsightsError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let reply: ChatReply = resp.json()?;
        reply
            .message
            .and_then(|m| m.content)
            .ok_or(InsightsError::EmptyResponse)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightOutcome {
    pub transcript: String,
    pub summary: Option<String>,
    pub source: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Asks `model` for a summary; on failure the transcript stands in for it.
pub fn summarize_or_fallback(model: &dyn Summarizer, transcript: String) -> InsightOutcome {
    match model.summarize(&build_prompt(&transcript)) {
        Ok(summary) => InsightOutcome {
            transcript,
            summary: Some(summary),
            source: "model",
            error: None,
        },
        Err(e) => {
            tracing::warn!(error = %e, "AI summary unavailable, returning raw transcript");
            InsightOutcome {
                transcript,
                summary: None,
                source: "raw",
                error: Some(format!("AI summary could not be generated: {e}")),
            }
        }
    }
}
