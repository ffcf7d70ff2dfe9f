use crate::db::{self, Student};
use rusqlite::Connection;
use serde::Serialize;

pub const AT_RISK_THRESHOLD: f64 = 75.0;

/// Two-decimal rounding, half away from zero. Ties are not broken to even,
/// so 1/32 (3.125) gives 3.13 where a half-to-even rounder reports 3.12.
pub fn round_2_decimals(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// `present / total * 100` rounded to two decimals; 0 when nothing is recorded.
pub fn attendance_pct(present_days: i64, total_days: i64) -> f64 {
    if total_days <= 0 {
        return 0.0;
    }
    round_2_decimals(present_days as f64 / total_days as f64 * 100.0)
}

pub fn is_at_risk(pct: f64) -> bool {
    pct < AT_RISK_THRESHOLD
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRow {
    pub student_id: i64,
    pub name: String,
    pub roll_no: String,
    pub total_days: i64,
    pub present_days: i64,
    pub attendance_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceChart {
    pub title: String,
    pub y_label: String,
    pub labels: Vec<String>,
    pub values: Vec<f64>,
    pub first_date: Option<String>,
    pub last_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassAttendanceSummary {
    pub class_section: String,
    pub rows: Vec<AttendanceRow>,
    pub at_risk: Vec<AttendanceRow>,
    pub chart: AttendanceChart,
}

pub fn at_risk_rows(rows: &[AttendanceRow]) -> Vec<AttendanceRow> {
    rows.iter()
        .filter(|r| is_at_risk(r.attendance_pct))
        .cloned()
        .collect()
}

/// Per-student attendance over every recorded date, for one class/section.
pub fn class_attendance_summary(
    conn: &Connection,
    class_section: &str,
) -> rusqlite::Result<ClassAttendanceSummary> {
    let label = db::trim_class_label(class_section).to_string();
    let students = db::students_in_class(conn, Some(&label))?;

    let mut count_stmt = conn.prepare(
        "SELECT COUNT(*),
                COALESCE(SUM(CASE WHEN status = 'Present' THEN 1 ELSE 0 END), 0),
                MIN(date),
                MAX(date)
         FROM attendance
         WHERE student_id = ?",
    )?;

    let mut rows = Vec::with_capacity(students.len());
    let mut first_date: Option<String> = None;
    let mut last_date: Option<String> = None;
    for Student {
        id, name, roll_no, ..
    } in students
    {
        let (total_days, present_days, min_date, max_date) =
            count_stmt.query_row([id], |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    r.get::<_, i64>(1)?,
                    r.get::<_, Option<String>>(2)?,
                    r.get::<_, Option<String>>(3)?,
                ))
            })?;
        if let Some(d) = min_date {
            if first_date.as_ref().map(|f| d < *f).unwrap_or(true) {
                first_date = Some(d);
            }
        }
        if let Some(d) = max_date {
            if last_date.as_ref().map(|l| d > *l).unwrap_or(true) {
                last_date = Some(d);
            }
        }
        rows.push(AttendanceRow {
            student_id: id,
            name,
            roll_no,
            total_days,
            present_days,
            attendance_pct: attendance_pct(present_days, total_days),
        });
    }

    let chart = AttendanceChart {
        title: format!("Attendance % for Class {}", label),
        y_label: "Attendance %".to_string(),
        labels: rows.iter().map(|r| r.name.clone()).collect(),
        values: rows.iter().map(|r| r.attendance_pct).collect(),
        first_date,
        last_date,
    };

    Ok(ClassAttendanceSummary {
        class_section: label,
        at_risk: at_risk_rows(&rows),
        rows,
        chart,
    })
}
