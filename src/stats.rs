//! Attendance aggregates for the charts.
//!
//! Computed from an [`AttendanceSheet`], so unsaved edits are already
//! reflected in the numbers.

use chrono::NaiveDate;
use serde::Serialize;

use crate::buffer::PendingKey;
use crate::session::AttendanceSheet;

/// Attended head count for one lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonAttendance {
    pub lesson_id: String,
    pub lesson_date: NaiveDate,
    pub attended: usize,
    pub total: usize,
}

/// Attendance rate for one student over the lessons in view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentAttendance {
    pub student_id: String,
    pub name: String,
    pub attended: usize,
    pub total: usize,
    /// Rounded to the nearest whole percent; 0 when there are no lessons.
    pub percentage: u32,
}

fn percentage(attended: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((attended as f64 * 100.0) / total as f64).round() as u32
}

fn is_attended(sheet: &AttendanceSheet, lesson_id: &str, student_id: &str) -> bool {
    sheet
        .cells
        .get(&PendingKey::new(lesson_id, student_id))
        .map(|c| c.attended)
        .unwrap_or(false)
}

/// One point per lesson, oldest first, for the attendance-over-time chart.
pub fn lesson_series(sheet: &AttendanceSheet) -> Vec<LessonAttendance> {
    let total = sheet.students.len();
    let mut series: Vec<LessonAttendance> = sheet
        .lessons
        .iter()
        .map(|lesson| LessonAttendance {
            lesson_id: lesson.id.clone(),
            lesson_date: lesson.lesson_date,
            attended: sheet
                .students
                .iter()
                .filter(|s| is_attended(sheet, &lesson.id, &s.id))
                .count(),
            total,
        })
        .collect();
    series.sort_by_key(|p| p.lesson_date);
    series
}

/// One row per student, in roster order, for the per-student charts.
pub fn student_rates(sheet: &AttendanceSheet) -> Vec<StudentAttendance> {
    let total = sheet.lessons.len();
    sheet
        .students
        .iter()
        .map(|student| {
            let attended = sheet
                .lessons
                .iter()
                .filter(|l| is_attended(sheet, &l.id, &student.id))
                .count();
            StudentAttendance {
                student_id: student.id.clone(),
                name: student.name.clone(),
                attended,
                total,
                percentage: percentage(attended, total),
            }
        })
        .collect()
}
