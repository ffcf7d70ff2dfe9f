use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use std::path::Path;

pub const DB_FILE_NAME: &str = "classbook.sqlite3";

/// Column list matching [`student_from_row`]. Older stores allow NULLs in
/// every text column, so reads coalesce to empty strings.
pub const STUDENT_COLUMNS: &str = "id,
    COALESCE(name, ''),
    COALESCE(roll_no, ''),
    COALESCE(class_section, ''),
    COALESCE(father_name, ''),
    COALESCE(contact, ''),
    COALESCE(photo, '')";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: i64,
    pub name: String,
    pub roll_no: String,
    pub class_section: String,
    pub father_name: String,
    pub contact: String,
    pub photo: String,
}

pub fn student_from_row(row: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: row.get(0)?,
        name: row.get(1)?,
        roll_no: row.get(2)?,
        class_section: row.get(3)?,
        father_name: row.get(4)?,
        contact: row.get(5)?,
        photo: row.get(6)?,
    })
}

pub fn find_student(conn: &Connection, student_id: i64) -> rusqlite::Result<Option<Student>> {
    conn.query_row(
        &format!("SELECT {STUDENT_COLUMNS} FROM students WHERE id = ?"),
        [student_id],
        student_from_row,
    )
    .optional()
}

/// Padding stripped from class labels. SQLite's one-argument `TRIM` only
/// removes spaces, so the SQL side names the same set in [`TRIMMED_CLASS_SQL`].
const CLASS_LABEL_PAD: [char; 4] = [' ', '\t', '\n', '\r'];

pub const TRIMMED_CLASS_SQL: &str = "TRIM(COALESCE(class_section, ''), ' ' || char(9, 10, 13))";

pub fn trim_class_label(label: &str) -> &str {
    label.trim_matches(&CLASS_LABEL_PAD[..])
}

/// Students whose trimmed class label equals the trimmed `class_section`.
/// `None` lists everyone.
pub fn students_in_class(
    conn: &Connection,
    class_section: Option<&str>,
) -> rusqlite::Result<Vec<Student>> {
    match class_section {
        Some(c) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {STUDENT_COLUMNS}
                 FROM students
                 WHERE {TRIMMED_CLASS_SQL} = ?
                 ORDER BY id"
            ))?;
            let rows = stmt.query_map([trim_class_label(c)], student_from_row)?;
            rows.collect()
        }
        None => {
            let mut stmt =
                conn.prepare(&format!("SELECT {STUDENT_COLUMNS} FROM students ORDER BY id"))?;
            let rows = stmt.query_map([], student_from_row)?;
            rows.collect()
        }
    }
}

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL DEFAULT '',
            roll_no TEXT NOT NULL DEFAULT '',
            class_section TEXT NOT NULL DEFAULT '',
            father_name TEXT NOT NULL DEFAULT '',
            contact TEXT NOT NULL DEFAULT '',
            photo TEXT NOT NULL DEFAULT ''
        )",
        [],
    )?;
    // Early rosters were created before photos were tracked.
    ensure_students_photo(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_section)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id INTEGER NOT NULL,
            date TEXT NOT NULL,
            status TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id) ON DELETE CASCADE
        )",
        [],
    )?;
    ensure_unique_per_day(conn, "attendance", "idx_attendance_student_date")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS activities(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id INTEGER NOT NULL,
            date TEXT NOT NULL,
            note TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id) ON DELETE CASCADE
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_activities_student ON activities(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_remarks(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id INTEGER NOT NULL,
            date TEXT NOT NULL,
            remark TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id) ON DELETE CASCADE
        )",
        [],
    )?;
    ensure_unique_per_day(conn, "student_remarks", "idx_student_remarks_student_date")?;

    Ok(())
}

fn ensure_students_photo(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "students", "photo")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE students ADD COLUMN photo TEXT NOT NULL DEFAULT ''",
        [],
    )?;
    Ok(())
}

/// Creates the (student_id, date) unique index on `table`. Stores written
/// before the index existed may hold several rows per key; the newest row
/// (highest id) wins.
fn ensure_unique_per_day(conn: &Connection, table: &str, index: &str) -> anyhow::Result<()> {
    if index_exists(conn, index)? {
        return Ok(());
    }
    let removed = conn.execute(
        &format!(
            "DELETE FROM {table}
             WHERE id NOT IN (SELECT MAX(id) FROM {table} GROUP BY student_id, date)"
        ),
        [],
    )?;
    if removed > 0 {
        tracing::info!(table, removed, "collapsed duplicate per-day rows");
    }
    conn.execute(
        &format!("CREATE UNIQUE INDEX IF NOT EXISTS {index} ON {table}(student_id, date)"),
        [],
    )?;
    Ok(())
}

fn index_exists(conn: &Connection, index: &str) -> anyhow::Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'index' AND name = ?",
            [index],
            |r| r.get::<_, i64>(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
pub(crate) fn test_conn() -> Connection {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    init_schema(&conn).expect("init schema");
    conn
}

#[cfg(test)]
pub(crate) fn insert_test_student(conn: &Connection, name: &str, class_section: &str) -> i64 {
    conn.execute(
        "INSERT INTO students(name, roll_no, class_section) VALUES(?, ?, ?)",
        (name, format!("R-{name}"), class_section),
    )
    .expect("insert student");
    conn.last_insert_rowid()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_schema_is_idempotent() {
        let conn = test_conn();
        init_schema(&conn).expect("second init");
        let sid = insert_test_student(&conn, "Asha", "5-A");
        assert!(find_student(&conn, sid).expect("find").is_some());
    }

    #[test]
    fn upgrades_legacy_store_without_photo_and_with_duplicate_days() {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute_batch(
            "CREATE TABLE students(id INTEGER PRIMARY KEY AUTOINCREMENT,
                 name TEXT, roll_no TEXT, class_section TEXT, father_name TEXT, contact TEXT);
             CREATE TABLE attendance(id INTEGER PRIMARY KEY AUTOINCREMENT,
                 student_id INTEGER, date TEXT, status TEXT);
             INSERT INTO students(name, roll_no, class_section) VALUES('Ravi', '7', ' 5-A ');
             INSERT INTO attendance(student_id, date, status) VALUES(1, '2024-06-01', 'Absent');
             INSERT INTO attendance(student_id, date, status) VALUES(1, '2024-06-01', 'Present');",
        )
        .expect("legacy schema");

        init_schema(&conn).expect("upgrade");

        assert!(table_has_column(&conn, "students", "photo").expect("columns"));
        let rows: Vec<String> = conn
            .prepare("SELECT status FROM attendance WHERE student_id = 1")
            .expect("prepare")
            .query_map([], |r| r.get(0))
            .expect("query")
            .collect::<Result<_, _>>()
            .expect("collect");
        assert_eq!(rows, vec!["Present".to_string()]);

        let students = students_in_class(&conn, Some("5-A")).expect("list");
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].father_name, "");
    }

    #[test]
    fn tab_and_newline_padded_labels_match_their_bare_form() {
        let conn = test_conn();
        insert_test_student(&conn, "Asha", "5-A\t");
        insert_test_student(&conn, "Bilal", "\r\n5-A ");
        insert_test_student(&conn, "Chen", "5-B");

        let names = |label: &str| -> Vec<String> {
            students_in_class(&conn, Some(label))
                .expect("list")
                .into_iter()
                .map(|s| s.name)
                .collect()
        };
        assert_eq!(names("5-A"), vec!["Asha", "Bilal"]);
        assert_eq!(names("5-A\t"), vec!["Asha", "Bilal"]);
        assert_eq!(trim_class_label("\t 6-C\r\n"), "6-C");
    }
}
