use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Error, Result};
use crate::path::Separator;
use crate::schema;

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    trace!("reading columns of {}", table);

    let mut st = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let mut rows = st.query([])?;

    let mut columns = Vec::new();
    while let Some(row) = rows.next()? {
        columns.push(row.get(1)?);
    }

    Ok(columns)
}

/// Checks that the folder and song tables carry every column the tree
/// operations touch.
pub fn verify_schema(conn: &Connection) -> Result<()> {
    for (table, required) in &[
        ("folder", schema::FOLDER_COLUMNS),
        ("song", schema::SONG_COLUMNS),
    ] {
        let columns = table_columns(conn, table)?;

        if columns.is_empty() {
            error!("table {} is missing", table);
            return Err(Error::Schema(format!("missing table {}", table)));
        }

        for column in required.iter() {
            if !columns.iter().any(|c| c == column) {
                error!("column {}.{} is missing", table, column);
                return Err(Error::Schema(format!("missing column {}.{}", table, column)));
            }
        }
    }

    Ok(())
}

/// Reads the separator convention off any stored folder path. `None` for an
/// empty index.
pub fn detect_separator(conn: &Connection) -> Result<Option<Separator>> {
    let path: Option<String> = conn
        .query_row("SELECT path FROM folder LIMIT 1", params![], |row| row.get(0))
        .optional()?;

    Ok(path.and_then(|p| p.chars().last()).and_then(Separator::from_char))
}
