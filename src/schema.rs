// Layout of the player's songdata.db. The player owns these tables; they
// are never created or altered here outside of test fixtures.

pub const FOLDER_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS folder (
    title TEXT,
    subtitle TEXT,
    command TEXT,
    path TEXT,
    banner TEXT,
    parent TEXT,
    type INTEGER,
    date INTEGER,
    adddate INTEGER,
    max INTEGER,
    PRIMARY KEY(path));
";

pub const SONG_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS song (
    md5 TEXT NOT NULL,
    sha256 TEXT NOT NULL,
    title TEXT,
    subtitle TEXT,
    genre TEXT,
    artist TEXT,
    subartist TEXT,
    tag TEXT,
    path TEXT,
    folder TEXT,
    stagefile TEXT,
    banner TEXT,
    backbmp TEXT,
    preview TEXT,
    parent TEXT,
    level INTEGER,
    difficulty INTEGER,
    maxbpm INTEGER,
    minbpm INTEGER,
    length INTEGER,
    mode INTEGER,
    judge INTEGER,
    feature INTEGER,
    content INTEGER,
    date INTEGER,
    favorite INTEGER,
    adddate INTEGER,
    notes INTEGER,
    charthash TEXT,
    PRIMARY KEY(path));
";

pub const FOLDER_COLUMNS: &[&str] = &["path", "parent", "title", "date", "adddate"];

pub const SONG_COLUMNS: &[&str] = &["path", "folder", "parent", "title", "md5", "sha256"];
