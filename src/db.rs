mod schema;

use std::path::Path;

use anyhow::{Result, bail};
use rusqlite::{Connection, OptionalExtension, params};
use time::OffsetDateTime;

use crate::store::{NoteStore, Page, PageRequest};
use crate::{Folder, FolderId, Note, NoteBuilder, NoteId, Tag, TagId};

use schema::INITIAL_SCHEMA;

/// SQLite-backed note store.
///
/// Implements [`NoteStore`] over a single connection. Listings are ordered by
/// id and paginated with LIMIT/OFFSET; one extra row is fetched to compute
/// `has_more`.
pub struct Database {
    conn: Connection,
}

/// Raw note columns before timestamp conversion.
struct NoteRow {
    id: i64,
    title: String,
    body: String,
    folder_id: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl NoteRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            body: row.get(2)?,
            folder_id: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    fn into_note(self) -> Result<Note> {
        Ok(NoteBuilder::new()
            .id(NoteId::new(self.id))
            .title(self.title)
            .body(self.body)
            .folder_id(self.folder_id.map(FolderId::new))
            .created_at(OffsetDateTime::from_unix_timestamp(self.created_at)?)
            .updated_at(OffsetDateTime::from_unix_timestamp(self.updated_at)?)
            .build())
    }
}

const NOTE_COLUMNS: &str = "id, title, body, folder_id, created_at, updated_at";

impl Database {
    /// Opens an in-memory SQLite database.
    ///
    /// Automatically initializes the schema on connection open.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.initialize_schema()?;
        Ok(db)
    }

    /// Opens a file-based SQLite database at the given path.
    ///
    /// Creates the database file if it does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.initialize_schema()?;
        Ok(db)
    }

    fn initialize_schema(&self) -> Result<()> {
        self.conn.execute("PRAGMA foreign_keys = ON", [])?;
        self.conn.execute_batch(INITIAL_SCHEMA)?;
        Ok(())
    }

    /// Returns a reference to the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Creates a folder, optionally nested under `parent`.
    ///
    /// # Examples
    ///
    /// ```
    /// use aitag::Database;
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let db = Database::in_memory()?;
    /// let work = db.create_folder("Work", None)?;
    /// let projects = db.create_folder("Projects", Some(work.id()))?;
    /// assert_eq!(projects.parent_id(), Some(work.id()));
    /// # Ok(())
    /// # }
    /// ```
    pub fn create_folder(&self, title: &str, parent: Option<FolderId>) -> Result<Folder> {
        if let Some(parent_id) = parent
            && self.get_folder(parent_id)?.is_none()
        {
            bail!("Parent folder {parent_id} not found");
        }

        self.conn.execute(
            "INSERT INTO folders (title, parent_id) VALUES (?1, ?2)",
            params![title, parent.map(FolderId::get)],
        )?;

        Ok(Folder::new(
            FolderId::new(self.conn.last_insert_rowid()),
            title,
            parent,
        ))
    }

    /// Creates a note with the current timestamp.
    ///
    /// # Examples
    ///
    /// ```
    /// use aitag::Database;
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let db = Database::in_memory()?;
    /// let note = db.create_note("", "Learning Rust ownership", None)?;
    /// assert!(note.id().get() > 0);
    /// assert_eq!(note.body(), "Learning Rust ownership");
    /// # Ok(())
    /// # }
    /// ```
    pub fn create_note(&self, title: &str, body: &str, folder: Option<FolderId>) -> Result<Note> {
        let now = OffsetDateTime::now_utc().unix_timestamp();

        self.conn.execute(
            "INSERT INTO notes (title, body, folder_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![title, body, folder.map(FolderId::get), now],
        )?;

        let timestamp = OffsetDateTime::from_unix_timestamp(now)?;
        Ok(NoteBuilder::new()
            .id(NoteId::new(self.conn.last_insert_rowid()))
            .title(title)
            .body(body)
            .folder_id(folder)
            .created_at(timestamp)
            .updated_at(timestamp)
            .build())
    }

    /// Runs a paginated query whose last two parameters are LIMIT and OFFSET.
    fn paginate<T, F>(
        &self,
        sql: &str,
        leading: &[&dyn rusqlite::ToSql],
        page: PageRequest,
        map: F,
    ) -> Result<Page<T>>
    where
        F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    {
        let fetch = i64::from(page.limit) + 1;
        let offset = i64::try_from(page.offset())?;

        let mut params: Vec<&dyn rusqlite::ToSql> = leading.to_vec();
        params.push(&fetch);
        params.push(&offset);

        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params), map)?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }

        let has_more = items.len() > page.limit as usize;
        items.truncate(page.limit as usize);
        Ok(Page::new(items, has_more))
    }

    fn note_page(
        &self,
        sql: &str,
        leading: &[&dyn rusqlite::ToSql],
        page: PageRequest,
    ) -> Result<Page<Note>> {
        let raw = self.paginate(sql, leading, page, NoteRow::from_row)?;
        let items = raw
            .items
            .into_iter()
            .map(NoteRow::into_note)
            .collect::<Result<Vec<_>>>()?;
        Ok(Page::new(items, raw.has_more))
    }
}

fn tag_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Tag> {
    Ok(Tag::new(TagId::new(row.get(0)?), row.get::<_, String>(1)?))
}

fn folder_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Folder> {
    Ok(Folder::new(
        FolderId::new(row.get(0)?),
        row.get::<_, String>(1)?,
        row.get::<_, Option<i64>>(2)?.map(FolderId::new),
    ))
}

impl NoteStore for Database {
    fn list_notes(&self, page: PageRequest) -> Result<Page<Note>> {
        let sql = format!("SELECT {NOTE_COLUMNS} FROM notes ORDER BY id LIMIT ? OFFSET ?");
        self.note_page(&sql, &[], page)
    }

    fn get_note(&self, id: NoteId) -> Result<Option<Note>> {
        let sql = format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?1");
        let row = self
            .conn
            .query_row(&sql, [id.get()], NoteRow::from_row)
            .optional()?;
        row.map(NoteRow::into_note).transpose()
    }

    fn update_note_title(&self, id: NoteId, title: &str) -> Result<()> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let changed = self.conn.execute(
            "UPDATE notes SET title = ?1, updated_at = ?2 WHERE id = ?3",
            params![title, now, id.get()],
        )?;
        if changed == 0 {
            bail!("Note {id} not found");
        }
        Ok(())
    }

    fn list_folder_notes(&self, folder: FolderId, page: PageRequest) -> Result<Page<Note>> {
        let sql = format!(
            "SELECT {NOTE_COLUMNS} FROM notes WHERE folder_id = ? ORDER BY id LIMIT ? OFFSET ?"
        );
        let folder_id = folder.get();
        self.note_page(&sql, &[&folder_id as &dyn rusqlite::ToSql], page)
    }

    fn get_folder(&self, id: FolderId) -> Result<Option<Folder>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, title, parent_id FROM folders WHERE id = ?1",
                [id.get()],
                folder_from_row,
            )
            .optional()?)
    }

    fn list_child_folders(&self, folder: FolderId, page: PageRequest) -> Result<Page<Folder>> {
        let folder_id = folder.get();
        self.paginate(
            "SELECT id, title, parent_id FROM folders WHERE parent_id = ?
             ORDER BY id LIMIT ? OFFSET ?",
            &[&folder_id as &dyn rusqlite::ToSql],
            page,
            folder_from_row,
        )
    }

    fn list_note_tags(&self, note: NoteId, page: PageRequest) -> Result<Page<Tag>> {
        let note_id = note.get();
        self.paginate(
            "SELECT t.id, t.title FROM tags t
             JOIN note_tags nt ON nt.tag_id = t.id
             WHERE nt.note_id = ?
             ORDER BY t.id LIMIT ? OFFSET ?",
            &[&note_id as &dyn rusqlite::ToSql],
            page,
            tag_from_row,
        )
    }

    fn list_tags(&self, page: PageRequest) -> Result<Page<Tag>> {
        self.paginate(
            "SELECT id, title FROM tags ORDER BY id LIMIT ? OFFSET ?",
            &[],
            page,
            tag_from_row,
        )
    }

    fn create_tag(&self, title: &str) -> Result<Tag> {
        self.conn
            .execute("INSERT INTO tags (title) VALUES (?1)", [title])?;
        Ok(Tag::new(TagId::new(self.conn.last_insert_rowid()), title))
    }

    fn attach_tag(&self, tag: TagId, note: NoteId) -> Result<()> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        self.conn.execute(
            "INSERT OR IGNORE INTO note_tags (note_id, tag_id, created_at) VALUES (?1, ?2, ?3)",
            params![note.get(), tag.get(), now],
        )?;
        Ok(())
    }

    fn detach_tag(&self, tag: TagId, note: NoteId) -> Result<()> {
        self.conn.execute(
            "DELETE FROM note_tags WHERE note_id = ?1 AND tag_id = ?2",
            params![note.get(), tag.get()],
        )?;
        Ok(())
    }
}
