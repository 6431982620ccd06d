//! Domain entities mirrored from persistent storage.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::{
    schema::{Column, ColumnDef, Entity, timestamp_now},
    types::UserRole,
};

macro_rules! impl_entity {
    ($ty:ident, table = $table:literal, cacheable = $cacheable:literal, columns = [$($column:ident),+ $(,)?]) => {
        impl Entity for $ty {
            const TABLE: &'static str = $table;
            const CACHEABLE: bool = $cacheable;
            const COLUMNS: &'static [ColumnDef] = &[$($ty::$column.def()),+];

            fn id(&self) -> Option<i64> {
                self.id
            }

            fn assign_id(&mut self, id: i64) {
                self.id = Some(id);
            }

            fn touch(&mut self, now: OffsetDateTime) {
                self.updated_date = Some(now);
            }
        }
    };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Option<i64>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_date: Option<OffsetDateTime>,
    pub username: String,
    pub email: String,
    pub role: UserRole,
    pub is_active: bool,
}

impl User {
    pub const ID: Column<Self> = Column::int("id");
    pub const CREATED_DATE: Column<Self> = Column::timestamp("created_date");
    pub const UPDATED_DATE: Column<Self> = Column::timestamp("updated_date");
    pub const USERNAME: Column<Self> = Column::text("username");
    pub const EMAIL: Column<Self> = Column::text("email");
    pub const ROLE: Column<Self> = Column::text("role");
    pub const IS_ACTIVE: Column<Self> = Column::boolean("is_active");

    pub fn new(username: impl Into<String>, email: impl Into<String>, role: UserRole) -> Self {
        Self {
            id: None,
            created_date: timestamp_now(),
            updated_date: None,
            username: username.into(),
            email: email.into(),
            role,
            is_active: true,
        }
    }

    pub fn can_read(&self) -> bool {
        self.is_active
    }

    pub fn can_write(&self) -> bool {
        self.is_active && self.role >= UserRole::Writer
    }

    pub fn can_edit(&self) -> bool {
        self.is_active && self.role >= UserRole::Editor
    }

    pub fn can_admin(&self) -> bool {
        self.is_active && self.role == UserRole::Admin
    }
}

impl_entity!(
    User,
    table = "users",
    cacheable = true,
    columns = [ID, CREATED_DATE, UPDATED_DATE, USERNAME, EMAIL, ROLE, IS_ACTIVE]
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: Option<i64>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_date: Option<OffsetDateTime>,
    pub user_id: i64,
    pub name: String,
    pub summary: Option<String>,
    pub documents_count: i64,
    pub documents_size: i64,
}

impl Collection {
    pub const ID: Column<Self> = Column::int("id");
    pub const CREATED_DATE: Column<Self> = Column::timestamp("created_date");
    pub const UPDATED_DATE: Column<Self> = Column::timestamp("updated_date");
    pub const USER_ID: Column<Self> = Column::int("user_id");
    pub const NAME: Column<Self> = Column::text("name");
    pub const SUMMARY: Column<Self> = Column::text("summary");
    pub const DOCUMENTS_COUNT: Column<Self> = Column::int("documents_count");
    pub const DOCUMENTS_SIZE: Column<Self> = Column::int("documents_size");

    pub fn new(user_id: i64, name: impl Into<String>) -> Self {
        Self {
            id: None,
            created_date: timestamp_now(),
            updated_date: None,
            user_id,
            name: name.into(),
            summary: None,
            documents_count: 0,
            documents_size: 0,
        }
    }
}

impl_entity!(
    Collection,
    table = "collections",
    cacheable = true,
    columns = [
        ID,
        CREATED_DATE,
        UPDATED_DATE,
        USER_ID,
        NAME,
        SUMMARY,
        DOCUMENTS_COUNT,
        DOCUMENTS_SIZE,
    ]
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Option<i64>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_date: Option<OffsetDateTime>,
    pub user_id: i64,
    pub collection_id: i64,
    pub name: String,
    pub summary: Option<String>,
    pub revisions_count: i64,
    pub revisions_size: i64,
    pub comments_count: i64,
    pub downloads_count: i64,
    pub favorites_count: i64,
}

impl Document {
    pub const ID: Column<Self> = Column::int("id");
    pub const CREATED_DATE: Column<Self> = Column::timestamp("created_date");
    pub const UPDATED_DATE: Column<Self> = Column::timestamp("updated_date");
    pub const USER_ID: Column<Self> = Column::int("user_id");
    pub const COLLECTION_ID: Column<Self> = Column::int("collection_id");
    pub const NAME: Column<Self> = Column::text("name");
    pub const SUMMARY: Column<Self> = Column::text("summary");
    pub const REVISIONS_COUNT: Column<Self> = Column::int("revisions_count");
    pub const REVISIONS_SIZE: Column<Self> = Column::int("revisions_size");
    pub const COMMENTS_COUNT: Column<Self> = Column::int("comments_count");
    pub const DOWNLOADS_COUNT: Column<Self> = Column::int("downloads_count");
    pub const FAVORITES_COUNT: Column<Self> = Column::int("favorites_count");

    pub fn new(user_id: i64, collection_id: i64, name: impl Into<String>) -> Self {
        Self {
            id: None,
            created_date: timestamp_now(),
            updated_date: None,
            user_id,
            collection_id,
            name: name.into(),
            summary: None,
            revisions_count: 0,
            revisions_size: 0,
            comments_count: 0,
            downloads_count: 0,
            favorites_count: 0,
        }
    }
}

impl_entity!(
    Document,
    table = "documents",
    cacheable = true,
    columns = [
        ID,
        CREATED_DATE,
        UPDATED_DATE,
        USER_ID,
        COLLECTION_ID,
        NAME,
        SUMMARY,
        REVISIONS_COUNT,
        REVISIONS_SIZE,
        COMMENTS_COUNT,
        DOWNLOADS_COUNT,
        FAVORITES_COUNT,
    ]
);

/// One uploaded version of a document's file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    pub id: Option<i64>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_date: Option<OffsetDateTime>,
    pub user_id: i64,
    pub document_id: i64,
    pub original_filename: String,
    pub mimetype: String,
    pub filesize: i64,
}

impl Revision {
    pub const ID: Column<Self> = Column::int("id");
    pub const CREATED_DATE: Column<Self> = Column::timestamp("created_date");
    pub const UPDATED_DATE: Column<Self> = Column::timestamp("updated_date");
    pub const USER_ID: Column<Self> = Column::int("user_id");
    pub const DOCUMENT_ID: Column<Self> = Column::int("document_id");
    pub const ORIGINAL_FILENAME: Column<Self> = Column::text("original_filename");
    pub const MIMETYPE: Column<Self> = Column::text("mimetype");
    pub const FILESIZE: Column<Self> = Column::int("filesize");

    pub fn new(
        user_id: i64,
        document_id: i64,
        original_filename: impl Into<String>,
        mimetype: impl Into<String>,
        filesize: i64,
    ) -> Self {
        Self {
            id: None,
            created_date: timestamp_now(),
            updated_date: None,
            user_id,
            document_id,
            original_filename: original_filename.into(),
            mimetype: mimetype.into(),
            filesize,
        }
    }
}

impl_entity!(
    Revision,
    table = "revisions",
    cacheable = true,
    columns = [
        ID,
        CREATED_DATE,
        UPDATED_DATE,
        USER_ID,
        DOCUMENT_ID,
        ORIGINAL_FILENAME,
        MIMETYPE,
        FILESIZE,
    ]
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: Option<i64>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_date: Option<OffsetDateTime>,
    pub user_id: i64,
    pub document_id: i64,
    pub content: String,
}

impl Comment {
    pub const ID: Column<Self> = Column::int("id");
    pub const CREATED_DATE: Column<Self> = Column::timestamp("created_date");
    pub const UPDATED_DATE: Column<Self> = Column::timestamp("updated_date");
    pub const USER_ID: Column<Self> = Column::int("user_id");
    pub const DOCUMENT_ID: Column<Self> = Column::int("document_id");
    pub const CONTENT: Column<Self> = Column::text("content");

    pub fn new(user_id: i64, document_id: i64, content: impl Into<String>) -> Self {
        Self {
            id: None,
            created_date: timestamp_now(),
            updated_date: None,
            user_id,
            document_id,
            content: content.into(),
        }
    }
}

impl_entity!(
    Comment,
    table = "comments",
    cacheable = true,
    columns = [ID, CREATED_DATE, UPDATED_DATE, USER_ID, DOCUMENT_ID, CONTENT]
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Favorite {
    pub id: Option<i64>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_date: Option<OffsetDateTime>,
    pub user_id: i64,
    pub document_id: i64,
}

impl Favorite {
    pub const ID: Column<Self> = Column::int("id");
    pub const CREATED_DATE: Column<Self> = Column::timestamp("created_date");
    pub const UPDATED_DATE: Column<Self> = Column::timestamp("updated_date");
    pub const USER_ID: Column<Self> = Column::int("user_id");
    pub const DOCUMENT_ID: Column<Self> = Column::int("document_id");

    pub fn new(user_id: i64, document_id: i64) -> Self {
        Self {
            id: None,
            created_date: timestamp_now(),
            updated_date: None,
            user_id,
            document_id,
        }
    }
}

impl_entity!(
    Favorite,
    table = "favorites",
    cacheable = true,
    columns = [ID, CREATED_DATE, UPDATED_DATE, USER_ID, DOCUMENT_ID]
);

/// Download log entry. Write-mostly, never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Download {
    pub id: Option<i64>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_date: Option<OffsetDateTime>,
    pub user_id: i64,
    pub document_id: i64,
}

impl Download {
    pub const ID: Column<Self> = Column::int("id");
    pub const CREATED_DATE: Column<Self> = Column::timestamp("created_date");
    pub const UPDATED_DATE: Column<Self> = Column::timestamp("updated_date");
    pub const USER_ID: Column<Self> = Column::int("user_id");
    pub const DOCUMENT_ID: Column<Self> = Column::int("document_id");

    pub fn new(user_id: i64, document_id: i64) -> Self {
        Self {
            id: None,
            created_date: timestamp_now(),
            updated_date: None,
            user_id,
            document_id,
        }
    }
}

impl_entity!(
    Download,
    table = "downloads",
    cacheable = false,
    columns = [ID, CREATED_DATE, UPDATED_DATE, USER_ID, DOCUMENT_ID]
);

/// Free-form label on a document. Looked up by value, never by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: Option<i64>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_date: Option<OffsetDateTime>,
    pub document_id: i64,
    pub value: String,
}

impl Tag {
    pub const ID: Column<Self> = Column::int("id");
    pub const CREATED_DATE: Column<Self> = Column::timestamp("created_date");
    pub const UPDATED_DATE: Column<Self> = Column::timestamp("updated_date");
    pub const DOCUMENT_ID: Column<Self> = Column::int("document_id");
    pub const VALUE: Column<Self> = Column::text("value");

    pub fn new(document_id: i64, value: impl Into<String>) -> Self {
        Self {
            id: None,
            created_date: timestamp_now(),
            updated_date: None,
            document_id,
            value: value.into(),
        }
    }
}

impl_entity!(
    Tag,
    table = "tags",
    cacheable = false,
    columns = [ID, CREATED_DATE, UPDATED_DATE, DOCUMENT_ID, VALUE]
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: Option<i64>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_date: Option<OffsetDateTime>,
    pub user_id: Option<i64>,
    pub action: String,
    pub entity_table: Option<String>,
    pub entity_id: Option<i64>,
    pub request_id: Option<String>,
}

impl AuditLog {
    pub const ID: Column<Self> = Column::int("id");
    pub const CREATED_DATE: Column<Self> = Column::timestamp("created_date");
    pub const UPDATED_DATE: Column<Self> = Column::timestamp("updated_date");
    pub const USER_ID: Column<Self> = Column::int("user_id");
    pub const ACTION: Column<Self> = Column::text("action");
    pub const ENTITY_TABLE: Column<Self> = Column::text("entity_table");
    pub const ENTITY_ID: Column<Self> = Column::int("entity_id");
    pub const REQUEST_ID: Column<Self> = Column::text("request_id");

    pub fn new(user_id: Option<i64>, action: impl Into<String>) -> Self {
        Self {
            id: None,
            created_date: timestamp_now(),
            updated_date: None,
            user_id,
            action: action.into(),
            entity_table: None,
            entity_id: None,
            request_id: None,
        }
    }
}

impl_entity!(
    AuditLog,
    table = "audit_logs",
    cacheable = false,
    columns = [
        ID,
        CREATED_DATE,
        UPDATED_DATE,
        USER_ID,
        ACTION,
        ENTITY_TABLE,
        ENTITY_ID,
        REQUEST_ID,
    ]
);
