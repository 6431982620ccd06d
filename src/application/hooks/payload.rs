//! Values threaded through a hook chain.

use crate::domain::entities::{
    Collection, Comment, Document, Download, Favorite, Revision, Tag, User,
};
use crate::domain::schema::Entity;

use super::HookError;

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Empty,
    User(User),
    Collection(Collection),
    Document(Document),
    Revision(Revision),
    Comment(Comment),
    Favorite(Favorite),
    Download(Download),
    Tag(Tag),
    Users(Vec<User>),
    Collections(Vec<Collection>),
    Documents(Vec<Document>),
    Revisions(Vec<Revision>),
    Comments(Vec<Comment>),
}

impl Payload {
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Empty => "empty",
            Payload::User(_) => "user",
            Payload::Collection(_) => "collection",
            Payload::Document(_) => "document",
            Payload::Revision(_) => "revision",
            Payload::Comment(_) => "comment",
            Payload::Favorite(_) => "favorite",
            Payload::Download(_) => "download",
            Payload::Tag(_) => "tag",
            Payload::Users(_) => "users",
            Payload::Collections(_) => "collections",
            Payload::Documents(_) => "documents",
            Payload::Revisions(_) => "revisions",
            Payload::Comments(_) => "comments",
        }
    }

    /// Table and id of a single-entity payload.
    pub fn entity_ref(&self) -> Option<(&'static str, Option<i64>)> {
        fn of<E: Entity>(entity: &E) -> Option<(&'static str, Option<i64>)> {
            Some((E::TABLE, entity.id()))
        }

        match self {
            Payload::User(entity) => of(entity),
            Payload::Collection(entity) => of(entity),
            Payload::Document(entity) => of(entity),
            Payload::Revision(entity) => of(entity),
            Payload::Comment(entity) => of(entity),
            Payload::Favorite(entity) => of(entity),
            Payload::Download(entity) => of(entity),
            Payload::Tag(entity) => of(entity),
            _ => None,
        }
    }
}

macro_rules! payload_conversions {
    ($($variant:ident($ty:ty) => $kind:literal),+ $(,)?) => {
        $(
            impl From<$ty> for Payload {
                fn from(value: $ty) -> Self {
                    Payload::$variant(value)
                }
            }

            impl TryFrom<Payload> for $ty {
                type Error = HookError;

                fn try_from(payload: Payload) -> Result<Self, Self::Error> {
                    match payload {
                        Payload::$variant(value) => Ok(value),
                        other => Err(HookError::PayloadMismatch {
                            expected: $kind,
                            found: other.kind(),
                        }),
                    }
                }
            }
        )+
    };
}

payload_conversions! {
    User(User) => "user",
    Collection(Collection) => "collection",
    Document(Document) => "document",
    Revision(Revision) => "revision",
    Comment(Comment) => "comment",
    Favorite(Favorite) => "favorite",
    Download(Download) => "download",
    Tag(Tag) => "tag",
    Users(Vec<User>) => "users",
    Collections(Vec<Collection>) => "collections",
    Documents(Vec<Document>) => "documents",
    Revisions(Vec<Revision>) => "revisions",
    Comments(Vec<Comment>) => "comments",
}

impl From<()> for Payload {
    fn from((): ()) -> Self {
        Payload::Empty
    }
}

impl TryFrom<Payload> for () {
    type Error = HookError;

    fn try_from(payload: Payload) -> Result<Self, Self::Error> {
        match payload {
            Payload::Empty => Ok(()),
            other => Err(HookError::PayloadMismatch {
                expected: "empty",
                found: other.kind(),
            }),
        }
    }
}
