//! Input cleanup applied before entities are stored.

use std::sync::Arc;

use crate::application::hooks::{
    Action, Extension, HookError, HookHandler, HookName, Payload, Target, handler_fn,
};

pub struct NormalizeExtension;

impl Extension for NormalizeExtension {
    fn name(&self) -> &'static str {
        "normalize"
    }

    fn hooks(&self) -> Vec<(HookName, Arc<dyn HookHandler>)> {
        let targets = [
            Target::User,
            Target::Collection,
            Target::Document,
            Target::Comment,
            Target::Tag,
        ];
        let mut hooks = Vec::new();
        for action in [Action::Insert, Action::Update] {
            for target in targets {
                hooks.push((
                    HookName::before(target, action),
                    handler_fn(|_, payload| normalize(payload)),
                ));
            }
        }
        hooks
    }
}

fn required(field: &'static str, value: &str) -> Result<String, HookError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(HookError::rejected(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

fn normalize(payload: Payload) -> Result<Payload, HookError> {
    Ok(match payload {
        Payload::User(mut user) => {
            user.username = required("username", &user.username)?;
            user.email = required("email", &user.email)?.to_lowercase();
            Payload::User(user)
        }
        Payload::Collection(mut collection) => {
            collection.name = required("collection name", &collection.name)?;
            Payload::Collection(collection)
        }
        Payload::Document(mut document) => {
            document.name = required("document name", &document.name)?;
            Payload::Document(document)
        }
        Payload::Comment(mut comment) => {
            comment.content = required("comment", &comment.content)?;
            Payload::Comment(comment)
        }
        Payload::Tag(mut tag) => {
            tag.value = required("tag", &tag.value)?.to_lowercase();
            Payload::Tag(tag)
        }
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Document, Tag};

    #[test]
    fn normalize_trims_and_lowercases_tags() {
        let payload = Payload::from(Tag::new(1, "  Draft "));
        let normalized = normalize(payload).expect("normalize");
        assert_eq!(Tag::try_from(normalized).expect("tag").value, "draft");
    }

    #[test]
    fn blank_names_are_rejected() {
        let err = normalize(Document::new(1, 1, "   ").into()).expect_err("blank name");
        assert!(matches!(err, HookError::Rejected { .. }));
    }

    #[test]
    fn registers_before_hooks_only() {
        let hooks = NormalizeExtension.hooks();
        assert_eq!(hooks.len(), 10);
        assert!(hooks.iter().all(|(name, _)| name.to_string().starts_with("before_")));
    }
}
