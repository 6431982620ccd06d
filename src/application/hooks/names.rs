//! The closed hook-name vocabulary.

use std::fmt;
use std::str::FromStr;

use super::HookError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Before,
    After,
}

impl Phase {
    pub const ALL: [Phase; 2] = [Phase::Before, Phase::After];

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Before => "before",
            Phase::After => "after",
        }
    }
}

/// Entity types that expose lifecycle hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    User,
    Collection,
    Document,
    Revision,
    Comment,
    Favorite,
    Download,
    Tag,
}

impl Target {
    pub const ALL: [Target; 8] = [
        Target::User,
        Target::Collection,
        Target::Document,
        Target::Revision,
        Target::Comment,
        Target::Favorite,
        Target::Download,
        Target::Tag,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Target::User => "user",
            Target::Collection => "collection",
            Target::Document => "document",
            Target::Revision => "revision",
            Target::Comment => "comment",
            Target::Favorite => "favorite",
            Target::Download => "download",
            Target::Tag => "tag",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Insert,
    Update,
    Delete,
    Select,
    List,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::Insert,
        Action::Update,
        Action::Delete,
        Action::Select,
        Action::List,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Insert => "insert",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Select => "select",
            Action::List => "list",
        }
    }

    pub fn is_mutation(self) -> bool {
        matches!(self, Action::Insert | Action::Update | Action::Delete)
    }
}

/// A hook point such as `after_startup` or `before_document_insert`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookName {
    AfterStartup,
    AfterUserRegister,
    Entity {
        phase: Phase,
        target: Target,
        action: Action,
    },
}

impl HookName {
    pub const fn before(target: Target, action: Action) -> Self {
        HookName::Entity {
            phase: Phase::Before,
            target,
            action,
        }
    }

    pub const fn after(target: Target, action: Action) -> Self {
        HookName::Entity {
            phase: Phase::After,
            target,
            action,
        }
    }

    /// Every hook name, lifecycle hooks first.
    pub fn all() -> Vec<HookName> {
        let mut names = vec![HookName::AfterStartup, HookName::AfterUserRegister];
        for target in Target::ALL {
            for action in Action::ALL {
                for phase in Phase::ALL {
                    names.push(HookName::Entity {
                        phase,
                        target,
                        action,
                    });
                }
            }
        }
        names
    }
}

impl fmt::Display for HookName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookName::AfterStartup => f.write_str("after_startup"),
            HookName::AfterUserRegister => f.write_str("after_user_register"),
            HookName::Entity {
                phase,
                target,
                action,
            } => write!(
                f,
                "{}_{}_{}",
                phase.as_str(),
                target.as_str(),
                action.as_str()
            ),
        }
    }
}

impl FromStr for HookName {
    type Err = HookError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let unknown = || HookError::UnknownHook(value.to_string());
        match value {
            "after_startup" => return Ok(HookName::AfterStartup),
            "after_user_register" => return Ok(HookName::AfterUserRegister),
            _ => {}
        }

        let (phase, rest) = value.split_once('_').ok_or_else(unknown)?;
        let (target, action) = rest.split_once('_').ok_or_else(unknown)?;
        let phase = Phase::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == phase)
            .ok_or_else(unknown)?;
        let target = Target::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == target)
            .ok_or_else(unknown)?;
        let action = Action::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == action)
            .ok_or_else(unknown)?;

        Ok(HookName::Entity {
            phase,
            target,
            action,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn names_render_in_snake_case() {
        assert_eq!(HookName::AfterStartup.to_string(), "after_startup");
        assert_eq!(
            HookName::before(Target::Document, Action::Insert).to_string(),
            "before_document_insert"
        );
        assert_eq!(
            HookName::after(Target::Comment, Action::List).to_string(),
            "after_comment_list"
        );
    }

    #[test]
    fn every_name_parses_back() {
        let names = HookName::all();
        assert_eq!(names.len(), 2 + 8 * 5 * 2);
        let unique: HashSet<_> = names.iter().map(ToString::to_string).collect();
        assert_eq!(unique.len(), names.len());
        for name in names {
            assert_eq!(name.to_string().parse::<HookName>().ok(), Some(name));
        }
    }

    #[test]
    fn unknown_names_are_rejected() {
        for raw in [
            "",
            "after",
            "after_document",
            "during_document_insert",
            "after_folder_insert",
            "after_document_rename",
            "after_document_insert_now",
        ] {
            assert!(raw.parse::<HookName>().is_err(), "{raw} should not parse");
        }
    }
}
