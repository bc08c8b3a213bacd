//! # Mark policy
//!
//! Which track-changes state survives in which compile mode.
use super::CompileMode;
use crate::model::MarkKind;

/// What happens to a text leaf carrying a mark
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MarkAction {
    /// Keep the mark and the text
    Keep,
    /// Remove the mark, keep the text
    Strip,
    /// Remove the whole leaf
    Drop,
}

pub fn action(mark: MarkKind, mode: CompileMode) -> MarkAction {
    use CompileMode::*;
    use MarkAction::*;

    match (mark, mode) {
        (MarkKind::Formatting, _) => Keep,
        (_, Review) => Keep,
        (MarkKind::Deletion, Final) => Drop,
        (MarkKind::Deletion, Original) => Strip,
        (MarkKind::Insertion, Final) => Strip,
        (MarkKind::Insertion, Original) => Drop,
        (MarkKind::Comment, Final) | (MarkKind::Comment, Original) => Strip,
    }
}

#[cfg(test)]
mod tests {
    use super::{action, MarkAction};
    use crate::compile::CompileMode;
    use crate::model::MarkKind;

    #[test]
    fn test_table() {
        let table = [
            (MarkKind::Deletion, [MarkAction::Drop, MarkAction::Strip, MarkAction::Keep]),
            (MarkKind::Insertion, [MarkAction::Strip, MarkAction::Drop, MarkAction::Keep]),
            (MarkKind::Comment, [MarkAction::Strip, MarkAction::Strip, MarkAction::Keep]),
            (MarkKind::Formatting, [MarkAction::Keep, MarkAction::Keep, MarkAction::Keep]),
        ];
        let modes = [CompileMode::Final, CompileMode::Original, CompileMode::Review];

        for (mark, expected) in table.iter() {
            for (mode, want) in modes.iter().zip(expected.iter()) {
                assert_eq!(action(*mark, *mode), *want, "{:?} in {:?}", mark, mode);
            }
        }
    }
}
