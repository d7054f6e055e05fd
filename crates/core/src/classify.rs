use serde::Serialize;

use crate::model::ChangeKind;

/// Label and style tags a frontend attaches to a change kind. The core never
/// interprets them.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct Presentation {
    pub label: &'static str,
    pub style: &'static str,
    pub button_style: &'static str,
}

const UNCHANGED: Presentation = Presentation {
    label: "",
    style: "file-change-none",
    button_style: "file-change-none",
};
const CHANGED: Presentation = Presentation {
    label: "Changed",
    style: "accent",
    button_style: "accent-button",
};
const LEFT_ONLY: Presentation = Presentation {
    label: "Not backed up",
    style: "warning",
    button_style: "warning-button",
};
const RIGHT_ONLY: Presentation = Presentation {
    label: "Only in backup",
    style: "missing",
    button_style: "missing-button",
};
const UNKNOWN: Presentation = Presentation {
    label: "",
    style: "file-change-unknown",
    button_style: "file-change-unknown",
};

/// Maps presence on each side plus the content verdict to a change kind.
/// `content_equal` is `None` when the pair could not be compared.
pub fn classify(in_left: bool, in_right: bool, content_equal: Option<bool>) -> ChangeKind {
    match (in_left, in_right, content_equal) {
        (true, true, Some(true)) => ChangeKind::Unchanged,
        (true, true, Some(false)) => ChangeKind::Changed,
        (true, false, _) => ChangeKind::LeftOnly,
        (false, true, _) => ChangeKind::RightOnly,
        (true, true, None) | (false, false, _) => ChangeKind::Unknown,
    }
}

impl ChangeKind {
    pub fn presentation(self) -> Presentation {
        match self {
            ChangeKind::Unchanged => UNCHANGED,
            ChangeKind::Changed => CHANGED,
            ChangeKind::LeftOnly => LEFT_ONLY,
            ChangeKind::RightOnly => RIGHT_ONLY,
            ChangeKind::Unknown => UNKNOWN,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ChangeKind::Unchanged => "unchanged",
            ChangeKind::Changed => "changed",
            ChangeKind::LeftOnly => "left_only",
            ChangeKind::RightOnly => "right_only",
            ChangeKind::Unknown => "unknown",
        }
    }

    /// Presentation label, or the kind name where the label is blank.
    pub fn display_label(self) -> &'static str {
        let label = self.presentation().label;
        if label.is_empty() {
            self.name()
        } else {
            label
        }
    }

    pub fn is_difference(self) -> bool {
        matches!(
            self,
            ChangeKind::Changed | ChangeKind::LeftOnly | ChangeKind::RightOnly
        )
    }

    /// The kind the same entry gets when left and right are swapped.
    pub fn mirrored(self) -> Self {
        match self {
            ChangeKind::LeftOnly => ChangeKind::RightOnly,
            ChangeKind::RightOnly => ChangeKind::LeftOnly,
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::classify;
    use crate::model::ChangeKind;

    #[test]
    fn classifies_presence_and_content() {
        assert_eq!(classify(true, true, Some(true)), ChangeKind::Unchanged);
        assert_eq!(classify(true, true, Some(false)), ChangeKind::Changed);
        assert_eq!(classify(true, false, None), ChangeKind::LeftOnly);
        assert_eq!(classify(false, true, Some(false)), ChangeKind::RightOnly);
        assert_eq!(classify(true, true, None), ChangeKind::Unknown);
        assert_eq!(classify(false, false, None), ChangeKind::Unknown);
    }

    #[test]
    fn presentation_tags_follow_kind() {
        assert_eq!(ChangeKind::LeftOnly.presentation().label, "Not backed up");
        assert_eq!(ChangeKind::RightOnly.presentation().style, "missing");
        assert_eq!(
            ChangeKind::Changed.presentation().button_style,
            "accent-button"
        );
        assert_eq!(ChangeKind::Unchanged.display_label(), "unchanged");
        assert_eq!(ChangeKind::Changed.display_label(), "Changed");
    }

    #[test]
    fn mirroring_swaps_one_sided_kinds_only() {
        assert_eq!(ChangeKind::LeftOnly.mirrored(), ChangeKind::RightOnly);
        assert_eq!(ChangeKind::RightOnly.mirrored(), ChangeKind::LeftOnly);
        assert_eq!(ChangeKind::Changed.mirrored(), ChangeKind::Changed);
        assert_eq!(ChangeKind::Unchanged.mirrored(), ChangeKind::Unchanged);
        assert!(!ChangeKind::Unknown.is_difference());
    }
}
