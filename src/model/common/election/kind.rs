use std::fmt::{Display, Formatter};

use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

use super::ElectionId;

/// The kind of office an election fills.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ElectionType {
    GroupRepresentative,
    SiteLeader,
    /// Split into parallel elections, one per time slot ("jornada").
    CenterRepresentative,
}

impl ElectionType {
    /// Is this type split into per-slot sibling elections?
    pub fn is_slotted(self) -> bool {
        self == Self::CenterRepresentative
    }

    /// The key shared by every election in the same sibling set.
    ///
    /// Unslotted elections form a set of their own, so the same key also enforces
    /// one vote per person per election.
    pub fn sibling_key(self, id: ElectionId, title: &str, slot: Option<&str>) -> String {
        if self.is_slotted() {
            format!("{self}:{}", title_root(title, slot))
        } else {
            format!("election:{id}")
        }
    }
}

impl Display for ElectionType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::GroupRepresentative => "group-representative",
            Self::SiteLeader => "site-leader",
            Self::CenterRepresentative => "center-representative",
        };
        f.write_str(name)
    }
}

impl From<ElectionType> for Bson {
    fn from(kind: ElectionType) -> Self {
        to_bson(&kind).expect("Serialisation is infallible")
    }
}

/// Strip a trailing slot marker from an election title and normalise what is left,
/// so that "Representante de Centro - Mañana" and "representante de centro (Tarde)"
/// share a root.
fn title_root(title: &str, slot: Option<&str>) -> String {
    let collapsed = title.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut root = collapsed.to_lowercase();

    if let Some(slot) = slot {
        let slot = slot.trim().to_lowercase();
        if !slot.is_empty() {
            let bracketed = format!("({slot})");
            // A bare slot name only counts at a word boundary.
            let stripped = root
                .strip_suffix(&bracketed)
                .or_else(|| {
                    root.strip_suffix(&slot)
                        .filter(|rest| rest.ends_with(|c: char| c.is_whitespace() || is_separator(c)))
                })
                .map(|rest| {
                    rest.trim_end()
                        .trim_end_matches(is_separator)
                        .trim_end()
                        .to_string()
                });
            if let Some(stripped) = stripped.filter(|s| !s.is_empty()) {
                root = stripped;
            }
        }
    }

    root
}

fn is_separator(c: char) -> bool {
    matches!(c, '-' | '–' | '—' | ':' | '/' | ',')
}
