use std::fmt::{Display, Formatter};

use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

use crate::error::VoteError;

/// States in the Election lifecycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElectionState {
    /// Under construction; the candidate roster may change.
    Configuracion,
    /// Open for voting.
    Activa,
    /// Closed normally. Terminal.
    Finalizada,
    /// Closed early. Votes are kept; the election may be deleted.
    Cancelada,
}

/// Administrative actions that move an election through its lifecycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElectionAction {
    Activate,
    Finalize,
    Cancel,
    Delete,
}

impl ElectionState {
    /// Can votes be cast in this state?
    pub fn accepts_votes(self) -> bool {
        self == Self::Activa
    }

    /// Can the candidate roster be changed in this state?
    pub fn roster_editable(self) -> bool {
        self == Self::Configuracion
    }

    /// Work out where `action` takes an election in this state.
    ///
    /// Returns `Ok(None)` if the action is already satisfied (re-invoking a transition is a
    /// no-op), `Ok(Some(target))` for a legal transition, and `InvalidTransition` otherwise.
    /// `Delete` has no target state and is never a no-op; it is legal only from `Cancelada`,
    /// which is returned as the target.
    pub fn apply(self, action: ElectionAction) -> Result<Option<ElectionState>, VoteError> {
        use ElectionAction::*;
        use ElectionState::*;

        match (self, action) {
            (Configuracion, Activate) => Ok(Some(Activa)),
            (Activa, Activate) => Ok(None),
            (Activa, Finalize) => Ok(Some(Finalizada)),
            (Finalizada, Finalize) => Ok(None),
            (Activa, Cancel) => Ok(Some(Cancelada)),
            (Cancelada, Cancel) => Ok(None),
            (Cancelada, Delete) => Ok(Some(Cancelada)),
            (from, action) => Err(VoteError::InvalidTransition { from, action }),
        }
    }
}

impl Display for ElectionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Configuracion => "configuracion",
            Self::Activa => "activa",
            Self::Finalizada => "finalizada",
            Self::Cancelada => "cancelada",
        };
        f.write_str(name)
    }
}

impl Display for ElectionAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Activate => "activate",
            Self::Finalize => "finalize",
            Self::Cancel => "cancel",
            Self::Delete => "delete",
        };
        f.write_str(name)
    }
}

impl From<ElectionState> for Bson {
    fn from(state: ElectionState) -> Self {
        to_bson(&state).expect("Serialisation is infallible")
    }
}
