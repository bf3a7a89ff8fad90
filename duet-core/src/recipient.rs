use crate::Identity;

/// The other party of a chat as seen by the local identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Recipient {
    /// The local identity is a member and the other member is determined.
    Known(Identity),
    /// Best-effort guess: the local identity is not known yet, or is not
    /// a member of the chat. Holds the first member.
    Provisional(Identity),
    /// No other party can be derived from the membership.
    Unresolved,
}

impl Recipient {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Known(identity) | Self::Provisional(identity) => Some(identity),
            Self::Unresolved => None,
        }
    }

    pub fn into_identity(self) -> Option<Identity> {
        match self {
            Self::Known(identity) | Self::Provisional(identity) => Some(identity),
            Self::Unresolved => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }
}

/// Returns the member of `members` that is not `me`.
///
/// Membership is unordered in meaning, so the position of `me` does not
/// matter. Without `me` the first member is returned as [`Recipient::Provisional`].
pub fn resolve_recipient(members: &[Identity], me: Option<&Identity>) -> Recipient {
    if members.len() < 2 {
        return Recipient::Unresolved;
    }
    let Some(me) = me else {
        return Recipient::Provisional(members[0].clone());
    };
    let Some(other) = members.iter().find(|member| *member != me) else {
        return Recipient::Unresolved;
    };
    if members.contains(me) {
        Recipient::Known(other.clone())
    } else {
        Recipient::Provisional(other.clone())
    }
}
