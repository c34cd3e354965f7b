use crate::{SubjectId, SubjectIdRef};

/// The authenticated identity attached to a request or session
///
/// A principal without a subject claim is an anonymous caller. That is a
/// normal state, not an error: token operations for anonymous principals
/// are no-ops that report no credential.
///
/// Principals are always passed explicitly through the call chain. Nothing
/// in this workspace resolves an identity from ambient or thread-local
/// state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    subject: Option<SubjectId>,
}

impl Principal {
    /// An unauthenticated principal
    pub const fn anonymous() -> Self {
        Self { subject: None }
    }

    /// A principal carrying the subject claim of an authenticated user
    pub fn authenticated(subject: SubjectId) -> Self {
        Self {
            subject: Some(subject),
        }
    }

    /// The subject claim, if the principal is authenticated
    pub fn subject(&self) -> Option<&SubjectIdRef> {
        self.subject.as_deref()
    }
}
