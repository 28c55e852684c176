/// Authorization context a request runs under
///
/// `InternalPrivileged` bypasses read grants; the hub uses it for its own
/// lookups (previous card state, authoritative card field lists).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Session {
    InternalPrivileged,
    User { id: String },
}

impl Session {
    pub fn user(id: impl Into<String>) -> Self {
        Session::User { id: id.into() }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Session::User { id } => Some(id),
            Session::InternalPrivileged => None,
        }
    }

    pub fn is_privileged(&self) -> bool {
        matches!(self, Session::InternalPrivileged)
    }
}
