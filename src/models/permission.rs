pub const MOVIES_READ: &str = "movies:read";
pub const MOVIES_WRITE: &str = "movies:write";

/// Every permission code that can be granted.
pub const KNOWN_PERMISSIONS: &[&str] = &[MOVIES_READ, MOVIES_WRITE];

/// Snapshot of the codes held by one user at lookup time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permissions(Vec<String>);

impl Permissions {
    pub fn new(codes: Vec<String>) -> Self {
        Permissions(codes)
    }

    pub fn include(&self, code: &str) -> bool {
        self.0.iter().any(|c| c == code)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn codes(&self) -> &[String] {
        &self.0
    }
}

impl FromIterator<String> for Permissions {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Permissions(iter.into_iter().collect())
    }
}

pub fn is_known_permission(code: &str) -> bool {
    KNOWN_PERMISSIONS.contains(&code)
}
