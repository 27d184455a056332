use crate::models::Permissions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

/// Allows exactly when `code` is among the principal's permissions. A missing
/// code and an empty set are denied the same way.
pub fn require(permissions: &Permissions, code: &str) -> Decision {
    if permissions.include(code) {
        Decision::Allow
    } else {
        Decision::Deny
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::permission::{MOVIES_READ, MOVIES_WRITE};

    #[test]
    fn test_allows_held_codes_only() {
        let perms = Permissions::new(vec![MOVIES_READ.to_string()]);
        assert_eq!(require(&perms, MOVIES_READ), Decision::Allow);
        assert_eq!(require(&perms, MOVIES_WRITE), Decision::Deny);
    }

    #[test]
    fn test_empty_set_denies() {
        assert_eq!(require(&Permissions::default(), MOVIES_READ), Decision::Deny);
    }
}
