//! UUID utilities

use uuid::Uuid;

use crate::{Error, Result};

/// Generate a new UUIDv4
pub fn generate() -> Uuid {
    Uuid::new_v4()
}

/// Parse a UUID read from a TEXT column or received from an external system
pub fn parse(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s.trim()).map_err(|_| Error::malformed("id", s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trip() {
        let id = generate();
        assert_eq!(parse(&id.to_string()).unwrap(), id);
        assert_eq!(parse(&format!(" {} ", id)).unwrap(), id);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(parse("shift-1"), Err(Error::Malformed { kind: "id", .. })));
    }
}
