use std::fmt;
use uuid::Uuid;

/// How an inbound message points at a payment: our id, or the provider's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentReference {
    Id(Uuid),
    External(String),
}

impl PaymentReference {
    /// UUIDs are our own ids; anything else is taken as a provider reference.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match Uuid::parse_str(raw) {
            Ok(id) => PaymentReference::Id(id),
            Err(_) => PaymentReference::External(raw.to_string()),
        }
    }
}

impl fmt::Display for PaymentReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentReference::Id(id) => write!(f, "{}", id),
            PaymentReference::External(external) => write!(f, "external:{}", external),
        }
    }
}

impl From<Uuid> for PaymentReference {
    fn from(id: Uuid) -> Self {
        PaymentReference::Id(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_prefers_uuid() {
        let id = Uuid::new_v4();
        assert_eq!(PaymentReference::parse(&id.to_string()), PaymentReference::Id(id));
        assert_eq!(
            PaymentReference::parse(" 1319834750 "),
            PaymentReference::External("1319834750".to_string())
        );
    }
}
