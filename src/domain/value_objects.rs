use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::{Uuid, Version};

use super::error::{PaymentError, PaymentResult};

/// Declares a UUIDv4-backed identifier that validates on parse.
macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident, $field:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(Uuid);

        impl $name {
            pub fn new(value: Uuid) -> PaymentResult<Self> {
                if value.get_version() != Some(Version::Random) {
                    return Err(PaymentError::InvalidIdentifier {
                        field: $field,
                        value: value.to_string(),
                    });
                }
                Ok(Self(value))
            }

            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn parse(raw: &str) -> PaymentResult<Self> {
                let value = Uuid::parse_str(raw.trim()).map_err(|_| {
                    PaymentError::InvalidIdentifier {
                        field: $field,
                        value: raw.to_string(),
                    }
                })?;
                Self::new(value)
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = PaymentError;

            fn try_from(raw: String) -> PaymentResult<Self> {
                Self::parse(&raw)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> String {
                value.0.to_string()
            }
        }
    };
}

uuid_identifier!(
    /// Caller-supplied token that makes payment creation safe to repeat.
    IdempotencyKey,
    "idempotency_key"
);

uuid_identifier!(
    /// Shopping session the payment is charged for.
    SessionId,
    "session_id"
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Canceled,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::Canceled => "CANCELED",
            Self::Refunded => "REFUNDED",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PAID" => Ok(Self::Paid),
            "CANCELED" => Ok(Self::Canceled),
            "REFUNDED" => Ok(Self::Refunded),
            other => Err(PaymentError::InvalidStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentType {
    Pix,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pix => "PIX",
        }
    }
}

impl fmt::Display for PaymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentType {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PIX" => Ok(Self::Pix),
            other => Err(PaymentError::InvalidType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderName {
    MercadoPago,
}

impl ProviderName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MercadoPago => "MERCADO_PAGO",
        }
    }
}

impl fmt::Display for ProviderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderName {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MERCADO_PAGO" => Ok(Self::MercadoPago),
            other => Err(PaymentError::UnknownProvider(other.to_string())),
        }
    }
}

/// Where the payment lives on the provider side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentProviderRef {
    provider: ProviderName,
    external_payment_id: String,
}

impl PaymentProviderRef {
    pub fn new(provider: ProviderName, external_payment_id: impl Into<String>) -> PaymentResult<Self> {
        let external_payment_id = external_payment_id.into();
        if external_payment_id.trim().is_empty() {
            return Err(PaymentError::InvalidIdentifier {
                field: "external_payment_id",
                value: external_payment_id,
            });
        }
        Ok(Self {
            provider,
            external_payment_id,
        })
    }

    pub fn provider(&self) -> ProviderName {
        self.provider
    }

    pub fn external_payment_id(&self) -> &str {
        &self.external_payment_id
    }
}

/// PIX-specific payload attached to a payment. Has no lifecycle of its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDetail {
    id: Uuid,
    payment_id: Uuid,
    qr_code: String,
}

impl PaymentDetail {
    pub fn pix(payment_id: Uuid, qr_code: impl Into<String>) -> PaymentResult<Self> {
        Self::from_persistence(Uuid::new_v4(), payment_id, qr_code)
    }

    pub fn from_persistence(
        id: Uuid,
        payment_id: Uuid,
        qr_code: impl Into<String>,
    ) -> PaymentResult<Self> {
        let qr_code = qr_code.into();
        if qr_code.trim().is_empty() {
            return Err(PaymentError::InvalidQrCode);
        }
        Ok(Self {
            id,
            payment_id,
            qr_code,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn payment_id(&self) -> Uuid {
        self.payment_id
    }

    pub fn qr_code(&self) -> &str {
        &self.qr_code
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idempotency_key_accepts_v4() {
        let raw = "5b0a4f7e-9c2d-4e8b-a1f3-2d6c8e9b7a10";
        let key = IdempotencyKey::parse(raw).unwrap();
        assert_eq!(key.to_string(), raw);
    }

    #[test]
    fn test_idempotency_key_rejects_garbage() {
        let err = IdempotencyKey::parse("not-a-uuid").unwrap_err();
        assert!(matches!(
            err,
            PaymentError::InvalidIdentifier {
                field: "idempotency_key",
                ..
            }
        ));
    }

    #[test]
    fn test_session_id_rejects_non_v4() {
        // version 1 (time-based) uuid
        let err = SessionId::parse("c232ab00-9414-11ec-b3c8-9f6bdeced846").unwrap_err();
        assert!(matches!(err, PaymentError::InvalidIdentifier { field: "session_id", .. }));
    }

    #[test]
    fn test_identifier_deserializes_from_string() {
        let key: IdempotencyKey =
            serde_json::from_str("\"5b0a4f7e-9c2d-4e8b-a1f3-2d6c8e9b7a10\"").unwrap();
        assert_eq!(key.to_string(), "5b0a4f7e-9c2d-4e8b-a1f3-2d6c8e9b7a10");
        assert!(serde_json::from_str::<IdempotencyKey>("\"abc\"").is_err());
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("PAID".parse::<PaymentStatus>().unwrap(), PaymentStatus::Paid);
        assert!(matches!(
            "SETTLED".parse::<PaymentStatus>(),
            Err(PaymentError::InvalidStatus(_))
        ));
    }

    #[test]
    fn test_provider_rejects_unknown_name() {
        assert_eq!(
            "MERCADO_PAGO".parse::<ProviderName>().unwrap(),
            ProviderName::MercadoPago
        );
        assert_eq!(
            "STRIPE".parse::<ProviderName>().unwrap_err(),
            PaymentError::UnknownProvider("STRIPE".to_string())
        );
    }

    #[test]
    fn test_provider_ref_requires_external_id() {
        assert!(PaymentProviderRef::new(ProviderName::MercadoPago, " ").is_err());
    }

    #[test]
    fn test_detail_requires_qr_code() {
        assert_eq!(
            PaymentDetail::pix(Uuid::new_v4(), "").unwrap_err(),
            PaymentError::InvalidQrCode
        );
    }
}
