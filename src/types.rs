//! Identifiers, timestamps and the transaction type vocabulary
use super::error::WorkflowError;
use super::utils;
use chrono::{DateTime, TimeZone, Utc};
use std::str::FromStr;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

// Opaque string identifiers. Stored as plain CBOR text.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl<C> minicbor::Encode<C> for $name {
            fn encode<W: minicbor::encode::Write>(
                &self,
                e: &mut minicbor::Encoder<W>,
                _: &mut C,
            ) -> Result<(), minicbor::encode::Error<W::Error>> {
                e.str(&self.0)?.ok()
            }
        }

        impl<'b, C> minicbor::Decode<'b, C> for $name {
            fn decode(
                d: &mut minicbor::Decoder<'b>,
                _: &mut C,
            ) -> Result<Self, minicbor::decode::Error> {
                Ok(Self(d.str()?.to_owned()))
            }
        }
    };
}

string_id!(
    /// A user of the system, resolved to a role by the directory.
    PrincipalId
);
string_id!(ItemId);
string_id!(StoreroomId);
string_id!(
    /// bech32m encoded uuid7 with the `txn` prefix
    TransactionId
);

impl TransactionId {
    pub fn generate() -> Result<Self, WorkflowError> {
        utils::new_uuid_to_bech32("txn")
            .map(Self)
            .map_err(|e| WorkflowError::PersistenceFailure(format!("id allocation: {e}")))
    }
}

#[derive(
    minicbor::Encode,
    minicbor::Decode,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
)]
pub enum TransactionType {
    #[n(0)]
    Receipt,
    #[n(1)]
    Issuance,
    #[n(2)]
    Transfer,
    #[n(3)]
    Swap,
}

impl TransactionType {
    pub fn parse(value: &str) -> Result<Self, WorkflowError> {
        Self::from_str(value).map_err(|_| WorkflowError::UnknownTransactionType(value.to_owned()))
    }

    /// Prefix of the human readable transaction number.
    pub fn number_prefix(self) -> &'static str {
        match self {
            TransactionType::Receipt => "RCV",
            TransactionType::Issuance => "ISS",
            TransactionType::Transfer => "TRF",
            TransactionType::Swap => "SWP",
        }
    }

    pub fn transaction_number(self, sequence: u64) -> String {
        format!("{}-{:06}", self.number_prefix(), sequence)
    }
}
