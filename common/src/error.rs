use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DslError {
    #[error("Unbalanced legs for asset {asset}: debits {debits}, credits {credits}")]
    Unbalanced {
        asset: String,
        debits: Decimal,
        credits: Decimal,
    },

    #[error("A value movement needs at least one source and one destination leg")]
    MissingLeg,

    #[error("Amount and share are mutually exclusive on leg {account}")]
    AmbiguousLegAmount { account: String },

    #[error("Leg {account} carries neither an amount nor a share")]
    MissingLegAmount { account: String },

    #[error("Total of leg amounts {total} does not match the declared value {value}")]
    TotalMismatch { total: Decimal, value: Decimal },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetadataError {
    #[error("Metadata key \"{0}\" exceeds the maximum length")]
    KeyTooLong(String),

    #[error("Metadata value for key \"{0}\" exceeds the maximum length")]
    ValueTooLong(String),
}
