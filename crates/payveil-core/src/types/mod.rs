//! Core data types for confidential records.

pub mod identifiers;
pub mod record;

pub use identifiers::{ActorId, ContractContext, EncryptedHandle, RecordId};
pub use record::{
    ConfidentialRecord, CreateRecordInput, Disclosure, LifecycleStatus, OperationKind,
    ValidatedCreate,
};
