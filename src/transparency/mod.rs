//! Public draw transparency.

pub mod service;

pub use service::{
    AuditFailure, AuditReport, DrawDisclosure, TransparencyError, TransparencyQueryService,
};
