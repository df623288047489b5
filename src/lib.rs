//! School Desk: client for a small school's records service.
//!
//! Attendance reconciliation, the fee ledger, marks entry and PDF fee
//! receipts, on top of an explicit sign-in session. The records service
//! owns persistence and business rules; this crate validates input, calls
//! it, and merges its answers with un-submitted local edits.

pub mod api;
pub mod attendance;
pub mod config;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod marks;
pub mod models;
pub mod receipt;
pub mod roster;
pub mod session;
pub mod storage;

pub use api::ApiClient;
pub use attendance::{resolve_status, AttendanceBook, BatchReport, OverridePolicy};
pub use config::AppConfig;
pub use error::{DeskError, Result};
pub use ledger::{remaining_due, FeeSummary};
pub use session::{authorize, login, logout, Access, Credentials, Route, Session};
pub use storage::{KeyringStore, MemoryStore, SessionStore};
