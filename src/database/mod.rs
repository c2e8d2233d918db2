//! Connection brokering and query execution.
//!
//! The [`driver`] module defines the capability seam; everything above it
//! (registry, sessions, executor, catalog) is driver-agnostic. The real
//! ODBC adapter lives behind the `odbc` feature so the crate builds and
//! tests without a driver manager installed.

pub mod catalog;
pub mod driver;
pub mod executor;
pub mod quirks;
pub mod registry;
pub mod result;
pub mod session;

#[cfg(feature = "odbc")]
pub mod odbc;

#[cfg(test)]
pub(crate) mod fake;

pub use catalog::CatalogIntrospector;
pub use driver::{ConnectAttr, Driver, DriverSession, DsnInfo, ServerInfo};
pub use executor::{QueryExecutor, QueryRequest};
pub use registry::{ProfileRegistry, ProfileSummary};
pub use result::{
    CellValue, Column, ColumnDescriptor, FetchOutcome, PortableType, QueryResult, TableDescriptor,
};
pub use session::{SessionHandle, SessionManager};
