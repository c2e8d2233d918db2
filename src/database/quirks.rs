//! Driver-family quirk tables.
//!
//! Quirks are data, not control flow: each family maps to an ordered list of
//! connection-time attributes and a couple of capability flags. ProvideX
//! drivers reject attribute changes after connect and require autocommit to
//! be fixed at connection time, so their sequence puts autocommit first and
//! nothing is ever altered post-open.

use crate::config::DriverFamily;
use crate::database::driver::ConnectAttr;

/// Connection-time attribute sequence for a family.
///
/// The returned order is driver-mandated and must be applied verbatim during
/// the open call, before any statement is issued.
pub fn connect_attrs(family: DriverFamily, readonly: bool, login_timeout: u32) -> Vec<ConnectAttr> {
    match family {
        // Order-sensitive: autocommit must be set first, at connect time.
        DriverFamily::Providex => vec![
            ConnectAttr::AutoCommit(true),
            ConnectAttr::ReadOnly(readonly),
            ConnectAttr::LoginTimeout(login_timeout),
        ],
        DriverFamily::Generic | DriverFamily::Sqlite => vec![
            ConnectAttr::LoginTimeout(login_timeout),
            ConnectAttr::ReadOnly(readonly),
            ConnectAttr::AutoCommit(!readonly),
        ],
    }
}

/// Whether the family's driver implements the standard catalog-metadata
/// calls. Non-compliant families go straight to the portable SQL fallback.
pub fn catalog_compliant(family: DriverFamily) -> bool {
    !matches!(family, DriverFamily::Providex)
}
