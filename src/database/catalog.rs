//! Catalog introspection with fallbacks for non-compliant drivers.
//!
//! The native ODBC catalog functions are tried first. Drivers whose family
//! is known to misreport catalog data (ProvideX) skip straight to the
//! portable fallbacks: an `INFORMATION_SCHEMA` query for tables and a
//! zero-row probe (`SELECT * FROM t WHERE 1=0`) for column metadata.

use crate::config::ConnectionProfile;
use crate::database::quirks;
use crate::database::result::{ColumnDescriptor, TableDescriptor};
use crate::database::session::SessionManager;
use crate::error::{DatabaseError, DbResult};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

/// Table names accepted for interpolation into a probe statement.
/// Dotted qualification is allowed, arbitrary punctuation is not.
static TABLE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_$#]*(\.[A-Za-z_][A-Za-z0-9_$#]*){0,2}$").unwrap());

const TABLES_FALLBACK_SQL: &str =
    "SELECT TABLE_CATALOG, TABLE_SCHEMA, TABLE_NAME, TABLE_TYPE FROM INFORMATION_SCHEMA.TABLES";

/// Lists tables and describes columns for a connection.
pub struct CatalogIntrospector {
    sessions: Arc<SessionManager>,
}

impl CatalogIntrospector {
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        Self { sessions }
    }

    /// Lists user-visible tables and views.
    pub async fn list_tables(&self, profile: &ConnectionProfile) -> DbResult<Vec<TableDescriptor>> {
        let handle = self.sessions.get_or_open(profile).await?;
        let _exec = handle.lock_exec().await;

        if quirks::catalog_compliant(profile.driver_family) {
            match handle.session().tables().await {
                Ok(tables) => return Ok(tables),
                Err(err) => {
                    debug!(connection = %profile.name, error = %err, "Catalog table listing failed, using fallback query");
                }
            }
        }

        let outcome = handle.session().run(TABLES_FALLBACK_SQL, usize::MAX).await?;
        let idx = |name: &str| {
            outcome
                .columns
                .iter()
                .position(|c| c.name.eq_ignore_ascii_case(name))
        };
        let (cat, sch, nam, typ) = (
            idx("TABLE_CATALOG"),
            idx("TABLE_SCHEMA"),
            idx("TABLE_NAME"),
            idx("TABLE_TYPE"),
        );
        let cell = |row: &[crate::database::result::CellValue], i: Option<usize>| {
            i.and_then(|i| row.get(i))
                .and_then(|c| c.as_str().map(str::to_owned))
                .unwrap_or_default()
        };
        Ok(outcome
            .rows
            .iter()
            .filter_map(|row| {
                let name = cell(row, nam);
                if name.is_empty() {
                    return None;
                }
                let table_type = match cell(row, typ) {
                    t if t.is_empty() => "TABLE".to_string(),
                    t => t,
                };
                Some(TableDescriptor {
                    catalog: cell(row, cat),
                    schema: cell(row, sch),
                    name,
                    table_type,
                })
            })
            .collect())
    }

    /// Describes the columns of `table`.
    ///
    /// # Errors
    ///
    /// [`DatabaseError::TableNotFound`] when neither the catalog functions
    /// nor the probe query can see the table.
    pub async fn table_schema(
        &self,
        profile: &ConnectionProfile,
        table: &str,
    ) -> DbResult<Vec<ColumnDescriptor>> {
        if !TABLE_NAME.is_match(table) {
            return Err(DatabaseError::TableNotFound(table.to_string()));
        }

        let handle = self.sessions.get_or_open(profile).await?;
        let _exec = handle.lock_exec().await;

        if quirks::catalog_compliant(profile.driver_family) {
            match handle.session().columns(table).await {
                Ok(columns) if !columns.is_empty() => return Ok(columns),
                Ok(_) => {
                    debug!(connection = %profile.name, table, "Catalog reported no columns, probing");
                }
                Err(err) => {
                    debug!(connection = %profile.name, table, error = %err, "Catalog column lookup failed, probing");
                }
            }
        }

        // Zero-row probe: the result set description carries the schema.
        let probe = format!("SELECT * FROM {table} WHERE 1=0");
        let outcome = handle
            .session()
            .run(&probe, 0)
            .await
            .map_err(|_| DatabaseError::TableNotFound(table.to_string()))?;
        if outcome.columns.is_empty() {
            return Err(DatabaseError::TableNotFound(table.to_string()));
        }
        Ok(outcome
            .columns
            .iter()
            .enumerate()
            .map(|(i, col)| ColumnDescriptor {
                name: col.name.clone(),
                declared_type: col.declared_type.clone(),
                // The probe cannot see constraints; assume nullable.
                nullable: true,
                ordinal: i + 1,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriverFamily;
    use crate::database::driver::Driver;
    use crate::database::fake::{FakeDriver, FakeTable};

    fn setup(profile: &ConnectionProfile) -> (Arc<FakeDriver>, CatalogIntrospector) {
        let driver = Arc::new(FakeDriver::new());
        driver.add_table(
            &profile.name,
            FakeTable::new("customers", &[("id", "INTEGER"), ("name", "VARCHAR(64)")]),
        );
        driver.add_table(&profile.name, FakeTable::new("orders", &[("id", "INTEGER")]));
        let sessions = Arc::new(SessionManager::new(driver.clone() as Arc<dyn Driver>));
        (driver, CatalogIntrospector::new(sessions))
    }

    #[tokio::test]
    async fn test_list_tables_native() {
        let profile = ConnectionProfile::builder("db").dsn("D").build().unwrap();
        let (_, catalog) = setup(&profile);

        let tables = catalog.list_tables(&profile).await.unwrap();
        let names: Vec<_> = tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["customers", "orders"]);
    }

    #[tokio::test]
    async fn test_list_tables_falls_back_when_catalog_unsupported() {
        let profile = ConnectionProfile::builder("db").dsn("D").build().unwrap();
        let (driver, catalog) = setup(&profile);
        driver.set_catalog_supported(false);

        let tables = catalog.list_tables(&profile).await.unwrap();
        assert_eq!(tables.len(), 2);
        assert!(driver.query_count() >= 1, "fallback must run a query");
    }

    #[tokio::test]
    async fn test_providex_family_skips_catalog_functions() {
        let profile = ConnectionProfile::builder("sage100")
            .dsn("SOTAMAS90")
            .driver_family(DriverFamily::Providex)
            .build()
            .unwrap();
        let (driver, catalog) = setup(&profile);

        let tables = catalog.list_tables(&profile).await.unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(
            driver.catalog_call_count(),
            0,
            "catalog functions must not be called for providex"
        );
    }

    #[tokio::test]
    async fn test_table_schema_native() {
        let profile = ConnectionProfile::builder("db").dsn("D").build().unwrap();
        let (_, catalog) = setup(&profile);

        let columns = catalog.table_schema(&profile, "customers").await.unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].name, "id");
        assert_eq!(columns[1].declared_type, "VARCHAR(64)");
    }

    #[tokio::test]
    async fn test_table_schema_via_probe() {
        let profile = ConnectionProfile::builder("db").dsn("D").build().unwrap();
        let (driver, catalog) = setup(&profile);
        driver.set_catalog_supported(false);

        let columns = catalog.table_schema(&profile, "customers").await.unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].ordinal, 1);
        assert_eq!(columns[1].ordinal, 2);
    }

    #[tokio::test]
    async fn test_missing_table_is_table_not_found() {
        let profile = ConnectionProfile::builder("db").dsn("D").build().unwrap();
        let (_, catalog) = setup(&profile);

        let err = catalog.table_schema(&profile, "no_such").await.unwrap_err();
        assert!(matches!(err, DatabaseError::TableNotFound(name) if name == "no_such"));
    }

    #[tokio::test]
    async fn test_hostile_table_name_rejected_without_probe() {
        let profile = ConnectionProfile::builder("db").dsn("D").build().unwrap();
        let (driver, catalog) = setup(&profile);

        let err = catalog
            .table_schema(&profile, "t; DROP TABLE t")
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::TableNotFound(_)));
        assert_eq!(driver.query_count(), 0);
        assert_eq!(driver.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_qualified_name_accepted() {
        assert!(TABLE_NAME.is_match("dbo.Customers"));
        assert!(TABLE_NAME.is_match("main.dbo.Customers"));
        assert!(!TABLE_NAME.is_match("a.b.c.d"));
        assert!(!TABLE_NAME.is_match("1table"));
        assert!(!TABLE_NAME.is_match(""));
    }
}
