//! Connector implementations and the factory that selects one
//!
//! Three connector kinds cover every supplier: cursor-paginated API,
//! spreadsheet export, and listing-page crawling. A connector is a
//! transport plus a field-mapping profile, so the factory is a plain
//! match on the profile's collection method.

pub mod api;
pub mod excel;
pub mod mapping;
pub mod web;

use std::sync::Arc;

use crate::domain::connector::{AccountCredentials, ConnectorError, SupplierConnector};
use crate::domain::record::CollectionMethod;
use crate::infrastructure::config::SupplierProfile;

pub use api::ApiConnector;
pub use excel::ExcelConnector;
pub use web::WebCrawlingConnector;

/// Build the connector for a supplier profile.
pub fn build_connector(
    profile: &SupplierProfile,
    credentials: &AccountCredentials,
) -> Result<Arc<dyn SupplierConnector>, ConnectorError> {
    match profile.collection_method {
        CollectionMethod::Api => Ok(Arc::new(ApiConnector::new(
            profile.clone(),
            credentials.clone(),
        )?)),
        CollectionMethod::Excel => Ok(Arc::new(ExcelConnector::new(profile.clone())?)),
        CollectionMethod::WebCrawling => Ok(Arc::new(WebCrawlingConnector::new(profile.clone())?)),
    }
}

/// Seam for constructing connectors, so orchestration code takes test
/// doubles instead of hitting real transports.
pub trait ConnectorFactory: Send + Sync {
    fn build(
        &self,
        profile: &SupplierProfile,
        credentials: &AccountCredentials,
    ) -> Result<Arc<dyn SupplierConnector>, ConnectorError>;
}

/// Production factory: dispatch on the profile's collection method.
#[derive(Debug, Default)]
pub struct DefaultConnectorFactory;

impl ConnectorFactory for DefaultConnectorFactory {
    fn build(
        &self,
        profile: &SupplierProfile,
        credentials: &AccountCredentials,
    ) -> Result<Arc<dyn SupplierConnector>, ConnectorError> {
        build_connector(profile, credentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_selects_by_collection_method() {
        let profile = SupplierProfile::new(
            "acme",
            "Acme",
            CollectionMethod::Api,
            "https://api.acme.test/products",
        );
        let connector = build_connector(&profile, &AccountCredentials::default()).unwrap();
        assert_eq!(connector.collection_method(), CollectionMethod::Api);

        let profile = SupplierProfile::new("sheet", "Sheet", CollectionMethod::Excel, "/tmp/x.csv");
        let connector = build_connector(&profile, &AccountCredentials::default()).unwrap();
        assert_eq!(connector.collection_method(), CollectionMethod::Excel);
    }

    #[test]
    fn web_profile_without_selectors_fails_construction() {
        let profile = SupplierProfile::new(
            "scrape",
            "Scrape",
            CollectionMethod::WebCrawling,
            "https://shop.test/list",
        );
        assert!(build_connector(&profile, &AccountCredentials::default()).is_err());
    }
}
