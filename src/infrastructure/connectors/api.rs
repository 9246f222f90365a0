//! Cursor-paginated API connector
//!
//! Works for REST and GraphQL-over-GET suppliers alike: the profile
//! describes where the item array and the next-page cursor live in each
//! response, and the connector never interprets cursor contents.

use serde_json::Value;
use url::Url;

use async_trait::async_trait;

use crate::domain::connector::{
    AccountCredentials, CollectFilters, CollectedPage, ConnectorError, RawItem, SupplierConnector,
};
use crate::domain::record::{CollectionMethod, NormalizedFields};
use crate::infrastructure::config::{AuthType, SupplierProfile};
use crate::infrastructure::connectors::mapping;
use crate::infrastructure::http_client::{HttpClient, HttpClientConfig, HttpError};

pub struct ApiConnector {
    profile: SupplierProfile,
    credentials: AccountCredentials,
    http: HttpClient,
}

impl ApiConnector {
    pub fn new(
        profile: SupplierProfile,
        credentials: AccountCredentials,
    ) -> Result<Self, ConnectorError> {
        Url::parse(&profile.source)
            .map_err(|e| ConnectorError::Config(format!("invalid API base URL '{}': {e}", profile.source)))?;

        let http = HttpClient::new(HttpClientConfig {
            timeout_seconds: profile.timeout_seconds,
            max_retries: 1, // page-level retry belongs to the collector
            ..HttpClientConfig::default()
        })
        .map_err(|e| ConnectorError::Config(e.to_string()))?;

        Ok(Self {
            profile,
            credentials,
            http,
        })
    }

    fn auth_headers(&self) -> Result<Vec<(String, String)>, ConnectorError> {
        match &self.profile.auth_type {
            AuthType::None => Ok(Vec::new()),
            AuthType::Bearer => {
                let token = self.credentials.access_token.as_deref().ok_or_else(|| {
                    ConnectorError::Auth("bearer auth configured but no access token".to_string())
                })?;
                Ok(vec![("Authorization".to_string(), format!("Bearer {token}"))])
            }
            AuthType::ApiKey { header } => {
                let key = self.credentials.api_key.as_deref().ok_or_else(|| {
                    ConnectorError::Auth("api-key auth configured but no key".to_string())
                })?;
                Ok(vec![(header.clone(), key.to_string())])
            }
        }
    }

    fn page_url(&self, filters: &CollectFilters, cursor: Option<&str>) -> Result<String, ConnectorError> {
        let mut url = Url::parse(&self.profile.source)
            .map_err(|e| ConnectorError::Config(e.to_string()))?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(category) = &filters.category {
                query.append_pair("category", category);
            }
            if let Some(keyword) = &filters.keyword {
                query.append_pair("keyword", keyword);
            }
            if let Some(since) = &filters.updated_since {
                query.append_pair("updated_since", &since.to_rfc3339());
            }
            for (name, value) in &filters.extra {
                query.append_pair(name, value);
            }
            if let Some(cursor) = cursor {
                query.append_pair(&self.profile.api_pagination.cursor_param, cursor);
            }
        }
        Ok(url.into())
    }

    fn map_http_error(&self, err: HttpError, cursor: Option<&str>) -> ConnectorError {
        if err.is_auth() {
            ConnectorError::Auth(err.to_string())
        } else {
            ConnectorError::PageFetch {
                cursor: cursor.map(str::to_string),
                message: err.to_string(),
            }
        }
    }

    fn parse_page(&self, body: &Value) -> Result<CollectedPage, ConnectorError> {
        let pagination = &self.profile.api_pagination;

        let items = match mapping::lookup(body, &pagination.items_path) {
            Some(Value::Array(items)) => items.clone(),
            Some(_) => {
                return Err(ConnectorError::PageFetch {
                    cursor: None,
                    message: format!("'{}' is not an array", pagination.items_path),
                })
            }
            None => Vec::new(),
        };

        let next_cursor = mapping::lookup(body, &pagination.cursor_path).and_then(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

        let has_more = match &pagination.has_more_path {
            Some(path) => mapping::lookup(body, path).and_then(Value::as_bool).unwrap_or(false),
            None => next_cursor.is_some(),
        };

        Ok(CollectedPage {
            items,
            next_cursor,
            has_more,
        })
    }
}

#[async_trait]
impl SupplierConnector for ApiConnector {
    fn supplier_id(&self) -> &str {
        &self.profile.supplier_id
    }

    fn collection_method(&self) -> CollectionMethod {
        CollectionMethod::Api
    }

    fn collection_source(&self) -> String {
        self.profile.source.clone()
    }

    async fn collect_products(
        &self,
        filters: &CollectFilters,
        cursor: Option<&str>,
    ) -> Result<CollectedPage, ConnectorError> {
        let headers = self.auth_headers()?;
        let url = self.page_url(filters, cursor)?;

        let body = self
            .http
            .get_json(&url, &headers)
            .await
            .map_err(|e| self.map_http_error(e, cursor))?;

        self.parse_page(&body)
    }

    fn transform_product(&self, raw: &RawItem) -> Result<NormalizedFields, ConnectorError> {
        mapping::transform_with_mapping(raw, &self.profile.field_mapping)
    }

    async fn validate_credentials(&self) -> Result<bool, ConnectorError> {
        let headers = self.auth_headers()?;
        let url = self.page_url(&CollectFilters::default(), None)?;

        match self.http.get_json(&url, &headers).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_auth() => Ok(false),
            Err(e) => Err(ConnectorError::PageFetch {
                cursor: None,
                message: e.to_string(),
            }),
        }
    }
}
