//! Web-crawling connector
//!
//! For suppliers with neither API nor export: scrape their public listing
//! pages. The cursor is the page number as text; a page reports
//! `has_more` only while the configured next-page selector matches.

use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use crate::domain::connector::{
    CollectFilters, CollectedPage, ConnectorError, RawItem, SupplierConnector,
};
use crate::domain::record::{CollectionMethod, NormalizedFields};
use crate::infrastructure::config::{SupplierProfile, WebSelectors};
use crate::infrastructure::connectors::mapping;
use crate::infrastructure::http_client::{HttpClient, HttpClientConfig};

pub struct WebCrawlingConnector {
    profile: SupplierProfile,
    product: Selector,
    title: Selector,
    price: Selector,
    image: Option<Selector>,
    link: Option<Selector>,
    next_page: Option<Selector>,
    http: HttpClient,
    price_pattern: Regex,
}

fn parse_selector(label: &str, css: &str) -> Result<Selector, ConnectorError> {
    Selector::parse(css)
        .map_err(|e| ConnectorError::Config(format!("bad {label} selector '{css}': {e}")))
}

impl WebCrawlingConnector {
    pub fn new(profile: SupplierProfile) -> Result<Self, ConnectorError> {
        Url::parse(&profile.source).map_err(|e| {
            ConnectorError::Config(format!("invalid listing URL '{}': {e}", profile.source))
        })?;
        let selectors: WebSelectors = profile
            .web_selectors
            .clone()
            .ok_or_else(|| ConnectorError::Config("web connector needs selectors".to_string()))?;

        // Selectors are parsed once here, so a bad profile fails at
        // construction instead of on page N
        let product = parse_selector("product", &selectors.product)?;
        let title = parse_selector("title", &selectors.title)?;
        let price = parse_selector("price", &selectors.price)?;
        let image = selectors
            .image
            .as_deref()
            .map(|css| parse_selector("image", css))
            .transpose()?;
        let link = selectors
            .link
            .as_deref()
            .map(|css| parse_selector("link", css))
            .transpose()?;
        let next_page = selectors
            .next_page
            .as_deref()
            .map(|css| parse_selector("next_page", css))
            .transpose()?;

        let http = HttpClient::new(HttpClientConfig {
            timeout_seconds: profile.timeout_seconds,
            max_retries: 1,
            ..HttpClientConfig::default()
        })
        .map_err(|e| ConnectorError::Config(e.to_string()))?;

        let price_pattern = Regex::new(r"\d[\d,.]*").map_err(|e| ConnectorError::Config(e.to_string()))?;

        Ok(Self {
            profile,
            product,
            title,
            price,
            image,
            link,
            next_page,
            http,
            price_pattern,
        })
    }

    fn page_url(&self, page: u32) -> Result<String, ConnectorError> {
        let mut url = Url::parse(&self.profile.source)
            .map_err(|e| ConnectorError::Config(e.to_string()))?;
        url.query_pairs_mut().append_pair("page", &page.to_string());
        Ok(url.into())
    }

    fn extract_price(&self, text: &str) -> Option<f64> {
        let matched = self.price_pattern.find(text)?;
        mapping::parse_loose_number(matched.as_str())
    }

    /// Parse one listing page into raw items. Synchronous: `Html` is not
    /// `Send`, so it must not live across an await point.
    fn parse_listing(&self, body: &str, page_url: &str) -> Vec<RawItem> {
        let document = Html::parse_document(body);

        let mut items = Vec::new();
        for card in document.select(&self.product) {
            let title_text = card
                .select(&self.title)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string());
            let price_value = card
                .select(&self.price)
                .next()
                .map(|el| el.text().collect::<String>())
                .and_then(|text| self.extract_price(&text));

            let image_url = self.image.as_ref().and_then(|sel| {
                card.select(sel)
                    .next()
                    .and_then(|el| el.value().attr("src").or_else(|| el.value().attr("data-src")))
                    .map(str::to_string)
            });
            let product_url = self.link.as_ref().and_then(|sel| {
                card.select(sel)
                    .next()
                    .and_then(|el| el.value().attr("href"))
                    .and_then(|href| Url::parse(page_url).ok()?.join(href).ok())
                    .map(String::from)
            });

            let (Some(title_text), Some(price_value)) = (title_text, price_value) else {
                // Cards without title or price are navigation chrome, skip
                continue;
            };

            items.push(json!({
                "title": title_text,
                "price": price_value,
                "images": image_url.map(|u| json!([u])).unwrap_or_else(|| json!([])),
                "url": product_url,
            }));
        }
        items
    }

    fn has_next_page(&self, body: &str) -> bool {
        let Some(selector) = &self.next_page else {
            return false;
        };
        Html::parse_document(body).select(selector).next().is_some()
    }
}

#[async_trait]
impl SupplierConnector for WebCrawlingConnector {
    fn supplier_id(&self) -> &str {
        &self.profile.supplier_id
    }

    fn collection_method(&self) -> CollectionMethod {
        CollectionMethod::WebCrawling
    }

    fn collection_source(&self) -> String {
        self.profile.source.clone()
    }

    async fn collect_products(
        &self,
        _filters: &CollectFilters,
        cursor: Option<&str>,
    ) -> Result<CollectedPage, ConnectorError> {
        let page: u32 = match cursor {
            Some(text) => text.parse().map_err(|_| ConnectorError::PageFetch {
                cursor: Some(text.to_string()),
                message: format!("web cursor must be a page number, got '{text}'"),
            })?,
            None => 1,
        };

        let url = self.page_url(page)?;
        let body = self
            .http
            .get_text(&url, &[])
            .await
            .map_err(|e| ConnectorError::PageFetch {
                cursor: cursor.map(str::to_string),
                message: e.to_string(),
            })?;

        let items = self.parse_listing(&body, &url);
        let has_more = !items.is_empty() && self.has_next_page(&body);
        debug!(supplier = %self.profile.supplier_id, page, items = items.len(), has_more, "listing page parsed");

        Ok(CollectedPage {
            items,
            next_cursor: has_more.then(|| (page + 1).to_string()),
            has_more,
        })
    }

    fn transform_product(&self, raw: &RawItem) -> Result<NormalizedFields, ConnectorError> {
        mapping::transform_with_mapping(raw, &self.profile.field_mapping)
    }

    async fn validate_credentials(&self) -> Result<bool, ConnectorError> {
        // Public listing pages carry no credentials; reachability is the check.
        match self.http.get_text(&self.page_url(1)?, &[]).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_auth() => Ok(false),
            Err(e) => Err(ConnectorError::PageFetch {
                cursor: None,
                message: e.to_string(),
            }),
        }
    }
}
