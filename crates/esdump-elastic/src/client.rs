//! Scroll-based [`SearchClient`] for Elasticsearch-compatible clusters.

use esdump_core::{ExportError, Page, PageRequest, SearchClient};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::config::ElasticConfig;
use crate::http::{SHARED_RUNTIME, build_client, transport_error};
use crate::response::{CatIndex, CountResponse, SearchResponse, classify};

/// Blocking client over the cluster's REST API.
///
/// Cheap to share by reference across slice workers; all requests go
/// through one connection pool.
pub struct ElasticClient {
    http: reqwest::Client,
    config: ElasticConfig,
}

impl ElasticClient {
    pub fn new(config: ElasticConfig) -> Result<Self, ExportError> {
        if config.username.is_some() && config.password.is_none() {
            return Err(ExportError::Authentication(
                "username given without password".into(),
            ));
        }
        let http = build_client(&config)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ElasticConfig {
        &self.config
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{path}", self.config.base_url());
        let builder = self
            .http
            .request(method, url)
            .timeout(self.config.request_timeout);
        match &self.config.username {
            Some(user) => builder.basic_auth(user, self.config.password.as_deref()),
            None => builder,
        }
    }

    /// Send and return the raw body of a success response.
    fn send(&self, builder: RequestBuilder, index: &str) -> Result<Vec<u8>, ExportError> {
        SHARED_RUNTIME.handle().block_on(async {
            let response = builder.send().await.map_err(transport_error)?;
            let status = response.status();
            let body = response.bytes().await.map_err(transport_error)?;
            if status.is_success() {
                Ok(body.to_vec())
            } else {
                Err(classify(status.as_u16(), &body, index))
            }
        })
    }

    fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        index: &str,
    ) -> Result<T, ExportError> {
        let body = self.send(builder, index)?;
        serde_json::from_slice(&body).map_err(|e| ExportError::Decode(e.to_string()))
    }

    fn open_slice(&self, request: &PageRequest<'_>) -> Result<SearchResponse, ExportError> {
        let mut body = json!({
            "size": request.page_size,
            "sort": ["_doc"],
            "query": {"match_all": {}},
        });
        // A single-slice clause is rejected by the service ("max must be greater than 1")
        if request.slice_max > 1 {
            body["slice"] = json!({"id": request.slice_id, "max": request.slice_max});
        }
        let builder = self
            .request(Method::POST, &format!("{}/_search", request.index))
            .query(&[("scroll", self.config.scroll_keepalive.as_str())])
            .json(&body);
        self.send_json(builder, request.index)
    }

    fn continue_scroll(
        &self,
        request: &PageRequest<'_>,
        scroll_id: &str,
    ) -> Result<SearchResponse, ExportError> {
        let builder = self.request(Method::POST, "_search/scroll").json(&json!({
            "scroll": self.config.scroll_keepalive,
            "scroll_id": scroll_id,
        }));
        self.send_json(builder, request.index)
    }
}

impl SearchClient for ElasticClient {
    fn fetch_page(&self, request: &PageRequest<'_>) -> Result<Page, ExportError> {
        let response = match request.cursor {
            None => self.open_slice(request)?,
            Some(scroll_id) => self.continue_scroll(request, scroll_id)?,
        };
        let label = format!("{}.slice{}", request.index, request.slice_id);
        Ok(response.into_page(&label))
    }

    fn release(&self, cursor: &str) -> Result<(), ExportError> {
        let builder = self
            .request(Method::DELETE, "_search/scroll")
            .json(&json!({ "scroll_id": [cursor] }));
        match self.send(builder, "") {
            Ok(_) => Ok(()),
            // Scroll context already expired or cleared
            Err(ExportError::Http { status: 404, .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn count(&self, index: &str) -> Result<u64, ExportError> {
        let builder = self.request(Method::GET, &format!("{index}/_count"));
        let response: CountResponse = self.send_json(builder, index)?;
        Ok(response.count)
    }

    fn list_indices(&self) -> Result<Vec<String>, ExportError> {
        let builder = self
            .request(Method::GET, "_cat/indices")
            .query(&[("format", "json"), ("h", "index")]);
        let rows: Vec<CatIndex> = self.send_json(builder, "")?;
        let mut names: Vec<String> = rows
            .into_iter()
            .map(|row| row.index)
            .filter(|name| !name.starts_with('.'))
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}
