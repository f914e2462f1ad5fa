use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone};
use reqwest::{header::CONTENT_TYPE, RequestBuilder, Response, Url};
use tracing::{debug, instrument};

use crate::{
    auth::wsse::{self, WSSE_HEADER},
    config::{ConfigError, TrackerConfig, DEFAULT_REQUEST_TIMEOUT},
    utils::{
        clock::Clock,
        time::{date_of, date_to_graph_name},
    },
};

use super::{parse::find_value, DataType, GraphApi, SyncError};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";

/// [GraphApi] over HTTP. Credentials are bound to the instance, each request is signed with a
/// fresh WSSE token.
pub struct HttpGraphClient {
    http: reqwest::Client,
    endpoint: Url,
    username: String,
    password: String,
}

impl HttpGraphClient {
    pub fn new(config: &TrackerConfig) -> Result<Self, ConfigError> {
        let endpoint = config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ConfigError::InvalidEndpoint {
                endpoint: config.endpoint.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            http,
            endpoint,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn signed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .header(WSSE_HEADER, wsse::sign(&self.username, &self.password))
    }

    /// Retrieves the whole graph of `username` in the requested representation.
    #[instrument(skip(self))]
    pub async fn fetch_graph(
        &self,
        graph_name: &str,
        username: &str,
        data_type: DataType,
    ) -> Result<String, SyncError> {
        let request = self.http.get(self.endpoint.clone()).query(&[
            ("graphname", graph_name),
            ("username", username),
            ("type", data_type.as_str()),
        ]);
        let response = check_status(self.signed(request).send().await?).await?;
        let body = response.text().await?;
        debug!("Received {} bytes of graph data", body.len());
        Ok(body)
    }

    /// Value of the client's own graph for `date`.
    pub async fn fetch_own_value(
        &self,
        graph_name: &str,
        date: NaiveDate,
    ) -> Result<f64, SyncError> {
        self.fetch_value(graph_name, &self.username, date).await
    }

    /// Posts `value_seconds` for the date `clock` currently shows in `time_zone`.
    pub async fn post_today<Tz: TimeZone>(
        &self,
        graph_name: &str,
        value_seconds: f64,
        clock: &dyn Clock,
        time_zone: &Tz,
    ) -> Result<(), SyncError> {
        let today = date_of(clock.time(), time_zone);
        self.post_value(graph_name, today, value_seconds).await
    }
}

#[async_trait]
impl GraphApi for HttpGraphClient {
    #[instrument(skip(self))]
    async fn fetch_value(
        &self,
        graph_name: &str,
        username: &str,
        date: NaiveDate,
    ) -> Result<f64, SyncError> {
        let body = self.fetch_graph(graph_name, username, DataType::Json).await?;
        Ok(find_value(&body, date))
    }

    #[instrument(skip(self))]
    async fn post_value(
        &self,
        graph_name: &str,
        date: NaiveDate,
        value_seconds: f64,
    ) -> Result<(), SyncError> {
        let date = date_to_graph_name(date);
        let value = format!("{value_seconds:.2}");
        let request = self.signed(self.http.post(self.endpoint.clone())).form(&[
            ("graphname", graph_name),
            ("date", date.as_str()),
            ("value", value.as_str()),
        ]);
        check_status(request.send().await?).await?;
        debug!("Posted {value} for {date}");
        Ok(())
    }
}

async fn check_status(response: Response) -> Result<Response, SyncError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SyncError::Status {
        status: status.as_u16(),
        body,
    })
}
