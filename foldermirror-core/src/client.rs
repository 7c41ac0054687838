use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::retry_after::parse_retry_after;

const DEFAULT_BASE_URL: &str = "https://api.box.com";
const API_VERSION: &str = "2.0";
const ENTRY_FIELDS: &str = "id,name,type";

/// Body of a file download, yielded chunk by chunk as it arrives.
pub type ByteStream = BoxStream<'static, Result<Bytes, DriveError>>;

#[derive(Debug, Error)]
pub enum DriveError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("base url cannot carry a path: {0}")]
    BaseUrl(Url),
    #[error("api returned {status}: {body}")]
    Api {
        status: StatusCode,
        headers: HeaderMap,
        body: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    RateLimit,
    Transient,
    Permanent,
}

#[derive(Clone)]
pub struct DriveClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl DriveClient {
    pub fn new(token: impl Into<String>) -> Result<Self, DriveError> {
        Self::with_base_url(DEFAULT_BASE_URL, token)
    }

    pub fn with_base_url(base_url: &str, token: impl Into<String>) -> Result<Self, DriveError> {
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(base_url)?,
            token: token.into(),
        })
    }

    pub async fn get_folder(&self, folder_id: &str) -> Result<Folder, DriveError> {
        let mut url = self.endpoint(&["folders", folder_id])?;
        url.query_pairs_mut().append_pair("fields", "id,name");
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn list_folder_items(
        &self,
        folder_id: &str,
        limit: u64,
        offset: u64,
    ) -> Result<ItemPage, DriveError> {
        let mut url = self.endpoint(&["folders", folder_id, "items"])?;
        url.query_pairs_mut()
            .append_pair("fields", ENTRY_FIELDS)
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", &offset.to_string());
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        Self::handle_response(response).await
    }

    /// Opens the content of a file. Redirects to the storage host are followed;
    /// the body is not buffered.
    pub async fn download(&self, file_id: &str) -> Result<ByteStream, DriveError> {
        let url = self.endpoint(&["files", file_id, "content"])?;
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(DriveError::from))
            .boxed())
    }

    fn auth_header_value(&self) -> String {
        format!("Bearer {}", self.token)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, DriveError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| DriveError::BaseUrl(self.base_url.clone()))?
            .pop_if_empty()
            .push(API_VERSION)
            .extend(segments);
        Ok(url)
    }

    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, DriveError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        Err(DriveError::Api {
            status,
            headers,
            body,
        })
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, DriveError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

impl DriveError {
    pub fn classification(&self) -> Option<ApiErrorClass> {
        match self {
            DriveError::Api { status, .. } => Some(classify_api_status(*status)),
            _ => None,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self.classification(), Some(ApiErrorClass::RateLimit))
    }

    /// Server-requested wait before the next attempt. Only a 429 response with a
    /// parseable `retry-after` header yields a value.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            DriveError::Api {
                status, headers, ..
            } if *status == StatusCode::TOO_MANY_REQUESTS => headers
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(parse_retry_after),
            _ => None,
        }
    }
}

fn classify_api_status(status: StatusCode) -> ApiErrorClass {
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ApiErrorClass::Auth
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ApiErrorClass::RateLimit
    } else if status.is_server_error()
        || matches!(
            status,
            StatusCode::REQUEST_TIMEOUT | StatusCode::CONFLICT | StatusCode::TOO_EARLY
        )
    {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Folder {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Entry {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Folder,
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ItemPage {
    #[serde(default)]
    pub entries: Vec<Entry>,
    #[serde(default)]
    pub total_count: Option<u64>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
}
