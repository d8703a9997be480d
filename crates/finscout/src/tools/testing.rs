use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use finscout_core::credentials::CredentialResolver;
use serde_json::Value;

use crate::data::{DataPayload, DataQuery, DataSource, DataSourceError};

/// A data source answering from canned responses keyed by endpoint.
#[derive(Default)]
pub struct FakeSource {
    responses: HashMap<String, Result<Value, u16>>,
    queries: Mutex<Vec<DataQuery>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, endpoint: &str, data: Value) -> Self {
        self.responses.insert(endpoint.to_owned(), Ok(data));
        self
    }

    pub fn with_error_status(mut self, endpoint: &str, status: u16) -> Self {
        self.responses.insert(endpoint.to_owned(), Err(status));
        self
    }

    pub fn queries(&self) -> Vec<DataQuery> {
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl DataSource for FakeSource {
    async fn fetch(
        &self,
        query: DataQuery,
        _credentials: &dyn CredentialResolver,
    ) -> Result<DataPayload, DataSourceError> {
        let url = format!("https://data.example/{}", query.endpoint);
        let response = self.responses.get(&query.endpoint).cloned();
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(query);
        match response {
            Some(Ok(data)) => Ok(DataPayload {
                data,
                source_url: url,
            }),
            Some(Err(status)) => Err(DataSourceError::Status { url, status }),
            None => Err(DataSourceError::Status { url, status: 404 }),
        }
    }
}
