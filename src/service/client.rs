//! HTTP client for the generation service.

use super::{GenerationService, ServiceError};
use crate::model::{
    ControllerConfig, JobId, JobSpec, JobSummary, RecentJobsResponse, StatusResponse,
    SubmitResponse,
};
use bytes::Bytes;
use reqwest::{Client, ClientBuilder, Response, Url};
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct HttpGenerationClient {
    http: Client,
    base_url: Url,
    download_timeout: Duration,
}

impl HttpGenerationClient {
    pub fn new(cfg: &ControllerConfig) -> Result<Self, ServiceError> {
        let base_url = Url::parse(&cfg.api_url)
            .map_err(|e| ServiceError::InvalidUrl(format!("{}: {e}", cfg.api_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(ServiceError::InvalidUrl(cfg.api_url.clone()));
        }

        let http = ClientBuilder::new()
            .user_agent(cfg.user_agent.clone())
            .timeout(cfg.request_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url,
            download_timeout: cfg.download_timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ServiceError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ServiceError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn handle_response_status(response: Response) -> Result<Response, ServiceError> {
        if !response.status().is_success() {
            return Err(ServiceError::from_response(response).await);
        }
        Ok(response)
    }
}

#[async_trait::async_trait]
impl GenerationService for HttpGenerationClient {
    async fn submit(&self, spec: &JobSpec) -> Result<SubmitResponse, ServiceError> {
        let url = self.endpoint(&["api", "generate"])?;
        let response = self.http.post(url).json(spec).send().await?;
        let response = Self::handle_response_status(response).await?;
        Ok(response.json::<SubmitResponse>().await?)
    }

    async fn status(&self, job_id: &JobId) -> Result<StatusResponse, ServiceError> {
        let url = self.endpoint(&["api", "status", job_id.as_str()])?;
        let response = self.http.get(url).send().await?;
        let response = Self::handle_response_status(response).await?;
        Ok(response.json::<StatusResponse>().await?)
    }

    async fn recent_jobs(&self, limit: usize) -> Result<Vec<JobSummary>, ServiceError> {
        let mut url = self.endpoint(&["api", "jobs"])?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());
        let response = self.http.get(url).send().await?;
        let response = Self::handle_response_status(response).await?;
        Ok(response.json::<RecentJobsResponse>().await?.jobs)
    }

    async fn download(&self, job_id: &JobId) -> Result<Bytes, ServiceError> {
        let url = self.endpoint(&["api", "download", job_id.as_str()])?;
        // Artifacts can be large; the transfer gets its own deadline.
        let response = self
            .http
            .get(url)
            .timeout(self.download_timeout)
            .send()
            .await?;
        let response = Self::handle_response_status(response).await?;
        Ok(response.bytes().await?)
    }
}
