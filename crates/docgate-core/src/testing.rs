//! Scripted `JobApi` for orchestrator and router tests

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use docgate_auth::{AuthScheme, Credential, TokenBroker};
use docgate_pool::CredentialPool;
use provider::{
    Artifact, BoxFuture, JobApi, Polled, ProviderError, RemoteStatus, RequestAuth, Started, Step,
    Tool, Uploaded,
};

use crate::orchestrator::{JobOrchestrator, PollSettings};

/// Replays queued results per step; an empty queue means "succeed".
pub struct ScriptedApi {
    id: String,
    tools: Vec<Tool>,
    uploads: Mutex<VecDeque<provider::Result<Uploaded>>>,
    starts: Mutex<VecDeque<provider::Result<Started>>>,
    polls: Mutex<VecDeque<provider::Result<Polled>>>,
    always_processing: bool,
    output: Vec<u8>,
    /// (step, credential public id) in call order
    calls: Mutex<Vec<(Step, String)>>,
}

impl ScriptedApi {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            tools: Tool::ALL.to_vec(),
            uploads: Mutex::new(VecDeque::new()),
            starts: Mutex::new(VecDeque::new()),
            polls: Mutex::new(VecDeque::new()),
            always_processing: false,
            output: format!("converted by {id}").into_bytes(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn only(mut self, tools: &[Tool]) -> Self {
        self.tools = tools.to_vec();
        self
    }

    pub fn always_processing(mut self) -> Self {
        self.always_processing = true;
        self
    }

    pub fn upload_fails(self, status: u16, body: &str) -> Self {
        self.uploads
            .lock()
            .unwrap()
            .push_back(Err(http(Step::Upload, status, body)));
        self
    }

    pub fn upload_network_error(self) -> Self {
        self.uploads.lock().unwrap().push_back(Err(ProviderError::Network {
            step: Step::Upload,
            reason: "connection reset".into(),
        }));
        self
    }

    pub fn start_fails(self, status: u16, body: &str) -> Self {
        self.starts
            .lock()
            .unwrap()
            .push_back(Err(http(Step::Start, status, body)));
        self
    }

    pub fn poll_returns(self, status: RemoteStatus, message: Option<&str>) -> Self {
        self.polls.lock().unwrap().push_back(Ok(Polled {
            status,
            download_uri: None,
            message: message.map(str::to_string),
        }));
        self
    }

    pub fn calls(&self) -> Vec<(Step, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, step: Step) -> usize {
        self.calls().iter().filter(|(s, _)| *s == step).count()
    }

    fn record(&self, step: Step, auth: RequestAuth<'_>) {
        self.calls
            .lock()
            .unwrap()
            .push((step, auth.public_id.to_string()));
    }
}

fn http(step: Step, status: u16, body: &str) -> ProviderError {
    ProviderError::Http {
        step,
        status,
        body: body.to_string(),
    }
}

impl JobApi for ScriptedApi {
    fn id(&self) -> &str {
        &self.id
    }

    fn supports(&self, tool: Tool) -> bool {
        self.tools.contains(&tool)
    }

    fn upload<'a>(
        &'a self,
        auth: RequestAuth<'a>,
        _input: &'a Artifact,
    ) -> BoxFuture<'a, provider::Result<Uploaded>> {
        self.record(Step::Upload, auth);
        let scripted = self.uploads.lock().unwrap().pop_front();
        Box::pin(async move {
            scripted.unwrap_or_else(|| {
                Ok(Uploaded {
                    asset_id: "asset-1".into(),
                })
            })
        })
    }

    fn start<'a>(
        &'a self,
        auth: RequestAuth<'a>,
        _tool: Tool,
        _uploaded: &'a Uploaded,
        _target_format: Option<&'a str>,
    ) -> BoxFuture<'a, provider::Result<Started>> {
        self.record(Step::Start, auth);
        let scripted = self.starts.lock().unwrap().pop_front();
        Box::pin(async move {
            scripted.unwrap_or_else(|| {
                Ok(Started {
                    locator: "https://provider.test/jobs/1".into(),
                })
            })
        })
    }

    fn poll<'a>(
        &'a self,
        auth: RequestAuth<'a>,
        _started: &'a Started,
    ) -> BoxFuture<'a, provider::Result<Polled>> {
        self.record(Step::Poll, auth);
        let scripted = self.polls.lock().unwrap().pop_front();
        let always_processing = self.always_processing;
        Box::pin(async move {
            match scripted {
                Some(result) => result,
                None if always_processing => Ok(Polled {
                    status: RemoteStatus::Processing,
                    download_uri: None,
                    message: None,
                }),
                None => Ok(Polled {
                    status: RemoteStatus::Done,
                    download_uri: Some("https://provider.test/dl/1".into()),
                    message: None,
                }),
            }
        })
    }

    fn download<'a>(
        &'a self,
        auth: RequestAuth<'a>,
        _uri: &'a str,
    ) -> BoxFuture<'a, provider::Result<Artifact>> {
        self.record(Step::Download, auth);
        let artifact = Artifact::new(self.output.clone(), "application/octet-stream");
        Box::pin(async move { Ok(artifact) })
    }
}

pub fn credentials(provider: &str, ids: &[&str]) -> Vec<Credential> {
    ids.iter()
        .map(|id| Credential::new(provider, *id, format!("key-{id}")))
        .collect()
}

/// Orchestrator over a scripted API with API-key auth and a 1s poll interval.
pub fn orchestrator(api: Arc<ScriptedApi>, ids: &[&str]) -> JobOrchestrator {
    let provider = api.id().to_string();
    let pool = Arc::new(CredentialPool::new(
        provider.clone(),
        credentials(&provider, ids),
        docgate_pool::DEFAULT_COOLDOWN,
    ));
    let broker = Arc::new(TokenBroker::new(
        provider,
        AuthScheme::ApiKey,
        reqwest::Client::new(),
    ));
    JobOrchestrator::new(api, pool, broker).with_poll_settings(PollSettings {
        interval: std::time::Duration::from_secs(1),
        max_attempts: 5,
    })
}

pub fn request(tool: Tool) -> provider::ConversionRequest {
    provider::ConversionRequest::new(tool, Artifact::new(b"%PDF-1.7".to_vec(), "application/pdf"))
}
