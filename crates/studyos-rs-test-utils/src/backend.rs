use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use studyos_rs_core::router::{
    BackendError, BackendFactory, BackendRequest, CompletionBackend, FragmentStream,
    ProviderProfile,
};
use studyos_rs_protocol::{GroundingLink, ProviderKind, StreamFragment};

/// One step of a scripted stream.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Fragment(StreamFragment),
    /// Fail the stream at this point.
    Error(String),
    Delay(Duration),
    /// Never yield again.
    Stall,
}

/// Backend that replays a fixed script and records every request.
#[derive(Debug, Clone)]
pub struct ScriptedBackend {
    kind: ProviderKind,
    steps: Vec<ScriptStep>,
    start_error: Option<String>,
    completion: Option<String>,
    requests: Arc<Mutex<Vec<BackendRequest>>>,
}

impl ScriptedBackend {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            steps: Vec::new(),
            start_error: None,
            completion: None,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.steps.push(ScriptStep::Fragment(StreamFragment::text(text)));
        self
    }

    pub fn grounding(mut self, title: &str, uri: &str) -> Self {
        self.steps
            .push(ScriptStep::Fragment(StreamFragment::grounding(vec![GroundingLink {
                title: title.to_string(),
                uri: uri.to_string(),
            }])));
        self
    }

    pub fn fail(mut self, message: impl Into<String>) -> Self {
        self.steps.push(ScriptStep::Error(message.into()));
        self
    }

    pub fn delay(mut self, duration: Duration) -> Self {
        self.steps.push(ScriptStep::Delay(duration));
        self
    }

    pub fn stall(mut self) -> Self {
        self.steps.push(ScriptStep::Stall);
        self
    }

    /// Reject the call before any fragment is produced.
    pub fn fail_on_start(mut self, message: impl Into<String>) -> Self {
        self.start_error = Some(message.into());
        self
    }

    /// Fixed text returned by `complete`, bypassing the script.
    pub fn completion(mut self, text: impl Into<String>) -> Self {
        self.completion = Some(text.into());
        self
    }

    pub fn requests(&self) -> Vec<BackendRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn stream(&self, request: BackendRequest) -> Result<FragmentStream, BackendError> {
        self.requests.lock().push(request);
        if let Some(message) = &self.start_error {
            return Err(BackendError::Provider(message.clone()));
        }
        let steps: VecDeque<ScriptStep> = self.steps.iter().cloned().collect();
        let fragments = stream::unfold(steps, |mut steps| async move {
            loop {
                match steps.pop_front()? {
                    ScriptStep::Fragment(fragment) => return Some((Ok(fragment), steps)),
                    ScriptStep::Error(message) => {
                        steps.clear();
                        return Some((Err(BackendError::Provider(message)), steps));
                    }
                    ScriptStep::Delay(duration) => tokio::time::sleep(duration).await,
                    ScriptStep::Stall => futures_util::future::pending::<()>().await,
                }
            }
        });
        Ok(Box::pin(fragments))
    }

    async fn complete(&self, request: BackendRequest) -> Result<String, BackendError> {
        let Some(text) = self.completion.clone() else {
            let mut stream = self.stream(request).await?;
            let mut collected = String::new();
            while let Some(fragment) = stream.next().await {
                collected.push_str(&fragment?.text);
            }
            return Ok(collected);
        };
        self.requests.lock().push(request);
        match &self.start_error {
            Some(message) => Err(BackendError::Provider(message.clone())),
            None => Ok(text),
        }
    }
}

/// Factory handing out one scripted backend and recording the profiles it saw.
#[derive(Debug, Clone)]
pub struct ScriptedFactory {
    backend: ScriptedBackend,
    profiles: Arc<Mutex<Vec<ProviderProfile>>>,
}

impl ScriptedFactory {
    pub fn new(backend: ScriptedBackend) -> Self {
        Self {
            backend,
            profiles: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn backend(&self) -> &ScriptedBackend {
        &self.backend
    }

    /// Profiles passed to `create`, in order.
    pub fn profiles(&self) -> Vec<ProviderProfile> {
        self.profiles.lock().clone()
    }
}

impl BackendFactory for ScriptedFactory {
    fn create(&self, profile: &ProviderProfile) -> Result<Arc<dyn CompletionBackend>, BackendError> {
        self.profiles.lock().push(profile.clone());
        Ok(Arc::new(self.backend.clone()))
    }
}
