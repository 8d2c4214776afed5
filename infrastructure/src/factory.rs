//! Transport factory wired from configuration.

use crate::local::transport::LocalChatTransport;
use crate::remote::transport::RemoteChatTransport;
use async_trait::async_trait;
use std::sync::Arc;
use tandem_application::ports::chat_transport::{ChatTransport, TransportError, TransportFactory};
use tandem_application::ports::generative::{DownloadProgress, GenerativeRuntime, SessionOptions};
use tandem_domain::{ChatId, TransportMode};

/// Builds local transports over the shared runtime and remote transports
/// against the configured endpoint.
pub struct ConfiguredTransportFactory {
    runtime: Arc<dyn GenerativeRuntime>,
    options: SessionOptions,
    on_download: Option<DownloadProgress>,
    endpoint: String,
}

impl ConfiguredTransportFactory {
    pub fn new(
        runtime: Arc<dyn GenerativeRuntime>,
        options: SessionOptions,
        on_download: Option<DownloadProgress>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            runtime,
            options,
            on_download,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl TransportFactory for ConfiguredTransportFactory {
    async fn create(
        &self,
        mode: TransportMode,
        chat_id: ChatId,
    ) -> Result<Box<dyn ChatTransport>, TransportError> {
        match mode {
            TransportMode::Local => Ok(Box::new(LocalChatTransport::new(
                chat_id,
                Arc::clone(&self.runtime),
                self.options.clone(),
                self.on_download.clone(),
            ))),
            TransportMode::Remote => Ok(Box::new(RemoteChatTransport::new(
                chat_id,
                self.endpoint.clone(),
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::fakes::FakeRuntime;

    #[tokio::test]
    async fn each_mode_gets_its_own_transport_kind() {
        let factory = ConfiguredTransportFactory::new(
            FakeRuntime::with_turns(vec![]) as Arc<dyn GenerativeRuntime>,
            SessionOptions::default(),
            None,
            "http://localhost:8787",
        );

        let local = factory
            .create(TransportMode::Local, ChatId::new("c-local"))
            .await
            .unwrap();
        assert_eq!(local.mode(), TransportMode::Local);
        assert_eq!(local.chat_id().as_str(), "c-local");

        let remote = factory
            .create(TransportMode::Remote, ChatId::new("c-remote"))
            .await
            .unwrap();
        assert_eq!(remote.mode(), TransportMode::Remote);
        assert_eq!(remote.chat_id().as_str(), "c-remote");
    }
}
