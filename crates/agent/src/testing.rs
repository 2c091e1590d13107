//! Test doubles shared by the agent's unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use santai_core::audit::AuditSink;
use santai_core::domain::candidate::{Candidate, CatalogItem};
use santai_core::protocol::{PreferenceRequest, PreferenceResponse, SentNotification};
use santai_core::registry::AgentAddress;

use crate::bridge::{AgentTransport, TransportError};
use crate::categories::StaticCategoryProvider;
use crate::conversation::FallbackExtractor;
use crate::flow::ConversationFlowManager;
use crate::search::{ProductSearch, SearchQuery};
use crate::store::SessionStore;

pub fn candidate(name: &str, price: i64, rating: f32) -> Candidate {
    Candidate {
        name: name.to_string(),
        price: Decimal::from(price),
        description: format!("{name} description"),
        rating,
        purchase_url: format!("https://shop.example/{}", name.to_lowercase().replace(' ', "-")),
        source_category: None,
    }
}

pub fn catalog_item(name: &str, price: i64, rating: f32, description: &str) -> CatalogItem {
    CatalogItem {
        name: name.to_string(),
        price: Decimal::from(price),
        rating: Some(rating),
        description: description.to_string(),
        url: format!("https://shop.example/{}", name.to_lowercase().replace(' ', "-")),
    }
}

/// Flow manager with rule-based extraction and the fixed category lists.
pub fn flow_manager(
    search: Arc<dyn ProductSearch>,
    audit: Arc<dyn AuditSink>,
) -> ConversationFlowManager {
    ConversationFlowManager::new(
        Arc::new(SessionStore::new()),
        Arc::new(FallbackExtractor::rules_only()),
        Arc::new(StaticCategoryProvider),
        search,
        audit,
    )
}

/// A catalog that is always down.
#[derive(Default)]
pub struct FailingSearch {
    calls: AtomicUsize,
}

impl FailingSearch {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProductSearch for FailingSearch {
    async fn search(&self, _query: &SearchQuery) -> Result<Vec<CatalogItem>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(anyhow!("catalog returned 503"))
    }
}

#[derive(Clone, Debug)]
pub enum TransportScript {
    Respond(PreferenceResponse),
    /// Never answers; only the bridge timeout ends the wait.
    Hang,
    Fail,
}

/// In-process transport that plays back a fixed script and records every call.
pub struct ScriptedTransport {
    script: TransportScript,
    requests: Mutex<Vec<(AgentAddress, PreferenceRequest)>>,
    notifications: Mutex<Vec<SentNotification>>,
}

impl ScriptedTransport {
    pub fn new(script: TransportScript) -> Self {
        Self { script, requests: Mutex::new(Vec::new()), notifications: Mutex::new(Vec::new()) }
    }

    pub fn preference_calls(&self) -> usize {
        self.requests().len()
    }

    pub fn requests(&self) -> Vec<(AgentAddress, PreferenceRequest)> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn notifications(&self) -> Vec<SentNotification> {
        self.notifications.lock().expect("notifications lock").clone()
    }

    fn failure(address: &AgentAddress) -> TransportError {
        TransportError::Unreachable {
            address: address.to_string(),
            message: "connection refused".to_string(),
        }
    }
}

#[async_trait]
impl AgentTransport for ScriptedTransport {
    async fn request_preferences(
        &self,
        address: &AgentAddress,
        request: &PreferenceRequest,
    ) -> Result<PreferenceResponse, TransportError> {
        self.requests.lock().expect("requests lock").push((address.clone(), request.clone()));
        match &self.script {
            TransportScript::Respond(response) => Ok(response.clone()),
            TransportScript::Hang => std::future::pending().await,
            TransportScript::Fail => Err(Self::failure(address)),
        }
    }

    async fn deliver_notification(
        &self,
        address: &AgentAddress,
        notification: &SentNotification,
    ) -> Result<(), TransportError> {
        match &self.script {
            TransportScript::Respond(_) => {
                self.notifications.lock().expect("notifications lock").push(notification.clone());
                Ok(())
            }
            TransportScript::Hang => std::future::pending().await,
            TransportScript::Fail => Err(Self::failure(address)),
        }
    }
}
