//! Arbitrary queries over one collection, published like the profile view.

use std::sync::Arc;

use tokio::sync::watch;

use crate::domain::error::STORE_NOT_INITIALIZED_MSG;
use crate::outbound::document::{DocumentStore, Fields, Query};

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionState {
    pub documents: Vec<Document>,
    pub loading: bool,
    pub error: Option<String>,
}

pub struct CollectionView {
    store: Option<Arc<dyn DocumentStore>>,
    collection: String,
    query: Query,
    state: watch::Sender<CollectionState>,
}

impl CollectionView {
    pub fn new(store: Option<Arc<dyn DocumentStore>>, collection: impl Into<String>, query: Query) -> Self {
        let initial = CollectionState { documents: Vec::new(), loading: true, error: None };
        Self { store, collection: collection.into(), query, state: watch::Sender::new(initial) }
    }

    pub fn current(&self) -> CollectionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CollectionState> {
        self.state.subscribe()
    }

    /// Runs the query once. A failure keeps the previous documents.
    pub async fn load(&self) {
        let Some(store) = &self.store else {
            self.state.send_modify(|state| {
                state.loading = false;
                state.error = Some(STORE_NOT_INITIALIZED_MSG.to_string());
            });
            return;
        };

        match store.query(&self.collection, &self.query).await {
            Ok(found) => {
                let documents = found.into_iter().map(|(id, fields)| Document { id, fields }).collect();
                self.state.send_replace(CollectionState { documents, loading: false, error: None });
            },
            Err(err) => {
                tracing::error!(collection = %self.collection, error = %err, "Collection query failed");
                self.state.send_modify(|state| {
                    state.loading = false;
                    state.error = Some(err.to_string());
                });
            },
        }
    }
}
