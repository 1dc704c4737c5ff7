//! Mapping inbound stream requests to a topic and subscriber identity.

use axum::extract::Query;
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Where a stream request subscribes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub topic: String,
    pub identity: String,
    pub min_version: u32,
}

/// Derives a [`Resolution`] from a request.
pub trait TopicResolver: Send + Sync {
    fn resolve(&self, request: &Parts) -> Resolution;
}

/// Topic is the request path; subscribers are anonymous at version 0.
#[derive(Debug, Default, Clone, Copy)]
pub struct PathResolver;

impl TopicResolver for PathResolver {
    fn resolve(&self, request: &Parts) -> Resolution {
        Resolution {
            topic: request.uri.path().to_string(),
            ..Resolution::default()
        }
    }
}

/// Topic is the request path; `?identity=` and `?version=` set the rest.
#[derive(Debug, Default, Clone, Copy)]
pub struct QueryResolver;

impl TopicResolver for QueryResolver {
    fn resolve(&self, request: &Parts) -> Resolution {
        let params = Query::<HashMap<String, String>>::try_from_uri(&request.uri)
            .map(|Query(params)| params)
            .unwrap_or_default();

        Resolution {
            topic: request.uri.path().to_string(),
            identity: params.get("identity").cloned().unwrap_or_default(),
            min_version: params
                .get("version")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
        }
    }
}

/// Resolver selected in configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolverKind {
    #[default]
    Path,
    Query,
}

impl ResolverKind {
    #[must_use]
    pub fn build(self) -> Arc<dyn TopicResolver> {
        match self {
            ResolverKind::Path => Arc::new(PathResolver),
            ResolverKind::Query => Arc::new(QueryResolver),
        }
    }
}
