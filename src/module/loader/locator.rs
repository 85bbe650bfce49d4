//! Module discovery in the federation scope
//!
//! A bundle registers its container under a global name the loader cannot
//! know in advance. The locator derives an ordered list of candidate names
//! from the block identifier and takes the first container that yields a
//! mountable module.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::CandidateConfig;
use crate::module::traits::{BlockError, BlockModule, FederationScope};

/// Module path every block bundle exposes
pub const DEFAULT_EXPOSED_PATH: &str = "./Block";
/// Prefix of the prefixed candidate name
pub const DEFAULT_CANDIDATE_PREFIX: &str = "block_";
/// Container name used by bundles built before per-block naming
pub const LEGACY_CONTAINER_NAME: &str = "blockContainer";

/// One way of deriving a global name from a block identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CandidateName {
    /// The identifier as-is
    Raw,
    /// The identifier with every non-alphanumeric character removed
    Alphanumeric,
    /// A prefix followed by the alphanumeric form
    Prefixed(String),
    /// A fixed name, independent of the identifier
    Fixed(String),
}

impl CandidateName {
    pub fn render(&self, block_id: &str) -> String {
        match self {
            CandidateName::Raw => block_id.to_string(),
            CandidateName::Alphanumeric => alphanumeric(block_id),
            CandidateName::Prefixed(prefix) => format!("{prefix}{}", alphanumeric(block_id)),
            CandidateName::Fixed(name) => name.clone(),
        }
    }
}

fn alphanumeric(block_id: &str) -> String {
    block_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Built-in candidate order
pub fn default_candidate_names() -> Vec<CandidateName> {
    vec![
        CandidateName::Raw,
        CandidateName::Alphanumeric,
        CandidateName::Prefixed(DEFAULT_CANDIDATE_PREFIX.to_string()),
        CandidateName::Fixed(LEGACY_CONTAINER_NAME.to_string()),
    ]
}

/// Candidate names for identifiers matching a pattern
#[derive(Debug, Clone)]
pub struct CandidateRule {
    /// `None` matches every identifier
    pub pattern: Option<Regex>,
    pub names: Vec<CandidateName>,
}

impl CandidateRule {
    fn matches(&self, block_id: &str) -> bool {
        self.pattern
            .as_ref()
            .map_or(true, |pattern| pattern.is_match(block_id))
    }
}

/// Ordered candidate rules; the first matching rule wins
#[derive(Debug, Clone)]
pub struct CandidateRules {
    rules: Vec<CandidateRule>,
    fallback: Vec<CandidateName>,
}

impl Default for CandidateRules {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            fallback: default_candidate_names(),
        }
    }
}

impl CandidateRules {
    pub fn new(rules: Vec<CandidateRule>, fallback: Vec<CandidateName>) -> Self {
        Self { rules, fallback }
    }

    /// Compile rules from configuration
    pub fn from_config(config: &CandidateConfig) -> Result<Self, regex::Error> {
        let rules = config
            .rules
            .iter()
            .map(|rule| {
                Ok(CandidateRule {
                    pattern: rule.pattern.as_deref().map(Regex::new).transpose()?,
                    names: rule.names.clone(),
                })
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self::new(rules, config.fallback.clone()))
    }

    /// Ordered, deduplicated, non-empty candidate names for an identifier
    pub fn candidates(&self, block_id: &str) -> Vec<String> {
        let names = self
            .rules
            .iter()
            .find(|rule| rule.matches(block_id))
            .map_or(&self.fallback, |rule| &rule.names);

        let mut candidates: Vec<String> = Vec::with_capacity(names.len());
        for name in names.iter().map(|name| name.render(block_id)) {
            if !name.is_empty() && !candidates.contains(&name) {
                candidates.push(name);
            }
        }
        candidates
    }
}

/// Finds the mountable module a freshly loaded bundle published
#[async_trait]
pub trait ModuleLocator: Send + Sync {
    async fn locate(&self, block_id: &str) -> Result<Arc<dyn BlockModule>, BlockError>;
}

/// Locator searching a `FederationScope` by candidate names
pub struct NamespaceLocator {
    scope: Arc<dyn FederationScope>,
    rules: CandidateRules,
    exposed_path: String,
}

impl NamespaceLocator {
    pub fn new(scope: Arc<dyn FederationScope>) -> Self {
        Self {
            scope,
            rules: CandidateRules::default(),
            exposed_path: DEFAULT_EXPOSED_PATH.to_string(),
        }
    }

    pub fn with_rules(mut self, rules: CandidateRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_exposed_path(mut self, exposed_path: impl Into<String>) -> Self {
        self.exposed_path = exposed_path.into();
        self
    }

    pub fn rules(&self) -> &CandidateRules {
        &self.rules
    }
}

#[async_trait]
impl ModuleLocator for NamespaceLocator {
    async fn locate(&self, block_id: &str) -> Result<Arc<dyn BlockModule>, BlockError> {
        let tried = self.rules.candidates(block_id);
        let mut found_uncallable = false;

        for name in &tried {
            let Some(container) = self.scope.container(name) else {
                debug!("No container registered as {}", name);
                continue;
            };

            let factory = match container.get(&self.exposed_path).await {
                Ok(factory) => factory,
                Err(e) => {
                    warn!(
                        "Container {} could not provide {} for block {}: {}",
                        name, self.exposed_path, block_id, e
                    );
                    continue;
                }
            };

            match factory() {
                Some(module) => {
                    info!("Found module for block {} in container {}", block_id, name);
                    return Ok(module);
                }
                None => {
                    warn!(
                        "Container {} exposes {} without a mount function, skipping",
                        name, self.exposed_path
                    );
                    found_uncallable = true;
                }
            }
        }

        let block_id = block_id.to_string();
        if found_uncallable {
            Err(BlockError::NotCallable { block_id, tried })
        } else {
            Err(BlockError::ModuleNotFound { block_id, tried })
        }
    }
}
