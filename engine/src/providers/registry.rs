//! Provider registry
//!
//! Holds every configured analysis provider together with its enable flag,
//! priority and rate-limit window, and answers "which provider should serve
//! this capability next". Providers are ranked by descending priority;
//! equal priorities keep registration (configuration) order.
//!
//! Priorities and limits are fixed at registration. Only the enable flag
//! changes at runtime.

use futures::future::join_all;
use sdk::errors::EngineError;
use sdk::types::Capability;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::{build_providers, AnalysisProvider};
use crate::config::{Config, ProviderConfig};
use crate::rate_limiter::{Clock, RateLimiter, SystemClock};

struct RegisteredProvider {
    config: ProviderConfig,
    enabled: AtomicBool,
    provider: Arc<dyn AnalysisProvider>,
}

impl RegisteredProvider {
    fn serves(&self, capability: Capability) -> bool {
        self.config.capabilities.contains(&capability)
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

/// Point-in-time view of one provider
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderStatus {
    pub name: String,
    pub capabilities: Vec<Capability>,
    pub enabled: bool,
    pub rate_limited: bool,
    pub requests_in_window: usize,
    pub requests_per_minute: u32,
    pub priority: i32,
    pub cost_weight: f64,
}

pub struct ProviderRegistry {
    /// Registration order
    entries: Vec<RegisteredProvider>,
    limiter: RateLimiter,
}

impl ProviderRegistry {
    /// Create an empty registry reading time from `clock`
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Vec::new(),
            limiter: RateLimiter::new(clock),
        }
    }

    /// Build providers for every configuration entry
    pub fn from_config(config: &Config) -> Result<Self, EngineError> {
        let mut registry = Self::new(Arc::new(SystemClock));
        let providers = build_providers(config).map_err(|e| {
            EngineError::Config(format!("Failed to initialise providers: {}", e))
        })?;

        for (entry, provider) in providers {
            registry.register(entry, provider)?;
        }

        info!(
            "Registered {} providers ({} enabled)",
            registry.entries.len(),
            registry.entries.iter().filter(|e| e.is_enabled()).count()
        );
        Ok(registry)
    }

    /// Register a provider. Names must be unique.
    pub fn register(
        &mut self,
        config: ProviderConfig,
        provider: Arc<dyn AnalysisProvider>,
    ) -> Result<(), EngineError> {
        if self.entries.iter().any(|e| e.config.name == config.name) {
            return Err(EngineError::Config(format!(
                "Provider '{}' registered twice",
                config.name
            )));
        }

        self.limiter
            .register(&config.name, config.requests_per_minute);
        self.entries.push(RegisteredProvider {
            enabled: AtomicBool::new(config.enabled),
            config,
            provider,
        });
        Ok(())
    }

    /// Providers serving `capability`, best first
    fn ranked(&self, capability: Capability) -> Vec<&RegisteredProvider> {
        let mut candidates: Vec<&RegisteredProvider> =
            self.entries.iter().filter(|e| e.serves(capability)).collect();
        // Stable sort keeps registration order among equal priorities
        candidates.sort_by(|a, b| b.config.priority.cmp(&a.config.priority));
        candidates
    }

    /// Best eligible provider for a capability.
    ///
    /// Disabled and rate-limited providers are skipped. Selection does not
    /// consume any rate-limit budget.
    pub fn select_provider(
        &self,
        capability: Capability,
    ) -> Result<Arc<dyn AnalysisProvider>, EngineError> {
        self.select_provider_excluding(capability, &[])
    }

    /// Like [`ProviderRegistry::select_provider`], skipping providers already tried
    pub fn select_provider_excluding(
        &self,
        capability: Capability,
        tried: &[String],
    ) -> Result<Arc<dyn AnalysisProvider>, EngineError> {
        for entry in self.ranked(capability) {
            let name = entry.config.name.as_str();
            if tried.iter().any(|t| t == name) {
                continue;
            }
            if !entry.is_enabled() {
                debug!("Skipping disabled provider {} for {}", name, capability);
                continue;
            }
            if self.limiter.is_rate_limited(name) {
                debug!("Skipping rate-limited provider {} for {}", name, capability);
                continue;
            }
            return Ok(Arc::clone(&entry.provider));
        }

        Err(EngineError::ProviderUnavailable(capability))
    }

    /// Select the next provider and record the dispatch in one step.
    ///
    /// Every provider considered is appended to `tried`, so repeated calls
    /// walk the fallback chain. A provider that reaches its limit between
    /// two concurrent callers is skipped rather than overshot.
    pub fn acquire(
        &self,
        capability: Capability,
        tried: &mut Vec<String>,
    ) -> Result<Arc<dyn AnalysisProvider>, EngineError> {
        loop {
            let provider = self.select_provider_excluding(capability, tried)?;
            tried.push(provider.name().to_string());
            if self.try_dispatch(provider.name()) {
                return Ok(provider);
            }
        }
    }

    /// Check the provider's window and record a dispatch under one lock.
    ///
    /// Returns `false` when the provider is unknown, disabled or limited.
    pub fn try_dispatch(&self, name: &str) -> bool {
        match self.entries.iter().find(|e| e.config.name == name) {
            Some(entry) if entry.is_enabled() => self.limiter.try_acquire(name),
            _ => false,
        }
    }

    /// Number of enabled providers for a capability, bounding fallback attempts
    pub fn enabled_count(&self, capability: Capability) -> usize {
        self.entries
            .iter()
            .filter(|e| e.serves(capability) && e.is_enabled())
            .count()
    }

    /// Enable or disable a provider at runtime
    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), EngineError> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.config.name == name)
            .ok_or_else(|| EngineError::InvalidInput(format!("Unknown provider '{}'", name)))?;

        entry.enabled.store(enabled, Ordering::SeqCst);
        info!(
            "Provider {} {}",
            name,
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }

    /// Per-call timeout configured for a provider, if it overrides the default
    pub fn timeout_override(&self, name: &str) -> Option<Duration> {
        self.entries
            .iter()
            .find(|e| e.config.name == name)
            .and_then(|e| e.config.timeout_secs)
            .map(Duration::from_secs)
    }

    /// Snapshot of every provider in registration order
    pub fn statuses(&self) -> Vec<ProviderStatus> {
        self.entries
            .iter()
            .map(|entry| {
                let name = entry.config.name.clone();
                let usage = self.limiter.usage(&name);
                ProviderStatus {
                    capabilities: entry.config.capabilities.clone(),
                    enabled: entry.is_enabled(),
                    rate_limited: self.limiter.is_rate_limited(&name),
                    requests_in_window: usage.map(|u| u.in_window).unwrap_or(0),
                    requests_per_minute: entry.config.requests_per_minute,
                    priority: entry.config.priority,
                    cost_weight: entry.config.cost_weight,
                    name,
                }
            })
            .collect()
    }

    /// Probe every provider concurrently.
    /// Returns a list of (provider_name, is_healthy)
    pub async fn check_health(&self) -> Vec<(String, bool)> {
        let probes = self.entries.iter().map(|entry| async move {
            (
                entry.config.name.clone(),
                entry.provider.check_health().await,
            )
        });
        join_all(probes).await
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
