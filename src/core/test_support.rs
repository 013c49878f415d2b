//! Scripted data source for engine tests

use anyhow::anyhow;
use crossbeam::channel::Receiver;
use pulsedeck_core::{DataSource, FetchContext, SourceMetadata};
use pulsedeck_types::{PanelSettings, UPDATE_INTERVAL_KEY};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub(crate) enum Behavior {
    Value(Value),
    Fail,
    Panic,
    /// Block until released through the channel
    Gated(Receiver<()>),
    /// Read a counter through the cycle cache
    CacheCounter,
}

pub(crate) struct ScriptedSource {
    metadata: SourceMetadata,
    settings: PanelSettings,
    behavior: Behavior,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub const CACHE_KEY: &'static str = "scripted:counter";

    pub fn new(interval: &str, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            metadata: SourceMetadata {
                id: "scripted".to_string(),
                name: "Scripted".to_string(),
                description: "Test source".to_string(),
                default_interval: Duration::from_secs(1),
            },
            settings: PanelSettings::new().with(UPDATE_INTERVAL_KEY, interval),
            behavior,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DataSource for ScriptedSource {
    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    fn fetch(&self, ctx: &FetchContext) -> anyhow::Result<Option<Value>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        match &self.behavior {
            Behavior::Value(value) => Ok(Some(value.clone())),
            Behavior::Fail => Err(anyhow!("sensor unavailable")),
            Behavior::Panic => panic!("sensor driver crashed"),
            Behavior::Gated(gate) => {
                let _ = gate.recv_timeout(Duration::from_secs(5));
                Ok(Some(json!(call)))
            }
            Behavior::CacheCounter => {
                let value: usize = ctx.cache.get_or_compute(Self::CACHE_KEY, || call);
                Ok(Some(json!(value)))
            }
        }
    }

    fn settings(&self) -> &PanelSettings {
        &self.settings
    }
}
