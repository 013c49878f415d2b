//! systemd service status data source

use crate::command::safe_command;
use anyhow::Result;
use pulsedeck_core::{DataSource, FetchContext, SourceMetadata, DEFAULT_COMMAND_TIMEOUT};
use pulsedeck_types::PanelSettings;
use serde_json::{json, Value};
use std::time::Duration;

/// Status reported when `systemctl` fails, times out or the unit is not active
const STATUS_FALLBACK: &str = "error";

/// Checks `systemctl is-active` for each unit in the comma-separated
/// `systemd_services` setting
pub struct SystemdSource {
    metadata: SourceMetadata,
    settings: PanelSettings,
    services: Vec<String>,
    /// Program followed by leading arguments; the unit name is appended
    command: Vec<String>,
    timeout: Duration,
}

impl SystemdSource {
    pub fn new(settings: &PanelSettings) -> Result<Self> {
        let services = settings
            .get_config("systemd_services", "")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            metadata: SourceMetadata {
                id: "systemd".to_string(),
                name: "Systemd Services".to_string(),
                description: "Active state of systemd units".to_string(),
                default_interval: Duration::from_secs(5),
            },
            settings: settings.clone(),
            services,
            command: vec!["systemctl".to_string(), "is-active".to_string()],
            timeout: DEFAULT_COMMAND_TIMEOUT,
        })
    }

    #[cfg(test)]
    fn with_command(mut self, command: &[&str], timeout: Duration) -> Self {
        self.command = command.iter().map(|s| s.to_string()).collect();
        self.timeout = timeout;
        self
    }

    fn status(&self, service: &str) -> String {
        let Some((program, leading)) = self.command.split_first() else {
            return STATUS_FALLBACK.to_string();
        };
        let mut args: Vec<&str> = leading.iter().map(String::as_str).collect();
        args.push(service);
        safe_command(program, &args, STATUS_FALLBACK, self.timeout)
    }
}

impl DataSource for SystemdSource {
    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    fn fetch(&self, _ctx: &FetchContext) -> Result<Option<Value>> {
        if self.services.is_empty() {
            return Ok(None);
        }

        let services: Vec<Value> = self
            .services
            .iter()
            .map(|name| json!({ "name": name, "status": self.status(name) }))
            .collect();
        let active = services
            .iter()
            .filter(|s| s["status"] == "active")
            .count();

        Ok(Some(json!({
            "services": services,
            "active": active,
            "value": active,
        })))
    }

    fn settings(&self) -> &PanelSettings {
        &self.settings
    }
}
