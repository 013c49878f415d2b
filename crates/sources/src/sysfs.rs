//! Helpers for reading small values from kernel pseudo-files
//!
//! Every reader returns `None` on any failure (missing file, permission,
//! parse error). Failures are logged at trace level only; a missing sensor
//! file is normal on most systems.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

/// Matches the active level of a `pp_dpm_*` table, e.g. `1: 1200Mhz *`
static ACTIVE_DPM_LEVEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i):\s*(\d+)\s*mhz\s*\*\s*$").expect("valid regex"));

/// Read a file and trim surrounding whitespace
pub fn read_string(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(content) => Some(content.trim().to_string()),
        Err(e) => {
            log::trace!("Failed to read {}: {}", path.display(), e);
            None
        }
    }
}

/// Read a decimal integer
pub fn read_int(path: &Path) -> Option<i64> {
    let content = read_string(path)?;
    match content.parse::<i64>() {
        Ok(value) => Some(value),
        Err(e) => {
            log::trace!("Failed to parse integer from {}: {}", path.display(), e);
            None
        }
    }
}

/// Read an unsigned decimal integer
pub fn read_u64(path: &Path) -> Option<u64> {
    read_int(path).and_then(|v| u64::try_from(v).ok())
}

/// Read a hexadecimal value with or without a `0x` prefix
pub fn read_hex(path: &Path) -> Option<u32> {
    let content = read_string(path)?;
    let digits = content.trim_start_matches("0x").trim_start_matches("0X");
    match u32::from_str_radix(digits, 16) {
        Ok(value) => Some(value),
        Err(e) => {
            log::trace!("Failed to parse hex value from {}: {}", path.display(), e);
            None
        }
    }
}

/// Read the first file in `candidates` (relative to `dir`) that parses
pub fn read_first_int(dir: &Path, candidates: &[&str]) -> Option<i64> {
    candidates.iter().find_map(|name| read_int(&dir.join(name)))
}

/// Parse the active clock level from a `pp_dpm_sclk`-style table
///
/// ```text
/// 0: 500Mhz
/// 1: 1200Mhz *
/// 2: 2100Mhz
/// ```
pub fn parse_active_dpm_clock(content: &str) -> Option<u32> {
    content
        .lines()
        .find_map(|line| ACTIVE_DPM_LEVEL.captures(line.trim_end()))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
}

/// Read the active clock level in MHz from a `pp_dpm_*` file
pub fn read_active_dpm_clock(path: &Path) -> Option<u32> {
    parse_active_dpm_clock(&read_string(path)?)
}

/// First `hwmon*` directory below `<device>/hwmon`
pub fn find_hwmon(device_path: &Path) -> Option<PathBuf> {
    let hwmon_dir = device_path.join("hwmon");
    let mut candidates: Vec<PathBuf> = fs::read_dir(&hwmon_dir)
        .ok()?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_dir()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map_or(false, |n| n.starts_with("hwmon"))
        })
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}

/// A DRM card directory such as `/sys/class/drm/card1`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrmCard {
    /// The N in `cardN`
    pub number: u32,
    pub card_path: PathBuf,
    pub device_path: PathBuf,
    /// PCI vendor ID, if readable
    pub vendor_id: Option<u32>,
}

/// List `cardN` directories under `drm_root`, sorted by N
///
/// Connector entries (`card0-DP-1`) and render nodes are skipped.
pub fn list_drm_cards(drm_root: &Path) -> Vec<DrmCard> {
    let entries = match fs::read_dir(drm_root) {
        Ok(entries) => entries,
        Err(e) => {
            log::debug!("Cannot list {}: {}", drm_root.display(), e);
            return Vec::new();
        }
    };

    let mut cards: Vec<DrmCard> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name();
            let number = name.to_str()?.strip_prefix("card")?.parse::<u32>().ok()?;
            let card_path = entry.path();
            let device_path = card_path.join("device");
            let vendor_id = read_hex(&device_path.join("vendor"));
            Some(DrmCard {
                number,
                card_path,
                device_path,
                vendor_id,
            })
        })
        .collect();
    cards.sort_by_key(|card| card.number);
    cards
}
