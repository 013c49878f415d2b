//! hwmon sensor readers shared by the GPU vendor managers and the fan source

use crate::sysfs;
use pulsedeck_types::{fan_percent, FanReading};
use std::fs;
use std::path::{Path, PathBuf};

/// Sensor files of one hwmon directory
///
/// Units follow the hwmon ABI: millidegrees Celsius, microwatts, RPM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hwmon {
    path: PathBuf,
}

impl Hwmon {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// hwmon directory of a PCI device, if the driver exposes one
    pub fn for_device(device_path: &Path) -> Option<Self> {
        sysfs::find_hwmon(device_path).map(Self::new)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Temperature in Celsius from the first readable `tempN_input`
    pub fn temperature(&self) -> Option<f32> {
        sysfs::read_first_int(&self.path, &["temp1_input", "temp2_input", "temp3_input"])
            .map(|millidegrees| millidegrees as f32 / 1000.0)
    }

    /// Power draw in Watts
    pub fn power_watts(&self) -> Option<f32> {
        sysfs::read_first_int(&self.path, &["power1_average", "power1_input"])
            .map(|microwatts| microwatts as f32 / 1_000_000.0)
    }

    /// Fan speed as a percentage of `fan1_max`
    pub fn fan_percent(&self) -> Option<f32> {
        let rpm = sysfs::read_int(&self.path.join("fan1_input"))?;
        let max_rpm = sysfs::read_int(&self.path.join("fan1_max"))?;
        fan_percent(rpm, max_rpm)
    }
}

/// Read every spinning fan below `hwmon_root` (normally `/sys/class/hwmon`)
///
/// Fans reporting 0 RPM are skipped, they are usually unpopulated headers.
pub fn read_fans(hwmon_root: &Path) -> Vec<FanReading> {
    let mut hwmon_dirs: Vec<PathBuf> = match fs::read_dir(hwmon_root) {
        Ok(entries) => entries.flatten().map(|e| e.path()).collect(),
        Err(e) => {
            log::debug!("Cannot list {}: {}", hwmon_root.display(), e);
            return Vec::new();
        }
    };
    hwmon_dirs.sort();

    let mut fans = Vec::new();
    for dir in hwmon_dirs {
        let mut inputs: Vec<String> = match fs::read_dir(&dir) {
            Ok(files) => files
                .flatten()
                .filter_map(|f| f.file_name().to_str().map(str::to_string))
                .filter(|name| name.starts_with("fan") && name.ends_with("_input"))
                .collect(),
            Err(_) => continue,
        };
        inputs.sort();

        for input in inputs {
            let rpm = match sysfs::read_u64(&dir.join(&input)) {
                Some(rpm) if rpm > 0 => rpm,
                _ => continue,
            };
            fans.push(FanReading {
                label: fan_label(&dir, &input),
                rpm: u32::try_from(rpm).unwrap_or(u32::MAX),
            });
        }
    }
    fans
}

/// Label for a fan: `fanN_label`, else `<chip name> Fan N`
fn fan_label(hwmon_path: &Path, fan_filename: &str) -> String {
    let fan_num = fan_filename
        .trim_start_matches("fan")
        .trim_end_matches("_input");

    if let Some(label) = sysfs::read_string(&hwmon_path.join(format!("fan{}_label", fan_num))) {
        return label;
    }

    if let Some(name) = sysfs::read_string(&hwmon_path.join("name")) {
        return format!("{} Fan {}", name, fan_num);
    }

    match hwmon_path.file_name() {
        Some(hwmon_name) => format!("{} Fan {}", hwmon_name.to_string_lossy(), fan_num),
        None => format!("Fan {}", fan_num),
    }
}
