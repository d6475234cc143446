//! Device: driver module registry and loader
//!
//! A device owns the table of driver modules it can load. The bundled
//! Levenberg-Marquardt driver is registered under [`crate::lm::LM_MODULE`];
//! hosts that load drivers from shared libraries resolve the module's
//! [`crate::DRIVER_ENTRY_POINT`] symbol themselves and register the function
//! with [`Device::register_module`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use cpsx_core::logging_facility::{self, Profile};
use cpsx_core::{log_op_end, log_op_error, log_op_start, CpsError, Result};
use serde::{Deserialize, Serialize};

use crate::driver::{Driver, DriverEntryPoint, DriverInitParams};
use crate::lm;

/// Device creation parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceParams {
    /// Logging profile installed at creation; `None` leaves the global
    /// subscriber alone
    #[serde(default)]
    pub log_profile: Option<Profile>,
}

/// Loaded driver
///
/// Cloning shares the driver. Pass it to [`Device::driver_unload`] once no
/// exploration needs it anymore.
#[derive(Clone)]
pub struct DriverHandle {
    module: String,
    driver: Arc<dyn Driver>,
}

impl DriverHandle {
    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn driver(&self) -> &dyn Driver {
        self.driver.as_ref()
    }
}

impl std::fmt::Debug for DriverHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverHandle")
            .field("module", &self.module)
            .field("driver", &self.driver.name())
            .finish()
    }
}

/// Driver host
pub struct Device {
    params: DeviceParams,
    modules: Mutex<HashMap<String, DriverEntryPoint>>,
}

impl Device {
    /// Create a device with the bundled modules registered
    ///
    /// # Errors
    /// * `MemErr` - the module table could not be allocated
    pub fn create(params: DeviceParams) -> Result<Self> {
        if let Some(profile) = params.log_profile {
            logging_facility::init(profile);
        }
        let mut modules: HashMap<String, DriverEntryPoint> = HashMap::new();
        modules.try_reserve(1)?;
        modules.insert(lm::LM_MODULE.to_string(), lm::lm_driver_entry as DriverEntryPoint);
        Ok(Self {
            params,
            modules: Mutex::new(modules),
        })
    }

    pub fn params(&self) -> &DeviceParams {
        &self.params
    }

    /// Register (or replace) the entry point of module `name`
    ///
    /// # Errors
    /// * `BadArg` - empty module name
    /// * `Internal` - the module table lock is poisoned
    pub fn register_module(&self, name: &str, entry: DriverEntryPoint) -> Result<()> {
        if name.is_empty() {
            return Err(CpsError::BadArg {
                reason: "driver module name is empty".to_string(),
            });
        }
        self.modules
            .lock()
            .map_err(|_| CpsError::Internal {
                message: "driver module table lock poisoned".to_string(),
            })?
            .insert(name.to_string(), entry);
        tracing::debug!(driver = name, "driver module registered");
        Ok(())
    }

    /// Registered module names, sorted
    pub fn modules(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .modules
            .lock()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Load the driver registered under `name`
    ///
    /// # Errors
    /// * `NotFound` - no module is registered under `name`
    /// * whatever the module's entry point returns
    pub fn driver_load(&self, name: &str) -> Result<DriverHandle> {
        log_op_start!("driver_load", driver = name);
        let start = Instant::now();

        let result = self.driver_load_impl(name).map_err(|e| {
            log_op_error!(
                "driver_load",
                e,
                duration_ms = start.elapsed().as_millis() as u64,
                driver = name
            );
            e
        })?;

        log_op_end!(
            "driver_load",
            duration_ms = start.elapsed().as_millis() as u64,
            driver = name
        );
        Ok(result)
    }

    fn driver_load_impl(&self, name: &str) -> Result<DriverHandle> {
        let entry = self
            .modules
            .lock()
            .map_err(|_| CpsError::Internal {
                message: "driver module table lock poisoned".to_string(),
            })?
            .get(name)
            .copied()
            .ok_or_else(|| CpsError::DriverNotFound {
                name: name.to_string(),
            })?;
        let init = DriverInitParams {
            module: name.to_string(),
            log_profile: self.params.log_profile,
        };
        let driver = entry(&init)?;
        Ok(DriverHandle {
            module: name.to_string(),
            driver: Arc::from(driver),
        })
    }

    /// Unload a driver, calling its `clean` hook
    ///
    /// Explorations prepared by the driver keep working; their solvers do
    /// not depend on driver-wide resources.
    ///
    /// # Errors
    /// Never fails today; the signature leaves room for hosts that close
    /// library handles.
    pub fn driver_unload(&self, handle: DriverHandle) -> Result<()> {
        log_op_start!("driver_unload", driver = handle.module());
        let start = Instant::now();

        handle.driver.clean();

        log_op_end!(
            "driver_unload",
            duration_ms = start.elapsed().as_millis() as u64,
            driver = handle.module()
        );
        Ok(())
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("params", &self.params)
            .field("modules", &self.modules())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lm_module_preregistered() {
        let device = Device::create(DeviceParams::default()).unwrap();
        assert_eq!(device.modules(), vec!["lm".to_string()]);
        let handle = device.driver_load("lm").unwrap();
        assert_eq!(handle.driver().name(), "lm");
        device.driver_unload(handle).unwrap();
    }

    #[test]
    fn test_unknown_module_not_found() {
        let device = Device::create(DeviceParams::default()).unwrap();
        let err = device.driver_load("eigen-sparse").unwrap_err();
        assert!(matches!(err, CpsError::DriverNotFound { .. }));
    }
}
