//! Directory of running groups.
//!
//! Owned by the daemon lifecycle. Commands that address "all groups" or a set
//! of lights are fanned out here; no group ever talks to another.

use anyhow::Result;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use super::worker::{GroupHandle, GroupWorker};
use super::{GroupOptions, GroupSettings, GroupSnapshot, LightGroup, LightOutcome, OverrideValues};
use crate::backend::LightSink;
use crate::geo::{Location, SunTimesProvider};

#[derive(Default)]
pub struct GroupDirectory {
    handles: Vec<GroupHandle>,
    workers: Vec<JoinHandle<()>>,
}

impl GroupDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start one worker per group.
    pub fn spawn(
        groups: Vec<GroupSettings>,
        location: Location,
        provider: Arc<dyn SunTimesProvider>,
        sink: Arc<dyn LightSink>,
        interval: Duration,
        debug_enabled: bool,
    ) -> Result<Self> {
        let mut directory = Self::new();
        for settings in groups {
            let group = LightGroup::new(settings, location, provider.clone(), sink.clone())
                .with_debug(debug_enabled);
            let name = group.name().to_string();
            let (handle, join) = GroupWorker::spawn(group, interval)?;
            directory.insert(handle, join);
            log_decorated!("Started group {}", name);
        }
        Ok(directory)
    }

    pub fn insert(&mut self, handle: GroupHandle, worker: JoinHandle<()>) {
        self.handles.push(handle);
        self.workers.push(worker);
    }

    pub fn names(&self) -> Vec<String> {
        self.handles.iter().map(|h| h.name().to_string()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&GroupHandle> {
        self.handles.iter().find(|h| h.name() == name)
    }

    fn require(&self, name: &str) -> Result<&GroupHandle> {
        self.get(name)
            .ok_or_else(|| anyhow::anyhow!("Unknown group: {name}"))
    }

    /// Handles addressed by an optional group name (all when `None`).
    fn select(&self, group: Option<&str>) -> Result<Vec<&GroupHandle>> {
        match group {
            Some(name) => Ok(vec![self.require(name)?]),
            None => Ok(self.handles.iter().collect()),
        }
    }

    /// Enable one group or all of them. Returns the affected names.
    pub fn enable(&self, group: Option<&str>) -> Result<Vec<String>> {
        let selected = self.select(group)?;
        for handle in &selected {
            handle.enable()?;
        }
        Ok(selected.iter().map(|h| h.name().to_string()).collect())
    }

    pub fn disable(&self, group: Option<&str>) -> Result<Vec<String>> {
        let selected = self.select(group)?;
        for handle in &selected {
            handle.disable()?;
        }
        Ok(selected.iter().map(|h| h.name().to_string()).collect())
    }

    pub fn update_options(&self, group: &str, options: GroupOptions) -> Result<()> {
        self.require(group)?.update_options(options)
    }

    /// Restore overridden lights across all groups.
    pub fn restore_lights(&self, lights: Option<&[String]>) -> Result<Vec<String>> {
        let mut restored = Vec::new();
        for handle in &self.handles {
            restored.extend(handle.restore_lights(lights)?);
        }
        Ok(restored)
    }

    /// Override lights wherever they belong.
    ///
    /// Ids that no group knows are logged and left out of the result.
    pub fn override_lights(
        &self,
        lights: &[String],
        values: OverrideValues,
    ) -> Result<Vec<(String, LightOutcome)>> {
        let mut outcomes = Vec::new();
        for handle in &self.handles {
            outcomes.extend(handle.override_lights(lights, values)?);
        }

        for light in lights {
            if !outcomes.iter().any(|(id, _)| id == light) {
                log_warning!("Light {} is not part of any group, skipping", light);
            }
        }
        Ok(outcomes)
    }

    /// Toggle a light's participation switch in every group containing it.
    ///
    /// Returns false when no group contains the light.
    pub fn set_light_enabled(&self, light: &str, enabled: bool) -> Result<bool> {
        let mut found = false;
        for handle in &self.handles {
            found |= handle.set_light_enabled(light, enabled)?;
        }
        if !found {
            log_warning!("Light {} is not part of any group, skipping", light);
        }
        Ok(found)
    }

    pub fn turn_on(&self, group: &str) -> Result<Vec<(String, LightOutcome)>> {
        self.require(group)?.turn_on()
    }

    pub fn turn_off(&self, group: &str) -> Result<Vec<(String, LightOutcome)>> {
        self.require(group)?.turn_off()
    }

    pub fn status(&self) -> Result<Vec<GroupSnapshot>> {
        self.handles.iter().map(GroupHandle::snapshot).collect()
    }

    /// Stop every worker and wait for it to finish its current tick.
    pub fn shutdown(self) {
        for handle in &self.handles {
            handle.shutdown();
        }
        for worker in self.workers {
            if worker.join().is_err() {
                log_warning!("A group worker panicked during shutdown");
            }
        }
    }
}
