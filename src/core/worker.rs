//! Per-group worker thread.
//!
//! Each group runs on its own thread that owns the [`LightGroup`]. Commands
//! arrive over an `mpsc` channel and the thread waits for them with
//! `recv_timeout` until the next scheduled tick is due. When a message arrives
//! every queued message is applied first and a single tick follows, so any
//! number of forced ticks in one burst collapse into one and two ticks of the
//! same group can never overlap.

use anyhow::{Context, Result};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::{GroupOptions, GroupSnapshot, LightGroup, LightOutcome, OverrideValues};
use crate::constants::CONTROL_REPLY_TIMEOUT_SECS;

type Outcomes = Vec<(String, LightOutcome)>;

/// Messages understood by a group worker.
pub enum GroupMessage {
    /// Run a tick now.
    Tick,
    Enable,
    Disable,
    UpdateOptions(GroupOptions),
    SetLightEnabled {
        light: String,
        enabled: bool,
        reply: Sender<bool>,
    },
    OverrideLights {
        lights: Vec<String>,
        values: OverrideValues,
        reply: Sender<Outcomes>,
    },
    RestoreLights {
        lights: Option<Vec<String>>,
        reply: Sender<Vec<String>>,
    },
    TurnOn {
        reply: Sender<Result<Outcomes, String>>,
    },
    TurnOff {
        reply: Sender<Outcomes>,
    },
    /// Answered after any tick triggered by the same batch of messages.
    Snapshot {
        reply: Sender<GroupSnapshot>,
    },
    Shutdown,
}

enum Effect {
    None,
    ForceTick,
    Deferred(Sender<GroupSnapshot>),
    Shutdown,
}

pub struct GroupWorker {
    group: LightGroup,
    receiver: Receiver<GroupMessage>,
    interval: Duration,
}

impl GroupWorker {
    /// Start the worker thread for `group`, ticking every `interval`.
    pub fn spawn(group: LightGroup, interval: Duration) -> Result<(GroupHandle, JoinHandle<()>)> {
        let (sender, receiver) = mpsc::channel();
        let name = group.name().to_string();
        let worker = Self {
            group,
            receiver,
            interval,
        };

        let join = std::thread::Builder::new()
            .name(format!("group-{name}"))
            .spawn(move || worker.run())
            .with_context(|| format!("Failed to start worker thread for group {name}"))?;

        Ok((GroupHandle { name, sender }, join))
    }

    fn run(mut self) {
        let mut next_tick = if self.group.restore_on_startup() {
            Instant::now()
        } else {
            Instant::now() + self.interval
        };

        loop {
            let timeout = next_tick.saturating_duration_since(Instant::now());
            match self.receiver.recv_timeout(timeout) {
                Ok(first) => {
                    let batch: Vec<GroupMessage> =
                        std::iter::once(first).chain(self.receiver.try_iter()).collect();

                    let mut force_tick = false;
                    let mut shutdown = false;
                    let mut deferred = Vec::new();

                    for message in batch {
                        match self.apply(message) {
                            Effect::None => {}
                            Effect::ForceTick => force_tick = true,
                            Effect::Deferred(reply) => deferred.push(reply),
                            Effect::Shutdown => shutdown = true,
                        }
                    }

                    if force_tick && !shutdown {
                        self.group.tick(crate::time_source::now());
                        next_tick = Instant::now() + self.interval;
                    }

                    for reply in deferred {
                        let _ = reply.send(self.group.snapshot());
                    }

                    if shutdown {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    self.group.tick(crate::time_source::now());
                    next_tick = Instant::now() + self.interval;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn apply(&mut self, message: GroupMessage) -> Effect {
        match message {
            GroupMessage::Tick => Effect::ForceTick,
            GroupMessage::Enable => {
                self.group.enable();
                Effect::ForceTick
            }
            GroupMessage::Disable => {
                self.group.disable();
                Effect::ForceTick
            }
            GroupMessage::UpdateOptions(options) => {
                self.group.update_options(options);
                Effect::ForceTick
            }
            GroupMessage::SetLightEnabled {
                light,
                enabled,
                reply,
            } => {
                let member = self.group.set_light_enabled(&light, enabled);
                let _ = reply.send(member);
                if member {
                    Effect::ForceTick
                } else {
                    Effect::None
                }
            }
            GroupMessage::OverrideLights {
                lights,
                values,
                reply,
            } => {
                let outcomes = self.group.override_lights(&lights, values);
                let _ = reply.send(outcomes);
                Effect::None
            }
            GroupMessage::RestoreLights { lights, reply } => {
                let restored = self.group.restore_lights(lights.as_deref());
                let changed = !restored.is_empty();
                let _ = reply.send(restored);
                if changed {
                    Effect::ForceTick
                } else {
                    Effect::None
                }
            }
            GroupMessage::TurnOn { reply } => {
                let result = self
                    .group
                    .turn_on_group(crate::time_source::now())
                    .map_err(|e| format!("{e:#}"));
                let _ = reply.send(result);
                Effect::None
            }
            GroupMessage::TurnOff { reply } => {
                let _ = reply.send(self.group.turn_off_group());
                Effect::None
            }
            GroupMessage::Snapshot { reply } => Effect::Deferred(reply),
            GroupMessage::Shutdown => Effect::Shutdown,
        }
    }
}

/// Sending side of a group worker.
#[derive(Clone)]
pub struct GroupHandle {
    name: String,
    sender: Sender<GroupMessage>,
}

impl GroupHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn send(&self, message: GroupMessage) -> Result<()> {
        self.sender
            .send(message)
            .map_err(|_| anyhow::anyhow!("Group {} is no longer running", self.name))
    }

    fn request<T>(&self, build: impl FnOnce(Sender<T>) -> GroupMessage) -> Result<T> {
        let (reply, response) = mpsc::channel();
        self.send(build(reply))?;
        response
            .recv_timeout(Duration::from_secs(CONTROL_REPLY_TIMEOUT_SECS))
            .with_context(|| format!("Group {} did not answer", self.name))
    }

    pub fn tick(&self) -> Result<()> {
        self.send(GroupMessage::Tick)
    }

    pub fn enable(&self) -> Result<()> {
        self.send(GroupMessage::Enable)
    }

    pub fn disable(&self) -> Result<()> {
        self.send(GroupMessage::Disable)
    }

    pub fn update_options(&self, options: GroupOptions) -> Result<()> {
        self.send(GroupMessage::UpdateOptions(options))
    }

    /// Returns whether the light belongs to this group.
    pub fn set_light_enabled(&self, light: &str, enabled: bool) -> Result<bool> {
        self.request(|reply| GroupMessage::SetLightEnabled {
            light: light.to_string(),
            enabled,
            reply,
        })
    }

    pub fn override_lights(&self, lights: &[String], values: OverrideValues) -> Result<Outcomes> {
        self.request(|reply| GroupMessage::OverrideLights {
            lights: lights.to_vec(),
            values,
            reply,
        })
    }

    pub fn restore_lights(&self, lights: Option<&[String]>) -> Result<Vec<String>> {
        self.request(|reply| GroupMessage::RestoreLights {
            lights: lights.map(<[String]>::to_vec),
            reply,
        })
    }

    pub fn turn_on(&self) -> Result<Outcomes> {
        self.request(|reply| GroupMessage::TurnOn { reply })?
            .map_err(anyhow::Error::msg)
    }

    pub fn turn_off(&self) -> Result<Outcomes> {
        self.request(|reply| GroupMessage::TurnOff { reply })
    }

    pub fn snapshot(&self) -> Result<GroupSnapshot> {
        self.request(|reply| GroupMessage::Snapshot { reply })
    }

    pub fn shutdown(&self) {
        let _ = self.sender.send(GroupMessage::Shutdown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::VirtualBackend;
    use crate::circadian::{ScheduleBounds, TransitionSpeed};
    use crate::core::GroupSettings;
    use crate::geo::{Location, MockSunTimesProvider, SunTimes};
    use chrono::{Duration as ChronoDuration, Utc};
    use std::sync::Arc;

    fn spawn_group(restore_on_startup: bool) -> (GroupHandle, JoinHandle<()>, Arc<VirtualBackend>) {
        let mut provider = MockSunTimesProvider::new();
        provider.expect_sun_times().returning(|_, _| {
            let now = Utc::now();
            Ok(SunTimes {
                sunrise: now - ChronoDuration::hours(10),
                // Just under two hours into the ramp for the whole test.
                sunset: now - ChronoDuration::minutes(119),
            })
        });
        let backend = Arc::new(VirtualBackend::with_lights(["light.a".to_string()]));
        let settings = GroupSettings {
            name: "office".into(),
            lights: vec!["light.a".into()],
            bounds: ScheduleBounds {
                min_brightness: 20,
                max_brightness: 100,
                min_color_temp: 2700,
                max_color_temp: 5000,
            },
            options: super::GroupOptions {
                sunset_offset: 0,
                transition_speed: TransitionSpeed::Moderate,
                override_detection: false,
            },
            restore_on_startup,
        };
        let location = Location {
            latitude: 0.0,
            longitude: 0.0,
            timezone: chrono_tz::UTC,
        };
        let group = LightGroup::new(settings, location, Arc::new(provider), backend.clone());
        let (handle, join) = GroupWorker::spawn(group, Duration::from_secs(3600)).unwrap();
        (handle, join, backend)
    }

    #[test]
    fn test_restore_on_startup_ticks_immediately() {
        let (handle, join, backend) = spawn_group(true);
        let deadline = Instant::now() + Duration::from_secs(5);
        while backend.calls().is_empty() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(backend.commands_for("light.a").len(), 1);

        handle.shutdown();
        join.join().unwrap();
    }

    #[test]
    fn test_no_startup_tick_without_restore() {
        let (handle, join, backend) = spawn_group(false);
        let snapshot = handle.snapshot().unwrap();
        assert!(snapshot.last_tick.is_none());
        assert!(backend.calls().is_empty());

        handle.shutdown();
        join.join().unwrap();
    }

    #[test]
    fn test_commands_then_single_tick() {
        let (handle, join, backend) = spawn_group(false);

        handle.disable().unwrap();
        let snapshot = handle.snapshot().unwrap();
        assert!(!snapshot.enabled);
        assert!(snapshot.last_tick.is_some());
        assert!(backend.calls().is_empty());

        handle.enable().unwrap();
        handle.tick().unwrap();
        let snapshot = handle.snapshot().unwrap();
        assert!(snapshot.enabled);
        assert_eq!(snapshot.last_counts.updated, 1);

        assert!(handle.set_light_enabled("light.a", false).unwrap());
        assert!(!handle.set_light_enabled("light.other", false).unwrap());

        handle.shutdown();
        join.join().unwrap();
    }

    #[test]
    fn test_override_and_restore_through_handle() {
        let (handle, join, backend) = spawn_group(false);

        let outcomes = handle
            .override_lights(
                &["light.a".to_string()],
                OverrideValues {
                    brightness: Some(42),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(outcomes, vec![("light.a".to_string(), LightOutcome::Updated)]);
        assert_eq!(backend.state("light.a").unwrap().brightness_pct, Some(42));

        assert_eq!(handle.restore_lights(None).unwrap(), vec!["light.a".to_string()]);
        let snapshot = handle.snapshot().unwrap();
        assert!(snapshot.overrides.is_empty());
        assert_eq!(backend.state("light.a").unwrap().brightness_pct, Some(60));

        handle.shutdown();
        join.join().unwrap();
    }

    #[test]
    fn test_turn_off_and_on_through_handle() {
        let (handle, join, backend) = spawn_group(false);

        handle.turn_off().unwrap();
        assert!(!backend.state("light.a").unwrap().is_on());

        let outcomes = handle.turn_on().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(backend.state("light.a").unwrap().is_on());

        handle.shutdown();
        join.join().unwrap();
    }
}
