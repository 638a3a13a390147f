// ABOUTME: Generic deployment struct parameterized by state type.
// ABOUTME: States carry their own data for compile-time guarantees.

use crate::config::Settings;
use crate::types::{ContainerId, ImageRef, SlotColor};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use super::state::{Completed, Initialized, Phase};

/// A deployment in progress, parameterized by its current state.
///
/// The state type parameter `S` carries state-specific data (like the new
/// container id) directly. Transitions consume `self`, so a deployment can
/// only move forward along the chain.
#[derive(Debug)]
pub struct Deployment<'a, S> {
    pub(crate) settings: &'a Settings,
    pub(crate) env: &'a HashMap<String, String>,
    pub(crate) image: ImageRef,
    pub(crate) active: Option<SlotColor>,
    pub(crate) target: SlotColor,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) state: S,
}

impl<'a> Deployment<'a, Initialized> {
    /// `active` is `None` for the first deployment of an environment, which
    /// always lands on blue.
    pub fn new(
        settings: &'a Settings,
        env: &'a HashMap<String, String>,
        image: ImageRef,
        active: Option<SlotColor>,
    ) -> Self {
        Deployment {
            settings,
            env,
            image,
            active,
            target: active.map_or(SlotColor::Blue, SlotColor::other),
            started_at: Utc::now(),
            state: Initialized,
        }
    }
}

impl<'a, S> Deployment<'a, S> {
    pub fn image(&self) -> &ImageRef {
        &self.image
    }

    /// Slot serving production when the deployment started.
    pub fn active(&self) -> Option<SlotColor> {
        self.active
    }

    pub fn target(&self) -> SlotColor {
        self.target
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    /// Move to the next state, keeping the plan.
    pub(crate) fn transition<T>(self, state: T) -> Deployment<'a, T> {
        Deployment {
            settings: self.settings,
            env: self.env,
            image: self.image,
            active: self.active,
            target: self.target,
            started_at: self.started_at,
            state,
        }
    }
}

impl<S: Phase> Deployment<'_, S> {
    pub fn phase(&self) -> super::DeployPhase {
        S::PHASE
    }
}

impl Deployment<'_, Completed> {
    pub fn deployed_container(&self) -> &ContainerId {
        self.state.container_id()
    }
}
