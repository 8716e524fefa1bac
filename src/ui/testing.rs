use crate::network_client::{ConnectOutcome, NetworkControl, Profile};
use anyhow::{Result, anyhow};
use std::sync::{Arc, Mutex};

#[derive(Debug)]
struct FakeState {
    profiles: Option<Vec<Profile>>,
    outcome: Option<ConnectOutcome>,
    profile_requests: usize,
    connects: Vec<String>,
    restarts: usize,
}

/// In-memory network control recording every request.
#[derive(Clone, Debug)]
pub struct FakeNetwork {
    state: Arc<Mutex<FakeState>>,
}

impl FakeNetwork {
    pub fn with_profiles(profiles: Vec<Profile>) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                profiles: Some(profiles),
                outcome: Some(ConnectOutcome::Connected),
                profile_requests: 0,
                connects: Vec::new(),
                restarts: 0,
            })),
        }
    }

    pub fn failing_profiles() -> Self {
        let fake = Self::with_profiles(Vec::new());
        fake.state.lock().unwrap().profiles = None;
        fake
    }

    pub fn set_profiles(&self, profiles: Vec<Profile>) {
        self.state.lock().unwrap().profiles = Some(profiles);
    }

    pub fn set_outcome(&self, outcome: ConnectOutcome) {
        self.state.lock().unwrap().outcome = Some(outcome);
    }

    pub fn fail_connect(&self) {
        self.state.lock().unwrap().outcome = None;
    }

    pub fn profile_requests(&self) -> usize {
        self.state.lock().unwrap().profile_requests
    }

    pub fn connects(&self) -> Vec<String> {
        self.state.lock().unwrap().connects.clone()
    }

    pub fn restarts(&self) -> usize {
        self.state.lock().unwrap().restarts
    }
}

impl NetworkControl for FakeNetwork {
    async fn list_profiles(&self) -> Result<Vec<Profile>> {
        let mut state = self.state.lock().unwrap();
        state.profile_requests += 1;
        state
            .profiles
            .clone()
            .ok_or_else(|| anyhow!("nmcli unavailable"))
    }

    async fn connect(&self, handle: String) -> Result<ConnectOutcome> {
        let mut state = self.state.lock().unwrap();
        state.connects.push(handle);
        state.outcome.ok_or_else(|| anyhow!("helper missing"))
    }

    async fn restart(&self) -> Result<()> {
        self.state.lock().unwrap().restarts += 1;
        Ok(())
    }
}

pub fn profiles(names: &[&str]) -> Vec<Profile> {
    names
        .iter()
        .map(|name| Profile {
            name: name.to_string(),
            handle: name.to_string(),
        })
        .collect()
}
