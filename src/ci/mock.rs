use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::ci::CiJobStore;
use crate::error::{ReleaseError, Result};

#[derive(Debug, Clone, Default)]
struct Job {
    config: String,
    next_build_number: u64,
}

#[derive(Debug, Default)]
struct StoreState {
    jobs: BTreeMap<String, Job>,
    views: BTreeMap<String, String>,
    builds: Vec<String>,
    reconfigured: Vec<String>,
    reject_build_numbers: bool,
}

/// In-memory [`CiJobStore`] for tests.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    state: Mutex<StoreState>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_job(self, job: &str, config: &str, next_build_number: u64) -> Self {
        self.lock().jobs.insert(
            job.to_string(),
            Job {
                config: config.to_string(),
                next_build_number,
            },
        );
        self
    }

    pub fn with_view(self, view: &str, config: &str) -> Self {
        self.lock()
            .views
            .insert(view.to_string(), config.to_string());
        self
    }

    /// Make every build-number upload fail, as an unreachable build server would.
    pub fn rejecting_build_numbers(self) -> Self {
        self.lock().reject_build_numbers = true;
        self
    }

    pub fn config(&self, job: &str) -> Option<String> {
        self.lock().jobs.get(job).map(|j| j.config.clone())
    }

    pub fn build_number(&self, job: &str) -> Option<u64> {
        self.lock().jobs.get(job).map(|j| j.next_build_number)
    }

    pub fn view(&self, view: &str) -> Option<String> {
        self.lock().views.get(view).cloned()
    }

    pub fn job_names(&self) -> Vec<String> {
        self.lock().jobs.keys().cloned().collect()
    }

    /// Jobs whose builds were triggered, in order.
    pub fn builds(&self) -> Vec<String> {
        self.lock().builds.clone()
    }

    /// Jobs whose configuration was replaced, in order.
    pub fn reconfigured(&self) -> Vec<String> {
        self.lock().reconfigured.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn missing_job(job: &str) -> ReleaseError {
    ReleaseError::remote(format!("Job '{}' does not exist", job))
}

impl CiJobStore for InMemoryJobStore {
    fn job_exists(&self, job: &str) -> Result<bool> {
        Ok(self.lock().jobs.contains_key(job))
    }

    fn get_config(&self, job: &str) -> Result<String> {
        self.config(job).ok_or_else(|| missing_job(job))
    }

    fn set_config(&self, job: &str, xml: &str) -> Result<()> {
        let mut state = self.lock();
        let entry = state.jobs.get_mut(job).ok_or_else(|| missing_job(job))?;
        entry.config = xml.to_string();
        state.reconfigured.push(job.to_string());
        Ok(())
    }

    fn create_job(&self, job: &str, xml: &str) -> Result<()> {
        let mut state = self.lock();
        if state.jobs.contains_key(job) {
            return Err(ReleaseError::remote(format!("Job '{}' already exists", job)));
        }
        state.jobs.insert(
            job.to_string(),
            Job {
                config: xml.to_string(),
                next_build_number: 1,
            },
        );
        Ok(())
    }

    fn get_build_number(&self, job: &str) -> Result<u64> {
        self.build_number(job).ok_or_else(|| missing_job(job))
    }

    fn set_build_number(&self, job: &str, number: u64) -> Result<()> {
        let mut state = self.lock();
        if state.reject_build_numbers {
            return Err(ReleaseError::remote(format!(
                "scp of nextBuildNumber for '{}' failed",
                job
            )));
        }
        let entry = state.jobs.get_mut(job).ok_or_else(|| missing_job(job))?;
        entry.next_build_number = number;
        Ok(())
    }

    fn build_job(&self, job: &str) -> Result<()> {
        let mut state = self.lock();
        if !state.jobs.contains_key(job) {
            return Err(missing_job(job));
        }
        state.builds.push(job.to_string());
        Ok(())
    }

    fn get_view_config(&self, view: &str) -> Result<String> {
        self.view(view)
            .ok_or_else(|| ReleaseError::remote(format!("View '{}' does not exist", view)))
    }

    fn set_view_config(&self, view: &str, xml: &str) -> Result<()> {
        let mut state = self.lock();
        let entry = state
            .views
            .get_mut(view)
            .ok_or_else(|| ReleaseError::remote(format!("View '{}' does not exist", view)))?;
        *entry = xml.to_string();
        Ok(())
    }
}
