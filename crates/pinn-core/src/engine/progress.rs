use super::state::RunStatus;

/// Events emitted by workflows and the training loop.
///
/// Phases bracket workflow stages; the task events follow the training loop
/// itself, one increment per drawn batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    PhaseStart { name: &'static str },
    PhaseFinish,

    TaskStart { total_steps: u64 },
    /// `loss` is `None` when the batch was skipped.
    TaskIncrement { step: u64, loss: Option<f64> },
    TaskFinish { status: RunStatus, steps: u64 },

    /// Held-out loss after `step` training steps.
    Evaluation { step: u64, loss: f64 },

    Message(String),
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

#[derive(Default)]
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    pub fn is_silent(&self) -> bool {
        self.callback.is_none()
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }

    /// Builds the message only when someone is listening.
    pub fn message(&self, text: impl FnOnce() -> String) {
        if let Some(cb) = &self.callback {
            cb(Progress::Message(text()));
        }
    }

    /// Runs `stage` between `PhaseStart` and `PhaseFinish`.
    ///
    /// `PhaseFinish` is reported only when the stage succeeds, so listeners
    /// see an unterminated phase for the stage that failed.
    pub fn phase<T, E>(
        &self,
        name: &'static str,
        stage: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E> {
        self.report(Progress::PhaseStart { name });
        let value = stage()?;
        self.report(Progress::PhaseFinish);
        Ok(value)
    }
}

impl std::fmt::Debug for ProgressReporter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("silent", &self.is_silent())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recording(events: &Mutex<Vec<Progress>>) -> ProgressReporter<'_> {
        ProgressReporter::with_callback(Box::new(move |event| events.lock().unwrap().push(event)))
    }

    #[test]
    fn silent_reporter_never_builds_messages() {
        let reporter = ProgressReporter::new();
        assert!(reporter.is_silent());
        reporter.message(|| panic!("message built without a listener"));
    }

    #[test]
    fn phase_brackets_successful_stages() {
        let events = Mutex::new(Vec::new());
        let reporter = recording(&events);
        let value: Result<u32, ()> = reporter.phase("Preparation", || {
            reporter.message(|| "inside".to_string());
            Ok(7)
        });
        drop(reporter);

        assert_eq!(value, Ok(7));
        assert_eq!(
            events.into_inner().unwrap(),
            vec![
                Progress::PhaseStart {
                    name: "Preparation"
                },
                Progress::Message("inside".to_string()),
                Progress::PhaseFinish,
            ]
        );
    }

    #[test]
    fn failed_phase_is_left_open() {
        let events = Mutex::new(Vec::new());
        let reporter = recording(&events);
        let value: Result<(), &str> = reporter.phase("Training", || Err("boom"));
        drop(reporter);

        assert_eq!(value, Err("boom"));
        assert_eq!(
            events.into_inner().unwrap(),
            vec![Progress::PhaseStart { name: "Training" }]
        );
    }
}
