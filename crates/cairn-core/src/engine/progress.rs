#[derive(Debug, Clone)]
pub enum Progress {
    PhaseStart { name: &'static str },
    PhaseFinish,

    TaskStart { total: u64 },
    TaskAdvance,
    TaskFinish,

    Message(String),
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

#[derive(Default)]
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new() -> Self {
        Self { callback: None }
    }

    pub fn with_callback(callback: ProgressCallback<'a>) -> Self {
        Self { callback: Some(callback) }
    }

    pub fn report(&self, progress: Progress) {
        if let Some(callback) = &self.callback {
            callback(progress);
        }
    }
}
