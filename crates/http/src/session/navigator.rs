//! Hook through which the session asks the view layer to change screens

use std::sync::Mutex;

/// Receives redirects the session decides on its own, such as sending the
/// user to the login screen after the session died.
pub trait Navigator: Send + Sync {
    fn redirect(&self, path: &str);
}

impl<F> Navigator for F
where
    F: Fn(&str) + Send + Sync,
{
    fn redirect(&self, path: &str) {
        self(path);
    }
}

/// Navigator that ignores redirects
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn redirect(&self, _path: &str) {}
}

/// Navigator that remembers every redirect, in order
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    redirects: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn redirects(&self) -> Vec<String> {
        self.redirects
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn last(&self) -> Option<String> {
        self.redirects().pop()
    }
}

impl Navigator for RecordingNavigator {
    fn redirect(&self, path: &str) {
        if let Ok(mut redirects) = self.redirects.lock() {
            redirects.push(path.to_string());
        }
    }
}
