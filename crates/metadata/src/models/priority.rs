use serde::{Deserialize, Serialize};

/// Who is waiting on a provider call.
///
/// Interactive work is served first; background refresh work only gets a
/// token ahead of it after waiting past the limiter's aging bound.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    #[default]
    Interactive,
    Background,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Interactive => "interactive",
            Priority::Background => "background",
        }
    }
}
