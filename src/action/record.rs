/// Persisted source form of an action
///
/// A record is the prelude (require directives and namespace declaration) and
/// the rewritten callable body. Stored as a single text joined by a sentinel
/// line which is itself a Lua long comment, so the stored text stays valid Lua.

use crate::error::{Result, SchedulerError};
use serde::{Deserialize, Serialize};

/// Line separating the prelude from the body in the stored text
pub const BODY_SENTINEL: &str = "--[==[ action-body ]==]";

/// Name of the argument the generated entry point forwards into the callable
pub const ENTRY_ARGUMENT: &str = "argument";

/// Source text of one action, as captured at its registration call site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    /// Require directives visible at the call site plus the namespace declaration
    pub prelude: String,
    /// `jobs.execute_job(<callable>)`
    pub body: String,
}

impl ActionRecord {
    pub fn new(prelude: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            prelude: prelude.into(),
            body: body.into(),
        }
    }

    /// Join prelude and body into the stored text
    pub fn to_text(&self) -> String {
        format!("{}\n{}\n{}", self.prelude, BODY_SENTINEL, self.body)
    }

    /// Split stored text back into prelude and body
    pub fn from_text(text: &str) -> Option<Self> {
        let separator = format!("\n{}\n", BODY_SENTINEL);
        let (prelude, body) = text.split_once(&separator)?;
        Some(Self::new(prelude, body))
    }

    /// Build the translation unit handed to the Lua loader
    ///
    /// The body's final `)` receives the entry argument, and the whole call is
    /// wrapped in a function of one argument returned by the chunk.
    pub fn entry_point(&self, identifier: &str) -> Result<String> {
        let close = self.body.rfind(')').ok_or_else(|| SchedulerError::Compilation {
            identifier: identifier.to_string(),
            message: "action body is not a call expression".to_string(),
        })?;
        let mut call = self.body.clone();
        call.insert_str(close, &format!(", {}", ENTRY_ARGUMENT));

        Ok(format!(
            "-- entry point for action '{identifier}'\n{prelude}\nreturn function({arg})\n    return {call}\nend\n",
            identifier = identifier.replace('\n', " "),
            prelude = self.prelude,
            arg = ENTRY_ARGUMENT,
            call = call,
        ))
    }
}
