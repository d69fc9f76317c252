//! Command registry - resolves keywords and runs their handlers.
//!
//! Keywords are matched case-insensitively and exactly. HELP/? and QUIT/EXIT
//! are built in: QUIT and EXIT are accepted but do nothing here, since the
//! host stops the add-in through the queue.
//!
//! Whatever a handler does (error or panic) ends up as a failure result with
//! a console line; nothing escapes [`CommandRegistry::dispatch`].
//!
//! CHANGELOG:
//! - 10/12/2026 - Built-in VER and DBSIZE handlers
//! - 10/12/2026 - Initial implementation

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::daemon::protocol::{Command, HandlerError, HandlerResult};
use crate::db::{StoreBackend, StoreError};

/// Command handler. Receives the arguments after the keyword.
pub type Handler = Box<dyn Fn(&[&str]) -> Result<Vec<String>, HandlerError>>;

const HELP_KEYWORDS: [&str; 2] = ["HELP", "?"];
const QUIT_KEYWORDS: [&str; 2] = ["QUIT", "EXIT"];

struct Entry {
    usage: String,
    description: Option<String>,
    handler: Handler,
}

/// Keyword table plus the add-in identity used in console text.
pub struct CommandRegistry {
    program_name: String,
    display_name: String,
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl CommandRegistry {
    pub fn new(program_name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            program_name: program_name.into(),
            display_name: display_name.into(),
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Registry with VER and DBSIZE wired to `store`.
    pub fn with_builtins(
        program_name: impl Into<String>,
        display_name: impl Into<String>,
        store: Arc<dyn StoreBackend>,
    ) -> Self {
        let mut registry = Self::new(program_name, display_name);
        let prog = registry.program_name.clone();

        let ver_store = Arc::clone(&store);
        let ver_prog = prog.clone();
        registry.register_with_help(
            "VER",
            "VER",
            "displays the runtime version of this server",
            move |_args| runtime_version(&ver_prog, ver_store.as_ref()),
        );

        registry.register_with_help(
            "DBSIZE",
            "DBSIZE <dbname>",
            "displays the size of a given database",
            move |args| store_size(&prog, store.as_ref(), args),
        );

        registry
    }

    /// Register a handler under `keyword`.
    pub fn register<F>(&mut self, keyword: &str, handler: F)
    where
        F: Fn(&[&str]) -> Result<Vec<String>, HandlerError> + 'static,
    {
        self.insert(keyword, keyword.to_uppercase(), None, Box::new(handler));
    }

    /// Register a handler with the usage line shown by HELP.
    pub fn register_with_help<F>(&mut self, keyword: &str, usage: &str, description: &str, handler: F)
    where
        F: Fn(&[&str]) -> Result<Vec<String>, HandlerError> + 'static,
    {
        self.insert(
            keyword,
            usage.to_string(),
            Some(description.to_string()),
            Box::new(handler),
        );
    }

    fn insert(&mut self, keyword: &str, usage: String, description: Option<String>, handler: Handler) {
        let key = keyword.to_uppercase();
        if is_reserved(&key) || key.split_whitespace().count() != 1 {
            tracing::warn!(keyword, "refusing to register reserved or malformed keyword");
            return;
        }

        let entry = Entry {
            usage,
            description,
            handler,
        };
        match self.index.get(&key) {
            Some(&slot) => self.entries[slot] = entry,
            None => {
                self.index.insert(key, self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    pub fn is_registered(&self, keyword: &str) -> bool {
        self.index.contains_key(&keyword.to_uppercase())
    }

    /// Usage screen, one console line each.
    pub fn help_lines(&self) -> Vec<String> {
        let prog = &self.program_name;
        let mut lines = vec![
            format!("{} Usage:", self.display_name),
            format!("Tell {} HELP  -- displays this help screen", prog),
        ];
        for entry in &self.entries {
            lines.push(match &entry.description {
                Some(description) => format!("Tell {} {}  -- {}", prog, entry.usage, description),
                None => format!("Tell {} {}", prog, entry.usage),
            });
        }
        lines.push(format!("Tell {} QUIT  -- terminates this addin", prog));
        lines
    }

    /// Resolve and run one command.
    pub fn dispatch(&self, command: &Command) -> HandlerResult {
        let Some(keyword) = command.keyword() else {
            tracing::debug!("empty command");
            return HandlerResult::failure(self.help_lines());
        };
        let key = keyword.to_uppercase();

        if HELP_KEYWORDS.contains(&key.as_str()) {
            return HandlerResult::success(self.help_lines());
        }
        if QUIT_KEYWORDS.contains(&key.as_str()) {
            tracing::debug!(keyword, "quit is handled by the host");
            return HandlerResult::success(Vec::new());
        }

        let Some(entry) = self.index.get(&key).map(|&slot| &self.entries[slot]) else {
            tracing::info!(keyword, "unknown command");
            let mut lines = vec![format!("Unknown argument for {}: {}", self.display_name, keyword)];
            lines.extend(self.help_lines());
            return HandlerResult::failure(lines);
        };

        let args = command.args();
        let outcome = catch_unwind(AssertUnwindSafe(|| (entry.handler)(&args)))
            .unwrap_or_else(|panic| Err(HandlerError::Unknown(panic_message(panic.as_ref()))));

        match outcome {
            Ok(lines) => HandlerResult::success(lines),
            Err(e) => {
                tracing::warn!(keyword = %key, error = %e, "command failed");
                HandlerResult::failure(vec![format!("{} - {}", self.program_name, e)])
            }
        }
    }
}

fn is_reserved(key: &str) -> bool {
    HELP_KEYWORDS.contains(&key) || QUIT_KEYWORDS.contains(&key)
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("Internal error: {}", detail)
}

fn runtime_version(prog: &str, store: &dyn StoreBackend) -> Result<Vec<String>, HandlerError> {
    let version = store.runtime_version().map_err(|e| {
        HandlerError::BackendUnavailable(format!("Error getting runtime version: {}", e))
    })?;
    Ok(vec![format!("{} - Runtime version: {}", prog, version)])
}

fn store_size(prog: &str, store: &dyn StoreBackend, args: &[&str]) -> Result<Vec<String>, HandlerError> {
    let name = args
        .first()
        .ok_or_else(|| HandlerError::BadArguments("DBSIZE requires a database name".to_string()))?;

    match store.store_size(name) {
        Ok(bytes) => Ok(vec![format!("{} - Database {} is {} bytes", prog, name, bytes)]),
        Err(StoreError::NotFound(_)) => Err(HandlerError::StoreNotFound(name.to_string())),
        Err(e) => Err(HandlerError::BackendUnavailable(format!(
            "Error getting database size: {}",
            e
        ))),
    }
}
