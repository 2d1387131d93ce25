//! Command registry
//!
//! Centralized registry for all available commands.
//! This allows loose coupling between command implementations and the dispatcher.

use super::{Command, connection, string, hash};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of all available commands
pub struct CommandRegistry {
    commands: HashMap<String, Arc<dyn Command>>,
}

impl CommandRegistry {
    /// Create a new command registry and register all commands
    pub fn new() -> Self {
        let mut registry = CommandRegistry {
            commands: HashMap::new(),
        };

        // Register connection commands
        registry.register(Arc::new(connection::PingCommand));
        registry.register(Arc::new(connection::EchoCommand));

        // Register string commands
        registry.register(Arc::new(string::SetCommand));
        registry.register(Arc::new(string::GetCommand));

        // Register hash commands
        registry.register(Arc::new(hash::HSetCommand));
        registry.register(Arc::new(hash::HGetCommand));
        registry.register(Arc::new(hash::HGetAllCommand));

        registry
    }

    /// Register a command
    fn register(&mut self, command: Arc<dyn Command>) {
        let name = command.name().to_uppercase();
        self.commands.insert(name, command);
    }

    /// Get a command by name (case-insensitive)
    pub fn get(&self, name: &str) -> Option<Arc<dyn Command>> {
        self.commands.get(&name.to_uppercase()).cloned()
    }

    /// Names of every command that mutates the store, sorted
    pub fn write_commands(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self
            .commands
            .values()
            .filter(|cmd| cmd.is_write())
            .map(|cmd| cmd.name())
            .collect();
        names.sort_unstable();
        names
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}
